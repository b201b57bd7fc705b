//! On-chain gate for SAS verification attestations.
//!
//! `validate` re-runs the shared gate rules from `sas-gate-core` against the
//! accounts passed in and emits a [`ValidationResult`] event. Callers read the
//! verdict from the event; a rejected account fails the instruction instead.

#![allow(deprecated, unexpected_cfgs)] // #[program] expands to deprecated items

use anchor_lang::prelude::*;
use sas_gate_core::{evaluate, GateContext, Rejection};

declare_id!("FSzAQ5gnGcpGTc6HoPb28JMBnVWyZ7Uj1NXZ2zrwYLyh");

#[program]
pub mod attestation_gate {
    use super::*;

    /// Validate that `user_wallet` has an unexpired attestation with payload
    /// `{ age: true, country: true }` under the given credential and schema.
    pub fn validate(ctx: Context<Validate>, user_wallet: Pubkey) -> Result<()> {
        validate_impl(ctx, user_wallet)
    }
}

fn validate_impl(ctx: Context<Validate>, user_wallet: Pubkey) -> Result<()> {
    let attestation = &ctx.accounts.attestation;
    let gate = GateContext {
        credential: ctx.accounts.credential.key(),
        schema: ctx.accounts.schema.key(),
        user: user_wallet,
        now: ctx.accounts.clock.unix_timestamp,
    };

    let data = attestation.try_borrow_data()?;
    let valid = evaluate(attestation.owner, attestation.key, &data, &gate)
        .map_err(|rejection| -> Error { GateError::from(rejection).into() })?;

    msg!("attestation gate: user={} valid={}", user_wallet, valid);
    emit!(ValidationResult {
        user: user_wallet,
        valid,
    });

    Ok(())
}

#[derive(Accounts)]
pub struct Validate<'info> {
    /// CHECK: SAS attestation PDA for (credential, schema, user); verified in the handler
    pub attestation: UncheckedAccount<'info>,
    /// CHECK: SAS credential PDA of the issuer
    pub credential: UncheckedAccount<'info>,
    /// CHECK: SAS schema PDA under the credential
    pub schema: UncheckedAccount<'info>,
    pub clock: Sysvar<'info, Clock>,
}

#[event]
pub struct ValidationResult {
    pub user: Pubkey,
    pub valid: bool,
}

#[error_code]
pub enum GateError {
    #[msg("Attestation account is not owned by SAS program")]
    WrongOwner,
    #[msg("Attestation PDA mismatch")]
    InvalidAttestationPda,
    #[msg("Could not decode SAS attestation account")]
    DecodeFailed,
    #[msg("Attestation header mismatch")]
    HeaderMismatch,
    #[msg("Attestation expired")]
    Expired,
    #[msg("Schema/payload length mismatch")]
    SchemaMismatch,
}

impl From<Rejection> for GateError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::WrongOwner => GateError::WrongOwner,
            Rejection::InvalidAttestationPda => GateError::InvalidAttestationPda,
            Rejection::DecodeFailed => GateError::DecodeFailed,
            Rejection::HeaderMismatch => GateError::HeaderMismatch,
            Rejection::Expired => GateError::Expired,
            Rejection::SchemaMismatch => GateError::SchemaMismatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Rejection; 6] = [
        Rejection::WrongOwner,
        Rejection::InvalidAttestationPda,
        Rejection::DecodeFailed,
        Rejection::HeaderMismatch,
        Rejection::Expired,
        Rejection::SchemaMismatch,
    ];

    #[test]
    fn test_program_id_matches_core() {
        assert_eq!(crate::ID, sas_gate_core::GATE_PROGRAM_ID);
    }

    #[test]
    fn test_error_codes_are_stable() {
        // Anchor custom errors start at 6000 and follow declaration order.
        for (i, rejection) in ALL.into_iter().enumerate() {
            assert_eq!(u32::from(GateError::from(rejection)), 6000 + i as u32);
        }
    }

    #[test]
    fn test_error_messages_match_core() {
        for rejection in ALL {
            assert_eq!(GateError::from(rejection).to_string(), rejection.to_string());
        }
    }
}
