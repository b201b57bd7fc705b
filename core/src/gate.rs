//! Gate rules: does a wallet hold a live, well-formed verification attestation?
//!
//! Both the on-chain `attestation-gate` program and the backend's local
//! validation mode run [`evaluate`]. Neither trusts the attestation header on
//! its own; every field is checked against what the caller expects.

use core::fmt;

use solana_attestation_service_client::accounts::Attestation;
use solana_pubkey::Pubkey;

use crate::pda::{attestation_pda, SAS_PROGRAM_ID};
use crate::schema::PAYLOAD_LEN;

/// What the caller expects the attestation to be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateContext {
    pub credential: Pubkey,
    pub schema: Pubkey,
    pub user: Pubkey,
    /// Current unix time in seconds.
    pub now: i64,
}

/// Reasons an attestation account is refused outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    WrongOwner,
    InvalidAttestationPda,
    DecodeFailed,
    HeaderMismatch,
    Expired,
    SchemaMismatch,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Rejection::WrongOwner => "Attestation account is not owned by SAS program",
            Rejection::InvalidAttestationPda => "Attestation PDA mismatch",
            Rejection::DecodeFailed => "Could not decode SAS attestation account",
            Rejection::HeaderMismatch => "Attestation header mismatch",
            Rejection::Expired => "Attestation expired",
            Rejection::SchemaMismatch => "Schema/payload length mismatch",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Rejection {}

/// Evaluate an attestation account against the gate.
///
/// Checks run in order and the first failure is returned:
/// 1. owner is the SAS program
/// 2. `address` is the attestation PDA for (credential, schema, user)
/// 3. data decodes as an SAS attestation
/// 4. header credential, schema and nonce match the context
/// 5. `now < expiry`
/// 6. payload is exactly [`PAYLOAD_LEN`] bytes
///
/// On success returns whether both `age` and `country` are set. Any non-zero
/// byte counts as set.
pub fn evaluate(
    owner: &Pubkey,
    address: &Pubkey,
    data: &[u8],
    ctx: &GateContext,
) -> Result<bool, Rejection> {
    if *owner != SAS_PROGRAM_ID {
        return Err(Rejection::WrongOwner);
    }

    let expected = attestation_pda(&ctx.credential, &ctx.schema, &ctx.user);
    if *address != expected {
        return Err(Rejection::InvalidAttestationPda);
    }

    let attestation = Attestation::from_bytes(data).map_err(|_| Rejection::DecodeFailed)?;
    evaluate_attestation(&attestation, ctx)
}

/// Steps 4 to 6 of [`evaluate`], for an already decoded attestation.
pub fn evaluate_attestation(attestation: &Attestation, ctx: &GateContext) -> Result<bool, Rejection> {
    if attestation.credential != ctx.credential
        || attestation.schema != ctx.schema
        || attestation.nonce != ctx.user
    {
        return Err(Rejection::HeaderMismatch);
    }

    if ctx.now >= attestation.expiry {
        return Err(Rejection::Expired);
    }

    let payload = attestation.data.as_slice();
    if payload.len() != PAYLOAD_LEN {
        return Err(Rejection::SchemaMismatch);
    }

    let age = payload[0] != 0;
    let country = payload[1] != 0;
    Ok(age && country)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pda::IssuerAccounts;
    use borsh::BorshSerialize;

    const NOW: i64 = 1_750_000_000;

    /// On-chain layout of an SAS attestation account.
    #[derive(BorshSerialize, Clone)]
    struct RawAttestation {
        discriminator: u8,
        nonce: Pubkey,
        credential: Pubkey,
        schema: Pubkey,
        data: Vec<u8>,
        signer: Pubkey,
        expiry: i64,
        token_account: Pubkey,
    }

    struct Fixture {
        ctx: GateContext,
        address: Pubkey,
        attestation: RawAttestation,
    }

    fn fixture(payload: Vec<u8>) -> Fixture {
        let accounts = IssuerAccounts::derive(&Pubkey::new_unique());
        let user = Pubkey::new_unique();
        let ctx = GateContext {
            credential: accounts.credential,
            schema: accounts.schema,
            user,
            now: NOW,
        };
        let attestation = RawAttestation {
            discriminator: 2,
            nonce: user,
            credential: accounts.credential,
            schema: accounts.schema,
            data: payload,
            signer: Pubkey::new_unique(),
            expiry: NOW + 3600,
            token_account: Pubkey::default(),
        };
        Fixture {
            ctx,
            address: accounts.attestation(&user),
            attestation,
        }
    }

    fn run(f: &Fixture) -> Result<bool, Rejection> {
        let data = borsh::to_vec(&f.attestation).unwrap();
        evaluate(&SAS_PROGRAM_ID, &f.address, &data, &f.ctx)
    }

    #[test]
    fn test_valid_attestation() {
        assert_eq!(run(&fixture(vec![1, 1])), Ok(true));
    }

    #[test]
    fn test_partial_payload_is_not_valid() {
        assert_eq!(run(&fixture(vec![1, 0])), Ok(false));
        assert_eq!(run(&fixture(vec![0, 1])), Ok(false));
        assert_eq!(run(&fixture(vec![0, 0])), Ok(false));
    }

    #[test]
    fn test_any_nonzero_byte_is_set() {
        assert_eq!(run(&fixture(vec![7, 255])), Ok(true));
    }

    #[test]
    fn test_wrong_owner() {
        let f = fixture(vec![1, 1]);
        let data = borsh::to_vec(&f.attestation).unwrap();
        let system_program = Pubkey::default();
        assert_eq!(
            evaluate(&system_program, &f.address, &data, &f.ctx),
            Err(Rejection::WrongOwner)
        );
    }

    #[test]
    fn test_wrong_user_is_pda_mismatch() {
        let mut f = fixture(vec![1, 1]);
        f.ctx.user = Pubkey::new_unique();
        assert_eq!(run(&f), Err(Rejection::InvalidAttestationPda));
    }

    #[test]
    fn test_undecodable_account() {
        let f = fixture(vec![1, 1]);
        assert_eq!(
            evaluate(&SAS_PROGRAM_ID, &f.address, &[2, 0, 0], &f.ctx),
            Err(Rejection::DecodeFailed)
        );
        assert_eq!(
            evaluate(&SAS_PROGRAM_ID, &f.address, &[], &f.ctx),
            Err(Rejection::DecodeFailed)
        );
    }

    #[test]
    fn test_header_mismatch() {
        let mut f = fixture(vec![1, 1]);
        f.attestation.nonce = Pubkey::new_unique();
        assert_eq!(run(&f), Err(Rejection::HeaderMismatch));

        let mut f = fixture(vec![1, 1]);
        f.attestation.schema = Pubkey::new_unique();
        assert_eq!(run(&f), Err(Rejection::HeaderMismatch));
    }

    #[test]
    fn test_header_credential_mismatch() {
        // The address is still the PDA for the expected credential, only the
        // header points elsewhere.
        let mut f = fixture(vec![1, 1]);
        f.attestation.credential = Pubkey::new_unique();
        assert_eq!(run(&f), Err(Rejection::HeaderMismatch));
    }

    #[test]
    fn test_expired() {
        let mut f = fixture(vec![1, 1]);
        f.attestation.expiry = NOW;
        assert_eq!(run(&f), Err(Rejection::Expired));
    }

    #[test]
    fn test_payload_length_mismatch() {
        assert_eq!(run(&fixture(vec![1])), Err(Rejection::SchemaMismatch));
        assert_eq!(run(&fixture(vec![1, 1, 1])), Err(Rejection::SchemaMismatch));
    }

    #[test]
    fn test_expiry_checked_before_payload() {
        let mut f = fixture(vec![1]);
        f.attestation.expiry = NOW - 1;
        assert_eq!(run(&f), Err(Rejection::Expired));
    }
}
