//! Client side of the `attestation-gate` program.
//!
//! [`GateClient`] asks the on-chain program for a verdict by simulating its
//! `validate` instruction and reading the `ValidationResult` event back out of
//! the program logs. [`LocalValidator`] applies the same rules off-chain to the
//! attestation account fetched over RPC.

use std::fmt;
use std::sync::Arc;

use anchor_lang::{AnchorDeserialize, Discriminator, InstructionData, ToAccountMetas};
use anyhow::{Context, Result};
use async_trait::async_trait;
use attestation_gate::accounts::Validate as ValidateAccounts;
use attestation_gate::instruction::Validate as ValidateIx;
use attestation_gate::ValidationResult;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sas_gate_core::{evaluate, GateContext, IssuerAccounts};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_sdk::{
    account::Account,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    sysvar,
    transaction::Transaction,
};
use tracing::{debug, warn};

use crate::rpc::fetch_account;
use crate::server::AttestationValidator;

const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// Build the gate's `validate(user_wallet)` instruction.
pub fn validate_instruction(program_id: &Pubkey, accounts: &IssuerAccounts, user: &Pubkey) -> Instruction {
    let metas = ValidateAccounts {
        attestation: accounts.attestation(user),
        credential: accounts.credential,
        schema: accounts.schema,
        clock: sysvar::clock::ID,
    }
    .to_account_metas(None);

    Instruction {
        program_id: *program_id,
        accounts: metas,
        data: ValidateIx { user_wallet: *user }.data(),
    }
}

/// Decode one `Program data:` payload as a `ValidationResult` event.
pub fn decode_validation_event(bytes: &[u8]) -> Option<ValidationResult> {
    let mut body = bytes.strip_prefix(ValidationResult::DISCRIMINATOR)?;
    <ValidationResult as AnchorDeserialize>::deserialize(&mut body).ok()
}

/// Extract every `ValidationResult` event from program logs.
pub fn parse_validation_events(logs: &[String]) -> Vec<ValidationResult> {
    logs.iter()
        .filter_map(|line| line.strip_prefix(PROGRAM_DATA_PREFIX))
        .filter_map(|data| STANDARD.decode(data.trim()).ok())
        .filter_map(|bytes| decode_validation_event(&bytes))
        .collect()
}

/// Verdict carried by a `validate` simulation for `user`.
///
/// A failed simulation means the program rejected the attestation (or it
/// does not exist), which is a negative verdict rather than an error. So is
/// a successful run that never emitted an event for this user.
pub fn simulation_verdict<E: fmt::Debug>(err: Option<&E>, logs: &[String], user: &Pubkey) -> bool {
    if let Some(err) = err {
        debug!(%user, ?err, ?logs, "gate rejected attestation");
        return false;
    }

    match parse_validation_events(logs)
        .into_iter()
        .find(|event| event.user == *user)
    {
        Some(event) => event.valid,
        None => {
            warn!(%user, "gate simulation succeeded without a ValidationResult event");
            false
        }
    }
}

/// Talks to the deployed `attestation-gate` program.
pub struct GateClient {
    rpc: Arc<RpcClient>,
    program_id: Pubkey,
    accounts: IssuerAccounts,
    payer: Arc<Keypair>,
}

impl GateClient {
    pub fn new(rpc: Arc<RpcClient>, program_id: Pubkey, accounts: IssuerAccounts, payer: Arc<Keypair>) -> Self {
        Self {
            rpc,
            program_id,
            accounts,
            payer,
        }
    }

    fn message(&self, user: &Pubkey) -> Message {
        let ix = validate_instruction(&self.program_id, &self.accounts, user);
        Message::new(&[ix], Some(&self.payer.pubkey()))
    }

    /// Simulate `validate` and return the verdict carried by its event.
    pub async fn check(&self, user: &Pubkey) -> Result<bool> {
        let tx = Transaction::new_unsigned(self.message(user));
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.rpc.commitment()),
            ..RpcSimulateTransactionConfig::default()
        };
        let sim = self
            .rpc
            .simulate_transaction_with_config(&tx, config)
            .await
            .context("Failed to simulate gate validation")?
            .value;

        Ok(simulation_verdict(
            sim.err.as_ref(),
            sim.logs.as_deref().unwrap_or_default(),
            user,
        ))
    }

    /// Land a `validate` transaction on chain.
    pub async fn submit(&self, user: &Pubkey) -> Result<Signature> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let mut tx = Transaction::new_unsigned(self.message(user));
        tx.try_sign(&[self.payer.as_ref()], blockhash)
            .context("Failed to sign gate validation")?;
        let sig = self
            .rpc
            .send_and_confirm_transaction(&tx)
            .await
            .context("Gate validation was not confirmed")?;
        Ok(sig)
    }
}

#[async_trait]
impl AttestationValidator for GateClient {
    async fn validate(&self, user: Pubkey) -> Result<bool> {
        self.check(&user).await
    }
}

/// Gate verdict for an attestation account fetched off-chain.
pub fn local_verdict(account: Option<&Account>, address: &Pubkey, ctx: &GateContext) -> bool {
    let Some(account) = account else {
        debug!(user = %ctx.user, "no attestation account");
        return false;
    };
    match evaluate(&account.owner, address, &account.data, ctx) {
        Ok(valid) => valid,
        Err(rejection) => {
            debug!(user = %ctx.user, %rejection, "attestation rejected");
            false
        }
    }
}

/// Runs the gate rules off-chain, using the wall clock.
pub struct LocalValidator {
    rpc: Arc<RpcClient>,
    accounts: IssuerAccounts,
}

impl LocalValidator {
    pub fn new(rpc: Arc<RpcClient>, accounts: IssuerAccounts) -> Self {
        Self { rpc, accounts }
    }
}

#[async_trait]
impl AttestationValidator for LocalValidator {
    async fn validate(&self, user: Pubkey) -> Result<bool> {
        let address = self.accounts.attestation(&user);
        let account = fetch_account(&self.rpc, &address).await?;
        let ctx = GateContext {
            credential: self.accounts.credential,
            schema: self.accounts.schema,
            user,
            now: chrono::Utc::now().timestamp(),
        };
        Ok(local_verdict(account.as_ref(), &address, &ctx))
    }
}
