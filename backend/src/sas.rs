//! Issuing and reading attestations through the Solana Attestation Service.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sas_gate_core::{
    AttestationPayload, IssuerAccounts, CREDENTIAL_NAME, DEFAULT_ATTESTATION_TTL_DAYS, SCHEMA_DESC,
    SCHEMA_NAME,
};
use solana_attestation_service_client::{
    accounts::{Attestation, Credential, Schema},
    instructions::{CreateAttestationBuilder, CreateCredentialBuilder, CreateSchemaBuilder},
};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    message::Message,
    native_token::LAMPORTS_PER_SOL,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::Transaction,
};
use solana_system_interface::program as system_program;
use tracing::{debug, debug_span, field, info, warn, Instrument};

use crate::rpc::{account_exists, fetch_account};
use crate::server::AttestationLedger;

pub const COMPUTE_UNIT_LIMIT: u32 = 400_000;
pub const COMPUTE_UNIT_PRICE: u64 = 1;
/// Balance `init` tops the payer up to, in SOL.
pub const MIN_SOL_BALANCE: u32 = 2;

/// Prepend the compute budget every transaction from this service carries.
pub fn with_compute_budget(instruction: Instruction) -> [Instruction; 3] {
    [
        ComputeBudgetInstruction::set_compute_unit_limit(COMPUTE_UNIT_LIMIT),
        ComputeBudgetInstruction::set_compute_unit_price(COMPUTE_UNIT_PRICE),
        instruction,
    ]
}

pub fn create_credential_instruction(
    payer: &Pubkey,
    issuer: &Pubkey,
    signer: &Pubkey,
    accounts: &IssuerAccounts,
) -> Instruction {
    CreateCredentialBuilder::new()
        .payer(*payer)
        .credential(accounts.credential)
        .authority(*issuer)
        .system_program(system_program::id())
        .name(CREDENTIAL_NAME.to_string())
        .signers(vec![*signer])
        .instruction()
}

pub fn create_schema_instruction(
    payer: &Pubkey,
    issuer: &Pubkey,
    accounts: &IssuerAccounts,
) -> Instruction {
    CreateSchemaBuilder::new()
        .payer(*payer)
        .authority(*issuer)
        .credential(accounts.credential)
        .schema(accounts.schema)
        .name(SCHEMA_NAME.to_string())
        .description(SCHEMA_DESC.to_string())
        .layout(AttestationPayload::layout().to_vec())
        .field_names(AttestationPayload::fields().map(String::from).to_vec())
        .instruction()
}

pub fn create_attestation_instruction(
    payer: &Pubkey,
    signer: &Pubkey,
    accounts: &IssuerAccounts,
    user: &Pubkey,
    payload: &AttestationPayload,
    expiry: i64,
) -> Instruction {
    CreateAttestationBuilder::new()
        .payer(*payer)
        .authority(*signer)
        .credential(accounts.credential)
        .schema(accounts.schema)
        .attestation(accounts.attestation(user))
        .data(payload.to_bytes().to_vec())
        .nonce(*user)
        .expiry(expiry)
        .instruction()
}

/// On-chain state of the issuer's accounts, as seen by `status`.
#[derive(Debug, Clone, Default)]
pub struct LedgerStatus {
    pub credential: Option<Credential>,
    pub schema: Option<Schema>,
    pub attestation: Option<Attestation>,
}

pub struct AttestationService {
    rpc: Arc<RpcClient>,
    payer: Arc<Keypair>,
    issuer: Keypair,
    signer: Keypair,
    accounts: IssuerAccounts,
    ttl: Duration,
    airdrop: bool,
}

impl AttestationService {
    pub fn new(rpc: Arc<RpcClient>, payer: Keypair, issuer: Keypair, signer: Keypair) -> Self {
        let accounts = IssuerAccounts::derive(&issuer.pubkey());
        Self {
            rpc,
            payer: Arc::new(payer),
            issuer,
            signer,
            accounts,
            ttl: Duration::days(DEFAULT_ATTESTATION_TTL_DAYS.into()),
            airdrop: true,
        }
    }

    pub fn with_ttl_days(mut self, days: u32) -> Self {
        self.ttl = Duration::days(days.into());
        self
    }

    /// Disable airdrops in [`Self::init`], e.g. on clusters without a faucet.
    pub fn without_airdrop(mut self) -> Self {
        self.airdrop = false;
        self
    }

    pub fn accounts(&self) -> &IssuerAccounts {
        &self.accounts
    }

    /// Fee payer shared with the gate client.
    pub fn payer(&self) -> Arc<Keypair> {
        self.payer.clone()
    }

    pub fn rpc(&self) -> Arc<RpcClient> {
        self.rpc.clone()
    }

    /// Airdrops some SOL to the payer so that a minimum balance is kept,
    /// and creates the credential and schema accounts if not already present.
    pub async fn init(&self) -> Result<()> {
        if self.airdrop {
            let balance = self.airdrop_up_to(MIN_SOL_BALANCE).await?;
            debug!(%balance, "airdropped sol to payer if needed");
        }
        if !account_exists(&self.rpc, &self.accounts.credential).await? {
            let sig = self.create_credential().await?;
            debug!(%sig, "created new credential");
        }
        if !account_exists(&self.rpc, &self.accounts.schema).await? {
            let sig = self.create_schema().await?;
            debug!(%sig, "created new schema");
        }
        info!(
            credential = %self.accounts.credential,
            schema = %self.accounts.schema,
            "successfully initialized attestation service"
        );
        Ok(())
    }

    /// [`Self::init`] without existence checks, for a clean localnet.
    pub async fn init_unchecked(&self) -> Result<()> {
        if self.airdrop {
            self.airdrop_up_to(MIN_SOL_BALANCE).await?;
        }
        self.create_credential().await?;
        self.create_schema().await?;
        Ok(())
    }

    async fn send(&self, instruction: Instruction, extra_signers: &[&Keypair]) -> Result<Signature> {
        let mut signers: Vec<&Keypair> = vec![self.payer.as_ref()];
        signers.extend_from_slice(extra_signers);

        let message = Message::new(&with_compute_budget(instruction), Some(&self.payer.pubkey()));
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .context("Failed to fetch blockhash")?;
        let mut tx = Transaction::new_unsigned(message);
        tx.try_sign(&signers, blockhash)
            .context("Failed to sign transaction")?;
        let sig = self
            .rpc
            .send_and_confirm_transaction(&tx)
            .await
            .context("Transaction was not confirmed")?;
        Ok(sig)
    }

    /// On success, returns the payer balance in lamports after a possible airdrop.
    /// It is no less than `amount_sol`.
    async fn airdrop_up_to(&self, amount_sol: u32) -> Result<u64> {
        let target = u64::from(amount_sol) * LAMPORTS_PER_SOL;
        let payer = self.payer.pubkey();
        let balance = self.rpc.get_balance(&payer).await?;
        if balance >= target {
            return Ok(balance);
        }

        let sig = self.rpc.request_airdrop(&payer, target - balance).await?;
        self.rpc
            .poll_for_signature_with_commitment(&sig, self.rpc.commitment())
            .await
            .context("Airdrop was not confirmed")?;
        Ok(target)
    }

    async fn create_credential(&self) -> Result<Signature> {
        let instruction = create_credential_instruction(
            &self.payer.pubkey(),
            &self.issuer.pubkey(),
            &self.signer.pubkey(),
            &self.accounts,
        );
        self.send(instruction, &[&self.issuer]).await
    }

    async fn create_schema(&self) -> Result<Signature> {
        let instruction =
            create_schema_instruction(&self.payer.pubkey(), &self.issuer.pubkey(), &self.accounts);
        self.send(instruction, &[&self.issuer]).await
    }

    fn expiry(&self) -> i64 {
        (Utc::now() + self.ttl).timestamp()
    }

    pub async fn create_attestation(&self, user: Pubkey, payload: AttestationPayload) -> Result<Pubkey> {
        let instruction = create_attestation_instruction(
            &self.payer.pubkey(),
            &self.signer.pubkey(),
            &self.accounts,
            &user,
            &payload,
            self.expiry(),
        );
        debug!(data = %hex::encode(&instruction.data), "create attestation");

        let sig = self.send(instruction, &[&self.signer]).await?;
        debug!(%sig, %user, "attestation created");

        Ok(self.accounts.attestation(&user))
    }

    /// Read the user's attestation header. `Ok(None)` if the account is absent.
    pub async fn fetch_attestation_account(&self, user: Pubkey) -> Result<Option<Attestation>> {
        let pda = self.accounts.attestation(&user);

        let span = debug_span!("attestation.get", %pda, success = field::Empty);
        let account = match fetch_account(&self.rpc, &pda).instrument(span.clone()).await {
            Ok(account) => {
                span.record("success", true);
                account
            }
            Err(err) => {
                span.record("success", false);
                return Err(err);
            }
        };
        let Some(account) = account else {
            return Ok(None);
        };

        let span = debug_span!("attestation.parse.header",
            %pda,
            owner = %account.owner,
            success = field::Empty
        );
        let _guard = span.enter();
        match Attestation::from_bytes(&account.data) {
            Ok(attestation) => {
                span.record("success", true);
                Ok(Some(attestation))
            }
            Err(err) => {
                span.record("success", false);
                warn!(%err, "couldn't parse attestation header");
                Err(anyhow!("couldn't parse attestation header: {err}"))
            }
        }
    }

    pub async fn fetch_attestation(&self, user: Pubkey) -> Result<Option<AttestationPayload>> {
        let Some(attestation) = self.fetch_attestation_account(user).await? else {
            return Ok(None);
        };

        let span = debug_span!("attestation.parse.payload",
            pda = %self.accounts.attestation(&user),
            success = field::Empty
        );
        let _guard = span.enter();
        match AttestationPayload::from_bytes(&attestation.data) {
            Ok(payload) => {
                span.record("success", true);
                Ok(Some(payload))
            }
            Err(err) => {
                span.record("success", false);
                warn!(%err, "couldn't parse attestation payload");
                Err(anyhow!("couldn't decode payload: {err}"))
            }
        }
    }

    /// Credential, schema and, if given, the user's attestation.
    pub async fn describe(&self, user: Option<Pubkey>) -> Result<LedgerStatus> {
        let credential = fetch_account(&self.rpc, &self.accounts.credential)
            .await?
            .map(|a| Credential::from_bytes(&a.data))
            .transpose()
            .map_err(|e| anyhow!("couldn't parse credential: {e}"))?;
        let schema = fetch_account(&self.rpc, &self.accounts.schema)
            .await?
            .map(|a| Schema::from_bytes(&a.data))
            .transpose()
            .map_err(|e| anyhow!("couldn't parse schema: {e}"))?;
        let attestation = match user {
            Some(user) => self.fetch_attestation_account(user).await?,
            None => None,
        };
        Ok(LedgerStatus {
            credential,
            schema,
            attestation,
        })
    }
}

#[async_trait]
impl AttestationLedger for AttestationService {
    async fn fetch_attestation(&self, user: Pubkey) -> Result<Option<AttestationPayload>> {
        AttestationService::fetch_attestation(self, user).await
    }

    async fn create_attestation(&self, user: Pubkey, payload: AttestationPayload) -> Result<Pubkey> {
        AttestationService::create_attestation(self, user, payload).await
    }
}
