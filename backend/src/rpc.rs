//! Glue over `solana-client`'s nonblocking RPC client.

use anyhow::Result;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::RpcError;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;

/// Commitment level requested from the RPC node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl From<Commitment> for CommitmentConfig {
    fn from(commitment: Commitment) -> Self {
        match commitment {
            Commitment::Processed => CommitmentConfig::processed(),
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

pub fn connect(url: impl Into<String>, commitment: Commitment) -> RpcClient {
    RpcClient::new_with_commitment(url.into(), commitment.into())
}

/// `get_account` reports a missing account as a `ForUser` RPC error.
pub fn is_account_not_found(err: &ClientError) -> bool {
    matches!(err.kind(), ClientErrorKind::RpcError(RpcError::ForUser(_)))
}

/// Fetch an account. `Ok(None)` if it does not exist; other errors propagate.
pub async fn fetch_account(rpc: &RpcClient, pubkey: &Pubkey) -> Result<Option<Account>> {
    match rpc.get_account(pubkey).await {
        Ok(account) => Ok(Some(account)),
        Err(err) if is_account_not_found(&err) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub async fn account_exists(rpc: &RpcClient, pubkey: &Pubkey) -> Result<bool> {
    Ok(fetch_account(rpc, pubkey).await?.is_some())
}
