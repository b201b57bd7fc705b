//! Service configuration from CLI flags and the environment.
//!
//! Every flag falls back to a `SAS_*` environment variable; `main` loads a
//! `.env` file from the working directory before parsing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};
use sas_gate_core::{DEFAULT_ATTESTATION_TTL_DAYS, GATE_PROGRAM_ID};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair};

use crate::gate::{GateClient, LocalValidator};
use crate::rpc::{connect, Commitment};
use crate::sas::AttestationService;
use crate::server::{AppState, AttestationValidator};

/// How `GET /validate` reaches its verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ValidationMode {
    /// Simulate the on-chain gate program.
    #[default]
    Program,
    /// Apply the gate rules off-chain.
    Local,
}

#[derive(Args, Debug, Clone)]
pub struct SasArgs {
    /// Solana RPC endpoint
    #[arg(long, env = "SAS_RPC_URL")]
    pub rpc_url: String,

    /// Keypair file paying for transactions
    #[arg(long, env = "SAS_PAYER_CREDS")]
    pub payer: PathBuf,

    /// Keypair file of the credential authority [default: payer]
    #[arg(long, env = "SAS_ISSUER_CREDS")]
    pub issuer: Option<PathBuf>,

    /// Keypair file of the authorized attestation signer [default: issuer]
    #[arg(long, env = "SAS_SIGNER_CREDS")]
    pub signer: Option<PathBuf>,

    /// Deployed attestation-gate program
    #[arg(long, env = "SAS_GATE_PROGRAM_ID", default_value_t = GATE_PROGRAM_ID)]
    pub gate_program: Pubkey,

    #[arg(long, env = "SAS_VALIDATION_MODE", value_enum, default_value_t = ValidationMode::Program)]
    pub validation_mode: ValidationMode,

    /// Lifetime of issued attestations
    #[arg(long, env = "SAS_ATTESTATION_TTL_DAYS", default_value_t = DEFAULT_ATTESTATION_TTL_DAYS)]
    pub ttl_days: u32,

    /// Never request airdrops for the payer
    #[arg(long, env = "SAS_SKIP_AIRDROP", value_parser = clap::builder::BoolishValueParser::new())]
    pub skip_airdrop: bool,

    #[arg(long, value_enum, default_value_t = Commitment::Confirmed)]
    pub commitment: Commitment,
}

fn load_keypair(path: &Path) -> Result<Keypair> {
    read_keypair_file(path).map_err(|e| anyhow!("Failed to read keypair {}: {e}", path.display()))
}

/// Fully loaded runtime configuration.
pub struct ServiceConfig {
    pub service: Arc<AttestationService>,
    pub gate: Arc<GateClient>,
    pub validation_mode: ValidationMode,
}

impl SasArgs {
    /// Load keypairs and wire up the RPC-backed services.
    pub fn load(&self) -> Result<ServiceConfig> {
        let payer = load_keypair(&self.payer)?;
        let issuer = match &self.issuer {
            Some(path) => load_keypair(path)?,
            None => payer.insecure_clone(),
        };
        let signer = match &self.signer {
            Some(path) => load_keypair(path)?,
            None => issuer.insecure_clone(),
        };

        let rpc = Arc::new(connect(self.rpc_url.clone(), self.commitment));
        let mut service =
            AttestationService::new(rpc.clone(), payer, issuer, signer).with_ttl_days(self.ttl_days);
        if self.skip_airdrop {
            service = service.without_airdrop();
        }

        let gate = GateClient::new(rpc, self.gate_program, *service.accounts(), service.payer());

        Ok(ServiceConfig {
            service: Arc::new(service),
            gate: Arc::new(gate),
            validation_mode: self.validation_mode,
        })
    }
}

impl ServiceConfig {
    pub fn validator(&self) -> Arc<dyn AttestationValidator> {
        match self.validation_mode {
            ValidationMode::Program => self.gate.clone(),
            ValidationMode::Local => Arc::new(LocalValidator::new(
                self.service.rpc(),
                *self.service.accounts(),
            )),
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            ledger: self.service.clone(),
            validator: self.validator(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::ffi::OsString;
    use solana_sdk::signature::{write_keypair_file, Signer};

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        sas: SasArgs,
    }

    fn write_keypair(dir: &Path, name: &str) -> (PathBuf, Keypair) {
        let keypair = Keypair::new();
        let path = dir.join(name);
        write_keypair_file(&keypair, &path).unwrap();
        (path, keypair)
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sas-gate-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test", "--rpc-url", "http://localhost:8899", "--payer", "id.json"]);
        assert_eq!(cli.sas.gate_program, GATE_PROGRAM_ID);
        assert_eq!(cli.sas.validation_mode, ValidationMode::Program);
        assert_eq!(cli.sas.ttl_days, 30);
        assert_eq!(cli.sas.commitment, Commitment::Confirmed);
        assert!(cli.sas.issuer.is_none());
    }

    #[test]
    fn test_invalid_program_id_is_rejected() {
        let result = TestCli::try_parse_from([
            "test",
            "--rpc-url",
            "http://localhost:8899",
            "--payer",
            "id.json",
            "--gate-program",
            "nope",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_issuer_and_signer_default_to_payer() {
        let dir = temp_dir("defaults");
        let (payer_path, payer) = write_keypair(&dir, "payer.json");

        let args: Vec<OsString> = vec![
            "test".into(),
            "--rpc-url".into(),
            "http://localhost:8899".into(),
            "--payer".into(),
            payer_path.into_os_string(),
        ];
        let cli = TestCli::parse_from(args);
        let config = cli.sas.load().unwrap();
        let expected = sas_gate_core::IssuerAccounts::derive(&payer.pubkey());
        assert_eq!(*config.service.accounts(), expected);
        assert_eq!(config.service.payer().pubkey(), payer.pubkey());
    }

    #[test]
    fn test_separate_issuer() {
        let dir = temp_dir("issuer");
        let (payer_path, _) = write_keypair(&dir, "payer.json");
        let (issuer_path, issuer) = write_keypair(&dir, "issuer.json");

        let args: Vec<OsString> = vec![
            "test".into(),
            "--rpc-url".into(),
            "http://localhost:8899".into(),
            "--payer".into(),
            payer_path.into_os_string(),
            "--issuer".into(),
            issuer_path.into_os_string(),
            "--validation-mode".into(),
            "local".into(),
        ];
        let cli = TestCli::parse_from(args);
        let config = cli.sas.load().unwrap();
        assert_eq!(
            *config.service.accounts(),
            sas_gate_core::IssuerAccounts::derive(&issuer.pubkey())
        );
        assert_eq!(config.validation_mode, ValidationMode::Local);
    }

    // Flag and env cases share one test: the environment is process-wide.
    #[test]
    fn test_skip_airdrop() {
        let args = ["test", "--rpc-url", "http://localhost:8899", "--payer", "id.json"];

        for (value, expected) in [("1", true), ("yes", true), ("true", true), ("0", false), ("no", false)] {
            std::env::set_var("SAS_SKIP_AIRDROP", value);
            let cli = TestCli::try_parse_from(args).unwrap_or_else(|e| panic!("SAS_SKIP_AIRDROP={value}: {e}"));
            assert_eq!(cli.sas.skip_airdrop, expected, "SAS_SKIP_AIRDROP={value}");
        }

        std::env::remove_var("SAS_SKIP_AIRDROP");
        assert!(!TestCli::parse_from(args).sas.skip_airdrop);

        let mut with_flag = args.to_vec();
        with_flag.push("--skip-airdrop");
        assert!(TestCli::parse_from(with_flag).sas.skip_airdrop);
    }

    #[test]
    fn test_missing_keypair_file() {
        let cli = TestCli::parse_from([
            "test",
            "--rpc-url",
            "http://localhost:8899",
            "--payer",
            "/nonexistent/payer.json",
        ]);
        let err = cli.sas.load().err().unwrap();
        assert!(err.to_string().contains("/nonexistent/payer.json"));
    }
}
