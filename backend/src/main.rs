//! SAS verification gate: CLI and HTTP server
//!
//! Usage:
//!   sas-gate serve [--port <port>]
//!   sas-gate init [--force]
//!   sas-gate attest --address <pubkey> [--age <bool>] [--country <bool>]
//!   sas-gate status [--address <pubkey>]
//!   sas-gate validate --address <pubkey> [--submit]
//!   sas-gate pda --issuer <pubkey> [--address <pubkey>]

use std::str::FromStr;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use sas_gate_backend::config::SasArgs;
use sas_gate_backend::server::AttestationValidator;
use sas_gate_core::{AttestationPayload, IssuerAccounts};
use solana_sdk::pubkey::Pubkey;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sas-gate", about = "SAS attestation issuer and verification gate")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP verification service
    Serve {
        #[command(flatten)]
        sas: SasArgs,
        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value = "3000")]
        port: u16,
    },
    /// Create the credential and schema accounts
    Init {
        #[command(flatten)]
        sas: SasArgs,
        /// Send the create transactions even if the accounts exist
        #[arg(long)]
        force: bool,
    },
    /// Issue an attestation for a wallet
    Attest {
        #[command(flatten)]
        sas: SasArgs,
        /// Wallet address
        #[arg(short, long)]
        address: String,
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        age: bool,
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        country: bool,
    },
    /// Show the credential, schema and optionally a wallet's attestation
    Status {
        #[command(flatten)]
        sas: SasArgs,
        /// Wallet address
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Ask the gate whether a wallet passes
    Validate {
        #[command(flatten)]
        sas: SasArgs,
        /// Wallet address
        #[arg(short, long)]
        address: String,
        /// Land the validate transaction instead of simulating it
        #[arg(long)]
        submit: bool,
    },
    /// Print derived account addresses without touching the network
    Pda {
        /// Credential authority
        #[arg(long)]
        issuer: String,
        /// Wallet address
        #[arg(short, long)]
        address: Option<String>,
    },
}

fn parse_pubkey(s: &str) -> Result<Pubkey> {
    Pubkey::from_str(s).map_err(|e| anyhow!("Invalid public key {s}: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { sas, port } => {
            let config = sas.load()?;
            config.service.init().await?;
            tracing::info!(
                credential = %config.service.accounts().credential,
                schema = %config.service.accounts().schema,
                mode = ?config.validation_mode,
                "SAS accounts ready"
            );

            let app = sas_gate_backend::server::build_router(config.app_state());

            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
            tracing::info!("Verification service listening on port {}", port);
            axum::serve(listener, app).await?;
        }
        Commands::Init { sas, force } => {
            let config = sas.load()?;
            if force {
                config.service.init_unchecked().await?;
            } else {
                config.service.init().await?;
            }
            println!("Credential: {}", config.service.accounts().credential);
            println!("Schema: {}", config.service.accounts().schema);
        }
        Commands::Attest {
            sas,
            address,
            age,
            country,
        } => {
            let user = parse_pubkey(&address)?;
            let config = sas.load()?;
            config.service.init().await?;
            let attestation = config
                .service
                .create_attestation(user, AttestationPayload { age, country })
                .await?;
            println!("Attestation: {}", attestation);
            println!("Payload: age={}, country={}", age, country);
        }
        Commands::Status { sas, address } => {
            let user = address.as_deref().map(parse_pubkey).transpose()?;
            let config = sas.load()?;
            let status = config.service.describe(user).await?;
            let accounts = config.service.accounts();

            match &status.credential {
                Some(credential) => println!(
                    "Credential: {} (name={:?}, signers={})",
                    accounts.credential,
                    String::from_utf8_lossy(&credential.name),
                    credential.authorized_signers.len()
                ),
                None => println!("Credential: {} (missing)", accounts.credential),
            }
            match &status.schema {
                Some(schema) => println!(
                    "Schema: {} (name={:?}, version={}, paused={})",
                    accounts.schema,
                    String::from_utf8_lossy(&schema.name),
                    schema.version,
                    schema.is_paused
                ),
                None => println!("Schema: {} (missing)", accounts.schema),
            }
            if let Some(user) = user {
                let address = accounts.attestation(&user);
                match &status.attestation {
                    Some(attestation) => {
                        let now = chrono::Utc::now().timestamp();
                        let expiry = chrono::DateTime::from_timestamp(attestation.expiry, 0)
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| attestation.expiry.to_string());
                        println!("Attestation: {}", address);
                        match AttestationPayload::from_bytes(&attestation.data) {
                            Ok(payload) => {
                                println!("Payload: age={}, country={}", payload.age, payload.country)
                            }
                            Err(err) => println!("Payload: undecodable ({})", err),
                        }
                        println!("Expiry: {} (expired={})", expiry, now >= attestation.expiry);
                    }
                    None => println!("Attestation: {} (missing)", address),
                }
            }
        }
        Commands::Validate {
            sas,
            address,
            submit,
        } => {
            let user = parse_pubkey(&address)?;
            let config = sas.load()?;
            if submit {
                let signature = config.gate.submit(&user).await?;
                println!("Validation landed: {}", signature);
            } else {
                let valid = config.validator().validate(user).await?;
                println!("Valid: {}", valid);
            }
        }
        Commands::Pda { issuer, address } => {
            let issuer = parse_pubkey(&issuer)?;
            let accounts = IssuerAccounts::derive(&issuer);
            println!("Credential: {}", accounts.credential);
            println!("Schema: {}", accounts.schema);
            if let Some(address) = address {
                let user = parse_pubkey(&address)?;
                println!("Attestation: {}", accounts.attestation(&user));
            }
        }
    }

    Ok(())
}
