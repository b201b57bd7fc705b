//! Core types and gate rules for SAS-backed user verification.
//!
//! This crate is shared by the on-chain `attestation-gate` program and the
//! off-chain backend, so the rules that decide whether a wallet passes the
//! gate are written exactly once. Nothing here performs I/O. SAS account
//! layouts come from `solana-attestation-service-client`.

pub mod gate;
pub mod pda;
pub mod schema;

pub use gate::*;
pub use pda::*;
pub use schema::*;

pub use solana_attestation_service_client::accounts::Attestation;
pub use solana_pubkey::Pubkey;
