//! Off-chain side of the SAS verification gate.
//!
//! Issues Solana Attestation Service attestations for verified wallets and
//! answers whether a wallet passes the `attestation-gate` program, either by
//! simulating the program or by applying its rules locally.

pub mod config;
pub mod gate;
pub mod rpc;
pub mod sas;
pub mod server;
