//! Program-derived addresses of SAS accounts.
//!
//! Seeds follow the SAS program:
//! - credential  = PDA("credential", issuer, CREDENTIAL_NAME)
//! - schema      = PDA("schema", credential, SCHEMA_NAME, [SCHEMA_VERSION])
//! - attestation = PDA("attestation", credential, schema, user)

use solana_attestation_service_client::programs::SOLANA_ATTESTATION_SERVICE_ID;
use solana_pubkey::{pubkey, Pubkey};

use crate::schema::{CREDENTIAL_NAME, SCHEMA_NAME, SCHEMA_VERSION};

/// Solana Attestation Service program.
pub const SAS_PROGRAM_ID: Pubkey = SOLANA_ATTESTATION_SERVICE_ID;

/// The `attestation-gate` program.
pub const GATE_PROGRAM_ID: Pubkey = pubkey!("FSzAQ5gnGcpGTc6HoPb28JMBnVWyZ7Uj1NXZ2zrwYLyh");

pub const CREDENTIAL_SEED: &[u8] = b"credential";
pub const SCHEMA_SEED: &[u8] = b"schema";
pub const ATTESTATION_SEED: &[u8] = b"attestation";

pub fn credential_pda(issuer: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[CREDENTIAL_SEED, issuer.as_ref(), CREDENTIAL_NAME.as_bytes()],
        &SAS_PROGRAM_ID,
    )
    .0
}

pub fn schema_pda(credential: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            SCHEMA_SEED,
            credential.as_ref(),
            SCHEMA_NAME.as_bytes(),
            &[SCHEMA_VERSION],
        ],
        &SAS_PROGRAM_ID,
    )
    .0
}

pub fn attestation_pda(credential: &Pubkey, schema: &Pubkey, user: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            ATTESTATION_SEED,
            credential.as_ref(),
            schema.as_ref(),
            user.as_ref(),
        ],
        &SAS_PROGRAM_ID,
    )
    .0
}

/// Credential and schema PDAs of one issuer, derived once and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuerAccounts {
    pub credential: Pubkey,
    pub schema: Pubkey,
}

impl IssuerAccounts {
    pub fn derive(issuer: &Pubkey) -> Self {
        let credential = credential_pda(issuer);
        let schema = schema_pda(&credential);
        Self { credential, schema }
    }

    pub fn attestation(&self, user: &Pubkey) -> Pubkey {
        attestation_pda(&self.credential, &self.schema, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sas_program_id() {
        assert_eq!(
            SAS_PROGRAM_ID,
            pubkey!("22zoJMtdu4tQc2PzL74ZUT7FrwgB1Udec8DdW4yw4BdG")
        );
    }

    #[test]
    fn test_pdas_are_deterministic() {
        let issuer = Pubkey::new_unique();
        assert_eq!(IssuerAccounts::derive(&issuer), IssuerAccounts::derive(&issuer));
    }

    #[test]
    fn test_pdas_are_off_curve_and_distinct() {
        let issuer = Pubkey::new_unique();
        let accounts = IssuerAccounts::derive(&issuer);
        let attestation = accounts.attestation(&Pubkey::new_unique());

        for pda in [accounts.credential, accounts.schema, attestation] {
            assert!(!pda.is_on_curve());
        }
        assert_ne!(accounts.credential, accounts.schema);
        assert_ne!(accounts.schema, attestation);
    }

    #[test]
    fn test_attestation_pda_depends_on_user() {
        let accounts = IssuerAccounts::derive(&Pubkey::new_unique());
        let a = accounts.attestation(&Pubkey::new_unique());
        let b = accounts.attestation(&Pubkey::new_unique());
        assert_ne!(a, b);
    }

    #[test]
    fn test_issuers_get_separate_credentials() {
        let a = credential_pda(&Pubkey::new_unique());
        let b = credential_pda(&Pubkey::new_unique());
        assert_ne!(a, b);
    }

    #[test]
    fn test_attestation_seed_order() {
        let accounts = IssuerAccounts::derive(&Pubkey::new_unique());
        let user = Pubkey::new_unique();
        let (expected, _) = Pubkey::find_program_address(
            &[
                b"attestation",
                &accounts.credential.to_bytes(),
                &accounts.schema.to_bytes(),
                &user.to_bytes(),
            ],
            &SAS_PROGRAM_ID,
        );
        assert_eq!(accounts.attestation(&user), expected);
    }
}
