//! Credential and schema definitions issued by the backend.

use borsh::{BorshDeserialize, BorshSerialize};

/// Name of the credential owned by the issuer.
pub const CREDENTIAL_NAME: &str = "Test Credential";
/// Name of the verification schema under the credential.
pub const SCHEMA_NAME: &str = "UserVerification";
pub const SCHEMA_VERSION: u8 = 1;
pub const SCHEMA_DESC: &str = "age: bool, country: bool";

/// SAS layout type code for a `bool` field.
pub const SAS_TYPE_BOOL: u8 = 10;

/// Encoded payload length of [`AttestationPayload`].
pub const PAYLOAD_LEN: usize = 2;

/// Default attestation lifetime in days.
pub const DEFAULT_ATTESTATION_TTL_DAYS: u32 = 30;

/// The data stored inside an attestation issued under [`SCHEMA_NAME`].
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttestationPayload {
    pub age: bool,
    pub country: bool,
}

impl AttestationPayload {
    /// Payload granted to wallets that pass the identity check.
    pub const APPROVED: Self = Self {
        age: true,
        country: true,
    };

    /// Payload reported for wallets that cannot be checked at all.
    pub const REJECTED: Self = Self {
        age: false,
        country: false,
    };

    pub const fn layout() -> [u8; PAYLOAD_LEN] {
        [SAS_TYPE_BOOL, SAS_TYPE_BOOL]
    }

    pub const fn fields() -> [&'static str; PAYLOAD_LEN] {
        ["age", "country"]
    }

    pub fn is_approved(&self) -> bool {
        self.age && self.country
    }

    pub fn to_bytes(&self) -> [u8; PAYLOAD_LEN] {
        [self.age as u8, self.country as u8]
    }

    /// Decode the data field of an attestation issued under this schema.
    pub fn from_bytes(data: &[u8]) -> std::io::Result<Self> {
        Self::try_from_slice(data)
    }
}
