//! Error types for the Tally core.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid private scalar")] InvalidSecretKey,
    #[error("invalid public key coordinates")] InvalidPublicKey,
    #[error("invalid signature components")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("hash must be 32 bytes, got {0}")] InvalidHashLength(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("serialization: {0}")] Serialization(String),
    #[error("invalid number literal: {0}")] InvalidNumber(String),
    #[error("invalid base64: {0}")] InvalidBase64(String),
    #[error("value overflow")] ValueOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")] Empty,
    #[error("invalid amount literal: {0}")] InvalidLiteral(String),
    #[error("too many decimal places (max {max}): {literal}")] TooPrecise { literal: String, max: u32 },
    #[error("amount overflow")] Overflow,
    #[error("negative amount: {0}")] Negative(String),
}

impl From<serde_json::Error> for EncodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

