//! ECDSA P-256 signing over 32-byte hashes.
//!
//! Every signature in the protocol is a plain ECDSA signature over a hash
//! produced by [`crate::hash`]; the hash is used as the prehash directly and
//! never hashed again. Public keys travel as affine `(X, Y)` coordinates and
//! signatures as `(R, S)`, both as big integers.

use num_bigint::BigUint;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{EncodedPoint, FieldBytes};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;
use crate::hash::Hash256;
use crate::types::{EcdsaSignature, PublicKeyCoords};

/// A raw private scalar handed out by a key provider.
///
/// Zeroized on drop; never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretScalar {
    bytes: [u8; 32],
}

impl SecretScalar {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse a big-endian hex scalar of at most 32 bytes.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let text = text.trim();
        let text = text.strip_prefix("0x").unwrap_or(text);
        let raw = Zeroizing::new(hex::decode(text).map_err(|_| CryptoError::InvalidSecretKey)?);
        if raw.is_empty() || raw.len() > 32 {
            return Err(CryptoError::InvalidSecretKey);
        }
        let mut bytes = [0u8; 32];
        bytes[32 - raw.len()..].copy_from_slice(&raw);
        Ok(Self { bytes })
    }

    /// A fresh random scalar from the OS RNG.
    pub fn generate() -> Self {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&key.to_bytes());
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretScalar")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// P-256 keypair.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// Build a keypair from a private scalar. Zero and out-of-range
    /// scalars are rejected.
    pub fn from_secret(secret: &SecretScalar) -> Result<Self, CryptoError> {
        let bytes = FieldBytes::from(*secret.as_bytes());
        let signing_key = SigningKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    pub fn public_key(&self) -> Result<PublicKeyCoords, CryptoError> {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        match (point.x(), point.y()) {
            (Some(x), Some(y)) => Ok(PublicKeyCoords {
                x: BigUint::from_bytes_be(x),
                y: BigUint::from_bytes_be(y),
            }),
            _ => Err(CryptoError::InvalidPublicKey),
        }
    }

    /// Sign a 32-byte hash as-is.
    pub fn sign_hash(&self, hash: &Hash256) -> Result<EcdsaSignature, CryptoError> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(hash.as_bytes())
            .map_err(|_| CryptoError::InvalidSignature)?;
        let (r, s) = signature.split_bytes();
        Ok(EcdsaSignature {
            r: BigUint::from_bytes_be(&r),
            s: BigUint::from_bytes_be(&s),
        })
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key().ok())
            .finish_non_exhaustive()
    }
}

fn field_bytes(value: &BigUint) -> Option<FieldBytes> {
    let raw = value.to_bytes_be();
    if raw.len() > 32 {
        return None;
    }
    let mut bytes = [0u8; 32];
    bytes[32 - raw.len()..].copy_from_slice(&raw);
    Some(FieldBytes::from(bytes))
}

fn verifying_key(key: &PublicKeyCoords) -> Result<VerifyingKey, CryptoError> {
    let x = field_bytes(&key.x).ok_or(CryptoError::InvalidPublicKey)?;
    let y = field_bytes(&key.y).ok_or(CryptoError::InvalidPublicKey)?;
    let point = EncodedPoint::from_affine_coordinates(&x, &y, false);
    VerifyingKey::from_encoded_point(&point).map_err(|_| CryptoError::InvalidPublicKey)
}

/// Verify a signature over a 32-byte hash.
pub fn verify_hash(
    key: &PublicKeyCoords,
    hash: &Hash256,
    signature: &EcdsaSignature,
) -> Result<(), CryptoError> {
    let vk = verifying_key(key)?;
    let r = field_bytes(&signature.r).ok_or(CryptoError::InvalidSignature)?;
    let s = field_bytes(&signature.s).ok_or(CryptoError::InvalidSignature)?;
    let sig = Signature::from_scalars(r, s).map_err(|_| CryptoError::InvalidSignature)?;
    vk.verify_prehash(hash.as_bytes(), &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Check that a secret scalar belongs to the given public key.
pub fn matches_public_key(secret: &SecretScalar, key: &PublicKeyCoords) -> Result<bool, CryptoError> {
    Ok(KeyPair::from_secret(secret)?.public_key()? == *key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    fn scalar_one() -> SecretScalar {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        SecretScalar::from_bytes(bytes)
    }

    #[test]
    fn scalar_one_yields_generator() {
        let kp = KeyPair::from_secret(&scalar_one()).unwrap();
        let pk = kp.public_key().unwrap();
        let gx = BigUint::parse_bytes(b"6b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c296", 16).unwrap();
        let gy = BigUint::parse_bytes(b"4fe342e2fe1a7f9b8ee7eb4a7c0f9e162bce33576b315ececbb6406837bf51f5", 16).unwrap();
        assert_eq!(pk.x, gx);
        assert_eq!(pk.y, gy);
    }

    #[test]
    fn sign_then_verify() {
        let kp = KeyPair::generate();
        let hash = sha256(b"tally");
        let sig = kp.sign_hash(&hash).unwrap();
        let pk = kp.public_key().unwrap();
        assert!(verify_hash(&pk, &hash, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_other_hash() {
        let kp = KeyPair::generate();
        let sig = kp.sign_hash(&sha256(b"one")).unwrap();
        let pk = kp.public_key().unwrap();
        assert_eq!(
            verify_hash(&pk, &sha256(b"two"), &sig),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn verify_rejects_other_key() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let hash = sha256(b"tally");
        let sig = signer.sign_hash(&hash).unwrap();
        assert!(verify_hash(&other.public_key().unwrap(), &hash, &sig).is_err());
    }

    #[test]
    fn signing_is_deterministic_per_key_and_hash() {
        let kp = KeyPair::from_secret(&scalar_one()).unwrap();
        let hash = sha256(b"deterministic");
        assert_eq!(kp.sign_hash(&hash).unwrap(), kp.sign_hash(&hash).unwrap());
    }

    #[test]
    fn zero_scalar_rejected() {
        let zero = SecretScalar::from_bytes([0u8; 32]);
        assert!(matches!(
            KeyPair::from_secret(&zero),
            Err(CryptoError::InvalidSecretKey)
        ));
    }

    #[test]
    fn off_curve_point_rejected() {
        let bogus = PublicKeyCoords {
            x: BigUint::from(1u8),
            y: BigUint::from(1u8),
        };
        let kp = KeyPair::generate();
        let hash = sha256(b"x");
        let sig = kp.sign_hash(&hash).unwrap();
        assert_eq!(
            verify_hash(&bogus, &hash, &sig),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn secret_from_hex_pads_short_input() {
        let s = SecretScalar::from_hex("0x01").unwrap();
        assert_eq!(s.as_bytes(), scalar_one().as_bytes());
        assert!(SecretScalar::from_hex("zz").is_err());
        assert!(SecretScalar::from_hex(&"ab".repeat(33)).is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let s = SecretScalar::from_hex("abcdef").unwrap();
        let debug = format!("{s:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("abcdef"));
    }

    #[test]
    fn matches_public_key_checks_ownership() {
        let secret = SecretScalar::generate();
        let pk = KeyPair::from_secret(&secret).unwrap().public_key().unwrap();
        assert!(matches_public_key(&secret, &pk).unwrap());
        let other = KeyPair::generate().public_key().unwrap();
        assert!(!matches_public_key(&secret, &other).unwrap());
    }
}
