//! Canonical encoding matching the verifier's struct layout.
//!
//! The encoding is compact JSON produced through serde with these rules:
//!
//! - struct fields are written in declaration order;
//! - map-typed fields are `BTreeMap`s, so keys are written sorted;
//! - arbitrary-precision integers are bare numeric literals of any length
//!   (see [`big_uint`]), never quoted and never routed through `f64`;
//! - byte arrays are standard base64 strings (see [`base64_bytes`]);
//! - an absent signature or public key is written as a pair of nulls,
//!   `{"R":null,"S":null}`, never as a missing key (see [`null_pair`]).
//!
//! Every hash in [`crate::hash`] is taken over bytes from [`encode`], so this
//! module is the single boundary where big integers and fixed-point values
//! meet text.

use num_bigint::BigUint;
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::collections::BTreeMap;

use crate::error::EncodeError;

/// Encode a value into canonical bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(value)?)
}

/// Encode a value into a canonical string.
pub fn encode_string<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(value)?)
}

/// Decode canonical bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EncodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Parse a decimal integer literal, optionally quoted, into a `BigUint`.
pub fn parse_big_uint(text: &str) -> Result<BigUint, EncodeError> {
    let digits = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EncodeError::InvalidNumber(text.to_string()));
    }
    BigUint::parse_bytes(digits.as_bytes(), 10).ok_or_else(|| EncodeError::InvalidNumber(text.to_string()))
}

fn raw_number(value: &BigUint) -> Result<Box<RawValue>, serde_json::Error> {
    RawValue::from_string(value.to_str_radix(10))
}

/// A borrowed big integer that serializes as a bare literal.
struct BareNumber<'a>(&'a BigUint);

impl Serialize for BareNumber<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        raw_number(self.0)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

/// `#[serde(with)]` adapter writing a `BigUint` as a bare numeric literal.
pub mod big_uint {
    use super::*;

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        BareNumber(value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        parse_big_uint(raw.get()).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with)]` adapter writing bytes as a standard base64 string.
///
/// `null` decodes to an empty vector.
pub mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;

    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        match text {
            None => Ok(Vec::new()),
            Some(text) => STANDARD
                .decode(text.as_bytes())
                .map_err(|e| serde::de::Error::custom(EncodeError::InvalidBase64(e.to_string()))),
        }
    }
}

/// Two big-integer components written as a named pair, e.g. `R`/`S`.
pub trait NumberPair: Sized {
    const FIRST: &'static str;
    const SECOND: &'static str;

    fn parts(&self) -> (&BigUint, &BigUint);
    fn from_parts(first: BigUint, second: BigUint) -> Self;
}

/// `#[serde(with)]` adapter for optional [`NumberPair`] fields.
///
/// `None` is written as `{"R":null,"S":null}` (with the pair's own field
/// names). Decoding accepts either both components or both nulls.
pub mod null_pair {
    use super::*;

    pub fn serialize<T: NumberPair, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut pair = serializer.serialize_struct("Pair", 2)?;
        match value {
            Some(v) => {
                let (first, second) = v.parts();
                pair.serialize_field(T::FIRST, &BareNumber(first))?;
                pair.serialize_field(T::SECOND, &BareNumber(second))?;
            }
            None => {
                pair.serialize_field(T::FIRST, &Option::<()>::None)?;
                pair.serialize_field(T::SECOND, &Option::<()>::None)?;
            }
        }
        pair.end()
    }

    pub fn deserialize<'de, T: NumberPair, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<T>, D::Error> {
        use serde::de::Error;

        let mut fields = BTreeMap::<String, Option<Box<RawValue>>>::deserialize(deserializer)?;
        let first = fields
            .remove(T::FIRST)
            .ok_or_else(|| D::Error::missing_field(T::FIRST))?;
        let second = fields
            .remove(T::SECOND)
            .ok_or_else(|| D::Error::missing_field(T::SECOND))?;
        match (first, second) {
            (None, None) => Ok(None),
            (Some(a), Some(b)) => {
                let a = parse_big_uint(a.get()).map_err(D::Error::custom)?;
                let b = parse_big_uint(b.get()).map_err(D::Error::custom)?;
                Ok(Some(T::from_parts(a, b)))
            }
            _ => Err(D::Error::custom(format!(
                "{} and {} must both be set or both be null",
                T::FIRST,
                T::SECOND
            ))),
        }
    }
}
