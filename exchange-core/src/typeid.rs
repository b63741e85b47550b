//! Sortable prefixed identifiers
//!
//! Every message and resource is named by a `TypeId`: a lowercase
//! prefix plus a 26-character base32 suffix encoding 128 bits. The top
//! 48 bits are a big-endian millisecond timestamp, the remaining 80
//! bits are randomness, so identifiers sort lexicographically in
//! creation order within a prefix.

use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Base32 alphabet (Crockford-style, lowercase, excludes i/l/o/u)
const ALPHABET: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";

/// Suffix length: 26 symbols x 5 bits = 130 bits, of which 128 are used
const SUFFIX_LEN: usize = 26;

/// Maximum prefix length
const MAX_PREFIX_LEN: usize = 63;

/// Prefixed, time-ordered identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId {
    prefix: String,
    suffix: String,
}

impl TypeId {
    /// Generate a fresh identifier for `prefix` at the current time
    pub fn generate(prefix: &str) -> Result<Self> {
        check_prefix(prefix)?;

        let millis = Utc::now().timestamp_millis() as u64;
        Ok(Self::from_parts(prefix, millis, random_80_bits()))
    }

    /// Parse an identifier from its string form
    ///
    /// Splits on the first `_`; a string without `_` is a bare suffix
    /// with an empty prefix.
    pub fn parse(s: &str) -> Result<Self> {
        let (prefix, suffix) = match s.split_once('_') {
            Some((p, rest)) => (p, rest),
            None => ("", s),
        };

        check_prefix(prefix)?;
        // Round-trips the suffix through the codec so every alphabet
        // and range violation is caught here.
        decode_base32(suffix)?;

        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Prefix part (may be empty)
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 26-character base32 suffix
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Millisecond timestamp embedded in the top 48 bits
    pub fn timestamp(&self) -> DateTime<Utc> {
        // Parse checked the suffix, so decoding cannot fail.
        let bytes = decode_base32(&self.suffix).unwrap_or([0u8; 16]);
        let mut millis = 0u64;
        for b in &bytes[..6] {
            millis = (millis << 8) | u64::from(*b);
        }
        Utc.timestamp_millis_opt(millis as i64)
            .single()
            .unwrap_or_default()
    }

    fn from_parts(prefix: &str, millis: u64, entropy: u128) -> Self {
        let value = (u128::from(millis & 0xFFFF_FFFF_FFFF) << 80)
            | (entropy & ((1u128 << 80) - 1));
        Self {
            prefix: prefix.to_string(),
            suffix: encode_base32(&value.to_be_bytes()),
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.suffix)
        } else {
            write!(f, "{}_{}", self.prefix, self.suffix)
        }
    }
}

impl FromStr for TypeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for TypeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Encode 16 bytes into 26 base32 symbols, most significant first
///
/// 130 output bits for 128 input bits: the first symbol carries only
/// the top 3 bits and therefore never exceeds 7.
pub fn encode_base32(bytes: &[u8; 16]) -> String {
    let value = u128::from_be_bytes(*bytes);
    let mut out = String::with_capacity(SUFFIX_LEN);
    for i in (0..SUFFIX_LEN).rev() {
        let symbol = ((value >> (5 * i as u32)) & 0x1F) as usize;
        out.push(ALPHABET[symbol] as char);
    }
    out
}

/// Decode a 26-symbol base32 string back into 16 bytes
pub fn decode_base32(s: &str) -> Result<[u8; 16]> {
    if s.len() != SUFFIX_LEN {
        return Err(Error::InvalidIdentifier(format!(
            "suffix must be {} characters, got {}",
            SUFFIX_LEN,
            s.len()
        )));
    }

    let mut value: u128 = 0;
    for (i, c) in s.bytes().enumerate() {
        let symbol = ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or_else(|| {
                Error::InvalidIdentifier(format!("character '{}' outside alphabet", c as char))
            })? as u128;

        // The first symbol holds the top 3 of 130 bits; anything above
        // 7 would overflow 128 bits.
        if i == 0 && symbol > 7 {
            return Err(Error::InvalidIdentifier(format!(
                "first suffix character '{}' exceeds 128-bit range",
                c as char
            )));
        }

        value = (value << 5) | symbol;
    }

    Ok(value.to_be_bytes())
}

fn check_prefix(prefix: &str) -> Result<()> {
    if prefix.len() > MAX_PREFIX_LEN {
        return Err(Error::InvalidIdentifier(format!(
            "prefix length {} exceeds {}",
            prefix.len(),
            MAX_PREFIX_LEN
        )));
    }
    if !prefix.bytes().all(|b| b.is_ascii_lowercase()) {
        return Err(Error::InvalidIdentifier(format!(
            "prefix '{}' must match [a-z]{{0,{}}}",
            prefix, MAX_PREFIX_LEN
        )));
    }
    Ok(())
}

fn random_80_bits() -> u128 {
    let mut buf = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut buf);
    let mut value = 0u128;
    for b in buf {
        value = (value << 8) | u128::from(b);
    }
    value
}
