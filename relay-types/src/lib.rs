// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Base types shared across the relay client crates.
//!
//! The relay protocol spans virtual machines with incompatible address
//! formats (20-byte EVM accounts, 32-byte SVM accounts). `ChainAddress`
//! carries the raw bytes together with an address-family tag so that
//! equality and display are always family-aware; raw byte strings from
//! different families never compare equal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address family of a chain account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressFamily {
    /// 20-byte EVM account
    Evm,
    /// 32-byte SVM account
    Svm,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Evm => write!(f, "evm"),
            AddressFamily::Svm => write!(f, "svm"),
        }
    }
}

/// A chain account address tagged with its family.
///
/// Equality is derived over (family, raw bytes), so an EVM address and an
/// SVM address are never equal even if their byte prefixes coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChainAddress {
    Evm([u8; 20]),
    Svm([u8; 32]),
}

impl ChainAddress {
    pub fn family(&self) -> AddressFamily {
        match self {
            ChainAddress::Evm(_) => AddressFamily::Evm,
            ChainAddress::Svm(_) => AddressFamily::Svm,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ChainAddress::Evm(b) => b,
            ChainAddress::Svm(b) => b,
        }
    }

    /// The all-zero EVM address, used as the "no exclusive relayer" marker.
    pub fn zero_evm() -> Self {
        ChainAddress::Evm([0u8; 20])
    }

    pub fn zero_svm() -> Self {
        ChainAddress::Svm([0u8; 32])
    }

    /// Parse a `0x`-prefixed (or bare) hex string, inferring the family
    /// from the byte length. Parsing is case-insensitive so that two
    /// spellings of the same account compare equal after parsing.
    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        let stripped = s.trim_start_matches("0x");
        let bytes = hex::decode(stripped).map_err(|_| AddressParseError::InvalidHex)?;
        match bytes.len() {
            20 => {
                let mut b = [0u8; 20];
                b.copy_from_slice(&bytes);
                Ok(ChainAddress::Evm(b))
            }
            32 => {
                let mut b = [0u8; 32];
                b.copy_from_slice(&bytes);
                Ok(ChainAddress::Svm(b))
            }
            n => Err(AddressParseError::InvalidLength(n)),
        }
    }

    /// Canonical lowercase hex form, `0x`-prefixed.
    pub fn to_canonical_string(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

/// Error parsing a textual address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    InvalidHex,
    InvalidLength(usize),
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressParseError::InvalidHex => write!(f, "invalid hex in address"),
            AddressParseError::InvalidLength(n) => {
                write!(f, "invalid address length: {} bytes", n)
            }
        }
    }
}

impl std::error::Error for AddressParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_tagging() {
        let evm = ChainAddress::Evm([5u8; 20]);
        let svm = ChainAddress::Svm([5u8; 32]);
        assert_eq!(evm.family(), AddressFamily::Evm);
        assert_eq!(svm.family(), AddressFamily::Svm);
        assert_ne!(evm, svm);
    }

    #[test]
    fn test_cross_family_bytes_never_equal() {
        // Same leading bytes, different families
        let mut svm_bytes = [0u8; 32];
        svm_bytes[..20].copy_from_slice(&[7u8; 20]);
        let evm = ChainAddress::Evm([7u8; 20]);
        let svm = ChainAddress::Svm(svm_bytes);
        assert_ne!(evm, svm);
        assert_ne!(evm.to_canonical_string(), svm.to_canonical_string());
    }

    #[test]
    fn test_hex_parse_case_insensitive() {
        let lower = ChainAddress::from_hex("0xabcdef0123456789abcdef0123456789abcdef01").unwrap();
        let upper = ChainAddress::from_hex("0xABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.family(), AddressFamily::Evm);
    }

    #[test]
    fn test_hex_parse_without_prefix() {
        let with = ChainAddress::from_hex("0x0000000000000000000000000000000000000001").unwrap();
        let without = ChainAddress::from_hex("0000000000000000000000000000000000000001").unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_svm_length_parse() {
        let addr = ChainAddress::from_hex(
            "0x0101010101010101010101010101010101010101010101010101010101010101",
        )
        .unwrap();
        assert_eq!(addr.family(), AddressFamily::Svm);
        assert_eq!(addr.as_bytes().len(), 32);
    }

    #[test]
    fn test_invalid_lengths_rejected() {
        assert_eq!(
            ChainAddress::from_hex("0x0102"),
            Err(AddressParseError::InvalidLength(2))
        );
        assert_eq!(
            ChainAddress::from_hex("0xzz"),
            Err(AddressParseError::InvalidHex)
        );
    }

    #[test]
    fn test_canonical_string_round_trip() {
        let addr = ChainAddress::Evm([0xab; 20]);
        let s = addr.to_canonical_string();
        assert!(s.starts_with("0x"));
        assert_eq!(ChainAddress::from_hex(&s).unwrap(), addr);
        assert_eq!(format!("{}", addr), s);
    }
}
