// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fill/deposit identity matching and relay data hashing.
//!
//! `validate_fill_for_deposit` is the single place that decides whether a
//! completion record satisfies an intent record. It walks a fixed, ordered
//! list of identity fields and reports the first mismatch. Slow fills are a
//! protocol-level fallback and bypass this check entirely at the call
//! sites.

use crate::types::{Deposit, Fill, MessageHash, RelayData};
use ethers::types::H256;
use ethers::utils::keccak256;
use relay_types::ChainAddress;
use std::fmt;

/// Result of matching a fill against a deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillMatch {
    Valid,
    Invalid { reason: String },
}

impl FillMatch {
    pub fn is_valid(&self) -> bool {
        matches!(self, FillMatch::Valid)
    }
}

impl fmt::Display for FillMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillMatch::Valid => write!(f, "valid"),
            FillMatch::Invalid { reason } => write!(f, "invalid: {}", reason),
        }
    }
}

fn mismatch(field: &str) -> FillMatch {
    FillMatch::Invalid {
        reason: format!("{} mismatch", field),
    }
}

/// Validate that a fill's identity fields exactly match a deposit's.
///
/// Numeric fields compare by value, addresses by family-aware normalized
/// form (`ChainAddress` equality), the message by content hash. An unset
/// message hash on either side is a mismatch even if both are unset: an
/// unset hash marks a record that was never finalized.
///
/// The first mismatching field wins; its name prefixes the reason string
/// for programmatic parsing.
pub fn validate_fill_for_deposit(fill: &Fill, deposit: &Deposit) -> FillMatch {
    let f = &fill.relay;
    let d = &deposit.relay;

    if f.depositor != d.depositor {
        return mismatch("depositor");
    }
    if f.recipient != d.recipient {
        return mismatch("recipient");
    }
    if f.exclusive_relayer != d.exclusive_relayer {
        return mismatch("exclusive_relayer");
    }
    if f.input_token != d.input_token {
        return mismatch("input_token");
    }
    if f.output_token != d.output_token {
        return mismatch("output_token");
    }
    if f.input_amount != d.input_amount {
        return mismatch("input_amount");
    }
    if f.output_amount != d.output_amount {
        return mismatch("output_amount");
    }
    if f.origin_chain_id != d.origin_chain_id {
        return mismatch("origin_chain_id");
    }
    if f.destination_chain_id != d.destination_chain_id {
        return mismatch("destination_chain_id");
    }
    if f.deposit_id != d.deposit_id {
        return mismatch("deposit_id");
    }
    if f.fill_deadline != d.fill_deadline {
        return mismatch("fill_deadline");
    }
    if f.exclusivity_deadline != d.exclusivity_deadline {
        return mismatch("exclusivity_deadline");
    }
    if !f.message_hash.matches(&d.message_hash) {
        return mismatch("message_hash");
    }

    FillMatch::Valid
}

const RELAY_DATA_HASH_PREFIX: &[u8] = b"RELAY_DATA";

/// Canonical hash of a relay's identity fields.
///
/// This is the key under which the destination chain's status store tracks
/// a relay, so the encoding must be deterministic: fixed-width big-endian
/// fields concatenated in declaration order, addresses prefixed with their
/// family tag and left-padded to 32 bytes.
pub fn relay_data_hash(relay: &RelayData) -> H256 {
    let mut bytes = Vec::with_capacity(512);
    bytes.extend_from_slice(RELAY_DATA_HASH_PREFIX);
    encode_address(&mut bytes, &relay.depositor);
    encode_address(&mut bytes, &relay.recipient);
    encode_address(&mut bytes, &relay.exclusive_relayer);
    encode_address(&mut bytes, &relay.input_token);
    encode_address(&mut bytes, &relay.output_token);
    encode_u256(&mut bytes, relay.input_amount);
    encode_u256(&mut bytes, relay.output_amount);
    bytes.extend_from_slice(&relay.origin_chain_id.to_be_bytes());
    bytes.extend_from_slice(&relay.destination_chain_id.to_be_bytes());
    encode_u256(&mut bytes, relay.deposit_id);
    bytes.extend_from_slice(&relay.fill_deadline.to_be_bytes());
    bytes.extend_from_slice(&relay.exclusivity_deadline.to_be_bytes());
    match relay.message_hash {
        MessageHash::Unset => bytes.push(0),
        MessageHash::Hashed(h) => {
            bytes.push(1);
            bytes.extend_from_slice(h.as_bytes());
        }
    }
    H256::from(keccak256(&bytes))
}

fn encode_address(out: &mut Vec<u8>, addr: &ChainAddress) {
    out.push(match addr {
        ChainAddress::Evm(_) => 0,
        ChainAddress::Svm(_) => 1,
    });
    let raw = addr.as_bytes();
    // Left-pad to 32 bytes so EVM and SVM addresses occupy the same width
    out.extend_from_slice(&[0u8; 32][..32 - raw.len()]);
    out.extend_from_slice(raw);
}

fn encode_u256(out: &mut Vec<u8>, value: ethers::types::U256) {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    out.extend_from_slice(&buf);
}
