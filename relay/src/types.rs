// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Domain types for the relay reconciliation core.
//!
//! A `Deposit` is an intent record created on an origin chain; a `Fill` is a
//! completion record created on a destination chain. The `RelayData` subset
//! shared by both is the identity that must match exactly for a fill to
//! satisfy a deposit. Token amounts and deposit ids are 256-bit (`U256`)
//! throughout; they routinely exceed machine-integer range.

use ethers::types::{H256, U256};
use ethers::utils::keccak256;
use num_enum::TryFromPrimitive;
use relay_types::ChainAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash of a deposit/fill message.
///
/// Two sentinels exist and must never be treated as equal to each other:
/// the hash of the empty message (`MessageHash::empty()`) marks a deposit
/// that carries no payload, while `Unset` marks a record whose hash was
/// never computed. An `Unset` hash matches nothing, not even another
/// `Unset` - a record that was never finalized cannot satisfy anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageHash {
    /// Hash not yet computed; the record is not finalized.
    Unset,
    /// Keccak256 of the message payload.
    Hashed(H256),
}

impl MessageHash {
    /// Hash of a concrete message payload.
    pub fn of(message: &[u8]) -> Self {
        MessageHash::Hashed(H256::from(keccak256(message)))
    }

    /// The well-defined "empty message" sentinel: keccak256 of zero bytes.
    pub fn empty() -> Self {
        Self::of(&[])
    }

    /// Whether two hashes identify the same message. `Unset` matches
    /// nothing, including another `Unset`.
    pub fn matches(&self, other: &MessageHash) -> bool {
        match (self, other) {
            (MessageHash::Hashed(a), MessageHash::Hashed(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageHash::Unset => write!(f, "unset"),
            MessageHash::Hashed(h) => write!(f, "{:?}", h),
        }
    }
}

/// Provenance of an on-chain event. Used for ordering and search only;
/// never part of a record's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    pub transaction_hash: H256,
}

impl EventMeta {
    /// Total order of events within a chain: block, then transaction
    /// position, then log position.
    pub fn log_position(&self) -> (u64, u64, u64) {
        (self.block_number, self.transaction_index, self.log_index)
    }
}

/// The identity fields that must compare equal between a deposit and its
/// satisfying fill. Field order here is the order the matcher walks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayData {
    pub depositor: ChainAddress,
    pub recipient: ChainAddress,
    pub exclusive_relayer: ChainAddress,
    pub input_token: ChainAddress,
    pub output_token: ChainAddress,
    pub input_amount: U256,
    pub output_amount: U256,
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
    pub deposit_id: U256,
    pub fill_deadline: u32,
    pub exclusivity_deadline: u32,
    pub message_hash: MessageHash,
}

/// An intent record created once on an origin chain. Immutable except for
/// the speed-up overlay, which later origin-chain events may revise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub relay: RelayData,
    pub quote_timestamp: u32,
    /// Raw message payload; `relay.message_hash` is its content hash.
    pub message: Vec<u8>,
    /// Speed-up overlay. Only the speed-up with the lowest updated output
    /// amount is retained as active.
    pub updated_recipient: Option<ChainAddress>,
    pub updated_output_amount: Option<U256>,
    pub updated_message: Option<Vec<u8>>,
    pub speed_up_signature: Option<Vec<u8>>,
    /// Chains exempt from hub route-mapping; repayment settles on the
    /// origin chain for these.
    pub from_lite_chain: bool,
    pub to_lite_chain: bool,
    pub meta: EventMeta,
}

impl Deposit {
    pub fn deposit_id(&self) -> U256 {
        self.relay.deposit_id
    }
}

/// How a fill was executed on the destination chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum FillType {
    FastFill = 0,
    ReplacedSlowFill = 1,
    /// Protocol-level fallback completion; bypasses identity matching.
    SlowFill = 2,
}

/// Destination-chain execution details carried by a fill event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayExecutionInfo {
    pub updated_recipient: ChainAddress,
    pub updated_message_hash: MessageHash,
    pub updated_output_amount: U256,
    pub fill_type: FillType,
}

/// A completion record created once on a destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub relay: RelayData,
    pub relayer: ChainAddress,
    pub repayment_chain_id: u64,
    pub relay_execution_info: RelayExecutionInfo,
    pub meta: EventMeta,
}

impl Fill {
    pub fn deposit_id(&self) -> U256 {
        self.relay.deposit_id
    }

    pub fn is_slow_fill(&self) -> bool {
        self.relay_execution_info.fill_type == FillType::SlowFill
    }
}

/// Authoritative per-relay status on the destination chain.
/// `Filled` is terminal; `RequestedSlowFill` is optional.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum FillStatus {
    Unfilled = 0,
    RequestedSlowFill = 1,
    Filled = 2,
}

impl fmt::Display for FillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillStatus::Unfilled => write!(f, "Unfilled"),
            FillStatus::RequestedSlowFill => write!(f, "RequestedSlowFill"),
            FillStatus::Filled => write!(f, "Filled"),
        }
    }
}

/// An origin-chain event revising a deposit's output amount, recipient or
/// message downward in cost to the depositor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedUp {
    pub deposit_id: U256,
    pub depositor: ChainAddress,
    pub updated_recipient: ChainAddress,
    pub updated_output_amount: U256,
    pub updated_message: Vec<u8>,
    pub signature: Vec<u8>,
    pub meta: EventMeta,
}

/// A destination-chain request for the protocol's slow-fill fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowFillRequest {
    pub relay: RelayData,
    pub meta: EventMeta,
}

/// An origin-chain route enable/disable toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteToggle {
    pub origin_token: ChainAddress,
    pub destination_chain_id: u64,
    pub enabled: bool,
    pub meta: EventMeta,
}

/// A hub-chain assignment of an L2 token to its canonical L1 token,
/// effective as of the hub block it was recorded at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRebalanceRoute {
    pub l2_chain_id: u64,
    pub l1_token: ChainAddress,
    pub l2_token: ChainAddress,
    pub meta: EventMeta,
}

/// A hub-chain bundle proposal covering block ranges across chains.
///
/// The evaluation vector is positional: entry `i` is the end block for the
/// chain at index `i` of the configured chain id list. A bundle covers a
/// chain iff that chain's index falls within the vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedRootBundle {
    pub bundle_evaluation_block_numbers: Vec<u64>,
    pub pool_rebalance_root: H256,
    pub relayer_refund_root: H256,
    pub slow_relay_root: H256,
    pub proposer: ChainAddress,
    pub meta: EventMeta,
}

/// Codes carried by a failed deposit lookup. These are expected,
/// data-dependent outcomes that callers branch on; they are values, never
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidFillReason {
    /// Target id precedes the spoke pool's first known deposit id.
    DepositIdInvalid,
    /// Target id is beyond the last known deposit id, or no deposit with
    /// that id exists in the searched range.
    DepositIdNotFound,
    /// A deposit with the target id exists but its identity fields do not
    /// match the fill.
    FillMismatch,
}

impl fmt::Display for InvalidFillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidFillReason::DepositIdInvalid => write!(f, "DepositIdInvalid"),
            InvalidFillReason::DepositIdNotFound => write!(f, "DepositIdNotFound"),
            InvalidFillReason::FillMismatch => write!(f, "FillMismatch"),
        }
    }
}

/// Discriminated result of a deposit lookup. This shape is a stable
/// contract with downstream bundle construction; variant and field names
/// must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositSearchResult {
    Found {
        deposit: Box<Deposit>,
    },
    NotFound {
        code: InvalidFillReason,
        reason: String,
    },
}

impl DepositSearchResult {
    pub fn is_found(&self) -> bool {
        matches!(self, DepositSearchResult::Found { .. })
    }
}

/// An inclusive block range bracketing a search target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub low: u64,
    pub high: u64,
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// Outcome of a successful `update()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Inclusive range of blocks this update covered, if any.
    pub searched_range: Option<BlockRange>,
    pub new_deposits: usize,
    pub new_fills: usize,
    pub new_speed_ups: usize,
    pub new_slow_fill_requests: usize,
    pub new_route_updates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message_hash_is_well_defined() {
        // keccak256 of zero bytes, the canonical empty-message sentinel
        let expected: H256 =
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
                .parse()
                .unwrap();
        assert_eq!(MessageHash::empty(), MessageHash::Hashed(expected));
        assert_eq!(MessageHash::of(&[]), MessageHash::empty());
    }

    #[test]
    fn test_unset_hash_matches_nothing() {
        let unset = MessageHash::Unset;
        let empty = MessageHash::empty();
        // Both-unset is a mismatch: an unset hash signals the record was
        // never finalized.
        assert!(!unset.matches(&MessageHash::Unset));
        assert!(!unset.matches(&empty));
        assert!(!empty.matches(&unset));
        assert!(empty.matches(&MessageHash::empty()));
    }

    #[test]
    fn test_empty_and_unset_are_distinct_sentinels() {
        assert_ne!(MessageHash::empty(), MessageHash::Unset);
    }

    #[test]
    fn test_message_hash_of_payload() {
        let a = MessageHash::of(b"hello");
        let b = MessageHash::of(b"hello");
        let c = MessageHash::of(b"world");
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_fill_status_from_primitive() {
        assert_eq!(FillStatus::try_from(0u8).unwrap(), FillStatus::Unfilled);
        assert_eq!(
            FillStatus::try_from(1u8).unwrap(),
            FillStatus::RequestedSlowFill
        );
        assert_eq!(FillStatus::try_from(2u8).unwrap(), FillStatus::Filled);
        assert!(FillStatus::try_from(3u8).is_err());
    }

    #[test]
    fn test_fill_type_from_primitive() {
        assert_eq!(FillType::try_from(2u8).unwrap(), FillType::SlowFill);
        assert!(FillType::try_from(9u8).is_err());
    }

    #[test]
    fn test_event_meta_log_position_ordering() {
        let a = EventMeta {
            block_number: 10,
            transaction_index: 0,
            log_index: 5,
            transaction_hash: H256::zero(),
        };
        let b = EventMeta {
            block_number: 10,
            transaction_index: 1,
            log_index: 0,
            transaction_hash: H256::zero(),
        };
        let c = EventMeta {
            block_number: 11,
            transaction_index: 0,
            log_index: 0,
            transaction_hash: H256::zero(),
        };
        assert!(a.log_position() < b.log_position());
        assert!(b.log_position() < c.log_position());
    }
}
