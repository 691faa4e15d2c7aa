// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Log source capabilities consumed by the clients.
//!
//! The clients never talk to a provider directly; they are constructed over
//! these traits so that tests inject in-memory implementations and
//! production injects the RPC-backed sources in `eth_source`. Retry and
//! backoff policy live behind the implementation, never in the clients:
//! any transient failure surfaces immediately as an error.

use crate::error::RelayResult;
use crate::events::{HubPoolEvent, HubPoolEventKind, SpokePoolEvent, SpokePoolEventKind};
use crate::types::FillStatus;
use async_trait::async_trait;
use ethers::types::{H256, U256};

/// Capability for reading a spoke pool's event log and counters.
#[async_trait]
pub trait SpokePoolLogSource: Send + Sync {
    /// Current head block of the chain.
    async fn latest_block(&self) -> RelayResult<u64>;

    /// Deposit counter value as of `block` (number of deposits the spoke
    /// pool had recorded once `block` was processed). Monotonically
    /// non-decreasing in `block`; a single block may advance it by more
    /// than one.
    async fn deposit_id_at_block(&self, block: u64) -> RelayResult<U256>;

    /// All events of the given kinds in `[from_block, to_block]`
    /// (inclusive), ordered by block/transaction/log position.
    async fn query_events(
        &self,
        kinds: &[SpokePoolEventKind],
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<SpokePoolEvent>>;

    /// Authoritative fill statuses for the given relay data hashes as of
    /// `block`, in as few round trips as the backend allows. The returned
    /// vector is positional with the input.
    async fn fill_statuses(
        &self,
        relay_data_hashes: &[H256],
        block: u64,
    ) -> RelayResult<Vec<FillStatus>>;
}

/// Capability for reading the hub pool's event log.
#[async_trait]
pub trait HubPoolLogSource: Send + Sync {
    /// Current head block of the hub chain.
    async fn latest_block(&self) -> RelayResult<u64>;

    /// All events of the given kinds in `[from_block, to_block]`
    /// (inclusive), ordered by block/transaction/log position.
    async fn query_events(
        &self,
        kinds: &[HubPoolEventKind],
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<HubPoolEvent>>;
}
