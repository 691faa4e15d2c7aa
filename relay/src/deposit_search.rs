// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded binary search mapping a deposit id back to the block range in
//! which the spoke pool's deposit counter first reached it.
//!
//! The counter is monotonically non-decreasing but not strictly increasing:
//! a single block may carry a batch of deposits and advance it by more than
//! one. Each probe is one RPC round trip, so the caller supplies a probe
//! budget; an exhausted budget widens the returned range but never loses
//! the target block, because the bracketing invariant
//! `counter(low) <= target < counter(high)` holds at every step.

use crate::error::{RelayError, RelayResult};
use crate::types::BlockRange;
use ethers::types::U256;
use std::future::Future;
use tracing::debug;

/// Find a block range guaranteed to bracket the block at which the deposit
/// counter first exceeded `target_id` (i.e. the block that emitted deposit
/// `target_id`).
///
/// `counter_at` answers "deposit counter value as of block N". Probes are
/// sequential and dependent; at most `max_searches` midpoint probes are
/// issued beyond the two initial bound reads.
///
/// Errors are caller-contract violations, never chain-data conditions:
/// `low_block > high_block`, or `target_id` outside
/// `[counter_at(low_block), counter_at(high_block))`.
pub async fn get_block_range_for_deposit_id<F, Fut>(
    target_id: U256,
    low_block: u64,
    high_block: u64,
    max_searches: u32,
    counter_at: F,
) -> RelayResult<BlockRange>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = RelayResult<U256>>,
{
    if low_block > high_block {
        return Err(RelayError::InvalidSearchBounds(format!(
            "low > high: {} > {}",
            low_block, high_block
        )));
    }

    let low_value = counter_at(low_block).await?;
    let high_value = counter_at(high_block).await?;

    if target_id < low_value {
        return Err(RelayError::InvalidSearchBounds(format!(
            "target less than initial low bound: target {}, counter at block {} is {}",
            target_id, low_block, low_value
        )));
    }
    if target_id >= high_value {
        return Err(RelayError::InvalidSearchBounds(format!(
            "target greater than initial high bound: target {}, counter at block {} is {}",
            target_id, high_block, high_value
        )));
    }

    // Invariant: counter(low) <= target < counter(high), so the block that
    // emitted the target deposit lies in (low, high].
    let mut low = low_block;
    let mut high = high_block;
    let mut searches = 0u32;

    while high - low > 1 && searches < max_searches {
        let mid = low + (high - low) / 2;
        let mid_value = counter_at(mid).await?;
        searches += 1;
        if mid_value <= target_id {
            low = mid;
        } else {
            high = mid;
        }
    }

    let range = BlockRange {
        low: low + 1,
        high,
    };
    debug!(
        "deposit id {} bracketed by {} after {} probes (budget {})",
        target_id, range, searches, max_searches
    );
    Ok(range)
}
