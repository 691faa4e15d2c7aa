// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Test fixtures and in-memory log sources.
//!
//! The mock sources count every query they serve so tests can assert not
//! just results but I/O behavior (e.g. the no-RPC fast path of historical
//! deposit recovery).

use crate::chain_source::{HubPoolLogSource, SpokePoolLogSource};
use crate::error::{RelayError, RelayResult};
use crate::events::{
    sort_by_log_position, HubPoolEvent, HubPoolEventKind, SpokePoolEvent, SpokePoolEventKind,
};
use crate::types::{
    Deposit, EventMeta, Fill, FillStatus, FillType, MessageHash, PoolRebalanceRoute,
    ProposedRootBundle, RelayData, RelayExecutionInfo, RouteToggle, SlowFillRequest, SpeedUp,
};
use async_trait::async_trait;
use ethers::types::{H256, U256};
use relay_types::ChainAddress;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const TEST_ORIGIN_CHAIN: u64 = 1;
pub const TEST_DESTINATION_CHAIN: u64 = 10;

/// Install a test tracing subscriber. Safe to call from every test; only
/// the first call wins.
pub fn init_for_testing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_event_meta(block_number: u64, transaction_index: u64, log_index: u64) -> EventMeta {
    // Deterministic tx hash so fixtures are reproducible
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&block_number.to_be_bytes());
    bytes[8..16].copy_from_slice(&transaction_index.to_be_bytes());
    bytes[16..24].copy_from_slice(&log_index.to_be_bytes());
    EventMeta {
        block_number,
        transaction_index,
        log_index,
        transaction_hash: H256::from(bytes),
    }
}

pub fn test_relay_data(deposit_id: u64) -> RelayData {
    RelayData {
        depositor: ChainAddress::Evm([0x01; 20]),
        recipient: ChainAddress::Evm([0x02; 20]),
        exclusive_relayer: ChainAddress::zero_evm(),
        input_token: ChainAddress::Evm([0x03; 20]),
        output_token: ChainAddress::Evm([0x04; 20]),
        input_amount: U256::from(1_000u64 + deposit_id),
        output_amount: U256::from(990u64 + deposit_id),
        origin_chain_id: TEST_ORIGIN_CHAIN,
        destination_chain_id: TEST_DESTINATION_CHAIN,
        deposit_id: U256::from(deposit_id),
        fill_deadline: 1_700_003_600,
        exclusivity_deadline: 1_700_001_800,
        message_hash: MessageHash::empty(),
    }
}

/// A deposit with the given id, recorded at a block derived from the id.
pub fn test_deposit(deposit_id: u64) -> Deposit {
    test_deposit_at(deposit_id, 100 + deposit_id)
}

pub fn test_deposit_at(deposit_id: u64, block_number: u64) -> Deposit {
    Deposit {
        relay: test_relay_data(deposit_id),
        quote_timestamp: 1_700_000_000,
        message: Vec::new(),
        updated_recipient: None,
        updated_output_amount: None,
        updated_message: None,
        speed_up_signature: None,
        from_lite_chain: false,
        to_lite_chain: false,
        meta: test_event_meta(block_number, 0, deposit_id),
    }
}

/// A fill whose identity fields exactly match the deposit's.
pub fn test_fill_for(deposit: &Deposit) -> Fill {
    Fill {
        relay: deposit.relay.clone(),
        relayer: ChainAddress::Evm([0x09; 20]),
        repayment_chain_id: deposit.relay.origin_chain_id,
        relay_execution_info: RelayExecutionInfo {
            updated_recipient: deposit.relay.recipient,
            updated_message_hash: deposit.relay.message_hash,
            updated_output_amount: deposit.relay.output_amount,
            fill_type: FillType::FastFill,
        },
        meta: test_event_meta(200 + deposit.relay.deposit_id.low_u64(), 0, 0),
    }
}

pub fn test_speed_up(
    deposit_id: u64,
    depositor: ChainAddress,
    updated_output_amount: u64,
    block_number: u64,
) -> SpeedUp {
    SpeedUp {
        deposit_id: U256::from(deposit_id),
        depositor,
        updated_recipient: ChainAddress::Evm([0x02; 20]),
        updated_output_amount: U256::from(updated_output_amount),
        updated_message: Vec::new(),
        signature: Vec::new(),
        meta: test_event_meta(block_number, 1, deposit_id),
    }
}

pub fn test_slow_fill_request(deposit_id: u64, block_number: u64) -> SlowFillRequest {
    SlowFillRequest {
        relay: test_relay_data(deposit_id),
        meta: test_event_meta(block_number, 2, deposit_id),
    }
}

pub fn test_route_toggle(
    token_byte: u8,
    destination_chain_id: u64,
    enabled: bool,
    block_number: u64,
    log_index: u64,
) -> RouteToggle {
    RouteToggle {
        origin_token: ChainAddress::Evm([token_byte; 20]),
        destination_chain_id,
        enabled,
        meta: test_event_meta(block_number, 0, log_index),
    }
}

pub fn test_pool_rebalance_route(
    l2_chain_id: u64,
    l1_byte: u8,
    l2_byte: u8,
    block_number: u64,
) -> PoolRebalanceRoute {
    PoolRebalanceRoute {
        l2_chain_id,
        l1_token: ChainAddress::Evm([l1_byte; 20]),
        l2_token: ChainAddress::Evm([l2_byte; 20]),
        meta: test_event_meta(block_number, 0, 0),
    }
}

pub fn test_proposed_bundle(
    bundle_evaluation_block_numbers: Vec<u64>,
    block_number: u64,
) -> ProposedRootBundle {
    ProposedRootBundle {
        bundle_evaluation_block_numbers,
        pool_rebalance_root: H256::repeat_byte(0x01),
        relayer_refund_root: H256::repeat_byte(0x02),
        slow_relay_root: H256::repeat_byte(0x03),
        proposer: ChainAddress::Evm([0x0f; 20]),
        meta: test_event_meta(block_number, 0, 0),
    }
}

/// In-memory spoke pool log source.
///
/// The deposit counter is derived from the stored deposit events: the
/// counter at block N is `base_deposit_id` plus the number of deposit
/// events at or below N, which keeps the counter and the event log
/// consistent by construction.
pub struct MockSpokePoolSource {
    head: AtomicU64,
    base_deposit_id: u64,
    events: Mutex<Vec<SpokePoolEvent>>,
    fill_statuses: Mutex<HashMap<H256, FillStatus>>,
    fail_next_query: AtomicBool,
    pub query_events_calls: AtomicUsize,
    pub counter_calls: AtomicUsize,
    pub fill_status_calls: AtomicUsize,
}

impl MockSpokePoolSource {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            base_deposit_id: 0,
            events: Mutex::new(Vec::new()),
            fill_statuses: Mutex::new(HashMap::new()),
            fail_next_query: AtomicBool::new(false),
            query_events_calls: AtomicUsize::new(0),
            counter_calls: AtomicUsize::new(0),
            fill_status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_base_deposit_id(mut self, base: u64) -> Self {
        self.base_deposit_id = base;
        self
    }

    pub fn push_event(&self, event: SpokePoolEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn set_fill_status(&self, relay_data_hash: H256, status: FillStatus) {
        self.fill_statuses
            .lock()
            .unwrap()
            .insert(relay_data_hash, status);
    }

    /// Fail the next `query_events` call with a transient error.
    pub fn fail_next_query(&self) {
        self.fail_next_query.store(true, Ordering::SeqCst);
    }

    pub fn query_events_count(&self) -> usize {
        self.query_events_calls.load(Ordering::SeqCst)
    }

    pub fn counter_count(&self) -> usize {
        self.counter_calls.load(Ordering::SeqCst)
    }

    pub fn fill_status_count(&self) -> usize {
        self.fill_status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpokePoolLogSource for MockSpokePoolSource {
    async fn latest_block(&self) -> RelayResult<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn deposit_id_at_block(&self, block: u64) -> RelayResult<U256> {
        self.counter_calls.fetch_add(1, Ordering::SeqCst);
        let events = self.events.lock().unwrap();
        let deposits_through_block = events
            .iter()
            .filter(|e| {
                matches!(e, SpokePoolEvent::FundsDeposited(_))
                    && e.meta().block_number <= block
            })
            .count() as u64;
        Ok(U256::from(self.base_deposit_id + deposits_through_block))
    }

    async fn query_events(
        &self,
        kinds: &[SpokePoolEventKind],
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<SpokePoolEvent>> {
        self.query_events_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_query.swap(false, Ordering::SeqCst) {
            return Err(RelayError::TransientProviderError(
                "injected query failure".to_string(),
            ));
        }
        let events = self.events.lock().unwrap();
        let mut matching: Vec<SpokePoolEvent> = events
            .iter()
            .filter(|e| {
                let block = e.meta().block_number;
                kinds.contains(&e.kind()) && block >= from_block && block <= to_block
            })
            .cloned()
            .collect();
        sort_by_log_position(&mut matching, |e| e.meta());
        Ok(matching)
    }

    async fn fill_statuses(
        &self,
        relay_data_hashes: &[H256],
        _block: u64,
    ) -> RelayResult<Vec<FillStatus>> {
        self.fill_status_calls.fetch_add(1, Ordering::SeqCst);
        let statuses = self.fill_statuses.lock().unwrap();
        Ok(relay_data_hashes
            .iter()
            .map(|hash| statuses.get(hash).copied().unwrap_or(FillStatus::Unfilled))
            .collect())
    }
}

/// In-memory hub pool log source.
pub struct MockHubPoolSource {
    head: AtomicU64,
    events: Mutex<Vec<HubPoolEvent>>,
    fail_next_query: AtomicBool,
    pub query_events_calls: AtomicUsize,
}

impl MockHubPoolSource {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            events: Mutex::new(Vec::new()),
            fail_next_query: AtomicBool::new(false),
            query_events_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_event(&self, event: HubPoolEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn fail_next_query(&self) {
        self.fail_next_query.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl HubPoolLogSource for MockHubPoolSource {
    async fn latest_block(&self) -> RelayResult<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn query_events(
        &self,
        kinds: &[HubPoolEventKind],
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<HubPoolEvent>> {
        self.query_events_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_query.swap(false, Ordering::SeqCst) {
            return Err(RelayError::TransientProviderError(
                "injected query failure".to_string(),
            ));
        }
        let events = self.events.lock().unwrap();
        let mut matching: Vec<HubPoolEvent> = events
            .iter()
            .filter(|e| {
                let block = e.meta().block_number;
                kinds.contains(&e.kind()) && block >= from_block && block <= to_block
            })
            .cloned()
            .collect();
        sort_by_log_position(&mut matching, |e| e.meta());
        Ok(matching)
    }
}
