// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-chain event-sourced client for one spoke pool contract.
//!
//! `SpokePoolClient` ingests ordered Deposit/Fill/SpeedUp/SlowFill-request/
//! route-toggle events into in-memory indices and answers reconciliation
//! queries over them. One instance exists per chain; `update` takes
//! `&mut self`, so concurrent updates on the same instance are rejected at
//! compile time and callers serialize them (one update loop per instance).
//! Instances for different chains are independent and may run concurrently.
//!
//! Indices grow for the lifetime of the client; there is no eviction.
//! Long-lived processes restart or bound memory externally.

use crate::chain_source::SpokePoolLogSource;
use crate::config::SpokePoolClientConfig;
use crate::deposit_search::get_block_range_for_deposit_id;
use crate::error::{RelayError, RelayResult};
use crate::events::{sort_by_log_position, SpokePoolEvent, SpokePoolEventKind};
use crate::metrics::RelayMetrics;
use crate::types::{
    BlockRange, Deposit, DepositSearchResult, Fill, FillStatus, InvalidFillReason, RelayData,
    SlowFillRequest, SpeedUp, UpdateSummary,
};
use crate::validation::{relay_data_hash, validate_fill_for_deposit, FillMatch};
use ethers::types::{H256, U256};
use relay_types::ChainAddress;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SpokePoolClient<S> {
    chain_id: u64,
    deployment_block: u64,
    config: SpokePoolClientConfig,
    source: Arc<S>,
    metrics: Option<Arc<RelayMetrics>>,

    // In-memory indices. Deposit ids are unique per spoke pool, so deposits
    // key directly on the id.
    deposits: BTreeMap<U256, Deposit>,
    fills: Vec<Fill>,
    fill_keys: HashSet<(H256, u64)>,
    speed_ups: HashMap<(U256, ChainAddress), SpeedUp>,
    slow_fill_requests: HashMap<H256, SlowFillRequest>,
    routes: HashMap<(ChainAddress, u64), bool>,

    // Bounds of the contract's entire known id space, refreshed each update
    first_deposit_id_for_spoke_pool: U256,
    last_deposit_id_for_spoke_pool: U256,
    // Bounds of what this instance has actually fetched into memory
    earliest_deposit_id_queried: Option<U256>,
    latest_deposit_id_queried: Option<U256>,

    first_height_to_search: u64,
    latest_height_searched: u64,
    is_updated: bool,
}

impl<S> SpokePoolClient<S>
where
    S: SpokePoolLogSource,
{
    pub fn new(
        chain_id: u64,
        deployment_block: u64,
        config: SpokePoolClientConfig,
        source: Arc<S>,
    ) -> Self {
        let first_height_to_search = config.start_block.unwrap_or(deployment_block);
        Self {
            chain_id,
            deployment_block,
            config,
            source,
            metrics: None,
            deposits: BTreeMap::new(),
            fills: Vec::new(),
            fill_keys: HashSet::new(),
            speed_ups: HashMap::new(),
            slow_fill_requests: HashMap::new(),
            routes: HashMap::new(),
            first_deposit_id_for_spoke_pool: U256::zero(),
            last_deposit_id_for_spoke_pool: U256::zero(),
            earliest_deposit_id_queried: None,
            latest_deposit_id_queried: None,
            first_height_to_search,
            latest_height_searched: 0,
            is_updated: false,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RelayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn deployment_block(&self) -> u64 {
        self.deployment_block
    }

    pub fn latest_height_searched(&self) -> u64 {
        self.latest_height_searched
    }

    pub fn first_deposit_id_for_spoke_pool(&self) -> U256 {
        self.first_deposit_id_for_spoke_pool
    }

    pub fn last_deposit_id_for_spoke_pool(&self) -> U256 {
        self.last_deposit_id_for_spoke_pool
    }

    pub fn is_updated(&self) -> bool {
        self.is_updated
    }

    /// Fetch and apply all matching events in
    /// `[first_height_to_search, head]`.
    ///
    /// All queries run before any index is touched, so a failed query
    /// leaves the prior snapshot fully intact and the same range is
    /// re-searched on the next call. Bookkeeping advances only after the
    /// whole batch is applied.
    pub async fn update(
        &mut self,
        event_kinds: Option<&[SpokePoolEventKind]>,
    ) -> RelayResult<UpdateSummary> {
        self.record_rpc_metric("latest_block");
        let head = self.source.latest_block().await?;
        let from = self.first_height_to_search;
        if head < from {
            debug!(
                "[SpokePoolClient-{}] nothing to search: head {} below next height {}",
                self.chain_id, head, from
            );
            return Ok(UpdateSummary::default());
        }

        self.record_rpc_metric("deposit_id_at_block");
        let first_id = self.source.deposit_id_at_block(self.deployment_block).await?;
        self.record_rpc_metric("deposit_id_at_block");
        let last_id = self.source.deposit_id_at_block(head).await?;

        let kinds = event_kinds.unwrap_or(&SpokePoolEventKind::ALL[..]);
        self.record_rpc_metric("query_events");
        let mut events = self.source.query_events(kinds, from, head).await?;
        // Sources return events in chain order already; a stable sort by
        // log position costs nothing and pins the application order.
        sort_by_log_position(&mut events, |e| e.meta());

        // Every query succeeded; no fallible step below this point.
        let mut summary = UpdateSummary {
            searched_range: Some(BlockRange { low: from, high: head }),
            ..Default::default()
        };
        for event in events {
            match event {
                SpokePoolEvent::FundsDeposited(deposit) => {
                    if self.apply_deposit(deposit) {
                        summary.new_deposits += 1;
                    }
                }
                SpokePoolEvent::FilledRelay(fill) => {
                    if self.apply_fill(fill) {
                        summary.new_fills += 1;
                    }
                }
                SpokePoolEvent::RequestedSpeedUpDeposit(speed_up) => {
                    if self.apply_speed_up(speed_up) {
                        summary.new_speed_ups += 1;
                    }
                }
                SpokePoolEvent::RequestedSlowFill(request) => {
                    if self.apply_slow_fill_request(request) {
                        summary.new_slow_fill_requests += 1;
                    }
                }
                SpokePoolEvent::EnabledDepositRoute(toggle) => {
                    self.routes
                        .insert((toggle.origin_token, toggle.destination_chain_id), toggle.enabled);
                    summary.new_route_updates += 1;
                }
            }
        }

        self.first_deposit_id_for_spoke_pool = first_id;
        self.last_deposit_id_for_spoke_pool = last_id;
        self.first_height_to_search = head + 1;
        self.latest_height_searched = head;
        self.is_updated = true;

        if let Some(metrics) = &self.metrics {
            metrics
                .last_synced_block
                .with_label_values(&[&self.chain_id.to_string()])
                .set(head as i64);
        }
        info!(
            "[SpokePoolClient-{}] update applied blocks [{}, {}]: {} deposits, {} fills, {} speed-ups, {} slow fill requests, {} route updates",
            self.chain_id,
            from,
            head,
            summary.new_deposits,
            summary.new_fills,
            summary.new_speed_ups,
            summary.new_slow_fill_requests,
            summary.new_route_updates
        );
        Ok(summary)
    }

    fn apply_deposit(&mut self, mut deposit: Deposit) -> bool {
        let id = deposit.deposit_id();
        if self.deposits.contains_key(&id) {
            warn!(
                "[SpokePoolClient-{}] duplicate deposit {}: tx={:?}, ignoring",
                self.chain_id, id, deposit.meta.transaction_hash
            );
            return false;
        }
        self.set_lite_chain_flags(&mut deposit);
        // A speed-up for this deposit may already be indexed when updates
        // run with per-kind event filters.
        if let Some(speed_up) = self.speed_ups.get(&(id, deposit.relay.depositor)) {
            apply_speed_up_to_deposit(&mut deposit, speed_up);
        }
        self.record_event_metric("funds_deposited");
        self.earliest_deposit_id_queried = Some(match self.earliest_deposit_id_queried {
            Some(earliest) => earliest.min(id),
            None => id,
        });
        self.latest_deposit_id_queried = Some(match self.latest_deposit_id_queried {
            Some(latest) => latest.max(id),
            None => id,
        });
        self.deposits.insert(id, deposit);
        true
    }

    fn apply_fill(&mut self, fill: Fill) -> bool {
        let key = (fill.meta.transaction_hash, fill.meta.log_index);
        if !self.fill_keys.insert(key) {
            warn!(
                "[SpokePoolClient-{}] duplicate fill for deposit {}: tx={:?}, ignoring",
                self.chain_id,
                fill.deposit_id(),
                fill.meta.transaction_hash
            );
            return false;
        }
        self.record_event_metric("filled_relay");
        self.fills.push(fill);
        true
    }

    fn apply_speed_up(&mut self, speed_up: SpeedUp) -> bool {
        let key = (speed_up.deposit_id, speed_up.depositor);
        match self.speed_ups.get(&key) {
            // Only the speed-up with the lowest updated output amount stays
            // active.
            Some(existing)
                if existing.updated_output_amount <= speed_up.updated_output_amount =>
            {
                return false;
            }
            _ => {}
        }
        if let Some(deposit) = self.deposits.get_mut(&speed_up.deposit_id) {
            if deposit.relay.depositor == speed_up.depositor {
                apply_speed_up_to_deposit(deposit, &speed_up);
            }
        }
        self.record_event_metric("requested_speed_up_deposit");
        self.speed_ups.insert(key, speed_up);
        true
    }

    fn apply_slow_fill_request(&mut self, request: SlowFillRequest) -> bool {
        let key = relay_data_hash(&request.relay);
        if self.slow_fill_requests.contains_key(&key) {
            return false;
        }
        self.record_event_metric("requested_slow_fill");
        self.slow_fill_requests.insert(key, request);
        true
    }

    fn set_lite_chain_flags(&self, deposit: &mut Deposit) {
        deposit.from_lite_chain = self
            .config
            .lite_chain_ids
            .contains(&deposit.relay.origin_chain_id);
        deposit.to_lite_chain = self
            .config
            .lite_chain_ids
            .contains(&deposit.relay.destination_chain_id);
    }

    fn record_event_metric(&self, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .indexed_events
                .with_label_values(&[&self.chain_id.to_string(), kind])
                .inc();
        }
    }

    fn record_lookup_metric(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .historical_deposit_lookups
                .with_label_values(&[&self.chain_id.to_string(), outcome])
                .inc();
        }
    }

    fn record_rpc_metric(&self, method: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .rpc_queries
                .with_label_values(&[&self.chain_id.to_string(), method])
                .inc();
        }
    }

    // ------------------------------------------------------------------
    // Read accessors over the current in-memory snapshot
    // ------------------------------------------------------------------

    pub fn deposits(&self) -> Vec<Deposit> {
        self.deposits.values().cloned().collect()
    }

    pub fn deposit(&self, deposit_id: U256) -> Option<&Deposit> {
        self.deposits.get(&deposit_id)
    }

    pub fn fills(&self) -> Vec<Fill> {
        self.fills.clone()
    }

    pub fn fills_for_origin_chain(&self, origin_chain_id: u64) -> Vec<Fill> {
        self.fills
            .iter()
            .filter(|f| f.relay.origin_chain_id == origin_chain_id)
            .cloned()
            .collect()
    }

    pub fn fills_for_relayer(&self, relayer: &ChainAddress) -> Vec<Fill> {
        self.fills
            .iter()
            .filter(|f| &f.relayer == relayer)
            .cloned()
            .collect()
    }

    pub fn slow_fill_requests(&self) -> Vec<SlowFillRequest> {
        self.slow_fill_requests.values().cloned().collect()
    }

    /// Current route-enablement snapshot.
    pub fn deposit_routes(&self) -> HashMap<(ChainAddress, u64), bool> {
        self.routes.clone()
    }

    pub fn is_deposit_route_enabled(
        &self,
        origin_token: &ChainAddress,
        destination_chain_id: u64,
    ) -> bool {
        self.routes
            .get(&(*origin_token, destination_chain_id))
            .copied()
            .unwrap_or(false)
    }

    /// The in-memory deposit matching a fill, or `None`. No I/O. Slow
    /// fills bypass identity validation; they are a protocol-level
    /// fallback, not a relayer-submitted match.
    pub fn deposit_for_fill(&self, fill: &Fill) -> Option<&Deposit> {
        let deposit = self.deposits.get(&fill.deposit_id())?;
        if fill.is_slow_fill() {
            return Some(deposit);
        }
        match validate_fill_for_deposit(fill, deposit) {
            FillMatch::Valid => Some(deposit),
            FillMatch::Invalid { reason } => {
                debug!(
                    "[SpokePoolClient-{}] fill for deposit {} does not match: {}",
                    self.chain_id,
                    fill.deposit_id(),
                    reason
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Historical deposit recovery
    // ------------------------------------------------------------------

    /// Find a deposit by id, falling back to a fresh bounded log query
    /// when it is not held in memory.
    ///
    /// Ids outside the contract's known id space short-circuit with zero
    /// I/O. Ids inside the already-queried window are served from memory
    /// with zero fresh log queries. Everything else runs the bounded
    /// binary search and exactly one bounded event query over the
    /// resulting range, so this never blocks indefinitely.
    pub async fn find_deposit(&self, deposit_id: U256) -> RelayResult<DepositSearchResult> {
        if !self.is_updated {
            return Err(RelayError::ClientNotUpdated(format!(
                "spoke pool client for chain {} has no successful update yet",
                self.chain_id
            )));
        }

        if deposit_id < self.first_deposit_id_for_spoke_pool {
            self.record_lookup_metric("not_found");
            return Ok(DepositSearchResult::NotFound {
                code: InvalidFillReason::DepositIdInvalid,
                reason: format!(
                    "deposit id {} is below the spoke pool's first deposit id {}",
                    deposit_id, self.first_deposit_id_for_spoke_pool
                ),
            });
        }
        if deposit_id >= self.last_deposit_id_for_spoke_pool {
            self.record_lookup_metric("not_found");
            return Ok(DepositSearchResult::NotFound {
                code: InvalidFillReason::DepositIdNotFound,
                reason: format!(
                    "deposit id {} is at or beyond the spoke pool's last deposit id {}",
                    deposit_id, self.last_deposit_id_for_spoke_pool
                ),
            });
        }

        // Fast path: the id window already fetched into memory.
        if let (Some(earliest), Some(latest)) =
            (self.earliest_deposit_id_queried, self.latest_deposit_id_queried)
        {
            if deposit_id >= earliest && deposit_id <= latest {
                return match self.deposits.get(&deposit_id) {
                    Some(deposit) => {
                        info!(
                            "[SpokePoolClient-{}] deposit {} served from memory, no lookup issued",
                            self.chain_id, deposit_id
                        );
                        self.record_lookup_metric("memory");
                        Ok(DepositSearchResult::Found {
                            deposit: Box::new(deposit.clone()),
                        })
                    }
                    // The window is authoritative: a fully applied update
                    // over the range would have indexed this id.
                    None => {
                        self.record_lookup_metric("not_found");
                        Ok(DepositSearchResult::NotFound {
                            code: InvalidFillReason::DepositIdNotFound,
                            reason: format!(
                                "deposit id {} is inside the queried id window but not indexed",
                                deposit_id
                            ),
                        })
                    }
                };
            }
        }

        let range = get_block_range_for_deposit_id(
            deposit_id,
            self.deployment_block,
            self.latest_height_searched,
            self.config.max_deposit_id_searches,
            |block| {
                self.record_rpc_metric("deposit_id_at_block");
                self.source.deposit_id_at_block(block)
            },
        )
        .await?;

        info!(
            "[SpokePoolClient-{}] deposit {} not in memory, querying blocks {}",
            self.chain_id, deposit_id, range
        );
        self.record_rpc_metric("query_events");
        let events = self
            .source
            .query_events(&[SpokePoolEventKind::FundsDeposited], range.low, range.high)
            .await?;

        let mut found: Option<Deposit> = None;
        let event_count = events.len();
        for event in events {
            if let SpokePoolEvent::FundsDeposited(deposit) = event {
                if deposit.deposit_id() == deposit_id {
                    found = Some(deposit);
                    break;
                }
            }
        }

        match found {
            Some(mut deposit) => {
                self.set_lite_chain_flags(&mut deposit);
                if let Some(speed_up) = self.speed_ups.get(&(deposit_id, deposit.relay.depositor))
                {
                    apply_speed_up_to_deposit(&mut deposit, speed_up);
                }
                self.record_lookup_metric("rpc");
                Ok(DepositSearchResult::Found {
                    deposit: Box::new(deposit),
                })
            }
            None => {
                self.record_lookup_metric("not_found");
                Ok(DepositSearchResult::NotFound {
                    code: InvalidFillReason::DepositIdNotFound,
                    reason: format!(
                        "blocks {} yielded {} deposit events but none with id {}",
                        range, event_count, deposit_id
                    ),
                })
            }
        }
    }

    /// Recover the deposit for a fill, validating identity fields.
    ///
    /// Same fast/slow paths as `find_deposit`; an id match whose identity
    /// fields disagree with the fill maps to `FillMismatch`. Slow fills
    /// skip validation.
    pub async fn query_historical_deposit_for_fill(
        &self,
        fill: &Fill,
    ) -> RelayResult<DepositSearchResult> {
        let result = self.find_deposit(fill.deposit_id()).await?;
        let deposit = match result {
            DepositSearchResult::Found { deposit } => deposit,
            not_found => return Ok(not_found),
        };
        if fill.is_slow_fill() {
            return Ok(DepositSearchResult::Found { deposit });
        }
        match validate_fill_for_deposit(fill, &deposit) {
            FillMatch::Valid => Ok(DepositSearchResult::Found { deposit }),
            FillMatch::Invalid { reason } => Ok(DepositSearchResult::NotFound {
                code: InvalidFillReason::FillMismatch,
                reason,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Destination-chain fill status
    // ------------------------------------------------------------------

    /// Authoritative fill status for one relay on this (destination)
    /// chain, as of `at_block` (defaults to the latest searched height).
    pub async fn relay_fill_status(
        &self,
        relay: &RelayData,
        at_block: Option<u64>,
    ) -> RelayResult<FillStatus> {
        let block = at_block.unwrap_or(self.latest_height_searched);
        let hash = relay_data_hash(relay);
        self.record_rpc_metric("fill_statuses");
        let statuses = self.source.fill_statuses(&[hash], block).await?;
        statuses
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::ProviderError("empty fill status response".into()))
    }

    /// Fill statuses for many relays in a single source round trip.
    pub async fn fill_status_array(
        &self,
        relays: &[RelayData],
        at_block: Option<u64>,
    ) -> RelayResult<Vec<FillStatus>> {
        let block = at_block.unwrap_or(self.latest_height_searched);
        let hashes: Vec<H256> = relays.iter().map(relay_data_hash).collect();
        self.record_rpc_metric("fill_statuses");
        let statuses = self.source.fill_statuses(&hashes, block).await?;
        if statuses.len() != relays.len() {
            return Err(RelayError::ProviderError(format!(
                "fill status response length {} does not match request length {}",
                statuses.len(),
                relays.len()
            )));
        }
        Ok(statuses)
    }
}

fn apply_speed_up_to_deposit(deposit: &mut Deposit, speed_up: &SpeedUp) {
    let lower = deposit
        .updated_output_amount
        .map(|current| speed_up.updated_output_amount < current)
        .unwrap_or(true);
    if !lower {
        return;
    }
    deposit.updated_recipient = Some(speed_up.updated_recipient);
    deposit.updated_output_amount = Some(speed_up.updated_output_amount);
    deposit.updated_message = Some(speed_up.updated_message.clone());
    deposit.speed_up_signature = Some(speed_up.signature.clone());
}
