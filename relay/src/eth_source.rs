// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! RPC-backed log sources for EVM chains.
//!
//! These adapt an ethers `Provider` into the `SpokePoolLogSource` /
//! `HubPoolLogSource` capabilities. No retry or backoff happens here; any
//! provider failure propagates to the caller, whose transport layer owns
//! retry policy.

use crate::abi::{
    decode_hub_pool_log, decode_spoke_pool_log, EnabledDepositRouteFilter, FilledRelayFilter,
    FundsDepositedFilter, ProposedRootBundleFilter, RequestedSlowFillFilter,
    RequestedSpeedUpDepositFilter, RootBundleCanceledFilter, RootBundleDisputedFilter,
    RootBundleExecutedFilter, SetPoolRebalanceRouteFilter, SpokePool,
};
use crate::chain_source::{HubPoolLogSource, SpokePoolLogSource};
use crate::error::{RelayError, RelayResult};
use crate::events::{
    sort_by_log_position, HubPoolEvent, HubPoolEventKind, SpokePoolEvent, SpokePoolEventKind,
};
use crate::types::FillStatus;
use async_trait::async_trait;
use ethers::contract::EthEvent;
use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::{Address as EthAddress, BlockId, Filter, Log, Topic, ValueOrArray, H256, U256};
use std::sync::Arc;
use tap::TapFallible;
use tracing::info;

/// Spoke pool log source over an EVM JSON-RPC provider.
pub struct EthSpokePoolSource<P> {
    provider: Arc<Provider<P>>,
    contract: SpokePool<Provider<P>>,
    contract_address: EthAddress,
    chain_id: u64,
}

impl<P> EthSpokePoolSource<P>
where
    P: JsonRpcClient + 'static,
{
    /// Connect to a spoke pool. When `expected_chain_id` is set, the
    /// provider's reported chain id must match it; connecting a client to
    /// the wrong network is unrecoverable downstream.
    pub async fn new(
        provider: Arc<Provider<P>>,
        contract_address: EthAddress,
        expected_chain_id: Option<u64>,
    ) -> RelayResult<Self> {
        let chain_id = provider.get_chainid().await.map_err(RelayError::from)?;
        let chain_id = chain_id.as_u64();
        if let Some(expected) = expected_chain_id {
            if chain_id != expected {
                return Err(RelayError::ChainIdMismatch {
                    expected,
                    actual: chain_id,
                });
            }
        }
        info!(
            "[EthSpokePoolSource] connected to chain {} at spoke pool {:?}",
            chain_id, contract_address
        );
        let contract = SpokePool::new(contract_address, provider.clone());
        Ok(Self {
            provider,
            contract,
            contract_address,
            chain_id,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn topic0_for(kinds: &[SpokePoolEventKind]) -> Vec<H256> {
        kinds
            .iter()
            .map(|kind| match kind {
                SpokePoolEventKind::FundsDeposited => FundsDepositedFilter::signature(),
                SpokePoolEventKind::FilledRelay => FilledRelayFilter::signature(),
                SpokePoolEventKind::RequestedSpeedUpDeposit => {
                    RequestedSpeedUpDepositFilter::signature()
                }
                SpokePoolEventKind::RequestedSlowFill => RequestedSlowFillFilter::signature(),
                SpokePoolEventKind::EnabledDepositRoute => EnabledDepositRouteFilter::signature(),
            })
            .collect()
    }
}

// Note: query may fail if the range is too big. Callsite is responsible
// for bounding the range (the clients always pass bounded ranges).
async fn get_logs_checked<P: JsonRpcClient + 'static>(
    provider: &Provider<P>,
    address: EthAddress,
    topic0: Vec<H256>,
    from_block: u64,
    to_block: u64,
) -> RelayResult<Vec<Log>> {
    let topic0: Topic = ValueOrArray::Array(topic0.into_iter().map(Option::Some).collect());
    let filter = Filter::new()
        .from_block(from_block)
        .to_block(to_block)
        .address(address)
        .topic0(topic0);
    let logs = provider
        .get_logs(&filter)
        .await
        .map_err(RelayError::from)
        .tap_err(|e| {
            tracing::error!(
                "get_logs failed. Filter: {:?}. Error {:?}",
                filter,
                e
            )
        })?;

    // Safeguard check that all events are emitted from the requested
    // contract address
    if logs.iter().any(|log| log.address != address) {
        return Err(RelayError::ProviderError(format!(
            "provider returned logs from a different contract address (expected {:?})",
            address
        )));
    }
    Ok(logs)
}

#[async_trait]
impl<P> SpokePoolLogSource for EthSpokePoolSource<P>
where
    P: JsonRpcClient + 'static,
{
    async fn latest_block(&self) -> RelayResult<u64> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(RelayError::from)?;
        Ok(number.as_u64())
    }

    async fn deposit_id_at_block(&self, block: u64) -> RelayResult<U256> {
        self.contract
            .number_of_deposits()
            .block(BlockId::from(block))
            .call()
            .await
            .map_err(|e| {
                RelayError::ProviderError(format!("numberOfDeposits at block {}: {:?}", block, e))
            })
    }

    async fn query_events(
        &self,
        kinds: &[SpokePoolEventKind],
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<SpokePoolEvent>> {
        let logs = get_logs_checked(
            &self.provider,
            self.contract_address,
            Self::topic0_for(kinds),
            from_block,
            to_block,
        )
        .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if let Some(event) = decode_spoke_pool_log(self.chain_id, log)? {
                events.push(event);
            }
        }
        sort_by_log_position(&mut events, |e| e.meta());
        Ok(events)
    }

    async fn fill_statuses(
        &self,
        relay_data_hashes: &[H256],
        block: u64,
    ) -> RelayResult<Vec<FillStatus>> {
        let calls: Vec<_> = relay_data_hashes
            .iter()
            .map(|hash| {
                let call = self
                    .contract
                    .fill_statuses(hash.0)
                    .block(BlockId::from(block));
                async move { call.call().await }
            })
            .collect();
        let raw: Vec<U256> = futures::future::join_all(calls)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                RelayError::ProviderError(format!("fillStatuses at block {}: {:?}", block, e))
            })?;

        raw.into_iter()
            .map(|value| {
                let code = u8::try_from(value.low_u64())
                    .map_err(|_| RelayError::ProviderError("fill status out of range".into()))?;
                FillStatus::try_from(code).map_err(|_| {
                    RelayError::ProviderError(format!("unknown fill status {}", code))
                })
            })
            .collect()
    }
}

/// Hub pool log source over an EVM JSON-RPC provider.
pub struct EthHubPoolSource<P> {
    provider: Arc<Provider<P>>,
    contract_address: EthAddress,
}

impl<P> EthHubPoolSource<P>
where
    P: JsonRpcClient + 'static,
{
    pub async fn new(
        provider: Arc<Provider<P>>,
        contract_address: EthAddress,
        expected_chain_id: Option<u64>,
    ) -> RelayResult<Self> {
        let chain_id = provider.get_chainid().await.map_err(RelayError::from)?;
        if let Some(expected) = expected_chain_id {
            if chain_id.as_u64() != expected {
                return Err(RelayError::ChainIdMismatch {
                    expected,
                    actual: chain_id.as_u64(),
                });
            }
        }
        info!(
            "[EthHubPoolSource] connected to chain {} at hub pool {:?}",
            chain_id, contract_address
        );
        Ok(Self {
            provider,
            contract_address,
        })
    }

    fn topic0_for(kinds: &[HubPoolEventKind]) -> Vec<H256> {
        kinds
            .iter()
            .map(|kind| match kind {
                HubPoolEventKind::SetPoolRebalanceRoute => {
                    SetPoolRebalanceRouteFilter::signature()
                }
                HubPoolEventKind::ProposedRootBundle => ProposedRootBundleFilter::signature(),
                HubPoolEventKind::RootBundleExecuted => RootBundleExecutedFilter::signature(),
                HubPoolEventKind::RootBundleCanceled => RootBundleCanceledFilter::signature(),
                HubPoolEventKind::RootBundleDisputed => RootBundleDisputedFilter::signature(),
            })
            .collect()
    }
}

#[async_trait]
impl<P> HubPoolLogSource for EthHubPoolSource<P>
where
    P: JsonRpcClient + 'static,
{
    async fn latest_block(&self) -> RelayResult<u64> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(RelayError::from)?;
        Ok(number.as_u64())
    }

    async fn query_events(
        &self,
        kinds: &[HubPoolEventKind],
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<HubPoolEvent>> {
        let logs = get_logs_checked(
            &self.provider,
            self.contract_address,
            Self::topic0_for(kinds),
            from_block,
            to_block,
        )
        .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if let Some(event) = decode_hub_pool_log(log)? {
                events.push(event);
            }
        }
        sort_by_log_position(&mut events, |e| e.meta());
        Ok(events)
    }
}
