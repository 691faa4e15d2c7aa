// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Hub pool client: token-route resolution and bundle finality.
//!
//! The hub records pool rebalance routes (L1 <-> L2 token assignments,
//! effective as of the hub block they were set at) and the bundle
//! lifecycle (proposed -> executed | canceled | disputed). Route lookups
//! are point-in-time: they select the latest assignment at or before the
//! queried block. Bundle-finality queries answer which mainnet end block
//! the hub considered canonical when settling a given chain - the correct
//! point in time for resolving routes for settlement, as opposed to the
//! deposit's own quote block.
//!
//! Same serialization discipline as the spoke client: `update` takes
//! `&mut self`, one instance per process.

use crate::chain_source::HubPoolLogSource;
use crate::config::HubPoolClientConfig;
use crate::error::{RelayError, RelayResult};
use crate::events::{sort_by_log_position, HubPoolEvent};
use crate::types::{PoolRebalanceRoute, ProposedRootBundle};
use relay_types::ChainAddress;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A proposed bundle that survived its challenge period and was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBundle {
    pub proposal: ProposedRootBundle,
    /// Hub block at which the execution event landed.
    pub executed_at_block: u64,
}

impl ValidatedBundle {
    /// The bundle's mainnet end block: entry 0 of the evaluation vector
    /// (the hub/mainnet chain is the first entry of the configured chain
    /// id list).
    pub fn mainnet_end_block(&self) -> u64 {
        self.proposal
            .bundle_evaluation_block_numbers
            .first()
            .copied()
            .unwrap_or(0)
    }

    /// Whether this bundle's evaluation range includes `chain_id`. The
    /// evaluation vector is positional over `valid_chain_ids`; a chain not
    /// in the list, or whose index is beyond the vector, is not covered.
    pub fn covers_chain(&self, chain_id: u64, valid_chain_ids: &[u64]) -> bool {
        valid_chain_ids
            .iter()
            .position(|&c| c == chain_id)
            .map(|index| index < self.proposal.bundle_evaluation_block_numbers.len())
            .unwrap_or(false)
    }
}

pub struct HubPoolClient<S> {
    chain_id: u64,
    deployment_block: u64,
    source: Arc<S>,

    /// Route assignments in hub log order.
    routes: Vec<PoolRebalanceRoute>,
    /// The at-most-one proposal currently inside its challenge period.
    pending_proposal: Option<ProposedRootBundle>,
    validated_bundles: Vec<ValidatedBundle>,

    first_height_to_search: u64,
    latest_height_searched: u64,
    is_updated: bool,
}

impl<S> HubPoolClient<S>
where
    S: HubPoolLogSource,
{
    pub fn new(
        chain_id: u64,
        deployment_block: u64,
        config: HubPoolClientConfig,
        source: Arc<S>,
    ) -> Self {
        let first_height_to_search = config.start_block.unwrap_or(deployment_block);
        Self {
            chain_id,
            deployment_block,
            source,
            routes: Vec::new(),
            pending_proposal: None,
            validated_bundles: Vec::new(),
            first_height_to_search,
            latest_height_searched: 0,
            is_updated: false,
        }
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

    pub fn is_updated(&self) -> bool {
        self.is_updated
    }

    pub fn validated_bundles(&self) -> &[ValidatedBundle] {
        &self.validated_bundles
    }

    pub fn pending_proposal(&self) -> Option<&ProposedRootBundle> {
        self.pending_proposal.as_ref()
    }

    /// Fetch and apply all hub events in `[first_height_to_search, head]`.
    /// A failed query leaves the prior snapshot intact.
    pub async fn update(&mut self) -> RelayResult<()> {
        let head = self.source.latest_block().await?;
        let from = self.first_height_to_search;
        if head < from {
            debug!(
                "[HubPoolClient] nothing to search: head {} below next height {}",
                head, from
            );
            return Ok(());
        }

        let mut events = self
            .source
            .query_events(&crate::events::HubPoolEventKind::ALL, from, head)
            .await?;
        sort_by_log_position(&mut events, |e| e.meta());

        let mut new_routes = 0usize;
        let mut new_bundles = 0usize;
        for event in events {
            match event {
                HubPoolEvent::SetPoolRebalanceRoute(route) => {
                    self.routes.push(route);
                    new_routes += 1;
                }
                HubPoolEvent::ProposedRootBundle(proposal) => {
                    if let Some(previous) = self.pending_proposal.replace(proposal) {
                        // The hub contract serializes proposals; seeing a
                        // second pending one means the log is ahead of us,
                        // not a valid overlapping state.
                        warn!(
                            "[HubPoolClient] proposal at block {} superseded while still pending",
                            previous.meta.block_number
                        );
                    }
                }
                HubPoolEvent::RootBundleExecuted { meta } => {
                    match self.pending_proposal.take() {
                        Some(proposal) => {
                            self.validated_bundles.push(ValidatedBundle {
                                proposal,
                                executed_at_block: meta.block_number,
                            });
                            new_bundles += 1;
                        }
                        None => warn!(
                            "[HubPoolClient] bundle executed at block {} without a pending proposal",
                            meta.block_number
                        ),
                    }
                }
                HubPoolEvent::RootBundleCanceled { meta }
                | HubPoolEvent::RootBundleDisputed { meta } => {
                    if self.pending_proposal.take().is_none() {
                        warn!(
                            "[HubPoolClient] bundle voided at block {} without a pending proposal",
                            meta.block_number
                        );
                    }
                }
            }
        }

        self.first_height_to_search = head + 1;
        self.latest_height_searched = head;
        self.is_updated = true;
        info!(
            "[HubPoolClient] update applied blocks [{}, {}]: {} routes, {} validated bundles",
            from, head, new_routes, new_bundles
        );
        Ok(())
    }

    /// The canonical L1 token for an L2 token on `l2_chain_id`, as of
    /// `as_of_block` on the hub chain.
    pub fn l1_token_for(
        &self,
        l2_chain_id: u64,
        l2_token: &ChainAddress,
        as_of_block: u64,
    ) -> RelayResult<ChainAddress> {
        self.routes
            .iter()
            .rev()
            .find(|route| {
                route.meta.block_number <= as_of_block
                    && route.l2_chain_id == l2_chain_id
                    && &route.l2_token == l2_token
            })
            .map(|route| route.l1_token)
            .ok_or_else(|| {
                RelayError::TokenMappingNotFound(format!(
                    "no l1 token for l2 token {} on chain {} at or before block {}",
                    l2_token, l2_chain_id, as_of_block
                ))
            })
    }

    /// The L2 representation of an L1 token on `l2_chain_id`, as of
    /// `as_of_block` on the hub chain.
    pub fn l2_token_for(
        &self,
        l1_token: &ChainAddress,
        l2_chain_id: u64,
        as_of_block: u64,
    ) -> RelayResult<ChainAddress> {
        self.routes
            .iter()
            .rev()
            .find(|route| {
                route.meta.block_number <= as_of_block
                    && route.l2_chain_id == l2_chain_id
                    && &route.l1_token == l1_token
            })
            .map(|route| route.l2_token)
            .ok_or_else(|| {
                RelayError::TokenMappingNotFound(format!(
                    "no l2 token for l1 token {} on chain {} at or before block {}",
                    l1_token, l2_chain_id, as_of_block
                ))
            })
    }

    /// The mainnet end block of the most recently validated bundle whose
    /// evaluation range includes `chain_id`, strictly before
    /// `event_block`; `0` when no such bundle exists yet.
    ///
    /// A chain never covered by any validated bundle yields the latest
    /// validated bundle's end block regardless of `event_block`. Route
    /// lookups for lite-chain deposits skip this resolution entirely
    /// (repayment happens on the origin chain by protocol rule).
    pub fn mainnet_config_block_for_event(
        &self,
        event_block: u64,
        chain_id: u64,
        valid_chain_ids: &[u64],
    ) -> u64 {
        let mut latest_any = 0u64;
        let mut best_covered = 0u64;
        let mut ever_covered = false;

        for bundle in &self.validated_bundles {
            let end_block = bundle.mainnet_end_block();
            latest_any = latest_any.max(end_block);
            if bundle.covers_chain(chain_id, valid_chain_ids) {
                ever_covered = true;
                if end_block < event_block {
                    best_covered = best_covered.max(end_block);
                }
            }
        }

        if ever_covered {
            best_covered
        } else {
            latest_any
        }
    }

    /// Resolve the repayment token pair for a deposit at settlement time:
    /// the canonical L1 token for the deposit's input token, and its L2
    /// representation on the repayment chain, both as of the
    /// bundle-finality-aware hub block for the deposit.
    pub fn repayment_tokens_for_deposit(
        &self,
        input_token: &ChainAddress,
        origin_chain_id: u64,
        repayment_chain_id: u64,
        deposit_hub_block: u64,
        valid_chain_ids: &[u64],
    ) -> RelayResult<(ChainAddress, ChainAddress)> {
        let config_block =
            self.mainnet_config_block_for_event(deposit_hub_block, origin_chain_id, valid_chain_ids);
        // Before any bundle covered the origin chain, fall back to the
        // event block itself so freshly-set routes resolve.
        let as_of = if config_block == 0 {
            deposit_hub_block
        } else {
            config_block
        };
        let l1_token = self.l1_token_for(origin_chain_id, input_token, as_of)?;
        let repayment_token = self.l2_token_for(&l1_token, repayment_chain_id, as_of)?;
        Ok((l1_token, repayment_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HubPoolEvent;
    use crate::test_utils::*;
    use std::sync::Arc;

    const HUB_CHAIN: u64 = 1;

    async fn updated_client(source: Arc<MockHubPoolSource>) -> HubPoolClient<MockHubPoolSource> {
        let mut client =
            HubPoolClient::new(HUB_CHAIN, 0, HubPoolClientConfig::default(), source);
        client.update().await.unwrap();
        client
    }

    fn executed_at(block: u64) -> HubPoolEvent {
        HubPoolEvent::RootBundleExecuted {
            meta: test_event_meta(block, 0, 0),
        }
    }

    /// Two bundles validated at mainnet end blocks 100 and 200 covering
    /// chains [1, 2, 3].
    fn source_with_two_validated_bundles() -> Arc<MockHubPoolSource> {
        let source = Arc::new(MockHubPoolSource::new(5_000));
        source.push_event(HubPoolEvent::ProposedRootBundle(test_proposed_bundle(
            vec![100, 1_000, 2_000],
            1_000,
        )));
        source.push_event(executed_at(1_100));
        source.push_event(HubPoolEvent::ProposedRootBundle(test_proposed_bundle(
            vec![200, 3_000, 4_000],
            2_000,
        )));
        source.push_event(executed_at(2_100));
        source
    }

    #[tokio::test]
    async fn test_bundle_finality_boundary() {
        init_for_testing();
        let client = updated_client(source_with_two_validated_bundles()).await;
        let chains = [1u64, 2, 3];

        for event_block in [0u64, 10, 100] {
            assert_eq!(
                client.mainnet_config_block_for_event(event_block, 1, &chains),
                0,
                "event block {}",
                event_block
            );
        }
        for event_block in [101u64, 110, 200] {
            assert_eq!(
                client.mainnet_config_block_for_event(event_block, 1, &chains),
                100,
                "event block {}",
                event_block
            );
        }
        assert_eq!(client.mainnet_config_block_for_event(201, 1, &chains), 200);
    }

    #[tokio::test]
    async fn test_bundle_finality_uncovered_chain_gets_latest() {
        let client = updated_client(source_with_two_validated_bundles()).await;
        let chains = [1u64, 2, 3];
        // Chain 9 is covered by neither bundle: latest validated end block
        // regardless of the event block
        for event_block in [0u64, 100, 150, 10_000] {
            assert_eq!(
                client.mainnet_config_block_for_event(event_block, 9, &chains),
                200,
                "event block {}",
                event_block
            );
        }
    }

    #[tokio::test]
    async fn test_bundle_covering_subset_of_chains() {
        let source = Arc::new(MockHubPoolSource::new(5_000));
        // Evaluation vector of length 2 covers only the first two chains
        source.push_event(HubPoolEvent::ProposedRootBundle(test_proposed_bundle(
            vec![100, 1_000],
            1_000,
        )));
        source.push_event(executed_at(1_100));
        let client = updated_client(source).await;
        let chains = [1u64, 2, 3];

        assert_eq!(client.mainnet_config_block_for_event(150, 2, &chains), 100);
        // Chain 3 is beyond the vector: never covered, falls back to the
        // latest validated end block
        assert_eq!(client.mainnet_config_block_for_event(150, 3, &chains), 100);
        assert_eq!(client.mainnet_config_block_for_event(50, 3, &chains), 100);
    }

    #[tokio::test]
    async fn test_no_validated_bundles_yields_zero() {
        let source = Arc::new(MockHubPoolSource::new(5_000));
        // Proposal exists but was never executed
        source.push_event(HubPoolEvent::ProposedRootBundle(test_proposed_bundle(
            vec![100, 1_000, 2_000],
            1_000,
        )));
        let client = updated_client(source).await;
        assert_eq!(
            client.mainnet_config_block_for_event(5_000, 1, &[1, 2, 3]),
            0
        );
        assert!(client.pending_proposal().is_some());
        assert!(client.validated_bundles().is_empty());
    }

    #[tokio::test]
    async fn test_canceled_proposal_is_not_validated() {
        let source = Arc::new(MockHubPoolSource::new(5_000));
        source.push_event(HubPoolEvent::ProposedRootBundle(test_proposed_bundle(
            vec![100, 1_000, 2_000],
            1_000,
        )));
        source.push_event(HubPoolEvent::RootBundleCanceled {
            meta: test_event_meta(1_050, 0, 0),
        });
        // A later proposal goes through
        source.push_event(HubPoolEvent::ProposedRootBundle(test_proposed_bundle(
            vec![200, 3_000, 4_000],
            2_000,
        )));
        source.push_event(executed_at(2_100));

        let client = updated_client(source).await;
        assert_eq!(client.validated_bundles().len(), 1);
        assert_eq!(client.validated_bundles()[0].mainnet_end_block(), 200);
        assert!(client.pending_proposal().is_none());
    }

    #[tokio::test]
    async fn test_token_mapping_as_of_block() {
        let source = Arc::new(MockHubPoolSource::new(5_000));
        // The same l2 token is remapped to a new l1 token at block 150
        source.push_event(HubPoolEvent::SetPoolRebalanceRoute(
            test_pool_rebalance_route(10, 0xaa, 0xbb, 50),
        ));
        source.push_event(HubPoolEvent::SetPoolRebalanceRoute(
            test_pool_rebalance_route(10, 0xcc, 0xbb, 150),
        ));
        let client = updated_client(source).await;

        let l2_token = ChainAddress::Evm([0xbb; 20]);
        assert_eq!(
            client.l1_token_for(10, &l2_token, 100).unwrap(),
            ChainAddress::Evm([0xaa; 20])
        );
        assert_eq!(
            client.l1_token_for(10, &l2_token, 150).unwrap(),
            ChainAddress::Evm([0xcc; 20])
        );
        assert_eq!(
            client.l1_token_for(10, &l2_token, 10_000).unwrap(),
            ChainAddress::Evm([0xcc; 20])
        );

        // Before the first assignment: no mapping
        let err = client.l1_token_for(10, &l2_token, 10).unwrap_err();
        assert_eq!(err.error_type(), "token_mapping_not_found");
        assert!(format!("{}", err).starts_with("could not find token mapping"));

        // Unknown chain: no mapping at any block
        assert!(client.l1_token_for(137, &l2_token, 10_000).is_err());
    }

    #[tokio::test]
    async fn test_l2_token_for_inverse_lookup() {
        let source = Arc::new(MockHubPoolSource::new(5_000));
        source.push_event(HubPoolEvent::SetPoolRebalanceRoute(
            test_pool_rebalance_route(10, 0xaa, 0xbb, 50),
        ));
        source.push_event(HubPoolEvent::SetPoolRebalanceRoute(
            test_pool_rebalance_route(137, 0xaa, 0xdd, 60),
        ));
        let client = updated_client(source).await;

        let l1_token = ChainAddress::Evm([0xaa; 20]);
        assert_eq!(
            client.l2_token_for(&l1_token, 10, 100).unwrap(),
            ChainAddress::Evm([0xbb; 20])
        );
        assert_eq!(
            client.l2_token_for(&l1_token, 137, 100).unwrap(),
            ChainAddress::Evm([0xdd; 20])
        );
        assert!(client.l2_token_for(&l1_token, 42, 100).is_err());
    }

    #[tokio::test]
    async fn test_update_failure_leaves_snapshot_intact() {
        let source = Arc::new(MockHubPoolSource::new(1_000));
        source.push_event(HubPoolEvent::SetPoolRebalanceRoute(
            test_pool_rebalance_route(10, 0xaa, 0xbb, 50),
        ));
        let mut client =
            HubPoolClient::new(HUB_CHAIN, 0, HubPoolClientConfig::default(), source.clone());
        client.update().await.unwrap();
        assert_eq!(client.latest_height_searched(), 1_000);

        source.push_event(HubPoolEvent::SetPoolRebalanceRoute(
            test_pool_rebalance_route(10, 0xee, 0xbb, 1_500),
        ));
        source.set_head(2_000);
        source.fail_next_query();
        assert!(client.update().await.is_err());

        // Old mapping still served; bookkeeping unchanged
        assert_eq!(client.latest_height_searched(), 1_000);
        assert_eq!(
            client
                .l1_token_for(10, &ChainAddress::Evm([0xbb; 20]), 1_000)
                .unwrap(),
            ChainAddress::Evm([0xaa; 20])
        );

        client.update().await.unwrap();
        assert_eq!(
            client
                .l1_token_for(10, &ChainAddress::Evm([0xbb; 20]), 2_000)
                .unwrap(),
            ChainAddress::Evm([0xee; 20])
        );
    }

    #[tokio::test]
    async fn test_repayment_tokens_for_deposit() {
        let source = Arc::new(MockHubPoolSource::new(5_000));
        // Routes for origin chain 10 and repayment chain 137, set early
        source.push_event(HubPoolEvent::SetPoolRebalanceRoute(
            test_pool_rebalance_route(10, 0xaa, 0xbb, 50),
        ));
        source.push_event(HubPoolEvent::SetPoolRebalanceRoute(
            test_pool_rebalance_route(137, 0xaa, 0xdd, 60),
        ));
        // One validated bundle covering [1, 10, 137] at mainnet end 100
        source.push_event(HubPoolEvent::ProposedRootBundle(test_proposed_bundle(
            vec![100, 500, 600],
            1_000,
        )));
        source.push_event(executed_at(1_100));
        let client = updated_client(source).await;

        let (l1, repayment) = client
            .repayment_tokens_for_deposit(
                &ChainAddress::Evm([0xbb; 20]),
                10,
                137,
                2_000,
                &[1, 10, 137],
            )
            .unwrap();
        assert_eq!(l1, ChainAddress::Evm([0xaa; 20]));
        assert_eq!(repayment, ChainAddress::Evm([0xdd; 20]));
    }
}
