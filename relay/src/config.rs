// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use ethers::types::Address as EthAddress;
use serde::{Deserialize, Serialize};

/// Per-spoke-pool client tuning.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SpokePoolClientConfig {
    /// First block to replay events from. Defaults to the contract's
    /// deployment block when unset.
    #[serde(default)]
    pub start_block: Option<u64>,
    /// Probe budget for the deposit-id range search. Each probe is one RPC
    /// round trip; a smaller budget widens the recovered block range.
    #[serde(default = "default_max_deposit_id_searches")]
    pub max_deposit_id_searches: u32,
    /// Chains exempt from hub route-mapping; deposits from/to these chains
    /// settle repayment on the origin chain.
    #[serde(default)]
    pub lite_chain_ids: Vec<u64>,
}

fn default_max_deposit_id_searches() -> u32 {
    20
}

impl Default for SpokePoolClientConfig {
    fn default() -> Self {
        Self {
            start_block: None,
            max_deposit_id_searches: default_max_deposit_id_searches(),
            lite_chain_ids: Vec::new(),
        }
    }
}

/// Hub pool client tuning.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HubPoolClientConfig {
    /// First hub block to replay events from. Defaults to the hub pool's
    /// deployment block when unset.
    #[serde(default)]
    pub start_block: Option<u64>,
}

/// Connection details for one spoke pool.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SpokePoolConnection {
    // Rpc url for the chain's fullnode, used for log and counter queries.
    pub rpc_url: String,
    // The spoke pool contract address on this chain.
    pub spoke_pool_address: String,
    // The expected chain id; connection fails on mismatch.
    pub chain_id: u64,
    // Block at which the spoke pool was deployed.
    pub deployment_block: u64,
    #[serde(default)]
    pub client: SpokePoolClientConfig,
}

/// Connection details for the hub pool.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HubPoolConnection {
    pub rpc_url: String,
    pub hub_pool_address: String,
    pub chain_id: u64,
    pub deployment_block: u64,
    #[serde(default)]
    pub client: HubPoolClientConfig,
}

/// Top-level configuration for a relay client process: one hub pool plus
/// one spoke pool per chain.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayClientConfig {
    pub hub: HubPoolConnection,
    pub spoke_pools: Vec<SpokePoolConnection>,
}

impl RelayClientConfig {
    /// Validate the config before any client is constructed.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.spoke_pools.is_empty() {
            return Err(anyhow!("at least one spoke pool must be configured"));
        }
        let mut seen = std::collections::HashSet::new();
        for spoke in &self.spoke_pools {
            if !seen.insert(spoke.chain_id) {
                return Err(anyhow!(
                    "duplicate spoke pool configured for chain {}",
                    spoke.chain_id
                ));
            }
            spoke
                .spoke_pool_address
                .parse::<EthAddress>()
                .map_err(|e| {
                    anyhow!(
                        "invalid spoke pool address for chain {}: {}",
                        spoke.chain_id,
                        e
                    )
                })?;
        }
        self.hub
            .hub_pool_address
            .parse::<EthAddress>()
            .map_err(|e| anyhow!("invalid hub pool address: {}", e))?;
        Ok(())
    }
}
