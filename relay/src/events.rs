// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Typed events emitted by the spoke pool and hub pool contracts.
//!
//! These are pure data and can be consumed by the clients without coupling
//! to any particular log source. Sources return events already carrying
//! their on-chain provenance (`EventMeta`); `sort_by_log_position` pins the
//! block/transaction/log application order.

use crate::types::{
    Deposit, EventMeta, Fill, PoolRebalanceRoute, ProposedRootBundle, RouteToggle,
    SlowFillRequest, SpeedUp,
};
use serde::{Deserialize, Serialize};

/// Event kinds a spoke pool log query can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpokePoolEventKind {
    FundsDeposited,
    FilledRelay,
    RequestedSpeedUpDeposit,
    RequestedSlowFill,
    EnabledDepositRoute,
}

impl SpokePoolEventKind {
    pub const ALL: [SpokePoolEventKind; 5] = [
        SpokePoolEventKind::FundsDeposited,
        SpokePoolEventKind::FilledRelay,
        SpokePoolEventKind::RequestedSpeedUpDeposit,
        SpokePoolEventKind::RequestedSlowFill,
        SpokePoolEventKind::EnabledDepositRoute,
    ];
}

/// A typed spoke pool event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpokePoolEvent {
    FundsDeposited(Deposit),
    FilledRelay(Fill),
    RequestedSpeedUpDeposit(SpeedUp),
    RequestedSlowFill(SlowFillRequest),
    EnabledDepositRoute(RouteToggle),
}

impl SpokePoolEvent {
    pub fn kind(&self) -> SpokePoolEventKind {
        match self {
            SpokePoolEvent::FundsDeposited(_) => SpokePoolEventKind::FundsDeposited,
            SpokePoolEvent::FilledRelay(_) => SpokePoolEventKind::FilledRelay,
            SpokePoolEvent::RequestedSpeedUpDeposit(_) => {
                SpokePoolEventKind::RequestedSpeedUpDeposit
            }
            SpokePoolEvent::RequestedSlowFill(_) => SpokePoolEventKind::RequestedSlowFill,
            SpokePoolEvent::EnabledDepositRoute(_) => SpokePoolEventKind::EnabledDepositRoute,
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            SpokePoolEvent::FundsDeposited(e) => &e.meta,
            SpokePoolEvent::FilledRelay(e) => &e.meta,
            SpokePoolEvent::RequestedSpeedUpDeposit(e) => &e.meta,
            SpokePoolEvent::RequestedSlowFill(e) => &e.meta,
            SpokePoolEvent::EnabledDepositRoute(e) => &e.meta,
        }
    }
}

/// Event kinds a hub pool log query can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HubPoolEventKind {
    SetPoolRebalanceRoute,
    ProposedRootBundle,
    RootBundleExecuted,
    RootBundleCanceled,
    RootBundleDisputed,
}

impl HubPoolEventKind {
    pub const ALL: [HubPoolEventKind; 5] = [
        HubPoolEventKind::SetPoolRebalanceRoute,
        HubPoolEventKind::ProposedRootBundle,
        HubPoolEventKind::RootBundleExecuted,
        HubPoolEventKind::RootBundleCanceled,
        HubPoolEventKind::RootBundleDisputed,
    ];
}

/// A typed hub pool event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubPoolEvent {
    SetPoolRebalanceRoute(PoolRebalanceRoute),
    ProposedRootBundle(ProposedRootBundle),
    /// A proposed bundle passed its challenge period and was executed.
    RootBundleExecuted { meta: EventMeta },
    /// The pending proposal was canceled before execution.
    RootBundleCanceled { meta: EventMeta },
    /// The pending proposal was disputed and voided.
    RootBundleDisputed { meta: EventMeta },
}

impl HubPoolEvent {
    pub fn kind(&self) -> HubPoolEventKind {
        match self {
            HubPoolEvent::SetPoolRebalanceRoute(_) => HubPoolEventKind::SetPoolRebalanceRoute,
            HubPoolEvent::ProposedRootBundle(_) => HubPoolEventKind::ProposedRootBundle,
            HubPoolEvent::RootBundleExecuted { .. } => HubPoolEventKind::RootBundleExecuted,
            HubPoolEvent::RootBundleCanceled { .. } => HubPoolEventKind::RootBundleCanceled,
            HubPoolEvent::RootBundleDisputed { .. } => HubPoolEventKind::RootBundleDisputed,
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            HubPoolEvent::SetPoolRebalanceRoute(e) => &e.meta,
            HubPoolEvent::ProposedRootBundle(e) => &e.meta,
            HubPoolEvent::RootBundleExecuted { meta } => meta,
            HubPoolEvent::RootBundleCanceled { meta } => meta,
            HubPoolEvent::RootBundleDisputed { meta } => meta,
        }
    }
}

/// Stable sort by (block, transaction index, log index). Events already in
/// chain order pass through unchanged; this never re-orders equal
/// positions.
pub fn sort_by_log_position<E, F>(events: &mut [E], meta: F)
where
    F: Fn(&E) -> &EventMeta,
{
    events.sort_by_key(|e| meta(e).log_position());
}
