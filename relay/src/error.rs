// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    // Search bounds or target violate the caller contract of the deposit-id
    // range search. This is a caller bug, never a chain-data condition.
    InvalidSearchBounds(String),
    // No pool rebalance route has ever been set for the queried token/chain
    // at or before the queried block.
    TokenMappingNotFound(String),
    // Client has not completed a successful update yet
    ClientNotUpdated(String),
    // The connected node reports a different chain id than configured
    ChainIdMismatch { expected: u64, actual: u64 },
    // Provider returned a malformed or inconsistent response
    ProviderError(String),
    // Transient provider failure; an external transport layer may retry
    TransientProviderError(String),
    // Failure to decode a log into a typed event
    EventDecodeError(String),
    // Uncategorized error
    Generic(String),
}

impl RelayError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::InvalidSearchBounds(_) => "invalid_search_bounds",
            RelayError::TokenMappingNotFound(_) => "token_mapping_not_found",
            RelayError::ClientNotUpdated(_) => "client_not_updated",
            RelayError::ChainIdMismatch { .. } => "chain_id_mismatch",
            RelayError::ProviderError(_) => "provider_error",
            RelayError::TransientProviderError(_) => "transient_provider_error",
            RelayError::EventDecodeError(_) => "event_decode_error",
            RelayError::Generic(_) => "generic",
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::InvalidSearchBounds(msg) => write!(f, "invalid search bounds: {}", msg),
            RelayError::TokenMappingNotFound(msg) => {
                write!(f, "could not find token mapping: {}", msg)
            }
            RelayError::ClientNotUpdated(msg) => write!(f, "client not updated: {}", msg),
            RelayError::ChainIdMismatch { expected, actual } => {
                write!(f, "chain id mismatch: expected {}, got {}", expected, actual)
            }
            RelayError::ProviderError(msg) => write!(f, "provider error: {}", msg),
            RelayError::TransientProviderError(msg) => {
                write!(f, "transient provider error: {}", msg)
            }
            RelayError::EventDecodeError(msg) => write!(f, "event decode error: {}", msg),
            RelayError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<ethers::providers::ProviderError> for RelayError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        RelayError::ProviderError(format!("{:?}", e))
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
