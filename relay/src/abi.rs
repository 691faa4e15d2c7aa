// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Contract bindings and raw-log decoding for the spoke pool and hub pool.
//!
//! Events are decoded into the typed shapes in `types`/`events`. A log from
//! an unrecognized event returns `None` rather than an error so callers can
//! skip unrelated logs emitted by the same contract.

use crate::error::{RelayError, RelayResult};
use crate::events::{HubPoolEvent, SpokePoolEvent};
use crate::types::{
    Deposit, EventMeta, Fill, FillType, MessageHash, PoolRebalanceRoute, ProposedRootBundle,
    RelayData, RelayExecutionInfo, RouteToggle, SlowFillRequest, SpeedUp,
};
use ethers::contract::{abigen, EthLogDecode};
use ethers::types::{Address as EthAddress, Log, H256, U256};
use relay_types::ChainAddress;

abigen!(
    SpokePool,
    r#"[
        struct RelayExecutionEventInfo { address updatedRecipient; bytes32 updatedMessageHash; uint256 updatedOutputAmount; uint8 fillType; }
        event FundsDeposited(address inputToken, address outputToken, uint256 inputAmount, uint256 outputAmount, uint256 indexed destinationChainId, uint256 indexed depositId, uint32 quoteTimestamp, uint32 fillDeadline, uint32 exclusivityDeadline, address indexed depositor, address recipient, address exclusiveRelayer, bytes message)
        event FilledRelay(address inputToken, address outputToken, uint256 inputAmount, uint256 outputAmount, uint256 repaymentChainId, uint256 indexed originChainId, uint256 indexed depositId, uint32 fillDeadline, uint32 exclusivityDeadline, address exclusiveRelayer, address indexed relayer, address depositor, address recipient, bytes32 messageHash, RelayExecutionEventInfo relayExecutionInfo)
        event RequestedSpeedUpDeposit(uint256 updatedOutputAmount, uint256 indexed depositId, address indexed depositor, address updatedRecipient, bytes updatedMessage, bytes depositorSignature)
        event RequestedSlowFill(address inputToken, address outputToken, uint256 inputAmount, uint256 outputAmount, uint256 indexed originChainId, uint256 indexed depositId, uint32 fillDeadline, uint32 exclusivityDeadline, address exclusiveRelayer, address depositor, address recipient, bytes32 messageHash)
        event EnabledDepositRoute(address indexed originToken, uint256 indexed destinationChainId, bool enabled)
        function numberOfDeposits() external view returns (uint256)
        function fillStatuses(bytes32 relayDataHash) external view returns (uint256)
    ]"#
);

abigen!(
    HubPool,
    r#"[
        event SetPoolRebalanceRoute(uint256 indexed destinationChainId, address indexed l1Token, address indexed destinationToken)
        event ProposedRootBundle(uint32 challengePeriodEndTimestamp, uint8 poolRebalanceLeafCount, uint256[] bundleEvaluationBlockNumbers, bytes32 indexed poolRebalanceRoot, bytes32 indexed relayerRefundRoot, bytes32 slowRelayRoot, address indexed proposer)
        event RootBundleExecuted(uint256 indexed groupIndex, address caller)
        event RootBundleCanceled(address indexed caller, uint256 requestTime)
        event RootBundleDisputed(address indexed disputer, uint256 requestTime)
    ]"#
);

/// Decode a spoke pool log into a typed event.
///
/// `chain_id` is the chain the log was read from: the origin chain for
/// deposit/speed-up/route events, the destination chain for fill and
/// slow-fill-request events. Returns `Ok(None)` for unrecognized logs.
pub fn decode_spoke_pool_log(chain_id: u64, log: &Log) -> RelayResult<Option<SpokePoolEvent>> {
    let raw = ethers::abi::RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    let decoded = match SpokePoolEvents::decode_log(&raw) {
        Ok(event) => event,
        Err(_) => return Ok(None),
    };
    let meta = event_meta(log)?;

    let event = match decoded {
        SpokePoolEvents::FundsDepositedFilter(e) => {
            SpokePoolEvent::FundsDeposited(Deposit {
                relay: RelayData {
                    depositor: evm_address(e.depositor),
                    recipient: evm_address(e.recipient),
                    exclusive_relayer: evm_address(e.exclusive_relayer),
                    input_token: evm_address(e.input_token),
                    output_token: evm_address(e.output_token),
                    input_amount: e.input_amount,
                    output_amount: e.output_amount,
                    origin_chain_id: chain_id,
                    destination_chain_id: u256_chain_id(e.destination_chain_id)?,
                    deposit_id: e.deposit_id,
                    fill_deadline: e.fill_deadline,
                    exclusivity_deadline: e.exclusivity_deadline,
                    message_hash: MessageHash::of(&e.message),
                },
                quote_timestamp: e.quote_timestamp,
                message: e.message.to_vec(),
                updated_recipient: None,
                updated_output_amount: None,
                updated_message: None,
                speed_up_signature: None,
                from_lite_chain: false,
                to_lite_chain: false,
                meta,
            })
        }
        SpokePoolEvents::FilledRelayFilter(e) => SpokePoolEvent::FilledRelay(Fill {
            relay: RelayData {
                depositor: evm_address(e.depositor),
                recipient: evm_address(e.recipient),
                exclusive_relayer: evm_address(e.exclusive_relayer),
                input_token: evm_address(e.input_token),
                output_token: evm_address(e.output_token),
                input_amount: e.input_amount,
                output_amount: e.output_amount,
                origin_chain_id: u256_chain_id(e.origin_chain_id)?,
                destination_chain_id: chain_id,
                deposit_id: e.deposit_id,
                fill_deadline: e.fill_deadline,
                exclusivity_deadline: e.exclusivity_deadline,
                message_hash: wire_message_hash(e.message_hash),
            },
            relayer: evm_address(e.relayer),
            repayment_chain_id: u256_chain_id(e.repayment_chain_id)?,
            relay_execution_info: RelayExecutionInfo {
                updated_recipient: evm_address(e.relay_execution_info.0),
                updated_message_hash: wire_message_hash(
                    e.relay_execution_info.1,
                ),
                updated_output_amount: e.relay_execution_info.2,
                fill_type: FillType::try_from(e.relay_execution_info.3).map_err(
                    |_| {
                        RelayError::EventDecodeError(format!(
                            "unknown fill type {}",
                            e.relay_execution_info.3
                        ))
                    },
                )?,
            },
            meta,
        }),
        SpokePoolEvents::RequestedSpeedUpDepositFilter(e) => {
            SpokePoolEvent::RequestedSpeedUpDeposit(SpeedUp {
                deposit_id: e.deposit_id,
                depositor: evm_address(e.depositor),
                updated_recipient: evm_address(e.updated_recipient),
                updated_output_amount: e.updated_output_amount,
                updated_message: e.updated_message.to_vec(),
                signature: e.depositor_signature.to_vec(),
                meta,
            })
        }
        SpokePoolEvents::RequestedSlowFillFilter(e) => {
            SpokePoolEvent::RequestedSlowFill(SlowFillRequest {
                relay: RelayData {
                    depositor: evm_address(e.depositor),
                    recipient: evm_address(e.recipient),
                    exclusive_relayer: evm_address(e.exclusive_relayer),
                    input_token: evm_address(e.input_token),
                    output_token: evm_address(e.output_token),
                    input_amount: e.input_amount,
                    output_amount: e.output_amount,
                    origin_chain_id: u256_chain_id(e.origin_chain_id)?,
                    destination_chain_id: chain_id,
                    deposit_id: e.deposit_id,
                    fill_deadline: e.fill_deadline,
                    exclusivity_deadline: e.exclusivity_deadline,
                    message_hash: wire_message_hash(e.message_hash),
                },
                meta,
            })
        }
        SpokePoolEvents::EnabledDepositRouteFilter(e) => {
            SpokePoolEvent::EnabledDepositRoute(RouteToggle {
                origin_token: evm_address(e.origin_token),
                destination_chain_id: u256_chain_id(e.destination_chain_id)?,
                enabled: e.enabled,
                meta,
            })
        }
    };
    Ok(Some(event))
}

/// Decode a hub pool log into a typed event. Returns `Ok(None)` for
/// unrecognized logs.
pub fn decode_hub_pool_log(log: &Log) -> RelayResult<Option<HubPoolEvent>> {
    let raw = ethers::abi::RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    let decoded = match HubPoolEvents::decode_log(&raw) {
        Ok(event) => event,
        Err(_) => return Ok(None),
    };
    let meta = event_meta(log)?;

    let event = match decoded {
        HubPoolEvents::SetPoolRebalanceRouteFilter(e) => {
            HubPoolEvent::SetPoolRebalanceRoute(PoolRebalanceRoute {
                l2_chain_id: u256_chain_id(e.destination_chain_id)?,
                l1_token: evm_address(e.l_1_token),
                l2_token: evm_address(e.destination_token),
                meta,
            })
        }
        HubPoolEvents::ProposedRootBundleFilter(e) => {
            let mut blocks = Vec::with_capacity(e.bundle_evaluation_block_numbers.len());
            for number in &e.bundle_evaluation_block_numbers {
                blocks.push(u256_chain_id(*number)?);
            }
            HubPoolEvent::ProposedRootBundle(ProposedRootBundle {
                bundle_evaluation_block_numbers: blocks,
                pool_rebalance_root: H256::from(e.pool_rebalance_root),
                relayer_refund_root: H256::from(e.relayer_refund_root),
                slow_relay_root: H256::from(e.slow_relay_root),
                proposer: evm_address(e.proposer),
                meta,
            })
        }
        HubPoolEvents::RootBundleExecutedFilter(_) => HubPoolEvent::RootBundleExecuted { meta },
        HubPoolEvents::RootBundleCanceledFilter(_) => HubPoolEvent::RootBundleCanceled { meta },
        HubPoolEvents::RootBundleDisputedFilter(_) => HubPoolEvent::RootBundleDisputed { meta },
    };
    Ok(Some(event))
}

// Provenance fields are nullable on the wire; a provider that omits them
// cannot be used for ordered ingestion.
fn event_meta(log: &Log) -> RelayResult<EventMeta> {
    let block_number = log
        .block_number
        .ok_or_else(|| RelayError::ProviderError("log without block_number".into()))?
        .as_u64();
    let transaction_index = log
        .transaction_index
        .ok_or_else(|| RelayError::ProviderError("log without transaction_index".into()))?
        .as_u64();
    let log_index = log
        .log_index
        .ok_or_else(|| RelayError::ProviderError("log without log_index".into()))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| RelayError::ProviderError("log without transaction_hash".into()))?;
    Ok(EventMeta {
        block_number,
        transaction_index,
        log_index: log_index.as_u64(),
        transaction_hash,
    })
}

fn evm_address(address: EthAddress) -> ChainAddress {
    ChainAddress::Evm(address.0)
}

/// The zero hash is the wire marker for "hash not yet computed".
fn wire_message_hash(raw: [u8; 32]) -> MessageHash {
    if raw == [0u8; 32] {
        MessageHash::Unset
    } else {
        MessageHash::Hashed(H256::from(raw))
    }
}

fn u256_chain_id(value: U256) -> RelayResult<u64> {
    if value > U256::from(u64::MAX) {
        return Err(RelayError::EventDecodeError(format!(
            "value {} exceeds u64 range",
            value
        )));
    }
    Ok(value.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::contract::EthEvent;
    use ethers::types::{Bytes, U64};

    fn base_log(topics: Vec<H256>, data: Vec<u8>) -> Log {
        Log {
            address: EthAddress::repeat_byte(0xaa),
            topics,
            data: Bytes::from(data),
            block_number: Some(U64::from(42)),
            transaction_index: Some(U64::from(3)),
            log_index: Some(U256::from(7)),
            transaction_hash: Some(H256::repeat_byte(0x11)),
            ..Default::default()
        }
    }

    fn topic_from_address(address: EthAddress) -> H256 {
        H256::from(address)
    }

    fn topic_from_u256(value: U256) -> H256 {
        let mut buf = [0u8; 32];
        value.to_big_endian(&mut buf);
        H256::from(buf)
    }

    #[test]
    fn test_decode_funds_deposited() {
        let depositor = EthAddress::repeat_byte(0x01);
        let message = vec![0xde, 0xad];
        let topics = vec![
            FundsDepositedFilter::signature(),
            topic_from_u256(U256::from(10u64)), // destinationChainId
            topic_from_u256(U256::from(77u64)), // depositId
            topic_from_address(depositor),
        ];
        let data = encode(&[
            Token::Address(EthAddress::repeat_byte(0x02)), // inputToken
            Token::Address(EthAddress::repeat_byte(0x03)), // outputToken
            Token::Uint(U256::from(1000u64)),              // inputAmount
            Token::Uint(U256::from(990u64)),               // outputAmount
            Token::Uint(U256::from(1_700_000_000u64)),     // quoteTimestamp
            Token::Uint(U256::from(1_700_003_600u64)),     // fillDeadline
            Token::Uint(U256::from(1_700_001_800u64)),     // exclusivityDeadline
            Token::Address(EthAddress::repeat_byte(0x04)), // recipient
            Token::Address(EthAddress::zero()),            // exclusiveRelayer
            Token::Bytes(message.clone()),
        ]);

        let log = base_log(topics, data);
        let event = decode_spoke_pool_log(1, &log).unwrap().unwrap();
        match event {
            SpokePoolEvent::FundsDeposited(deposit) => {
                assert_eq!(deposit.relay.origin_chain_id, 1);
                assert_eq!(deposit.relay.destination_chain_id, 10);
                assert_eq!(deposit.relay.deposit_id, U256::from(77u64));
                assert_eq!(deposit.relay.depositor, ChainAddress::Evm([0x01; 20]));
                assert_eq!(deposit.relay.input_amount, U256::from(1000u64));
                assert_eq!(deposit.message, message);
                assert_eq!(deposit.relay.message_hash, MessageHash::of(&message));
                assert_eq!(deposit.meta.block_number, 42);
                assert_eq!(deposit.meta.transaction_index, 3);
                assert_eq!(deposit.meta.log_index, 7);
            }
            other => panic!("expected FundsDeposited, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_enabled_deposit_route() {
        let token = EthAddress::repeat_byte(0x05);
        let topics = vec![
            EnabledDepositRouteFilter::signature(),
            topic_from_address(token),
            topic_from_u256(U256::from(137u64)),
        ];
        let data = encode(&[Token::Bool(true)]);
        let log = base_log(topics, data);
        let event = decode_spoke_pool_log(1, &log).unwrap().unwrap();
        match event {
            SpokePoolEvent::EnabledDepositRoute(toggle) => {
                assert_eq!(toggle.origin_token, ChainAddress::Evm([0x05; 20]));
                assert_eq!(toggle.destination_chain_id, 137);
                assert!(toggle.enabled);
            }
            other => panic!("expected EnabledDepositRoute, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_filled_relay_with_execution_info() {
        let relayer = EthAddress::repeat_byte(0x06);
        let topics = vec![
            FilledRelayFilter::signature(),
            topic_from_u256(U256::from(1u64)),  // originChainId
            topic_from_u256(U256::from(77u64)), // depositId
            topic_from_address(relayer),
        ];
        let message_hash = [0x22u8; 32];
        let data = encode(&[
            Token::Address(EthAddress::repeat_byte(0x02)), // inputToken
            Token::Address(EthAddress::repeat_byte(0x03)), // outputToken
            Token::Uint(U256::from(1000u64)),              // inputAmount
            Token::Uint(U256::from(990u64)),               // outputAmount
            Token::Uint(U256::from(1u64)),                 // repaymentChainId
            Token::Uint(U256::from(1_700_003_600u64)),     // fillDeadline
            Token::Uint(U256::from(1_700_001_800u64)),     // exclusivityDeadline
            Token::Address(EthAddress::zero()),            // exclusiveRelayer
            Token::Address(EthAddress::repeat_byte(0x01)), // depositor
            Token::Address(EthAddress::repeat_byte(0x04)), // recipient
            Token::FixedBytes(message_hash.to_vec()),
            Token::Tuple(vec![
                Token::Address(EthAddress::repeat_byte(0x04)),
                Token::FixedBytes(message_hash.to_vec()),
                Token::Uint(U256::from(990u64)),
                Token::Uint(U256::from(2u64)), // SlowFill
            ]),
        ]);

        let log = base_log(topics, data);
        let event = decode_spoke_pool_log(10, &log).unwrap().unwrap();
        match event {
            SpokePoolEvent::FilledRelay(fill) => {
                assert_eq!(fill.relay.origin_chain_id, 1);
                assert_eq!(fill.relay.destination_chain_id, 10);
                assert_eq!(fill.relayer, ChainAddress::Evm([0x06; 20]));
                assert_eq!(fill.relay_execution_info.fill_type, FillType::SlowFill);
                assert!(fill.is_slow_fill());
                assert_eq!(
                    fill.relay.message_hash,
                    MessageHash::Hashed(H256::from(message_hash))
                );
            }
            other => panic!("expected FilledRelay, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_message_hash_decodes_as_unset() {
        assert_eq!(wire_message_hash([0u8; 32]), MessageHash::Unset);
        assert_eq!(
            wire_message_hash([1u8; 32]),
            MessageHash::Hashed(H256::repeat_byte(1))
        );
    }

    #[test]
    fn test_unrecognized_log_decodes_to_none() {
        let log = base_log(vec![H256::repeat_byte(0xff)], vec![]);
        assert!(decode_spoke_pool_log(1, &log).unwrap().is_none());
        assert!(decode_hub_pool_log(&log).unwrap().is_none());
    }

    #[test]
    fn test_decode_set_pool_rebalance_route() {
        let l1_token = EthAddress::repeat_byte(0x0a);
        let l2_token = EthAddress::repeat_byte(0x0b);
        let topics = vec![
            SetPoolRebalanceRouteFilter::signature(),
            topic_from_u256(U256::from(10u64)),
            topic_from_address(l1_token),
            topic_from_address(l2_token),
        ];
        let log = base_log(topics, vec![]);
        let event = decode_hub_pool_log(&log).unwrap().unwrap();
        match event {
            HubPoolEvent::SetPoolRebalanceRoute(route) => {
                assert_eq!(route.l2_chain_id, 10);
                assert_eq!(route.l1_token, ChainAddress::Evm([0x0a; 20]));
                assert_eq!(route.l2_token, ChainAddress::Evm([0x0b; 20]));
            }
            other => panic!("expected SetPoolRebalanceRoute, got {:?}", other),
        }
    }
}
