//! Wallet and contract adapters for an HTTP JSON-RPC provider that manages
//! the user's accounts and signs `eth_sendTransaction` on their behalf.

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use shared::{
    domain::{ContractField, RaffleEvent, RaffleEventKind},
    protocol::{
        encode_quantity, parse_quantity, CallRequest, LogEntry, LogFilter, TransactionReceipt,
        METHOD_NOT_FOUND,
    },
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    abi,
    subscription::{EventSink, EventSubscription},
    transport::JsonRpcTransport,
    RaffleContract, WalletProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcTimings {
    /// Delay between `eth_getLogs` polls of an event subscription.
    pub poll_interval: Duration,
    /// Delay between `eth_getTransactionReceipt` polls while confirming.
    pub confirmation_poll_interval: Duration,
}

impl Default for RpcTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            confirmation_poll_interval: Duration::from_secs(1),
        }
    }
}

pub struct JsonRpcWallet {
    transport: Arc<JsonRpcTransport>,
    timings: RpcTimings,
}

impl JsonRpcWallet {
    pub fn new(endpoint: Url, timings: RpcTimings) -> Self {
        Self {
            transport: Arc::new(JsonRpcTransport::new(endpoint)),
            timings,
        }
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        match self
            .transport
            .request::<Vec<Address>>("eth_requestAccounts", json!([]))
            .await
        {
            Ok(accounts) => Ok(accounts),
            Err(err) if err.rpc_code() == Some(METHOD_NOT_FOUND) => {
                debug!("provider lacks eth_requestAccounts; falling back to eth_accounts");
                Ok(self
                    .transport
                    .request::<Vec<Address>>("eth_accounts", json!([]))
                    .await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn connect_contract(
        &self,
        account: Address,
        contract_address: Address,
    ) -> Result<Arc<dyn RaffleContract>> {
        info!(
            endpoint = %self.transport.endpoint(),
            %account,
            contract = %contract_address,
            "binding raffle contract to signer"
        );
        Ok(Arc::new(JsonRpcRaffleContract {
            transport: Arc::clone(&self.transport),
            address: contract_address,
            account,
            timings: self.timings,
        }))
    }
}

pub struct JsonRpcRaffleContract {
    transport: Arc<JsonRpcTransport>,
    address: Address,
    account: Address,
    timings: RpcTimings,
}

impl JsonRpcRaffleContract {
    pub fn new(
        transport: Arc<JsonRpcTransport>,
        address: Address,
        account: Address,
        timings: RpcTimings,
    ) -> Self {
        Self {
            transport,
            address,
            account,
            timings,
        }
    }

    async fn call(&self, field: ContractField) -> Result<Bytes> {
        let request = CallRequest {
            from: Some(self.account),
            to: self.address,
            value: None,
            data: abi::encode_call(field.getter()),
        };
        self.transport
            .request::<Bytes>("eth_call", json!([request, "latest"]))
            .await
            .with_context(|| format!("eth_call {} failed", field.getter()))
    }
}

async fn block_number(transport: &JsonRpcTransport) -> Result<u64> {
    let raw: String = transport.request("eth_blockNumber", json!([])).await?;
    parse_quantity(&raw).ok_or_else(|| anyhow!("invalid block number '{raw}'"))
}

#[async_trait]
impl RaffleContract for JsonRpcRaffleContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn entrance_fee(&self) -> Result<U256> {
        let data = self.call(ContractField::EntranceFee).await?;
        Ok(abi::decode_uint256(&data)?)
    }

    async fn raffle_state(&self) -> Result<u8> {
        let data = self.call(ContractField::RaffleState).await?;
        Ok(abi::decode_uint8(&data)?)
    }

    async fn recent_winner(&self) -> Result<Address> {
        let data = self.call(ContractField::RecentWinner).await?;
        Ok(abi::decode_address(&data)?)
    }

    async fn last_timestamp(&self) -> Result<u64> {
        let data = self.call(ContractField::LastTimestamp).await?;
        Ok(abi::decode_u64(&data)?)
    }

    async fn submit_entry(&self, value: U256) -> Result<B256> {
        let request = CallRequest {
            from: Some(self.account),
            to: self.address,
            value: Some(format!("0x{value:x}")),
            data: abi::encode_call(abi::ENTER_RAFFLE),
        };
        let tx_hash: B256 = self
            .transport
            .request("eth_sendTransaction", json!([request]))
            .await?;
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt> {
        loop {
            let receipt: Option<TransactionReceipt> = self
                .transport
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await
                .with_context(|| format!("failed to poll receipt for {tx_hash}"))?;
            if let Some(receipt) = receipt {
                if !receipt.succeeded() {
                    bail!("transaction {tx_hash} reverted");
                }
                return Ok(receipt);
            }
            tokio::time::sleep(self.timings.confirmation_poll_interval).await;
        }
    }

    async fn subscribe(&self, kind: RaffleEventKind) -> Result<EventSubscription> {
        let head = block_number(&self.transport)
            .await
            .with_context(|| format!("failed to start {} subscription", kind.name()))?;
        let (sink, subscription) = EventSubscription::channel(kind);
        let poller = LogPoller {
            transport: Arc::clone(&self.transport),
            address: self.address,
            kind,
            next_block: head + 1,
            interval: self.timings.poll_interval,
        };
        tokio::spawn(poller.run(sink));
        Ok(subscription)
    }
}

struct LogPoller {
    transport: Arc<JsonRpcTransport>,
    address: Address,
    kind: RaffleEventKind,
    next_block: u64,
    interval: Duration,
}

impl LogPoller {
    async fn run(mut self, sink: EventSink) {
        let EventSink {
            events,
            mut unsubscribed,
        } = sink;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut unsubscribed => break,
                _ = ticker.tick() => {}
            }
            if events.is_closed() {
                break;
            }

            match self.poll_once().await {
                Ok(batch) => {
                    for event in batch {
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(kind = self.kind.name(), "log poll failed, retrying: {err:#}");
                }
            }
        }
        debug!(kind = self.kind.name(), "log poller stopped");
    }

    async fn poll_once(&mut self) -> Result<Vec<RaffleEvent>> {
        let latest = block_number(&self.transport).await?;
        if latest < self.next_block {
            return Ok(Vec::new());
        }

        let filter = LogFilter {
            address: self.address,
            from_block: encode_quantity(self.next_block),
            to_block: encode_quantity(latest),
            topics: vec![abi::event_topic(self.kind)],
        };
        let logs: Vec<LogEntry> = self
            .transport
            .request("eth_getLogs", json!([filter]))
            .await?;
        self.next_block = latest + 1;

        Ok(logs
            .iter()
            .filter_map(abi::decode_event)
            .filter(|event| event.kind() == self.kind)
            .collect())
    }
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
