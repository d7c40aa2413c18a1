use super::*;
use std::{
    collections::{HashMap, VecDeque},
    sync::{atomic::AtomicUsize, Mutex as StdMutex},
    time::Duration,
};

use anyhow::anyhow;
use chrono::Utc;
use shared::{
    domain::RaffleState,
    error::{ErrorCode, PROVIDER_UNAVAILABLE_MESSAGE},
};
use tokio::sync::{oneshot::error::TryRecvError, Semaphore};

use crate::view::format_timestamp;

const ONE_HUNDREDTH_ETH: u64 = 10_000_000_000_000_000;
const SCENARIO_TIMESTAMP: u64 = 1_700_000_000;

fn contract_address() -> Address {
    Address::repeat_byte(0xc0)
}

fn player() -> Address {
    Address::repeat_byte(0xaa)
}

#[derive(Clone)]
struct ChainState {
    fee: std::result::Result<U256, String>,
    state_code: std::result::Result<u8, String>,
    winner: std::result::Result<Address, String>,
    timestamp: std::result::Result<u64, String>,
}

impl ChainState {
    fn scenario() -> Self {
        Self {
            fee: Ok(U256::from(ONE_HUNDREDTH_ETH)),
            state_code: Ok(0),
            winner: Ok(Address::ZERO),
            timestamp: Ok(SCENARIO_TIMESTAMP),
        }
    }
}

struct TestRaffleContract {
    chain: StdMutex<ChainState>,
    fee_reads: AtomicUsize,
    timestamp_reads: AtomicUsize,
    fee_gate: StdMutex<Option<Arc<Semaphore>>>,
    receipt_gate: StdMutex<Option<Arc<Semaphore>>>,
    submit_error: StdMutex<Option<String>>,
    submitted: StdMutex<Vec<U256>>,
    subscribe_error: Option<String>,
    subscribe_calls: AtomicUsize,
    sinks: StdMutex<HashMap<RaffleEventKind, Vec<EventSink>>>,
}

impl TestRaffleContract {
    fn new(chain: ChainState) -> Arc<Self> {
        Arc::new(Self::build(chain, None))
    }

    fn failing_subscriptions(err: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(ChainState::scenario(), Some(err.into())))
    }

    fn build(chain: ChainState, subscribe_error: Option<String>) -> Self {
        Self {
            chain: StdMutex::new(chain),
            fee_reads: AtomicUsize::new(0),
            timestamp_reads: AtomicUsize::new(0),
            fee_gate: StdMutex::new(None),
            receipt_gate: StdMutex::new(None),
            submit_error: StdMutex::new(None),
            submitted: StdMutex::new(Vec::new()),
            subscribe_error,
            subscribe_calls: AtomicUsize::new(0),
            sinks: StdMutex::new(HashMap::new()),
        }
    }

    fn set_chain(&self, update: impl FnOnce(&mut ChainState)) {
        update(&mut self.chain.lock().expect("chain lock"));
    }

    fn fee_reads(&self) -> usize {
        self.fee_reads.load(Ordering::SeqCst)
    }

    fn timestamp_reads(&self) -> usize {
        self.timestamp_reads.load(Ordering::SeqCst)
    }

    fn submitted(&self) -> Vec<U256> {
        self.submitted.lock().expect("submitted lock").clone()
    }

    async fn emit(&self, event: RaffleEvent) {
        let sender = {
            let sinks = self.sinks.lock().expect("sinks lock");
            sinks
                .get(&event.kind())
                .and_then(|sinks| sinks.last())
                .map(|sink| sink.events.clone())
                .expect("active subscription")
        };
        sender.send(event).await.expect("listener alive");
    }

    fn unsubscribed(&self, kind: RaffleEventKind) -> bool {
        let mut sinks = self.sinks.lock().expect("sinks lock");
        sinks
            .get_mut(&kind)
            .and_then(|sinks| sinks.last_mut())
            .is_some_and(|sink| !matches!(sink.unsubscribed.try_recv(), Err(TryRecvError::Empty)))
    }

    fn take_sinks(&self, kind: RaffleEventKind) -> Vec<EventSink> {
        self.sinks
            .lock()
            .expect("sinks lock")
            .remove(&kind)
            .unwrap_or_default()
    }
}

#[async_trait]
impl RaffleContract for TestRaffleContract {
    fn address(&self) -> Address {
        contract_address()
    }

    async fn entrance_fee(&self) -> Result<U256> {
        self.fee_reads.fetch_add(1, Ordering::SeqCst);
        let gate = self.fee_gate.lock().expect("gate lock").clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        let fee = self.chain.lock().expect("chain lock").fee.clone();
        fee.map_err(|err| anyhow!(err))
    }

    async fn raffle_state(&self) -> Result<u8> {
        let code = self.chain.lock().expect("chain lock").state_code.clone();
        code.map_err(|err| anyhow!(err))
    }

    async fn recent_winner(&self) -> Result<Address> {
        let winner = self.chain.lock().expect("chain lock").winner.clone();
        winner.map_err(|err| anyhow!(err))
    }

    async fn last_timestamp(&self) -> Result<u64> {
        self.timestamp_reads.fetch_add(1, Ordering::SeqCst);
        let timestamp = self.chain.lock().expect("chain lock").timestamp.clone();
        timestamp.map_err(|err| anyhow!(err))
    }

    async fn submit_entry(&self, value: U256) -> Result<B256> {
        if let Some(err) = self.submit_error.lock().expect("submit lock").clone() {
            return Err(anyhow!(err));
        }
        self.submitted.lock().expect("submitted lock").push(value);
        Ok(B256::repeat_byte(0x42))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt> {
        let gate = self.receipt_gate.lock().expect("gate lock").clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        Ok(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some("0x10".to_string()),
            status: Some("0x1".to_string()),
        })
    }

    async fn subscribe(&self, kind: RaffleEventKind) -> Result<EventSubscription> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.subscribe_error {
            return Err(anyhow!(err.clone()));
        }
        let (sink, subscription) = EventSubscription::channel(kind);
        self.sinks
            .lock()
            .expect("sinks lock")
            .entry(kind)
            .or_default()
            .push(sink);
        Ok(subscription)
    }
}

struct TestWallet {
    accounts: std::result::Result<Vec<Address>, String>,
    contract: Arc<TestRaffleContract>,
}

#[async_trait]
impl WalletProvider for TestWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        self.accounts.clone().map_err(|err| anyhow!(err))
    }

    async fn connect_contract(
        &self,
        _account: Address,
        contract_address: Address,
    ) -> Result<Arc<dyn RaffleContract>> {
        assert_eq!(contract_address, self.contract.address());
        Ok(Arc::clone(&self.contract) as Arc<dyn RaffleContract>)
    }
}

/// Answers account requests from a fixed script, one reply per call.
struct ScriptedWallet {
    replies: StdMutex<VecDeque<std::result::Result<Vec<Address>, String>>>,
    contract: Arc<TestRaffleContract>,
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .expect("scripted reply");
        reply.map_err(|err| anyhow!(err))
    }

    async fn connect_contract(
        &self,
        _account: Address,
        _contract_address: Address,
    ) -> Result<Arc<dyn RaffleContract>> {
        Ok(Arc::clone(&self.contract) as Arc<dyn RaffleContract>)
    }
}

fn utc_display() -> DisplayOptions {
    DisplayOptions {
        timestamp_formatter: Arc::new(|secs| format_timestamp(secs, &Utc)),
        ..DisplayOptions::default()
    }
}

fn client_for(contract: &Arc<TestRaffleContract>) -> Arc<RaffleClient> {
    RaffleClient::new_with_dependencies(
        Arc::new(TestWallet {
            accounts: Ok(vec![player()]),
            contract: Arc::clone(contract),
        }),
        contract_address(),
        utc_display(),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_view(events: &mut broadcast::Receiver<ClientEvent>) -> RaffleView {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let ClientEvent::ViewUpdated(view) = events.recv().await.expect("event stream") {
                return view;
            }
        }
    })
    .await
    .expect("view update in time")
}

#[tokio::test]
async fn initialize_syncs_scenario_state_for_display() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);

    let account = client.initialize().await.expect("initialize");
    assert_eq!(account, player());

    let view = client.view().await;
    assert_eq!(view.account, Some(player()));
    assert_eq!(view.entrance_fee.as_deref(), Some("0.01"));
    assert_eq!(view.raffle_state, Some(RaffleState::Open));
    assert_eq!(view.raffle_state_label(), "OPEN");
    assert_eq!(view.recent_winner, Some(Address::ZERO));
    assert_eq!(
        view.last_timestamp.as_deref(),
        Some("11/14/2023, 10:13:20 PM")
    );
    assert!(view.error.is_none());
    assert_eq!(contract.subscribe_calls.load(Ordering::SeqCst), 2);

    client.shutdown().await;
}

#[tokio::test]
async fn non_zero_state_code_is_calculating() {
    let mut chain = ChainState::scenario();
    chain.state_code = Ok(1);
    let contract = TestRaffleContract::new(chain);
    let client = client_for(&contract);

    client.initialize().await.expect("initialize");
    assert_eq!(client.view().await.raffle_state_label(), "CALCULATING");
    client.shutdown().await;
}

#[tokio::test]
async fn initialize_without_wallet_reports_provider_unavailable() {
    let client = RaffleClient::new(contract_address());

    let err = client.initialize().await.expect_err("no wallet");
    assert!(matches!(err, RaffleError::ProviderUnavailable));

    let view = client.view().await;
    assert_eq!(
        view.error_message().as_deref(),
        Some(PROVIDER_UNAVAILABLE_MESSAGE)
    );
    assert!(!client.is_initialized().await);
}

#[tokio::test]
async fn denied_or_empty_account_access_fails_initialization() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let denied = RaffleClient::new_with_wallet(
        Arc::new(TestWallet {
            accounts: Err("User rejected the request.".to_string()),
            contract: Arc::clone(&contract),
        }),
        contract_address(),
    );
    let err = denied.initialize().await.expect_err("denied");
    assert_eq!(err.code(), ErrorCode::AccountAccessDenied);
    let message = denied.view().await.error_message().expect("error shown");
    assert!(message.starts_with("Initialization error: "));
    assert!(message.contains("User rejected the request."));

    let empty = RaffleClient::new_with_wallet(
        Arc::new(TestWallet {
            accounts: Ok(Vec::new()),
            contract: Arc::clone(&contract),
        }),
        contract_address(),
    );
    let err = empty.initialize().await.expect_err("no accounts");
    assert_eq!(err.code(), ErrorCode::AccountAccessDenied);
    assert_eq!(contract.fee_reads(), 0);
}

#[tokio::test]
async fn failed_initial_sync_still_registers_listeners() {
    let mut chain = ChainState::scenario();
    chain.fee = Err("could not coalesce error".to_string());
    let contract = TestRaffleContract::new(chain);
    let client = client_for(&contract);

    client.initialize().await.expect("initialize despite read failure");
    assert!(client.is_initialized().await);
    assert_eq!(contract.subscribe_calls.load(Ordering::SeqCst), 2);
    let message = client.view().await.error_message().expect("error shown");
    assert!(message.contains("could not coalesce error"));

    client.shutdown().await;
}

#[tokio::test]
async fn read_failure_keeps_fields_read_earlier_in_the_pass() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");
    let before = client.view().await;

    contract.set_chain(|chain| {
        chain.fee = Ok(U256::from(2 * ONE_HUNDREDTH_ETH));
        chain.state_code = Err("execution reverted".to_string());
        chain.winner = Ok(player());
    });

    let err = client
        .sync_all(contract.as_ref())
        .await
        .expect_err("state read fails");
    assert!(matches!(
        err,
        RaffleError::ReadFailure {
            field: ContractField::RaffleState,
            ..
        }
    ));

    let view = client.view().await;
    assert_eq!(view.entrance_fee.as_deref(), Some("0.02"));
    assert_eq!(view.raffle_state, before.raffle_state);
    assert_eq!(view.recent_winner, before.recent_winner);
    assert_eq!(view.last_timestamp, before.last_timestamp);
    let message = view.error_message().expect("error shown");
    assert!(message.starts_with("Contract state update error: "));
    assert!(message.contains("execution reverted"));

    client.shutdown().await;
}

#[tokio::test]
async fn sync_all_is_idempotent_without_chain_changes() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");

    let first = client.sync_all(contract.as_ref()).await.expect("first");
    let second = client.sync_all(contract.as_ref()).await.expect("second");
    assert_eq!(first, second);

    client.shutdown().await;
}

#[tokio::test]
async fn each_contract_event_triggers_exactly_one_pass() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");
    let mut events = client.subscribe_events();
    assert_eq!(contract.timestamp_reads(), 1);

    contract.set_chain(|chain| chain.fee = Ok(U256::from(3 * ONE_HUNDREDTH_ETH)));
    contract
        .emit(RaffleEvent::EntrantJoined { player: player() })
        .await;
    let view = next_view(&mut events).await;
    assert_eq!(view.entrance_fee.as_deref(), Some("0.03"));
    assert_eq!(contract.timestamp_reads(), 2);

    contract.set_chain(|chain| {
        chain.state_code = Ok(1);
        chain.winner = Ok(player());
    });
    contract
        .emit(RaffleEvent::WinnerSelected { winner: player() })
        .await;
    let view = next_view(&mut events).await;
    assert_eq!(view.raffle_state_label(), "CALCULATING");
    assert_eq!(view.recent_winner, Some(player()));
    assert_eq!(contract.timestamp_reads(), 3);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(contract.timestamp_reads(), 3);

    client.shutdown().await;
}

#[tokio::test]
async fn observed_events_are_broadcast_before_refresh() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");
    let mut events = client.subscribe_events();

    let joined = RaffleEvent::EntrantJoined { player: player() };
    contract.emit(joined).await;

    let observed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let ClientEvent::EventObserved(event) = events.recv().await.expect("events") {
                return event;
            }
        }
    })
    .await
    .expect("event observed");
    assert_eq!(observed, joined);

    client.shutdown().await;
}

#[tokio::test]
async fn trigger_during_pass_supersedes_it() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");
    let mut events = client.subscribe_events();

    let gate = Arc::new(Semaphore::new(0));
    *contract.fee_gate.lock().expect("gate lock") = Some(Arc::clone(&gate));

    contract
        .emit(RaffleEvent::EntrantJoined { player: player() })
        .await;
    wait_until(|| contract.fee_reads() == 2).await;

    contract
        .emit(RaffleEvent::WinnerSelected { winner: player() })
        .await;
    wait_until(|| contract.fee_reads() == 3).await;

    contract.set_chain(|chain| chain.fee = Ok(U256::from(5 * ONE_HUNDREDTH_ETH)));
    gate.add_permits(1);

    let view = next_view(&mut events).await;
    assert_eq!(view.entrance_fee.as_deref(), Some("0.05"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    // Initial pass plus the superseding pass; the superseded one never finished.
    assert_eq!(contract.timestamp_reads(), 2);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn manual_refresh_requires_initialization() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    assert!(!client.request_sync().await);

    client.initialize().await.expect("initialize");
    let mut events = client.subscribe_events();
    assert!(client.request_sync().await);
    next_view(&mut events).await;
    assert_eq!(contract.timestamp_reads(), 2);

    client.shutdown().await;
}

#[tokio::test]
async fn enter_without_connected_wallet_submits_nothing() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);

    let err = client.enter_raffle().await.expect_err("not connected");
    assert!(matches!(err, RaffleError::NotConnected));
    assert!(contract.submitted().is_empty());
    let message = client.view().await.error_message().expect("error shown");
    assert!(message.starts_with("Enter raffle error: "));

    let no_wallet = RaffleClient::new(contract_address());
    let _ = no_wallet.initialize().await;
    let err = no_wallet.enter_raffle().await.expect_err("no wallet");
    assert!(matches!(err, RaffleError::NotConnected));
}

#[tokio::test]
async fn enter_pays_displayed_fee_and_waits_for_confirmation() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");
    let mut events = client.subscribe_events();

    let receipt = client.enter_raffle().await.expect("enter");
    assert_eq!(receipt.transaction_hash, B256::repeat_byte(0x42));
    assert_eq!(contract.submitted(), vec![U256::from(ONE_HUNDREDTH_ETH)]);
    assert!(!client.view().await.entry_pending);

    let mut submitted = false;
    let mut confirmed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::EntrySubmitted { tx_hash } => {
                assert_eq!(tx_hash, B256::repeat_byte(0x42));
                submitted = true;
            }
            ClientEvent::EntryConfirmed { .. } => {
                assert!(submitted, "submission precedes confirmation");
                confirmed = true;
            }
            _ => {}
        }
    }
    assert!(submitted && confirmed);

    client.shutdown().await;
}

#[tokio::test]
async fn enter_with_explicit_amount_converts_display_units() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");

    client.enter_with_amount("0.25").await.expect("enter");
    assert_eq!(
        contract.submitted(),
        vec![U256::from(25 * ONE_HUNDREDTH_ETH)]
    );

    let err = client
        .enter_with_amount("a lot")
        .await
        .expect_err("malformed amount");
    assert_eq!(err.code(), ErrorCode::InvalidAmount);
    assert_eq!(contract.submitted().len(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn transaction_failure_is_surfaced_verbatim() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");
    *contract.submit_error.lock().expect("submit lock") =
        Some("insufficient funds for gas * price + value".to_string());

    let err = client.enter_raffle().await.expect_err("underfunded");
    assert_eq!(err.code(), ErrorCode::TransactionFailure);
    let view = client.view().await;
    assert_eq!(
        view.error_message().as_deref(),
        Some("Enter raffle error: insufficient funds for gas * price + value")
    );
    assert!(!view.entry_pending);

    client.shutdown().await;
}

#[tokio::test]
async fn second_entry_while_pending_is_rejected() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");

    let gate = Arc::new(Semaphore::new(0));
    *contract.receipt_gate.lock().expect("gate lock") = Some(Arc::clone(&gate));

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.enter_raffle().await })
    };
    wait_until(|| contract.submitted().len() == 1).await;
    assert!(client.view().await.entry_pending);

    let err = client.enter_raffle().await.expect_err("guarded");
    assert!(matches!(err, RaffleError::SubmissionInProgress));
    assert_eq!(contract.submitted().len(), 1);

    gate.add_permits(1);
    first.await.expect("join").expect("first entry");
    assert!(!client.view().await.entry_pending);

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_unregisters_both_subscriptions() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");

    client.shutdown().await;
    assert!(!client.is_initialized().await);
    assert_eq!(client.view().await.account, None);

    for kind in RaffleEventKind::ALL {
        let mut sinks = contract.take_sinks(kind);
        assert_eq!(sinks.len(), 1);
        let sink = sinks.first_mut().expect("sink");
        assert!(!matches!(
            sink.unsubscribed.try_recv(),
            Err(TryRecvError::Empty)
        ));
        assert!(sink.events.is_closed());
    }
}

#[tokio::test]
async fn reinitialize_does_not_accumulate_listeners() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("first initialize");
    client.initialize().await.expect("second initialize");
    assert_eq!(contract.subscribe_calls.load(Ordering::SeqCst), 4);

    for kind in RaffleEventKind::ALL {
        let mut sinks = contract.take_sinks(kind);
        assert_eq!(sinks.len(), 2);
        let (stale, live) = sinks.split_at_mut(1);
        assert!(!matches!(
            stale[0].unsubscribed.try_recv(),
            Err(TryRecvError::Empty)
        ));
        assert!(matches!(
            live[0].unsubscribed.try_recv(),
            Err(TryRecvError::Empty)
        ));
    }

    client.shutdown().await;
}

#[tokio::test]
async fn subscription_failure_fails_initialization() {
    let contract = TestRaffleContract::failing_subscriptions("filter not found");
    let client = client_for(&contract);

    let err = client.initialize().await.expect_err("subscription fails");
    assert_eq!(err.code(), ErrorCode::SubscriptionFailure);
    assert!(err.to_string().contains("filter not found"));
    assert!(!client.is_initialized().await);
}

#[tokio::test]
async fn refresh_commits_latest_state_before_returning() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);

    let err = client.refresh().await.expect_err("not connected");
    assert!(matches!(err, RaffleError::NotConnected));
    assert_eq!(contract.fee_reads(), 0);

    client.initialize().await.expect("initialize");
    contract.set_chain(|chain| chain.fee = Ok(U256::from(7 * ONE_HUNDREDTH_ETH)));

    let view = client.refresh().await.expect("refresh");
    assert_eq!(view.entrance_fee.as_deref(), Some("0.07"));
    assert_eq!(client.view().await.entrance_fee.as_deref(), Some("0.07"));
    assert_eq!(contract.timestamp_reads(), 2);

    client.shutdown().await;
    assert_eq!(client.view().await.entrance_fee.as_deref(), Some("0.07"));
}

#[tokio::test]
async fn failed_reinitialize_disconnects_previous_account() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = RaffleClient::new_with_dependencies(
        Arc::new(ScriptedWallet {
            replies: StdMutex::new(VecDeque::from([
                Ok(vec![player()]),
                Err("User rejected the request.".to_string()),
            ])),
            contract: Arc::clone(&contract),
        }),
        contract_address(),
        utc_display(),
    );

    client.initialize().await.expect("first initialize");
    assert_eq!(client.view().await.account, Some(player()));

    let err = client.initialize().await.expect_err("rejected");
    assert_eq!(err.code(), ErrorCode::AccountAccessDenied);
    assert!(!client.is_initialized().await);

    let view = client.view().await;
    assert_eq!(view.account, None);
    let message = view.error_message().expect("error shown");
    assert!(message.starts_with("Initialization error: "));

    let err = client.enter_raffle().await.expect_err("disconnected");
    assert!(matches!(err, RaffleError::NotConnected));
    assert!(contract.submitted().is_empty());
}

#[tokio::test]
async fn burst_of_events_is_merged_into_one_pass() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");
    let mut events = client.subscribe_events();

    let gate = Arc::new(Semaphore::new(0));
    *contract.fee_gate.lock().expect("gate lock") = Some(Arc::clone(&gate));

    contract
        .emit(RaffleEvent::EntrantJoined { player: player() })
        .await;
    contract
        .emit(RaffleEvent::EntrantJoined {
            player: Address::repeat_byte(0xbb),
        })
        .await;

    let mut observed = 0;
    tokio::time::timeout(Duration::from_secs(5), async {
        while observed < 2 {
            if let ClientEvent::EventObserved(_) = events.recv().await.expect("events") {
                observed += 1;
            }
        }
    })
    .await
    .expect("both events observed");

    // Let the worker pick up the queued trigger before the gate opens.
    tokio::time::sleep(Duration::from_millis(20)).await;
    contract.set_chain(|chain| chain.fee = Ok(U256::from(4 * ONE_HUNDREDTH_ETH)));
    gate.add_permits(8);

    let view = next_view(&mut events).await;
    assert_eq!(view.entrance_fee.as_deref(), Some("0.04"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    // One pass at initialization plus a single pass for the whole burst.
    assert_eq!(contract.timestamp_reads(), 2);

    client.shutdown().await;
}

#[tokio::test]
async fn dropping_client_without_shutdown_releases_subscriptions() {
    let contract = TestRaffleContract::new(ChainState::scenario());
    let client = client_for(&contract);
    client.initialize().await.expect("initialize");
    assert!(!contract.unsubscribed(RaffleEventKind::EntrantJoined));

    let weak = Arc::downgrade(&client);
    drop(client);
    assert!(weak.upgrade().is_none());

    wait_until(|| {
        RaffleEventKind::ALL
            .into_iter()
            .all(|kind| contract.unsubscribed(kind))
    })
    .await;
}
