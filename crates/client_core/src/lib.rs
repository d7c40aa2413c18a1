use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{ContractField, RaffleEvent, RaffleEventKind},
    error::{ErrorContext, ErrorReport, RaffleError},
    protocol::TransactionReceipt,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod abi;
pub mod config;
pub mod rpc;
pub mod subscription;
pub mod transport;
pub mod units;
pub mod view;

pub use rpc::{JsonRpcRaffleContract, JsonRpcWallet, RpcTimings};
pub use subscription::{EventSink, EventSubscription};
pub use view::{DisplayOptions, RaffleView, SyncPatch};

const CLIENT_EVENT_CAPACITY: usize = 256;

/// Capability to reach the user's wallet: account access plus a contract
/// handle whose writes are signed by the selected account.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<Address>>;
    async fn connect_contract(
        &self,
        account: Address,
        contract_address: Address,
    ) -> Result<Arc<dyn RaffleContract>>;
}

pub struct MissingWalletProvider;

#[async_trait]
impl WalletProvider for MissingWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Err(RaffleError::ProviderUnavailable.into())
    }

    async fn connect_contract(
        &self,
        _account: Address,
        _contract_address: Address,
    ) -> Result<Arc<dyn RaffleContract>> {
        Err(RaffleError::ProviderUnavailable.into())
    }
}

/// Fixed interface of the deployed raffle contract.
#[async_trait]
pub trait RaffleContract: Send + Sync {
    fn address(&self) -> Address;
    async fn entrance_fee(&self) -> Result<U256>;
    async fn raffle_state(&self) -> Result<u8>;
    async fn recent_winner(&self) -> Result<Address>;
    async fn last_timestamp(&self) -> Result<u64>;
    /// Sends `enterRaffle()` carrying `value` base units; returns once the
    /// provider has accepted the transaction.
    async fn submit_entry(&self, value: U256) -> Result<B256>;
    /// Blocks until the transaction is mined. No timeout is applied.
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt>;
    async fn subscribe(&self, kind: RaffleEventKind) -> Result<EventSubscription>;
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    ViewUpdated(RaffleView),
    EventObserved(RaffleEvent),
    EntrySubmitted { tx_hash: B256 },
    EntryConfirmed { receipt: TransactionReceipt },
    Error(ErrorReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Event(RaffleEventKind),
    Manual,
}

enum EntryAmount<'a> {
    DisplayedFee,
    Display(&'a str),
}

struct Listener {
    kind: RaffleEventKind,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Session {
    account: Address,
    contract: Arc<dyn RaffleContract>,
    sync_triggers: mpsc::Sender<SyncTrigger>,
    sync_worker: JoinHandle<()>,
    listeners: Vec<Listener>,
}

struct EntryGuard<'a>(&'a AtomicBool);

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Keeps a [`RaffleView`] in step with the contract: one read-all pass at
/// initialization, then one pass per observed contract event.
pub struct RaffleClient {
    wallet: Arc<dyn WalletProvider>,
    contract_address: Address,
    display: DisplayOptions,
    session: Mutex<Option<Session>>,
    view: RwLock<RaffleView>,
    events: broadcast::Sender<ClientEvent>,
    entry_in_flight: AtomicBool,
}

impl RaffleClient {
    pub fn new(contract_address: Address) -> Arc<Self> {
        Self::new_with_dependencies(
            Arc::new(MissingWalletProvider),
            contract_address,
            DisplayOptions::default(),
        )
    }

    pub fn new_with_wallet(
        wallet: Arc<dyn WalletProvider>,
        contract_address: Address,
    ) -> Arc<Self> {
        Self::new_with_dependencies(wallet, contract_address, DisplayOptions::default())
    }

    pub fn new_with_dependencies(
        wallet: Arc<dyn WalletProvider>,
        contract_address: Address,
        display: DisplayOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(CLIENT_EVENT_CAPACITY);
        Arc::new(Self {
            wallet,
            contract_address,
            display,
            session: Mutex::new(None),
            view: RwLock::new(RaffleView::default()),
            events,
            entry_in_flight: AtomicBool::new(false),
        })
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn display_options(&self) -> &DisplayOptions {
        &self.display
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn view(&self) -> RaffleView {
        self.view.read().await.clone()
    }

    pub async fn account(&self) -> Option<Address> {
        self.session.lock().await.as_ref().map(|session| session.account)
    }

    pub async fn is_initialized(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Connects the wallet, runs the first synchronization pass and registers
    /// the `EntrantJoined` / `WinnerSelected` listeners. A failed first pass is
    /// reported in the view but does not fail initialization. Calling this
    /// again tears down the previous listeners first.
    pub async fn initialize(self: &Arc<Self>) -> std::result::Result<Address, RaffleError> {
        self.shutdown().await;

        let accounts = match self.wallet.request_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => return Err(self.fail_initialization(classify_wallet_error(err)).await),
        };
        let Some(account) = accounts.first().copied() else {
            return Err(self
                .fail_initialization(RaffleError::AccountAccessDenied(
                    "wallet returned no accounts".to_string(),
                ))
                .await);
        };
        let contract = match self
            .wallet
            .connect_contract(account, self.contract_address)
            .await
        {
            Ok(contract) => contract,
            Err(err) => return Err(self.fail_initialization(classify_wallet_error(err)).await),
        };

        self.view.write().await.account = Some(account);
        info!(%account, contract = %self.contract_address, "wallet connected");

        if let Err(err) = self.sync_all(contract.as_ref()).await {
            warn!("initial contract state sync failed: {err}");
        }

        let (sync_triggers, trigger_rx) = mpsc::channel(1);
        let sync_worker = tokio::spawn(run_sync_worker(
            Arc::downgrade(self),
            Arc::clone(&contract),
            trigger_rx,
        ));

        let mut listeners = Vec::with_capacity(RaffleEventKind::ALL.len());
        for kind in RaffleEventKind::ALL {
            match contract.subscribe(kind).await {
                Ok(subscription) => {
                    listeners.push(self.spawn_listener(subscription, sync_triggers.clone()));
                }
                Err(err) => {
                    stop_listeners(listeners).await;
                    sync_worker.abort();
                    return Err(self
                        .fail_initialization(RaffleError::SubscriptionFailure(format!(
                            "{}: {err:#}",
                            kind.name()
                        )))
                        .await);
                }
            }
        }

        *self.session.lock().await = Some(Session {
            account,
            contract,
            sync_triggers,
            sync_worker,
            listeners,
        });
        Ok(account)
    }

    /// Reads the four contract fields in order and publishes the result. A
    /// failed read aborts the rest of the pass; fields read before it are
    /// kept, unread fields retain their previous values.
    pub async fn sync_all(
        &self,
        contract: &dyn RaffleContract,
    ) -> std::result::Result<RaffleView, RaffleError> {
        let mut patch = SyncPatch::default();
        let outcome = read_all(contract, &mut patch).await;

        let view = {
            let mut view = self.view.write().await;
            patch.apply(&mut view, &self.display);
            if let Err(err) = &outcome {
                view.error = Some(ErrorReport::from_error(ErrorContext::StateUpdate, err));
            }
            view.clone()
        };
        let _ = self.events.send(ClientEvent::ViewUpdated(view.clone()));

        match outcome {
            Ok(()) => {
                debug!(
                    fee = view.entrance_fee.as_deref().unwrap_or_default(),
                    state = view.raffle_state_label(),
                    "contract state synced"
                );
                Ok(view)
            }
            Err(err) => {
                if let Some(report) = view.error.clone() {
                    let _ = self.events.send(ClientEvent::Error(report));
                }
                Err(err)
            }
        }
    }

    /// Queues a refresh through the single-slot sync worker. Returns `false`
    /// when the client has not been initialized.
    pub async fn request_sync(&self) -> bool {
        let guard = self.session.lock().await;
        match guard.as_ref() {
            Some(session) => enqueue_sync(&session.sync_triggers, SyncTrigger::Manual),
            None => false,
        }
    }

    /// Runs one pass against the connected contract and waits for it to
    /// commit, bypassing the sync worker.
    pub async fn refresh(&self) -> std::result::Result<RaffleView, RaffleError> {
        let contract = {
            let guard = self.session.lock().await;
            guard.as_ref().map(|session| Arc::clone(&session.contract))
        };
        match contract {
            Some(contract) => self.sync_all(contract.as_ref()).await,
            None => Err(self
                .record_error(ErrorContext::StateUpdate, RaffleError::NotConnected)
                .await),
        }
    }

    /// Enters with the currently displayed entrance fee.
    pub async fn enter_raffle(&self) -> std::result::Result<TransactionReceipt, RaffleError> {
        self.enter(EntryAmount::DisplayedFee).await
    }

    /// Enters with an explicit amount expressed in the display denomination.
    pub async fn enter_with_amount(
        &self,
        amount: &str,
    ) -> std::result::Result<TransactionReceipt, RaffleError> {
        self.enter(EntryAmount::Display(amount)).await
    }

    async fn enter(
        &self,
        amount: EntryAmount<'_>,
    ) -> std::result::Result<TransactionReceipt, RaffleError> {
        let contract = {
            let guard = self.session.lock().await;
            guard.as_ref().map(|session| Arc::clone(&session.contract))
        };
        let Some(contract) = contract else {
            return Err(self
                .record_error(ErrorContext::EnterRaffle, RaffleError::NotConnected)
                .await);
        };

        if self
            .entry_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(self
                .record_error(ErrorContext::EnterRaffle, RaffleError::SubmissionInProgress)
                .await);
        }
        let _guard = EntryGuard(&self.entry_in_flight);

        let value = match self.resolve_amount(amount).await {
            Ok(value) => value,
            Err(err) => return Err(self.record_error(ErrorContext::EnterRaffle, err).await),
        };

        self.set_entry_pending(true).await;
        let outcome = submit_and_confirm(contract.as_ref(), value, &self.events).await;
        self.set_entry_pending(false).await;

        match outcome {
            Ok(receipt) => {
                info!(tx_hash = %receipt.transaction_hash, "Entered raffle successfully!");
                Ok(receipt)
            }
            Err(err) => Err(self.record_error(ErrorContext::EnterRaffle, err).await),
        }
    }

    async fn resolve_amount(&self, amount: EntryAmount<'_>) -> std::result::Result<U256, RaffleError> {
        match amount {
            EntryAmount::DisplayedFee => self
                .view
                .read()
                .await
                .entrance_fee_base_units
                .ok_or_else(|| {
                    RaffleError::InvalidAmount("entrance fee has not been loaded yet".to_string())
                }),
            EntryAmount::Display(raw) => self
                .display
                .denomination
                .parse(raw)
                .map_err(|err| RaffleError::InvalidAmount(err.to_string())),
        }
    }

    /// Stops both event listeners and the sync worker and disconnects the
    /// account from the view. Safe to call when not initialized.
    ///
    /// Dropping the last handle without calling this also stops the
    /// listeners, but the worker may finish a pass it already started.
    pub async fn shutdown(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            stop_listeners(session.listeners).await;
            session.sync_worker.abort();
            let view = {
                let mut view = self.view.write().await;
                view.account = None;
                view.clone()
            };
            let _ = self.events.send(ClientEvent::ViewUpdated(view));
            info!(account = %session.account, "raffle client listeners removed");
        }
    }

    fn spawn_listener(
        &self,
        mut subscription: EventSubscription,
        triggers: mpsc::Sender<SyncTrigger>,
    ) -> Listener {
        let kind = subscription.kind();
        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    next = subscription.next_event() => {
                        let Some(event) = next else {
                            warn!(kind = kind.name(), "event subscription closed by provider");
                            break;
                        };
                        info!(kind = kind.name(), subject = %event.address(), "{event}");
                        let _ = events.send(ClientEvent::EventObserved(event));
                        enqueue_sync(&triggers, SyncTrigger::Event(kind));
                    }
                }
            }
            subscription.unsubscribe();
        });
        Listener { kind, stop, task }
    }

    async fn set_entry_pending(&self, pending: bool) {
        let view = {
            let mut view = self.view.write().await;
            view.entry_pending = pending;
            view.clone()
        };
        let _ = self.events.send(ClientEvent::ViewUpdated(view));
    }

    async fn record_error(&self, context: ErrorContext, err: RaffleError) -> RaffleError {
        let report = ErrorReport::from_error(context, &err);
        warn!(code = ?report.code, "{report}");
        let view = {
            let mut view = self.view.write().await;
            view.error = Some(report.clone());
            view.clone()
        };
        let _ = self.events.send(ClientEvent::ViewUpdated(view));
        let _ = self.events.send(ClientEvent::Error(report));
        err
    }

    async fn fail_initialization(&self, err: RaffleError) -> RaffleError {
        self.view.write().await.account = None;
        self.record_error(ErrorContext::Initialization, err).await
    }
}

fn classify_wallet_error(err: anyhow::Error) -> RaffleError {
    match err.downcast::<RaffleError>() {
        Ok(err) => err,
        Err(err) => RaffleError::AccountAccessDenied(format!("{err:#}")),
    }
}

fn read_failure(field: ContractField) -> impl FnOnce(anyhow::Error) -> RaffleError {
    move |err| RaffleError::ReadFailure {
        field,
        message: format!("{err:#}"),
    }
}

async fn read_all(
    contract: &dyn RaffleContract,
    patch: &mut SyncPatch,
) -> std::result::Result<(), RaffleError> {
    patch.entrance_fee = Some(
        contract
            .entrance_fee()
            .await
            .map_err(read_failure(ContractField::EntranceFee))?,
    );
    patch.raffle_state_code = Some(
        contract
            .raffle_state()
            .await
            .map_err(read_failure(ContractField::RaffleState))?,
    );
    patch.recent_winner = Some(
        contract
            .recent_winner()
            .await
            .map_err(read_failure(ContractField::RecentWinner))?,
    );
    patch.last_timestamp = Some(
        contract
            .last_timestamp()
            .await
            .map_err(read_failure(ContractField::LastTimestamp))?,
    );
    Ok(())
}

async fn submit_and_confirm(
    contract: &dyn RaffleContract,
    value: U256,
    events: &broadcast::Sender<ClientEvent>,
) -> std::result::Result<TransactionReceipt, RaffleError> {
    let tx_hash = contract
        .submit_entry(value)
        .await
        .map_err(|err| RaffleError::TransactionFailure(format!("{err:#}")))?;
    info!(%tx_hash, %value, "raffle entry submitted, waiting for confirmation");
    let _ = events.send(ClientEvent::EntrySubmitted { tx_hash });

    let receipt = contract
        .wait_for_receipt(tx_hash)
        .await
        .map_err(|err| RaffleError::TransactionFailure(format!("{err:#}")))?;
    let _ = events.send(ClientEvent::EntryConfirmed {
        receipt: receipt.clone(),
    });
    Ok(receipt)
}

/// Capacity-1 trigger slot: a trigger that finds the slot full is already
/// covered by the pending one.
fn enqueue_sync(triggers: &mpsc::Sender<SyncTrigger>, trigger: SyncTrigger) -> bool {
    match triggers.try_send(trigger) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!(?trigger, "sync already queued; coalescing trigger");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// At most one pass in flight. A trigger arriving mid-pass drops the running
/// pass before it commits and starts a fresh one. The worker only holds the
/// client while a pass runs, so it never keeps a dropped client alive.
async fn run_sync_worker(
    client: Weak<RaffleClient>,
    contract: Arc<dyn RaffleContract>,
    mut triggers: mpsc::Receiver<SyncTrigger>,
) {
    while let Some(mut trigger) = triggers.recv().await {
        let Some(client) = client.upgrade() else {
            debug!("raffle client dropped; sync worker exiting");
            return;
        };
        loop {
            debug!(?trigger, "sync pass started");
            tokio::select! {
                next = triggers.recv() => match next {
                    Some(next) => {
                        debug!(superseded = ?trigger, by = ?next, "sync pass superseded");
                        trigger = next;
                    }
                    None => return,
                },
                result = client.sync_all(contract.as_ref()) => {
                    if let Err(err) = result {
                        warn!(?trigger, "contract state sync failed: {err}");
                    }
                    break;
                }
            }
        }
    }
}

async fn stop_listeners(listeners: Vec<Listener>) {
    for listener in listeners {
        let _ = listener.stop.send(());
        if let Err(err) = listener.task.await {
            warn!(kind = listener.kind.name(), "event listener ended abnormally: {err}");
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
