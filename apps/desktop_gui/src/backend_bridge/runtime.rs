//! Runtime bridge between UI command queue and backend event intake.

use std::{sync::Arc, thread};

use client_core::{config::Settings, ClientEvent, DisplayOptions, RaffleClient};
use crossbeam_channel::{Receiver, Sender};
use tokio::sync::broadcast;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

pub fn launch(settings: Settings, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                report_startup_failure(&ui_tx, format!("failed to build runtime: {err}"));
                return;
            }
        };

        runtime.block_on(async move {
            let client = match build_client(&settings) {
                Ok(client) => client,
                Err(err) => {
                    report_startup_failure(&ui_tx, format!("{err:#}"));
                    return;
                }
            };
            tokio::spawn(forward_client_events(
                client.subscribe_events(),
                ui_tx.clone(),
            ));
            let _ = ui_tx.try_send(UiEvent::Info("Backend worker ready".to_string()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::Connect => {
                        // Failures reach the UI through the client's event stream.
                        if let Ok(account) = client.initialize().await {
                            let _ = ui_tx.try_send(UiEvent::Connected(account.to_string()));
                        }
                    }
                    BackendCommand::Refresh => {
                        if !client.request_sync().await {
                            let _ = ui_tx.try_send(UiEvent::Info(
                                "Connect a wallet before refreshing".to_string(),
                            ));
                        }
                    }
                    BackendCommand::EnterRaffle => {
                        let client = Arc::clone(&client);
                        tokio::spawn(async move {
                            let _ = client.enter_raffle().await;
                        });
                    }
                }
            }

            client.shutdown().await;
            tracing::info!("backend worker stopped");
        });
    });
}

fn build_client(settings: &Settings) -> anyhow::Result<Arc<RaffleClient>> {
    Ok(RaffleClient::new_with_dependencies(
        settings.wallet()?,
        settings.contract_address()?,
        DisplayOptions::default(),
    ))
}

fn report_startup_failure(ui_tx: &Sender<UiEvent>, reason: String) {
    tracing::error!("backend worker startup failure: {reason}");
    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
        UiErrorContext::BackendStartup,
        format!("backend worker startup failure: {reason}"),
    )));
}

async fn forward_client_events(
    mut events: broadcast::Receiver<ClientEvent>,
    ui_tx: Sender<UiEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "ui event forwarder lagged behind client events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let ui_event = match event {
            ClientEvent::ViewUpdated(view) => UiEvent::ViewUpdated(view),
            ClientEvent::EventObserved(event) => UiEvent::ContractEvent(event),
            ClientEvent::EntrySubmitted { tx_hash } => UiEvent::EntrySubmitted(tx_hash.to_string()),
            ClientEvent::EntryConfirmed { receipt } => {
                UiEvent::EntryConfirmed(receipt.transaction_hash.to_string())
            }
            ClientEvent::Error(report) => UiEvent::Error(UiError::from_report(&report)),
        };
        if ui_tx.try_send(ui_event).is_err() {
            tracing::warn!("ui event queue unavailable; dropping client event");
        }
    }
}
