use std::{collections::VecDeque, time::Duration};

use client_core::RaffleView;
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::{
    events::{err_label, UiErrorContext, UiEvent},
    orchestration::dispatch_backend_command,
};

const RECENT_EVENT_LIMIT: usize = 20;

pub struct RaffleGuiApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    contract_address: String,
    view: RaffleView,
    status: String,
    /// Backend startup failures that never reach the client's error slot.
    startup_error: Option<String>,
    recent_events: VecDeque<String>,
}

impl RaffleGuiApp {
    pub fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        contract_address: String,
    ) -> Self {
        let mut app = Self {
            cmd_tx,
            ui_rx,
            contract_address,
            view: RaffleView::default(),
            status: "Starting...".to_string(),
            startup_error: None,
            recent_events: VecDeque::new(),
        };
        dispatch_backend_command(&app.cmd_tx, BackendCommand::Connect, &mut app.status);
        app
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Info(message) => self.status = message,
                UiEvent::Connected(account) => {
                    self.status = format!("Connected as {account}");
                }
                UiEvent::ViewUpdated(view) => self.view = view,
                UiEvent::ContractEvent(event) => {
                    self.push_recent(event.to_string());
                }
                UiEvent::EntrySubmitted(tx_hash) => {
                    self.status = format!("Entry submitted ({tx_hash}); waiting for confirmation");
                }
                UiEvent::EntryConfirmed(tx_hash) => {
                    self.status = "Entered raffle successfully!".to_string();
                    self.push_recent(format!("Entry confirmed in {tx_hash}"));
                }
                UiEvent::Error(err) => {
                    self.status = format!("{} error: {}", err_label(err.category()), err.message());
                    if err.context() == UiErrorContext::BackendStartup {
                        self.startup_error = Some(err.message().to_string());
                    }
                    tracing::warn!(context = ?err.context(), "{}", err.message());
                }
            }
        }
    }

    fn push_recent(&mut self, line: String) {
        if self.recent_events.len() == RECENT_EVENT_LIMIT {
            self.recent_events.pop_back();
        }
        self.recent_events.push_front(line);
    }

    fn show_error_banner(&self, ui: &mut egui::Ui) {
        let Some(message) = self.view.error_message().or_else(|| self.startup_error.clone())
        else {
            return;
        };
        egui::Frame::new()
            .fill(egui::Color32::from_rgb(111, 53, 53))
            .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(175, 96, 96)))
            .corner_radius(8)
            .inner_margin(egui::Margin::symmetric(10, 8))
            .show(ui, |ui| {
                ui.label(egui::RichText::new(message).color(egui::Color32::WHITE));
            });
    }

    fn show_state_grid(&self, ui: &mut egui::Ui) {
        let text = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
        egui::Grid::new("raffle_state_grid")
            .num_columns(2)
            .spacing([16.0, 6.0])
            .show(ui, |ui| {
                ui.strong("Account");
                ui.monospace(text(self.view.account.map(|a| a.to_string())));
                ui.end_row();

                ui.strong("Entrance fee");
                ui.label(match &self.view.entrance_fee {
                    Some(fee) => format!("{fee} ETH"),
                    None => "-".to_string(),
                });
                ui.end_row();

                ui.strong("Raffle state");
                ui.label(self.view.raffle_state_label());
                ui.end_row();

                ui.strong("Recent winner");
                ui.monospace(text(self.view.recent_winner.map(|a| a.to_string())));
                ui.end_row();

                ui.strong("Last timestamp");
                ui.label(text(self.view.last_timestamp.clone()));
                ui.end_row();
            });
    }

    fn show_main_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.weak(&self.status);
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Decentralized Raffle");
            ui.weak(format!("Contract {}", self.contract_address));
            ui.add_space(8.0);
            self.show_error_banner(ui);
            ui.add_space(8.0);
            self.show_state_grid(ui);
            ui.add_space(12.0);

            ui.horizontal(|ui| {
                let can_enter = self.view.account.is_some() && !self.view.entry_pending;
                let label = if self.view.entry_pending {
                    "Entering..."
                } else {
                    "Enter Raffle"
                };
                if ui.add_enabled(can_enter, egui::Button::new(label)).clicked() {
                    dispatch_backend_command(
                        &self.cmd_tx,
                        BackendCommand::EnterRaffle,
                        &mut self.status,
                    );
                }
                if ui.button("Refresh").clicked() {
                    dispatch_backend_command(&self.cmd_tx, BackendCommand::Refresh, &mut self.status);
                }
                if self.view.account.is_none() && ui.button("Connect Wallet").clicked() {
                    dispatch_backend_command(&self.cmd_tx, BackendCommand::Connect, &mut self.status);
                }
            });

            ui.add_space(12.0);
            ui.separator();
            ui.strong("Recent activity");
            egui::ScrollArea::vertical().show(ui, |ui| {
                if self.recent_events.is_empty() {
                    ui.weak("No contract events observed yet.");
                }
                for line in &self.recent_events {
                    ui.label(line);
                }
            });
        });
    }
}

impl eframe::App for RaffleGuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();
        self.show_main_panel(ctx);
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
