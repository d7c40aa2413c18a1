use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings, DEFAULT_CONFIG_PATH},
    ClientEvent, DisplayOptions, RaffleClient, RaffleView,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Overrides the wallet provider endpoint from the config file.
    #[arg(long)]
    rpc_url: Option<String>,
    #[arg(long)]
    contract: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Default)]
enum Command {
    /// Print the current contract state once.
    #[default]
    Show,
    /// Keep the state in sync with contract events until Ctrl-C.
    Watch,
    /// Submit an entry transaction and wait for it to be mined.
    Enter {
        /// Amount in ETH; defaults to the contract's entrance fee.
        #[arg(long)]
        amount: Option<String>,
    },
}

fn render(view: &RaffleView) {
    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    println!("Account:          {}", or_dash(view.account.map(|a| a.to_string())));
    println!("Entrance fee:     {} ETH", or_dash(view.entrance_fee.clone()));
    println!("Raffle state:     {}", view.raffle_state_label());
    println!(
        "Recent winner:    {}",
        or_dash(view.recent_winner.map(|a| a.to_string()))
    );
    println!("Last timestamp:   {}", or_dash(view.last_timestamp.clone()));
    if let Some(error) = view.error_message() {
        println!("Error:            {error}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(rpc_url) = args.rpc_url {
        settings.rpc_url = Some(rpc_url);
    }
    if let Some(contract) = args.contract {
        settings.contract_address = contract;
    }

    let client = RaffleClient::new_with_dependencies(
        settings.wallet()?,
        settings.contract_address()?,
        DisplayOptions::default(),
    );

    if let Err(err) = client.initialize().await {
        render(&client.view().await);
        return Err(err.into());
    }

    let outcome = match args.command.unwrap_or_default() {
        Command::Show => {
            render(&client.view().await);
            Ok(())
        }
        Command::Watch => watch(&client).await,
        Command::Enter { amount } => {
            let result = match amount.as_deref() {
                Some(amount) => client.enter_with_amount(amount).await,
                None => client.enter_raffle().await,
            };
            match result {
                Ok(receipt) => {
                    println!("Entered raffle in {}", receipt.transaction_hash);
                    if let Err(err) = client.refresh().await {
                        warn!("post-entry refresh failed: {err}");
                    }
                    render(&client.view().await);
                    Ok(())
                }
                Err(err) => {
                    render(&client.view().await);
                    Err(err.into())
                }
            }
        }
    };

    client.shutdown().await;
    outcome
}

async fn watch(client: &RaffleClient) -> Result<()> {
    let mut events = client.subscribe_events();
    render(&client.view().await);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(ClientEvent::EventObserved(event)) => println!("{event}"),
                Ok(ClientEvent::ViewUpdated(view)) => {
                    println!();
                    render(&view);
                }
                Ok(_) => {}
                Err(err) => warn!("event stream interrupted: {err}"),
            }
        }
    }
}
