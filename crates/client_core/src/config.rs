use std::{fs, io, path::Path, sync::Arc, time::Duration};

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::{JsonRpcWallet, MissingWalletProvider, RpcTimings, WalletProvider};

pub const DEFAULT_CONFIG_PATH: &str = "raffle.toml";
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x7d6dd236df1379c7c2b110e5af834b0fde0d8cf7";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// JSON-RPC endpoint of the wallet provider. `None` means no wallet.
    pub rpc_url: Option<String>,
    pub contract_address: String,
    pub poll_interval_ms: u64,
    pub confirmation_poll_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: DEFAULT_CONTRACT_ADDRESS.into(),
            poll_interval_ms: 2000,
            confirmation_poll_ms: 1000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    rpc_url: Option<String>,
    contract_address: Option<String>,
    poll_interval_ms: Option<u64>,
    confirmation_poll_ms: Option<u64>,
}

/// Defaults, then `path` if it exists, then environment overrides.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
            apply_file_settings(&mut settings, file_cfg);
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
    }

    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.rpc_url {
        settings.rpc_url = Some(v);
    }
    if let Some(v) = file_cfg.contract_address {
        settings.contract_address = v;
    }
    if let Some(v) = file_cfg.poll_interval_ms {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = file_cfg.confirmation_poll_ms {
        settings.confirmation_poll_ms = v;
    }
}

fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("RAFFLE_RPC_URL") {
        settings.rpc_url = Some(v);
    }
    if let Some(v) = non_empty("APP__RPC_URL") {
        settings.rpc_url = Some(v);
    }

    if let Some(v) = non_empty("RAFFLE_CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }
    if let Some(v) = non_empty("APP__CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }

    if let Some(parsed) = non_empty("APP__POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.poll_interval_ms = parsed;
    }
    if let Some(parsed) = non_empty("APP__CONFIRMATION_POLL_MS").and_then(|v| v.parse().ok()) {
        settings.confirmation_poll_ms = parsed;
    }
}

impl Settings {
    pub fn contract_address(&self) -> Result<Address> {
        self.contract_address
            .trim()
            .parse()
            .with_context(|| format!("invalid contract address '{}'", self.contract_address))
    }

    pub fn rpc_endpoint(&self) -> Result<Option<Url>> {
        self.rpc_url
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| Url::parse(raw).with_context(|| format!("invalid rpc url '{raw}'")))
            .transpose()
    }

    pub fn timings(&self) -> RpcTimings {
        RpcTimings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            confirmation_poll_interval: Duration::from_millis(self.confirmation_poll_ms.max(1)),
        }
    }

    /// Wallet capability described by these settings; without an RPC URL the
    /// client gets a provider that reports itself unavailable.
    pub fn wallet(&self) -> Result<Arc<dyn WalletProvider>> {
        Ok(match self.rpc_endpoint()? {
            Some(endpoint) => Arc::new(JsonRpcWallet::new(endpoint, self.timings())),
            None => Arc::new(MissingWalletProvider),
        })
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
