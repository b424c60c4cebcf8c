// src/config/mod.rs
use alloy_primitives::Address;
use reqwest::Url;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigurationError;

pub const ENV_STAKING_CONTRACT: &str = "STAKING_CONTRACT_ADDRESS";
pub const ENV_STAKING_TOKEN: &str = "STAKING_TOKEN_ADDRESS";
pub const ENV_INDEXER_URL: &str = "INDEXER_URL";
pub const ENV_RPC_URL: &str = "RPC_URL";
pub const ENV_WS_URL: &str = "WS_URL";

/// Token amounts on the contract are scaled by 10^18
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Everything the engine needs from the outside world, built once at startup
/// and handed to each component.
#[derive(Debug, Clone)]
pub struct StakingConfig {
    /// Staking contract (reads, writes, events)
    pub staking_contract: Address,
    /// ERC-20 being staked (approve target)
    pub staking_token: Address,
    /// GraphQL endpoint of the indexing service
    pub indexer_url: String,
    /// HTTP JSON-RPC endpoint for reads and receipts
    pub rpc_url: String,
    /// WebSocket JSON-RPC endpoint for log subscriptions
    pub ws_url: String,
    pub token_decimals: u8,
    /// Cadence of the user aggregate + positions query
    pub user_poll_interval: Duration,
    /// Cadence of the protocol stats query
    pub protocol_poll_interval: Duration,
    /// Forced recompute cadence (rewards accrue with time alone)
    pub tick_interval: Duration,
    /// How long an action waits for its receipt before giving up
    pub confirmation_timeout: Duration,
    pub receipt_poll_interval: Duration,
    /// Emergency-withdraw penalty override in basis points. When unset the
    /// figure comes from the indexer's protocol stats.
    pub emergency_penalty_bps: Option<u32>,
}

impl StakingConfig {
    /// Build a config with default cadences
    pub fn new(
        staking_contract: Address,
        staking_token: Address,
        indexer_url: impl Into<String>,
        rpc_url: impl Into<String>,
        ws_url: impl Into<String>,
    ) -> Self {
        Self {
            staking_contract,
            staking_token,
            indexer_url: indexer_url.into(),
            rpc_url: rpc_url.into(),
            ws_url: ws_url.into(),
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            user_poll_interval: Duration::from_secs(30),
            protocol_poll_interval: Duration::from_secs(60),
            tick_interval: Duration::from_secs(60),
            confirmation_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_secs(2),
            emergency_penalty_bps: None,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigurationError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigurationError::Missing(key))
        };

        let staking_contract = parse_address(ENV_STAKING_CONTRACT, &required(ENV_STAKING_CONTRACT)?)?;
        let staking_token = parse_address(ENV_STAKING_TOKEN, &required(ENV_STAKING_TOKEN)?)?;
        let indexer_url = parse_url(ENV_INDEXER_URL, &required(ENV_INDEXER_URL)?, &["http", "https"])?;
        let rpc_url = parse_url(ENV_RPC_URL, &required(ENV_RPC_URL)?, &["http", "https"])?;
        let ws_url = parse_url(ENV_WS_URL, &required(ENV_WS_URL)?, &["ws", "wss"])?;

        let mut config = Self::new(staking_contract, staking_token, indexer_url, rpc_url, ws_url);

        if let Some(decimals) = optional_number::<u8>(&lookup, "TOKEN_DECIMALS")? {
            config.token_decimals = decimals;
        }
        if let Some(secs) = optional_number::<u64>(&lookup, "USER_POLL_SECS")? {
            config.user_poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = optional_number::<u64>(&lookup, "PROTOCOL_POLL_SECS")? {
            config.protocol_poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = optional_number::<u64>(&lookup, "TICK_SECS")? {
            config.tick_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = optional_number::<u64>(&lookup, "CONFIRMATION_TIMEOUT_SECS")? {
            config.confirmation_timeout = Duration::from_secs(secs);
        }
        config.emergency_penalty_bps = optional_number::<u32>(&lookup, "EMERGENCY_PENALTY_BPS")?;

        Ok(config)
    }

    /// Lower-cased hex of the contract address, as the indexer keys it
    pub fn contract_key(&self) -> Option<String> {
        address_key(&self.staking_contract)
    }
}

/// Lower-cased `0x` hex for indexer lookups. `None` for the zero address.
pub fn address_key(address: &Address) -> Option<String> {
    if address.is_zero() {
        None
    } else {
        Some(format!("0x{}", hex::encode(address.as_slice())))
    }
}

fn parse_address(key: &'static str, value: &str) -> Result<Address, ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if !value.starts_with("0x") {
        return Err(invalid("address must start with 0x"));
    }
    let address = Address::from_str(value).map_err(|e| invalid(&e.to_string()))?;
    if address.is_zero() {
        return Err(invalid("zero address"));
    }
    Ok(address)
}

fn parse_url(key: &'static str, value: &str, schemes: &[&str]) -> Result<String, ConfigurationError> {
    let url = Url::parse(value).map_err(|e| ConfigurationError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigurationError::Invalid {
            key,
            value: value.to_string(),
            reason: format!("expected scheme {}", schemes.join(" or ")),
        });
    }
    Ok(value.to_string())
}

fn optional_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigurationError> {
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigurationError::Invalid {
                key,
                value: raw,
                reason: "not a number".to_string(),
            }),
    }
}
