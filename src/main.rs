// src/main.rs
//! Track one account and log every new view until Ctrl-C.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use stakewatch::actions::{RpcWallet, WalletSession};
use stakewatch::rpc::JsonRpcClient;
use stakewatch::units::{format_bps, format_time_until_unlock, format_units};
use stakewatch::{StakingConfig, StakingSession, ViewState};

/// Account to track; falls back to the wallet's first account
const ENV_ACCOUNT: &str = "ACCOUNT";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = StakingConfig::from_env().context("Invalid configuration")?;
    let account = resolve_account(&config).await?;
    let decimals = config.token_decimals;

    let mut session = StakingSession::new(config);
    let mut views = session.subscribe_view();
    session.watch(account).await;

    match session.user_history(account).await {
        Ok(history) => log::info!(
            "{} history: {} stakes, {} withdrawals, {} claimed over {} claims",
            account,
            history.staked.len(),
            history.withdrawn.len(),
            format_units(history.total_claimed(), decimals),
            history.rewards_claimed.len(),
        ),
        Err(e) => log::warn!("History unavailable for {}: {}", account, e),
    }

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = views.borrow_and_update().clone();
                log_view(&state, decimals);
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    session.stop().await;
    Ok(())
}

async fn resolve_account(config: &StakingConfig) -> Result<Address> {
    if let Ok(value) = std::env::var(ENV_ACCOUNT) {
        return value
            .trim()
            .parse::<Address>()
            .with_context(|| format!("{} is not an address: {}", ENV_ACCOUNT, value));
    }

    let rpc = Arc::new(JsonRpcClient::new(config.rpc_url.clone()));
    let wallet = RpcWallet::connect(rpc).await.context("No wallet to take the account from")?;
    wallet
        .account()
        .with_context(|| format!("Wallet exposes no accounts; set {}", ENV_ACCOUNT))
}

fn log_view(state: &ViewState, decimals: u8) {
    let view = match state {
        ViewState::Empty => return,
        ViewState::Loading => {
            log::info!("Loading position...");
            return;
        }
        ViewState::Failed(e) => {
            log::error!("No position data: {}", e);
            return;
        }
        ViewState::Ready(view) => view,
    };

    let unlock = match view.next_unlock_timestamp {
        Some(ts) => format_time_until_unlock(ts, view.evaluated_at),
        None => "-".to_string(),
    };
    log::info!(
        "{} staked={} pending={} next_unlock={} rate={} total_staked={} paused={} source={:?}",
        view.account,
        format_units(view.total_staked, decimals),
        format_units(view.total_pending_rewards, decimals),
        unlock,
        format_bps(view.protocol.current_reward_rate),
        format_units(view.protocol.total_staked, decimals),
        view.protocol.paused,
        view.source,
    );
    if let Some(contract_pending) = view.contract_pending_rewards {
        log::debug!("Contract-reported pending: {}", format_units(contract_pending, decimals));
    }
    for position in &view.positions {
        log::debug!(
            "  {} amount={} pending={} unlock={}",
            position.record.id,
            format_units(position.record.amount, decimals),
            format_units(position.pending_rewards, decimals),
            format_time_until_unlock(position.record.unlock_at(), view.evaluated_at),
        );
    }
    if let Some(error) = &view.error {
        log::warn!("Showing last known data: {}", error);
    }
}
