// src/actions/wallet.rs
//! Seams between the gateway and the outside world: the wallet that signs,
//! the chain that confirms, and the user who confirms emergency exits.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use std::sync::Arc;

use super::types::{AbortCause, EmergencyNotice};
use crate::error::{ConnectivityError, RpcError};
use crate::rpc::{JsonRpcClient, TransactionReceipt};

/// EIP-1193 "user rejected request"
const USER_REJECTED: i64 = 4001;

/// A connected wallet able to sign and broadcast
#[async_trait]
pub trait WalletSession: Send + Sync {
    /// Connected account, `None` when disconnected
    fn account(&self) -> Option<Address>;

    /// Sign and broadcast a call; returns the transaction hash
    async fn send_transaction(&self, from: Address, to: Address, data: Vec<u8>) -> Result<B256, AbortCause>;

    fn name(&self) -> String;
}

/// Receipt lookups and revert replay
#[async_trait]
pub trait ChainWatcher: Send + Sync {
    async fn receipt(&self, tx_hash: &B256) -> Result<Option<TransactionReceipt>, RpcError>;

    /// Raw revert data from replaying the call at `block`
    async fn revert_data(&self, from: &Address, to: &Address, data: &[u8], block: u64) -> Option<Vec<u8>>;
}

/// Explicit user consent before an irreversible action
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn confirm(&self, notice: &EmergencyNotice) -> bool;
}

#[async_trait]
impl ChainWatcher for JsonRpcClient {
    async fn receipt(&self, tx_hash: &B256) -> Result<Option<TransactionReceipt>, RpcError> {
        self.get_transaction_receipt(tx_hash).await
    }

    async fn revert_data(&self, from: &Address, to: &Address, data: &[u8], block: u64) -> Option<Vec<u8>> {
        self.replay_for_revert(from, to, data, block).await
    }
}

/// Wallet reached through a node or provider that manages keys and answers
/// `eth_accounts` / `eth_sendTransaction`
pub struct RpcWallet {
    rpc: Arc<JsonRpcClient>,
    account: Option<Address>,
}

impl RpcWallet {
    /// Resolve the first exposed account
    pub async fn connect(rpc: Arc<JsonRpcClient>) -> Result<Self, ConnectivityError> {
        let accounts = rpc.accounts().await.map_err(|e| {
            log::warn!("Wallet at {} did not return accounts: {}", rpc.url(), e);
            ConnectivityError::WalletUnavailable(e.to_string())
        })?;
        let account = accounts.first().copied();
        match account {
            Some(account) => log::info!("Wallet connected: {}", account),
            None => log::warn!("Wallet at {} exposes no accounts", rpc.url()),
        }
        Ok(Self { rpc, account })
    }
}

#[async_trait]
impl WalletSession for RpcWallet {
    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn send_transaction(&self, from: Address, to: Address, data: Vec<u8>) -> Result<B256, AbortCause> {
        self.rpc
            .send_transaction(&from, &to, &data)
            .await
            .map_err(submit_error)
    }

    fn name(&self) -> String {
        format!("RPC wallet ({})", self.rpc.url())
    }
}

fn submit_error(e: RpcError) -> AbortCause {
    match e {
        RpcError::Rpc { code: USER_REJECTED, .. } => AbortCause::UserDeclined,
        RpcError::Transport(msg) => AbortCause::Connectivity(ConnectivityError::WalletUnavailable(msg)),
        other => AbortCause::Connectivity(ConnectivityError::WalletUnavailable(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_error_mapping() {
        let declined = RpcError::Rpc {
            code: 4001,
            message: "User rejected the request.".to_string(),
            data: None,
        };
        assert_eq!(submit_error(declined), AbortCause::UserDeclined);
        assert!(matches!(
            submit_error(RpcError::Transport("connection refused".into())),
            AbortCause::Connectivity(ConnectivityError::WalletUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_to_missing_wallet() {
        let rpc = Arc::new(JsonRpcClient::new("http://127.0.0.1:9"));
        assert!(matches!(
            RpcWallet::connect(rpc).await,
            Err(ConnectivityError::WalletUnavailable(_))
        ));
    }
}
