// src/error.rs
//! Error taxonomy shared by every component.
//!
//! Readers and pollers never let these escape as panics; they are returned as
//! values and folded into the view or the action outcome.

use alloy_primitives::B256;
use std::fmt;

/// Missing or malformed startup configuration. Fatal to initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    Missing(&'static str),
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::Missing(key) => write!(f, "{} is not set", key),
            ConfigurationError::Invalid { key, value, reason } => {
                write!(f, "{} has invalid value '{}': {}", key, value, reason)
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Wallet could not be reached. Recoverable on the next user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    WalletUnavailable(String),
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityError::WalletUnavailable(msg) => write!(f, "Wallet unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ConnectivityError {}

/// Bad user input, rejected before anything touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NotConnected,
    EmptyAmount,
    NotNumeric(String),
    NonPositive,
    TooManyDecimals { max: u8 },
    AmountOverflow,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotConnected => write!(f, "Wallet is not connected"),
            ValidationError::EmptyAmount => write!(f, "Amount is required"),
            ValidationError::NotNumeric(input) => write!(f, "'{}' is not a number", input),
            ValidationError::NonPositive => write!(f, "Amount must be greater than zero"),
            ValidationError::TooManyDecimals { max } => {
                write!(f, "Amount has more than {} decimal places", max)
            }
            ValidationError::AmountOverflow => write!(f, "Amount is too large"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Transaction was mined but reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainRevert {
    pub tx_hash: B256,
    pub reason: Option<String>,
}

impl fmt::Display for OnChainRevert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "Transaction {} reverted: {}", self.tx_hash, reason),
            None => write!(f, "Transaction {} reverted", self.tx_hash),
        }
    }
}

impl std::error::Error for OnChainRevert {}

/// Indexing service failure. The read path degrades to last-known data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    Unreachable(String),
    Status(u16),
    GraphQl(String),
    Decode(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Unreachable(msg) => write!(f, "Indexer unreachable: {}", msg),
            QueryError::Status(code) => write!(f, "Indexer returned HTTP {}", code),
            QueryError::GraphQl(msg) => write!(f, "Indexer query error: {}", msg),
            QueryError::Decode(msg) => write!(f, "Failed to decode indexer response: {}", msg),
        }
    }
}

impl std::error::Error for QueryError {}

/// Contract read failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    NetworkUnavailable(String),
    ContractAddressInvalid,
    MalformedResponse(String),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::NetworkUnavailable(msg) => write!(f, "Network unavailable: {}", msg),
            ReadError::ContractAddressInvalid => write!(f, "Staking contract address is not set or invalid"),
            ReadError::MalformedResponse(msg) => write!(f, "Malformed contract response: {}", msg),
        }
    }
}

impl std::error::Error for ReadError {}

/// JSON-RPC transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    Transport(String),
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },
    Malformed(String),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Transport(msg) => write!(f, "Failed to send request: {}", msg),
            RpcError::Rpc { code, message, .. } => write!(f, "RPC error {}: {}", code, message),
            RpcError::Malformed(msg) => write!(f, "Failed to parse response: {}", msg),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<RpcError> for ReadError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport(msg) => ReadError::NetworkUnavailable(msg),
            other => ReadError::MalformedResponse(other.to_string()),
        }
    }
}

/// Any error a session can surface on its view state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakeWatchError {
    Configuration(ConfigurationError),
    Connectivity(ConnectivityError),
    Validation(ValidationError),
    OnChainRevert(OnChainRevert),
    Query(QueryError),
    Read(ReadError),
}

impl fmt::Display for StakeWatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeWatchError::Configuration(e) => write!(f, "Configuration error: {}", e),
            StakeWatchError::Connectivity(e) => write!(f, "{}", e),
            StakeWatchError::Validation(e) => write!(f, "Invalid input: {}", e),
            StakeWatchError::OnChainRevert(e) => write!(f, "{}", e),
            StakeWatchError::Query(e) => write!(f, "{}", e),
            StakeWatchError::Read(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StakeWatchError {}

impl From<ConfigurationError> for StakeWatchError {
    fn from(e: ConfigurationError) -> Self {
        StakeWatchError::Configuration(e)
    }
}

impl From<ConnectivityError> for StakeWatchError {
    fn from(e: ConnectivityError) -> Self {
        StakeWatchError::Connectivity(e)
    }
}

impl From<ValidationError> for StakeWatchError {
    fn from(e: ValidationError) -> Self {
        StakeWatchError::Validation(e)
    }
}

impl From<QueryError> for StakeWatchError {
    fn from(e: QueryError) -> Self {
        StakeWatchError::Query(e)
    }
}

impl From<ReadError> for StakeWatchError {
    fn from(e: ReadError) -> Self {
        StakeWatchError::Read(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failure_maps_to_network_unavailable() {
        let err: ReadError = RpcError::Transport("connection refused".to_string()).into();
        assert_eq!(err, ReadError::NetworkUnavailable("connection refused".to_string()));

        let err: ReadError = RpcError::Malformed("bad hex".to_string()).into();
        assert!(matches!(err, ReadError::MalformedResponse(_)));
    }

    #[test]
    fn test_revert_display_includes_reason() {
        let revert = OnChainRevert {
            tx_hash: B256::ZERO,
            reason: Some("Tokens are locked".to_string()),
        };
        assert!(revert.to_string().contains("Tokens are locked"));
    }
}
