// src/actions/gateway.rs
//! Single-shot staking actions: validate, submit, wait, classify.
//!
//! The gateway does not serialize calls. Keeping one action in flight per
//! account is up to the caller.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{decode_revert_reason, SolCall};
use std::sync::Arc;
use std::time::Duration;

use super::types::{AbortCause, ActionOutcome, EmergencyNotice};
use super::wallet::{ChainWatcher, ConfirmationPrompt, WalletSession};
use crate::abi::{IStakingPool, IERC20};
use crate::config::{StakingConfig, ENV_STAKING_CONTRACT, ENV_STAKING_TOKEN};
use crate::error::{ConfigurationError, OnChainRevert, ValidationError};
use crate::reconcile::ProtocolAggregate;
use crate::rpc::TransactionReceipt;
use crate::session::RefreshHandle;
use crate::units::parse_units;

/// A call that passed every precondition and is ready to sign
struct PreparedCall {
    label: &'static str,
    from: Address,
    to: Address,
    data: Vec<u8>,
}

pub struct ActionGateway {
    wallet: Arc<dyn WalletSession>,
    chain: Arc<dyn ChainWatcher>,
    staking_contract: Address,
    staking_token: Address,
    decimals: u8,
    confirmation_timeout: Duration,
    receipt_poll_interval: Duration,
    refresh: Option<RefreshHandle>,
}

impl ActionGateway {
    pub fn new(config: &StakingConfig, wallet: Arc<dyn WalletSession>, chain: Arc<dyn ChainWatcher>) -> Self {
        Self {
            wallet,
            chain,
            staking_contract: config.staking_contract,
            staking_token: config.staking_token,
            decimals: config.token_decimals,
            confirmation_timeout: config.confirmation_timeout,
            receipt_poll_interval: config.receipt_poll_interval,
            refresh: None,
        }
    }

    /// Nudge this session after every confirmed action
    pub fn with_refresh(mut self, refresh: RefreshHandle) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Allow the staking contract to pull `amount` of the staking token
    pub async fn approve(&self, amount: &str) -> ActionOutcome {
        let prepared = self.account().and_then(|from| {
            let to = configured(self.staking_token, ENV_STAKING_TOKEN)?;
            let spender = configured(self.staking_contract, ENV_STAKING_CONTRACT)?;
            let amount = parse_units(amount, self.decimals)?;
            Ok(PreparedCall {
                label: "approve",
                from,
                to,
                data: IERC20::approveCall { spender, amount }.abi_encode(),
            })
        });
        self.run(prepared).await
    }

    /// Stake `amount`. Allowance must already cover it.
    pub async fn stake(&self, amount: &str) -> ActionOutcome {
        let prepared = self.amount_call("stake", amount, |amount| IStakingPool::stakeCall { amount }.abi_encode());
        self.run(prepared).await
    }

    pub async fn withdraw(&self, amount: &str) -> ActionOutcome {
        let prepared = self.amount_call("withdraw", amount, |amount| IStakingPool::withdrawCall { amount }.abi_encode());
        self.run(prepared).await
    }

    pub async fn claim_rewards(&self) -> ActionOutcome {
        let prepared = self.account().and_then(|from| {
            Ok(PreparedCall {
                label: "claimRewards",
                from,
                to: configured(self.staking_contract, ENV_STAKING_CONTRACT)?,
                data: IStakingPool::claimRewardsCall {}.abi_encode(),
            })
        });
        self.run(prepared).await
    }

    /// Exit immediately, forfeiting rewards and paying the protocol penalty.
    /// Nothing is submitted unless `prompt` confirms.
    pub async fn emergency_withdraw(&self, prompt: &dyn ConfirmationPrompt, protocol: &ProtocolAggregate) -> ActionOutcome {
        let prepared = match self.account().and_then(|from| {
            Ok(PreparedCall {
                label: "emergencyWithdraw",
                from,
                to: configured(self.staking_contract, ENV_STAKING_CONTRACT)?,
                data: IStakingPool::emergencyWithdrawCall {}.abi_encode(),
            })
        }) {
            Ok(prepared) => prepared,
            Err(cause) => return ActionOutcome::Aborted(cause),
        };

        let notice = EmergencyNotice {
            penalty_bps: protocol.emergency_withdraw_penalty_bps,
        };
        if !prompt.confirm(&notice).await {
            log::info!("Emergency withdraw declined");
            return ActionOutcome::Aborted(AbortCause::UserDeclined);
        }

        self.run(Ok(prepared)).await
    }

    fn account(&self) -> Result<Address, AbortCause> {
        self.wallet
            .account()
            .ok_or(AbortCause::Validation(ValidationError::NotConnected))
    }

    fn amount_call(
        &self,
        label: &'static str,
        amount: &str,
        encode: impl FnOnce(U256) -> Vec<u8>,
    ) -> Result<PreparedCall, AbortCause> {
        let from = self.account()?;
        let to = configured(self.staking_contract, ENV_STAKING_CONTRACT)?;
        let amount = parse_units(amount, self.decimals)?;
        Ok(PreparedCall {
            label,
            from,
            to,
            data: encode(amount),
        })
    }

    async fn run(&self, prepared: Result<PreparedCall, AbortCause>) -> ActionOutcome {
        let call = match prepared {
            Ok(call) => call,
            Err(cause) => {
                log::debug!("Action rejected before submission: {}", cause);
                return ActionOutcome::Aborted(cause);
            }
        };

        let tx_hash = match self
            .wallet
            .send_transaction(call.from, call.to, call.data.clone())
            .await
        {
            Ok(hash) => hash,
            Err(cause) => {
                log::warn!("{} not submitted via {}: {}", call.label, self.wallet.name(), cause);
                return ActionOutcome::Aborted(cause);
            }
        };
        log::info!("{} submitted: {}", call.label, tx_hash);

        let Some(receipt) = self.wait_for_receipt(&tx_hash).await else {
            log::warn!("{} {} not confirmed within {:?}", call.label, tx_hash, self.confirmation_timeout);
            return ActionOutcome::Aborted(AbortCause::NotConfirmed { tx_hash });
        };

        match receipt.succeeded() {
            Some(true) => {
                log::info!("{} confirmed: {}", call.label, tx_hash);
                self.nudge();
                ActionOutcome::Success { tx_hash }
            }
            None => {
                log::warn!("{} {} mined without a status; re-reading state", call.label, tx_hash);
                self.nudge();
                ActionOutcome::Aborted(AbortCause::StatusUnknown { tx_hash })
            }
            Some(false) => {
                let reason = match receipt.block_number() {
                    Some(block) => self
                        .chain
                        .revert_data(&call.from, &call.to, &call.data, block)
                        .await
                        .and_then(|data| decode_revert_reason(&data)),
                    None => None,
                };
                log::warn!("{} reverted: {} ({})", call.label, tx_hash, reason.as_deref().unwrap_or("no reason"));
                ActionOutcome::Reverted(OnChainRevert { tx_hash, reason })
            }
        }
    }

    fn nudge(&self) {
        if let Some(refresh) = &self.refresh {
            refresh.refresh();
        }
    }

    /// Poll for the receipt until the confirmation timeout. Lookup errors are
    /// retried on the next poll.
    async fn wait_for_receipt(&self, tx_hash: &B256) -> Option<TransactionReceipt> {
        let poll = async {
            loop {
                match self.chain.receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(e) => log::debug!("Receipt lookup for {} failed: {}", tx_hash, e),
                }
                tokio::time::sleep(self.receipt_poll_interval).await;
            }
        };
        tokio::time::timeout(self.confirmation_timeout, poll).await.ok()
    }
}

fn configured(address: Address, key: &'static str) -> Result<Address, AbortCause> {
    if address.is_zero() {
        Err(AbortCause::Configuration(ConfigurationError::Missing(key)))
    } else {
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectivityError, RpcError};
    use crate::indexer::Polled;
    use crate::reconcile::fixtures::{position, stakes, tokens, DAY, T0};
    use crate::reconcile::{EngineInput, ReconciliationEngine};
    use crate::session::RefreshHandle;
    use alloy_primitives::U64;
    use alloy_sol_types::{Revert, SolError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    const HASH: B256 = B256::new([0x77; 32]);

    struct FakeWallet {
        account: Option<Address>,
        sent: Mutex<Vec<(Address, Address, Vec<u8>)>>,
        fail_with: Option<AbortCause>,
    }

    impl FakeWallet {
        fn connected() -> Self {
            Self {
                account: Some(Address::repeat_byte(0xaa)),
                sent: Mutex::new(Vec::new()),
                fail_with: None,
            }
        }

        fn sends(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl WalletSession for FakeWallet {
        fn account(&self) -> Option<Address> {
            self.account
        }

        async fn send_transaction(&self, from: Address, to: Address, data: Vec<u8>) -> Result<B256, AbortCause> {
            if let Some(cause) = &self.fail_with {
                return Err(cause.clone());
            }
            self.sent.lock().push((from, to, data));
            Ok(HASH)
        }

        fn name(&self) -> String {
            "fake".to_string()
        }
    }

    /// Mines after one empty lookup. `status: None` never mines;
    /// `Some(None)` mines a receipt with no status field.
    struct FakeChain {
        status: Option<Option<u64>>,
        polls: AtomicUsize,
        revert: Option<Vec<u8>>,
    }

    impl FakeChain {
        fn mined(status: u64) -> Self {
            Self {
                status: Some(Some(status)),
                polls: AtomicUsize::new(0),
                revert: None,
            }
        }
    }

    #[async_trait]
    impl ChainWatcher for FakeChain {
        async fn receipt(&self, tx_hash: &B256) -> Result<Option<TransactionReceipt>, RpcError> {
            if self.polls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(None);
            }
            Ok(self.status.map(|status| TransactionReceipt {
                transaction_hash: *tx_hash,
                block_number: Some(U64::from(16u64)),
                status: status.map(U64::from),
            }))
        }

        async fn revert_data(&self, _from: &Address, _to: &Address, _data: &[u8], block: u64) -> Option<Vec<u8>> {
            assert_eq!(block, 16);
            self.revert.clone()
        }
    }

    struct Prompt {
        answer: bool,
        asked: AtomicBool,
        seen: Mutex<Option<EmergencyNotice>>,
    }

    impl Prompt {
        fn answering(answer: bool) -> Self {
            Self {
                answer,
                asked: AtomicBool::new(false),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ConfirmationPrompt for Prompt {
        async fn confirm(&self, notice: &EmergencyNotice) -> bool {
            self.asked.store(true, Ordering::SeqCst);
            *self.seen.lock() = Some(notice.clone());
            self.answer
        }
    }

    fn config() -> StakingConfig {
        let mut config = StakingConfig::new(
            Address::repeat_byte(0x5f),
            Address::repeat_byte(0x70),
            "http://127.0.0.1:9/graphql",
            "http://127.0.0.1:9",
            "ws://127.0.0.1:9",
        );
        config.receipt_poll_interval = Duration::from_millis(5);
        config.confirmation_timeout = Duration::from_millis(500);
        config
    }

    fn gateway(wallet: Arc<FakeWallet>, chain: FakeChain) -> ActionGateway {
        ActionGateway::new(&config(), wallet, Arc::new(chain))
    }

    fn error_string(reason: &str) -> Vec<u8> {
        Revert {
            reason: reason.to_string(),
        }
        .abi_encode()
    }

    #[tokio::test]
    async fn test_bad_amounts_never_reach_the_wallet() {
        let wallet = Arc::new(FakeWallet::connected());
        let gateway = gateway(wallet.clone(), FakeChain::mined(1));

        for input in ["0", "abc", "-1", "", "  ", "0.000", "1e5", "NaN"] {
            let outcome = gateway.stake(input).await;
            assert!(
                matches!(outcome, ActionOutcome::Aborted(AbortCause::Validation(_))),
                "{:?} -> {:?}",
                input,
                outcome
            );
        }
        assert!(matches!(
            gateway.withdraw("1.0000000000000000001").await,
            ActionOutcome::Aborted(AbortCause::Validation(ValidationError::TooManyDecimals { max: 18 }))
        ));
        assert_eq!(wallet.sends(), 0);
    }

    #[tokio::test]
    async fn test_disconnected_and_unconfigured() {
        let wallet = Arc::new(FakeWallet {
            account: None,
            ..FakeWallet::connected()
        });
        let gateway = gateway(wallet.clone(), FakeChain::mined(1));
        assert_eq!(
            gateway.claim_rewards().await,
            ActionOutcome::Aborted(AbortCause::Validation(ValidationError::NotConnected))
        );

        let wallet = Arc::new(FakeWallet::connected());
        let mut config = config();
        config.staking_token = Address::ZERO;
        let gateway = ActionGateway::new(&config, wallet.clone(), Arc::new(FakeChain::mined(1)));
        assert_eq!(
            gateway.approve("10").await,
            ActionOutcome::Aborted(AbortCause::Configuration(ConfigurationError::Missing(ENV_STAKING_TOKEN)))
        );
        assert_eq!(wallet.sends(), 0);
    }

    #[tokio::test]
    async fn test_stake_success_encodes_and_refreshes() {
        let wallet = Arc::new(FakeWallet::connected());
        let (tx, mut inputs) = mpsc::unbounded_channel();
        let gateway = gateway(wallet.clone(), FakeChain::mined(1)).with_refresh(RefreshHandle::attached(tx));

        let outcome = gateway.stake("1.5").await;
        assert_eq!(outcome, ActionOutcome::Success { tx_hash: HASH });
        assert!(matches!(inputs.try_recv(), Ok(EngineInput::Refresh)));

        let sent = wallet.sent.lock();
        let (from, to, data) = &sent[0];
        assert_eq!(*from, Address::repeat_byte(0xaa));
        assert_eq!(*to, Address::repeat_byte(0x5f));
        let call = IStakingPool::stakeCall::abi_decode(data, true).unwrap();
        assert_eq!(call.amount, U256::from(1_500_000_000_000_000_000u64));
    }

    #[tokio::test]
    async fn test_approve_targets_token_with_contract_as_spender() {
        let wallet = Arc::new(FakeWallet::connected());
        let gateway = gateway(wallet.clone(), FakeChain::mined(1));
        assert!(gateway.approve("10000").await.is_success());

        let sent = wallet.sent.lock();
        let (_, to, data) = &sent[0];
        assert_eq!(*to, Address::repeat_byte(0x70));
        let call = IERC20::approveCall::abi_decode(data, true).unwrap();
        assert_eq!(call.spender, Address::repeat_byte(0x5f));
        assert_eq!(call.amount, tokens(10_000));
    }

    #[tokio::test]
    async fn test_declined_emergency_withdraw_submits_nothing() {
        let wallet = Arc::new(FakeWallet::connected());
        let gateway = gateway(wallet.clone(), FakeChain::mined(1));
        let prompt = Prompt::answering(false);
        let protocol = ProtocolAggregate {
            emergency_withdraw_penalty_bps: Some(5_000),
            ..ProtocolAggregate::default()
        };

        let outcome = gateway.emergency_withdraw(&prompt, &protocol).await;
        assert_eq!(outcome, ActionOutcome::Aborted(AbortCause::UserDeclined));
        assert!(prompt.asked.load(Ordering::SeqCst));
        assert_eq!(prompt.seen.lock().as_ref().unwrap().penalty_bps, Some(5_000));
        assert_eq!(wallet.sends(), 0);
    }

    #[tokio::test]
    async fn test_reverted_emergency_withdraw_leaves_position_untouched() {
        let me = Address::repeat_byte(0xaa);
        let mut engine = ReconciliationEngine::new();
        engine.activate(me);
        let mut polled = Polled::default();
        polled.apply(Ok(stakes(vec![position("p1", tokens(10_000), 500, T0, T0 + 7 * DAY)])), T0);
        engine.apply(EngineInput::UserStakes { account: me, state: polled }, T0 + DAY);
        let before = engine.state().clone();
        assert!(before.view().is_some_and(|view| view.has_stake));

        let wallet = Arc::new(FakeWallet::connected());
        let chain = FakeChain {
            revert: Some(error_string("Staking is paused")),
            ..FakeChain::mined(0)
        };
        let (tx, mut inputs) = mpsc::unbounded_channel();
        let gateway = gateway(wallet.clone(), chain).with_refresh(RefreshHandle::attached(tx));
        let prompt = Prompt::answering(true);

        let outcome = gateway.emergency_withdraw(&prompt, &ProtocolAggregate::default()).await;
        let ActionOutcome::Reverted(revert) = &outcome else { panic!("expected a revert, got {:?}", outcome) };
        assert_eq!(revert.tx_hash, HASH);
        assert!(revert.reason.as_deref().is_some_and(|r| r.contains("Staking is paused")));
        assert_eq!(wallet.sends(), 1);
        assert_eq!(prompt.seen.lock().as_ref().unwrap().penalty_bps, None);

        // Nothing reaches the engine, so the view cannot change
        while let Ok(input) = inputs.try_recv() {
            engine.apply(input, T0 + DAY);
        }
        assert_eq!(engine.state(), &before);
    }

    #[tokio::test]
    async fn test_receipt_without_status_is_not_a_revert() {
        let wallet = Arc::new(FakeWallet::connected());
        let chain = FakeChain {
            status: Some(None),
            revert: Some(error_string("should not be asked")),
            ..FakeChain::mined(1)
        };
        let (tx, mut inputs) = mpsc::unbounded_channel();
        let gateway = gateway(wallet, chain).with_refresh(RefreshHandle::attached(tx));

        let outcome = gateway.claim_rewards().await;
        assert_eq!(outcome, ActionOutcome::Aborted(AbortCause::StatusUnknown { tx_hash: HASH }));
        assert_eq!(outcome.tx_hash(), Some(HASH));
        assert!(matches!(inputs.try_recv(), Ok(EngineInput::Refresh)));
    }

    #[tokio::test]
    async fn test_never_confirmed() {
        let wallet = Arc::new(FakeWallet::connected());
        let chain = FakeChain {
            status: None,
            ..FakeChain::mined(1)
        };
        let gateway = gateway(wallet, chain);
        assert_eq!(
            gateway.claim_rewards().await,
            ActionOutcome::Aborted(AbortCause::NotConfirmed { tx_hash: HASH })
        );
    }

    #[tokio::test]
    async fn test_wallet_unavailable() {
        let wallet = Arc::new(FakeWallet {
            fail_with: Some(AbortCause::Connectivity(ConnectivityError::WalletUnavailable("locked".into()))),
            ..FakeWallet::connected()
        });
        let gateway = gateway(wallet, FakeChain::mined(1));
        assert!(matches!(
            gateway.withdraw("1").await,
            ActionOutcome::Aborted(AbortCause::Connectivity(_))
        ));
    }
}
