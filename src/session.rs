// src/session.rs
//! Async orchestration for one tracked account.
//!
//! A session owns the task set feeding the engine: the event subscriber, the
//! two indexer pollers, the tick timer and the engine loop itself. All of
//! them share one shutdown signal. Views are published on a watch channel.

use alloy_primitives::Address;
use chrono::Utc;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{address_key, StakingConfig};
use crate::contract::{ContractReader, SnapshotSource};
use crate::error::QueryError;
use crate::events::EventSubscriber;
use crate::indexer::{IndexedQueryClient, IndexerSource, Polled, RecentActivity, UserHistory};
use crate::reconcile::{Effect, EngineInput, ReconciliationEngine, ViewState};

type InputSender = mpsc::UnboundedSender<EngineInput>;

/// How long `stop` waits for tasks to wind down before aborting them
const STOP_GRACE: Duration = Duration::from_secs(3);

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Cloneable way to ask the running session for a fresh read
#[derive(Clone, Default)]
pub struct RefreshHandle {
    inputs: Arc<Mutex<Option<InputSender>>>,
}

impl RefreshHandle {
    /// Returns false when no account is being tracked
    pub fn refresh(&self) -> bool {
        match &*self.inputs.lock() {
            Some(tx) => tx.send(EngineInput::Refresh).is_ok(),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn attached(tx: InputSender) -> Self {
        Self {
            inputs: Arc::new(Mutex::new(Some(tx))),
        }
    }
}

struct ActiveTasks {
    account: Address,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

pub struct StakingSession {
    config: StakingConfig,
    snapshots: Arc<dyn SnapshotSource>,
    indexer: Arc<dyn IndexerSource>,
    subscriber: Arc<EventSubscriber>,
    view_tx: watch::Sender<ViewState>,
    refresh: RefreshHandle,
    active: Option<ActiveTasks>,
}

impl StakingSession {
    pub fn new(config: StakingConfig) -> Self {
        let snapshots = Arc::new(ContractReader::new(&config));
        let indexer = Arc::new(IndexedQueryClient::from_config(&config));
        let subscriber = EventSubscriber::new(&config);
        Self::with_sources(config, snapshots, indexer, subscriber)
    }

    pub fn with_sources(
        config: StakingConfig,
        snapshots: Arc<dyn SnapshotSource>,
        indexer: Arc<dyn IndexerSource>,
        subscriber: EventSubscriber,
    ) -> Self {
        let (view_tx, _) = watch::channel(ViewState::Empty);
        Self {
            config,
            snapshots,
            indexer,
            subscriber: Arc::new(subscriber),
            view_tx,
            refresh: RefreshHandle::default(),
            active: None,
        }
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ViewState> {
        self.view_tx.subscribe()
    }

    pub fn current_view(&self) -> ViewState {
        self.view_tx.borrow().clone()
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }

    pub fn account(&self) -> Option<Address> {
        self.active.as_ref().map(|a| a.account)
    }

    /// Indexed event history of `account`, one request per call. Works with
    /// or without an active watch.
    pub async fn user_history(&self, account: Address) -> Result<UserHistory, QueryError> {
        match address_key(&account) {
            Some(key) => self.indexer.fetch_user_history(&key).await,
            None => Ok(UserHistory::default()),
        }
    }

    pub async fn recent_activity(&self, limit: u32) -> Result<RecentActivity, QueryError> {
        self.indexer.fetch_recent_activity(limit).await
    }

    /// Track `account`. Whatever was tracked before is fully stopped first,
    /// subscriptions included.
    pub async fn watch(&mut self, account: Address) {
        self.stop().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let nudge = Arc::new(Notify::new());
        let mut handles = Vec::with_capacity(5);

        let engine = ReconciliationEngine::new().with_penalty_override(self.config.emergency_penalty_bps);
        handles.push(tokio::spawn(run_engine(
            engine,
            account,
            rx,
            tx.clone(),
            self.view_tx.clone(),
            self.snapshots.clone(),
            nudge.clone(),
            shutdown_rx.clone(),
        )));

        {
            let subscriber = self.subscriber.clone();
            let tx = tx.clone();
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move { subscriber.run(account, tx, shutdown).await }));
        }

        match address_key(&account) {
            Some(key) => {
                let indexer = self.indexer.clone();
                let tx = tx.clone();
                handles.push(tokio::spawn(poll_loop(
                    self.config.user_poll_interval,
                    Some(nudge),
                    shutdown_rx.clone(),
                    move || {
                        let indexer = indexer.clone();
                        let key = key.clone();
                        async move { indexer.fetch_user_stakes(&key).await }
                    },
                    move |state| tx.send(EngineInput::UserStakes { account, state }).is_ok(),
                )));
            }
            None => log::warn!("No indexer key for {}; positions will not be polled", account),
        }

        match self.config.contract_key() {
            Some(key) => {
                let indexer = self.indexer.clone();
                let tx = tx.clone();
                handles.push(tokio::spawn(poll_loop(
                    self.config.protocol_poll_interval,
                    None,
                    shutdown_rx.clone(),
                    move || {
                        let indexer = indexer.clone();
                        let key = key.clone();
                        async move { indexer.fetch_protocol_stats(&key).await }
                    },
                    move |state| tx.send(EngineInput::ProtocolStats(state)).is_ok(),
                )));
            }
            None => log::warn!("Staking contract not configured; protocol stats will not be polled"),
        }

        handles.push(tokio::spawn(run_ticker(self.config.tick_interval, tx.clone(), shutdown_rx)));

        *self.refresh.inputs.lock() = Some(tx);
        self.active = Some(ActiveTasks {
            account,
            shutdown: shutdown_tx,
            handles,
        });
    }

    /// Signal every task, wait for the subscriber to release its
    /// subscriptions, then join the rest. Tasks still running after
    /// `STOP_GRACE` are aborted.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        *self.refresh.inputs.lock() = None;
        let _ = active.shutdown.send(true);

        let deadline = Instant::now() + STOP_GRACE;
        for mut handle in active.handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => log::error!("Session task for {} ended abnormally: {}", active.account, e),
                Err(_) => {
                    log::warn!("Session task for {} still running after {:?}; aborting", active.account, STOP_GRACE);
                    handle.abort();
                }
            }
        }
        self.view_tx.send_replace(ViewState::Empty);
        log::info!("Session for {} stopped", active.account);
    }
}

impl Drop for StakingSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.shutdown.send(true);
            for handle in active.handles {
                handle.abort();
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_engine(
    mut engine: ReconciliationEngine,
    account: Address,
    mut rx: mpsc::UnboundedReceiver<EngineInput>,
    tx: InputSender,
    view_tx: watch::Sender<ViewState>,
    snapshots: Arc<dyn SnapshotSource>,
    nudge: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let effects = engine.activate(account);
    view_tx.send_replace(engine.state().clone());
    execute(effects, &tx, &snapshots, &nudge);

    loop {
        let input = tokio::select! {
            _ = shutdown.changed() => break,
            input = rx.recv() => match input {
                Some(input) => input,
                None => break,
            },
        };
        let effects = engine.apply(input, now());
        view_tx.send_replace(engine.state().clone());
        execute(effects, &tx, &snapshots, &nudge);
    }
}

fn execute(effects: Vec<Effect>, tx: &InputSender, snapshots: &Arc<dyn SnapshotSource>, nudge: &Notify) {
    for effect in effects {
        match effect {
            Effect::FetchSnapshot(account) => {
                let snapshots = snapshots.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = snapshots.fetch_snapshot(account).await;
                    // A closed channel means the session moved on
                    let _ = tx.send(EngineInput::Snapshot { account, result });
                });
            }
            Effect::PollPositions => nudge.notify_one(),
        }
    }
}

/// Run `fetch` every `every`, or sooner when `nudge` fires, and hand each
/// last-good state to `emit`. With a nudge the first run waits for it.
async fn poll_loop<T, F, Fut, E>(
    every: Duration,
    nudge: Option<Arc<Notify>>,
    mut shutdown: watch::Receiver<bool>,
    fetch: F,
    emit: E,
) where
    T: Clone + Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send,
    E: Fn(Polled<T>) -> bool + Send + 'static,
{
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if nudge.is_some() {
        interval.tick().await;
    }

    let mut state = Polled::default();
    loop {
        match &nudge {
            Some(nudge) => tokio::select! {
                _ = shutdown.changed() => return,
                _ = interval.tick() => {}
                _ = nudge.notified() => interval.reset(),
            },
            None => tokio::select! {
                _ = shutdown.changed() => return,
                _ = interval.tick() => {}
            },
        }

        let result = tokio::select! {
            _ = shutdown.changed() => return,
            result = fetch() => result,
        };
        state.apply(result, now());
        if !emit(state.clone()) {
            return;
        }
    }
}

async fn run_ticker(every: Duration, tx: InputSender, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = interval.tick() => {
                if tx.send(EngineInput::Tick).is_err() {
                    return;
                }
            }
        }
    }
}
