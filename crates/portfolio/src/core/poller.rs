//! Portfolio poller: re-fetches the watched account on a fixed interval.
//!
//! One task per watched identity source. The task owns the interval timer,
//! runs one fetch at a time, and publishes [`PortfolioState`] on a `watch`
//! channel. Identity comes from a `watch::Receiver<Option<AccountContext>>`;
//! any change drops the in-flight fetch and restarts in `Loading` for the new
//! identity. Results are applied only if the state still belongs to the
//! identity and generation they were fetched for.
//!
//! State machine: `Idle -> Loading -> (Ready | Failed) -> Loading -> ...`,
//! back to `Idle` when the identity becomes `None`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PortfolioConfig;
use crate::constants::FAILURE_ESCALATION_THRESHOLD;
use crate::core::aggregator::build_snapshot;
use crate::core::savings::SavingsApy;
use crate::core::view::ViewState;
use crate::errors::PortfolioError;
use crate::types::{AccountContext, PortfolioSnapshot, RawPortfolioResponse};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Source of raw upstream data for one account.
pub trait PortfolioFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        account: &AccountContext,
    ) -> impl Future<Output = Result<RawPortfolioResponse, PortfolioError>> + Send;
}

/// Everything a poller needs, constructed once and injected.
pub struct AppContext<F> {
    pub config: Arc<PortfolioConfig>,
    pub fetcher: Arc<F>,
    pub savings_apy: SavingsApy,
}

impl<F> Clone for AppContext<F> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            fetcher: Arc::clone(&self.fetcher),
            savings_apy: self.savings_apy.clone(),
        }
    }
}

impl<F: PortfolioFetcher> AppContext<F> {
    /// Fails when the sGHO APY is missing from the savings config.
    pub fn new(config: PortfolioConfig, fetcher: F) -> Result<Self, PortfolioError> {
        let savings_apy = SavingsApy::from_config(&config.savings)?;
        Ok(Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            savings_apy,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.polling.interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Published state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollPhase {
    /// No account to watch.
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Latest `{data, is_loading, error}` for the watched account.
#[derive(Debug, Clone, Default)]
pub struct PortfolioState {
    pub account: Option<AccountContext>,
    pub phase: PollPhase,
    /// Last good snapshot. Kept across failures, cleared on identity change.
    pub data: Option<Arc<PortfolioSnapshot>>,
    pub is_loading: bool,
    pub error: Option<Arc<PortfolioError>>,
    pub consecutive_failures: u32,
    /// Bumped on every identity change.
    pub generation: u64,
}

impl PortfolioState {
    /// The single UI state this maps to.
    pub fn view(&self) -> ViewState<'_> {
        if self.account.is_none() {
            return ViewState::ConnectWallet;
        }
        match (&self.data, &self.error) {
            (Some(snapshot), _) if snapshot.portfolio.is_empty() => ViewState::Empty(snapshot),
            (Some(snapshot), _) => ViewState::Positions(snapshot),
            (None, _) if self.is_loading => ViewState::Loading,
            (None, Some(err)) => ViewState::Error(err),
            (None, None) => ViewState::Loading,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owns a running poller. Dropping it cancels the task.
pub struct PollerHandle {
    state_rx: watch::Receiver<PortfolioState>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Spawn a poller on the current runtime. It stops when `parent` is
    /// cancelled or the handle is dropped.
    pub fn spawn<F: PortfolioFetcher>(
        ctx: AppContext<F>,
        identity: watch::Receiver<Option<AccountContext>>,
        parent: &CancellationToken,
    ) -> Self {
        let shutdown = parent.child_token();
        let (state_tx, state_rx) = watch::channel(PortfolioState::default());
        let poller = PortfolioPoller {
            interval: ctx.poll_interval(),
            ctx,
            identity_rx: identity,
            state_tx,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(poller.run());
        Self {
            state_rx,
            shutdown,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PortfolioState> {
        self.state_rx.clone()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PortfolioState {
        self.state_rx.borrow().clone()
    }

    /// Cancel and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "portfolio poller task ended abnormally");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ---------------------------------------------------------------------------
// Poller task
// ---------------------------------------------------------------------------

enum CycleOutcome {
    Completed,
    IdentityChanged(Option<AccountContext>),
    Shutdown,
}

struct PortfolioPoller<F> {
    ctx: AppContext<F>,
    interval: Duration,
    identity_rx: watch::Receiver<Option<AccountContext>>,
    state_tx: watch::Sender<PortfolioState>,
    shutdown: CancellationToken,
}

impl<F: PortfolioFetcher> PortfolioPoller<F> {
    async fn run(mut self) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "portfolio poller started"
        );

        let mut identity = self.identity_rx.borrow_and_update().clone();
        self.begin_identity(identity.as_ref());

        let mut ticker = new_ticker(self.interval);
        // Cleared once the identity sender is gone; the last identity stays.
        let mut identity_open = true;

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("portfolio poller shutting down");
                    break;
                }
                changed = self.identity_rx.changed(), if identity_open => {
                    if changed.is_err() {
                        debug!("identity source closed, keeping current account");
                        identity_open = false;
                        continue;
                    }
                    let next = self.identity_rx.borrow_and_update().clone();
                    if next != identity {
                        identity = next;
                        self.begin_identity(identity.as_ref());
                        ticker.reset_immediately();
                    }
                }
                _ = ticker.tick(), if identity.is_some() => {
                    let Some(account) = identity.clone() else { continue };
                    match self.cycle(&account, &mut identity_open).await {
                        CycleOutcome::Completed => {}
                        CycleOutcome::IdentityChanged(next) => {
                            identity = next;
                            self.begin_identity(identity.as_ref());
                            ticker.reset_immediately();
                        }
                        CycleOutcome::Shutdown => {
                            info!("portfolio poller shutting down mid-fetch");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// One fetch for `account`. Abandons the fetch if the identity changes or
    /// shutdown is requested before it resolves.
    async fn cycle(&mut self, account: &AccountContext, identity_open: &mut bool) -> CycleOutcome {
        let generation = self.mark_loading();
        let fetcher = Arc::clone(&self.ctx.fetcher);
        let fetch = fetcher.fetch(account);
        tokio::pin!(fetch);

        let result = loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return CycleOutcome::Shutdown,
                changed = self.identity_rx.changed(), if *identity_open => {
                    if changed.is_err() {
                        *identity_open = false;
                        continue;
                    }
                    let next = self.identity_rx.borrow_and_update().clone();
                    if next.as_ref() != Some(account) {
                        debug!(account = %account, "identity changed, dropping in-flight fetch");
                        return CycleOutcome::IdentityChanged(next);
                    }
                }
                result = &mut fetch => break result,
            }
        };

        self.apply(account, generation, result);
        CycleOutcome::Completed
    }

    /// Reset published state for a new identity.
    fn begin_identity(&self, identity: Option<&AccountContext>) {
        self.state_tx.send_modify(|state| {
            let generation = state.generation + 1;
            *state = match identity {
                None => PortfolioState {
                    generation,
                    ..PortfolioState::default()
                },
                Some(account) => PortfolioState {
                    account: Some(account.clone()),
                    phase: PollPhase::Loading,
                    is_loading: true,
                    generation,
                    ..PortfolioState::default()
                },
            };
        });
        match identity {
            Some(account) => info!(account = %account, "watching account"),
            None => info!("no account connected, poller idle"),
        }
    }

    fn mark_loading(&self) -> u64 {
        let mut generation = 0;
        self.state_tx.send_modify(|state| {
            state.phase = PollPhase::Loading;
            state.is_loading = true;
            generation = state.generation;
        });
        generation
    }

    fn apply(
        &self,
        account: &AccountContext,
        generation: u64,
        result: Result<RawPortfolioResponse, PortfolioError>,
    ) {
        let snapshot = result.map(|raw| {
            Arc::new(build_snapshot(
                account.clone(),
                &raw,
                &self.ctx.config.aggregation,
                &self.ctx.savings_apy,
                Utc::now(),
            ))
        });

        self.state_tx.send_if_modified(|state| {
            if state.generation != generation || state.account.as_ref() != Some(account) {
                debug!(account = %account, "discarding result for superseded identity");
                return false;
            }

            state.is_loading = false;
            match snapshot {
                Ok(snapshot) => {
                    debug!(
                        account = %account,
                        supplies = snapshot.portfolio.supplies.len(),
                        borrows = snapshot.portfolio.borrows.len(),
                        "portfolio refreshed"
                    );
                    state.phase = PollPhase::Ready;
                    state.data = Some(snapshot);
                    state.error = None;
                    state.consecutive_failures = 0;
                }
                Err(e) => {
                    state.consecutive_failures += 1;
                    let failures = state.consecutive_failures;
                    if failures >= FAILURE_ESCALATION_THRESHOLD {
                        error!(
                            account = %account,
                            error = %e,
                            consecutive_failures = failures,
                            "portfolio fetch keeps failing"
                        );
                    } else {
                        warn!(
                            account = %account,
                            error = %e,
                            transient = e.is_transient(),
                            consecutive_failures = failures,
                            "portfolio fetch failed, keeping last good data"
                        );
                    }
                    state.phase = PollPhase::Failed;
                    state.error = Some(Arc::new(e));
                }
            }
            true
        });
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
