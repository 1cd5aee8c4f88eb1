//! Poll scheduler and failure accumulator.
//!
//! The scheduler owns the repeating-timer lifecycle: at most one polling task
//! exists at a time, each tick performs exactly one fetch, and the fetch is
//! awaited inside the tick loop so ticks can never overlap even when the
//! network is slower than the interval.

use crate::config::PollerConfig;
use crate::device::status::{DeviceStatus, StatusEvent};
use crate::device::telemetry_client::{FetchError, Reading, TelemetryClient};
use log::{debug, info, warn};
use std::{
    net::Ipv4Addr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

/// Counts consecutive fetch failures and decides status transitions.
pub struct FailureAccumulator {
    consecutive_failures: u32,
    config: PollerConfig,
}

impl FailureAccumulator {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            consecutive_failures: 0,
            config,
        }
    }

    /// Fold one fetch outcome into the counter and produce the status event.
    pub fn observe(&mut self, result: Result<Reading, FetchError>) -> StatusEvent {
        match result {
            Ok(reading) => {
                self.consecutive_failures = 0;
                StatusEvent::FetchSucceeded(reading)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                debug!(
                    "fetch failed ({}/{}): {e}",
                    self.consecutive_failures, self.config.max_failures_before_offline
                );
                StatusEvent::FetchFailed {
                    error: e.to_string(),
                    consecutive_failures: self.consecutive_failures,
                }
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// True once the stop threshold is reached. Resource conservation, not a
    /// hard error: the user must reconfigure to resume polling.
    pub fn should_stop(&self) -> bool {
        self.consecutive_failures >= self.config.max_failures_before_stop
    }
}

struct PollSession {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl PollSession {
    fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

/// Owns the polling task and publishes the reconciled [`DeviceStatus`] on a
/// watch channel.
pub struct DevicePoller<C> {
    client: C,
    config: PollerConfig,
    status_tx: watch::Sender<DeviceStatus>,
    // protects the at-most-one-session invariant; never held across an await
    session: Mutex<Option<PollSession>>,
}

impl<C> DevicePoller<C>
where
    C: TelemetryClient + Clone + Send + Sync + 'static,
{
    pub fn new(client: C, config: PollerConfig) -> Self {
        let (status_tx, _) = watch::channel(DeviceStatus::Unconfigured);

        Self {
            client,
            config,
            status_tx,
            session: Mutex::new(None),
        }
    }

    /// Subscribe to status updates. The receiver always observes a change
    /// within one poll interval of the underlying transition.
    pub fn subscribe(&self) -> watch::Receiver<DeviceStatus> {
        self.status_tx.subscribe()
    }

    /// Current status snapshot.
    pub fn status(&self) -> DeviceStatus {
        self.status_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(PollSession::is_active)
    }

    /// Start polling the given address. No-op when a session is already
    /// active. The first fetch fires immediately, then every poll interval.
    pub fn start(&self, addr: Ipv4Addr) {
        let mut session = self.session.lock().unwrap();

        if session.as_ref().is_some_and(PollSession::is_active) {
            debug!("start: poll session already active");
            return;
        }

        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(poll_loop(
            self.client.clone(),
            addr,
            self.config,
            self.status_tx.clone(),
            Arc::clone(&running),
        ));

        *session = Some(PollSession { handle, running });
        info!("started polling device at {addr}");
    }

    /// Stop polling. Aborting the task drops any in-flight fetch together
    /// with its timeout, so no stale callback can touch the status model.
    /// Idempotent.
    pub fn stop(&self) {
        let mut session = self.session.lock().unwrap();

        match session.take() {
            Some(s) => {
                s.running.store(false, Ordering::SeqCst);
                s.handle.abort();
                info!("stopped polling");
            }
            None => debug!("stop: no active poll session"),
        }
    }

    /// Stop, then start against a (possibly new) address. The new session
    /// gets a fresh failure counter: a fresh address deserves a fresh trust
    /// window.
    pub fn restart(&self, addr: Ipv4Addr) {
        self.stop();
        self.start(addr);
    }

    /// Stop polling and publish `Unconfigured`. Used when the address is
    /// cleared.
    pub fn set_unconfigured(&self) {
        self.stop();
        let next = self
            .status_tx
            .borrow()
            .apply(&StatusEvent::Unconfigured, &self.config);
        let _ = self.status_tx.send(next);
    }
}

async fn poll_loop<C>(
    client: C,
    addr: Ipv4Addr,
    config: PollerConfig,
    status_tx: watch::Sender<DeviceStatus>,
    running: Arc<AtomicBool>,
) where
    C: TelemetryClient,
{
    let mut failures = FailureAccumulator::new(config);
    let mut ticker = interval(config.poll_interval);
    // a fetch outlasting the interval delays the next tick instead of
    // stacking a burst of catch-up ticks
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // the retry window opens as soon as the session starts
    let _ = status_tx.send(DeviceStatus::Connecting);

    loop {
        ticker.tick().await;

        let result = client.fetch_readings(addr).await;
        let event = failures.observe(result);

        let next = {
            let current = status_tx.borrow().clone();
            current.apply(&event, &config)
        };
        let _ = status_tx.send(next);

        if failures.should_stop() {
            warn!(
                "device at {addr} unreachable after {} consecutive failures, polling stopped",
                failures.consecutive_failures()
            );
            running.store(false, Ordering::SeqCst);
            break;
        }
    }
}
