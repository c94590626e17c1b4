//! Connection manager: owns the connectivity state of the inference service.
//!
//! A sweep probes the active endpoint first and, only if that fails, walks the
//! profile's candidates in priority order. The first candidate that answers is
//! promoted. The state flips to disconnected only when every candidate failed.
//!
//! Observers are plain callbacks. Each one is invoked synchronously whenever
//! the connected flag flips, outside of any lock, and a panicking observer is
//! caught and logged without affecting the others. Moving from one live
//! endpoint to another is not a transition; it is logged and visible through
//! [`ConnectionManager::snapshot`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use medassist_core::{ConnectionState, ConnectivitySignal, Endpoint, PlatformProfile};
use serde::Serialize;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::prober::EndpointProber;

/// Callback invoked with the new state on every transition.
pub type StateCallback = dyn Fn(&ConnectionState) + Send + Sync;

// Shortest sweep period; `interval` panics on a zero period.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Current state plus the model list from the last successful probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub models: Vec<String>,
}

/// A registered callback plus the newest generation it has been shown.
struct Observer {
    id: u64,
    callback: Arc<StateCallback>,
    // Generation + 1 of the last delivered state; 0 means nothing delivered yet.
    // Held while the callback runs, so deliveries to one observer never overlap.
    delivered: Mutex<u64>,
}

impl Observer {
    fn new(id: u64, callback: Arc<StateCallback>) -> Self {
        Self {
            id,
            callback,
            delivered: Mutex::new(0),
        }
    }

    /// Invoke the callback unless a newer state was already delivered.
    ///
    /// The callback must not cause a transition of the same manager
    /// synchronously; its own delivery would wait on itself.
    fn deliver(&self, generation: u64, state: &ConnectionState) {
        let mut delivered = lock(&self.delivered);
        let mark = generation + 1;
        if *delivered >= mark {
            debug!(subscription = self.id, generation, "Skipping stale state");
            return;
        }
        *delivered = mark;

        let callback: &StateCallback = &*self.callback;
        if catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
            warn!(subscription = self.id, "Connection observer panicked");
        }
    }
}

#[derive(Default)]
struct Observers {
    next_id: u64,
    entries: Vec<Arc<Observer>>,
}

/// Handle returned by [`ConnectionManager::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    manager: Weak<ConnectionManager>,
}

impl Subscription {
    /// Deregister the callback. No further invocations happen afterwards.
    pub fn unsubscribe(self) {
        if let Some(manager) = self.manager.upgrade() {
            lock(&manager.observers)
                .entries
                .retain(|observer| observer.id != self.id);
            debug!(subscription = self.id, "Observer unsubscribed");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Owns [`ConnectionState`] and runs health sweeps over the profile's endpoints.
pub struct ConnectionManager {
    profile: PlatformProfile,
    prober: EndpointProber,
    snapshot: Mutex<ConnectionSnapshot>,
    // Bumped on every transition, only while `snapshot` is locked.
    generation: AtomicU64,
    observers: Mutex<Observers>,
    sweep_lock: tokio::sync::Mutex<()>,
    monitor: Mutex<Option<CancellationToken>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionManager {
    pub fn new(profile: PlatformProfile, prober: EndpointProber) -> Self {
        Self {
            profile,
            prober,
            snapshot: Mutex::new(ConnectionSnapshot::default()),
            generation: AtomicU64::new(0),
            observers: Mutex::new(Observers::default()),
            sweep_lock: tokio::sync::Mutex::new(()),
            monitor: Mutex::new(None),
        }
    }

    pub const fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.snapshot).state.clone()
    }

    /// Models listed by the last endpoint that answered.
    pub fn models(&self) -> Vec<String> {
        lock(&self.snapshot).models.clone()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        lock(&self.snapshot).clone()
    }

    /// Register a callback.
    ///
    /// The callback runs once immediately with the current state, then on
    /// every transition until the subscription is dropped via `unsubscribe`.
    /// A transition racing with registration is never followed by the older
    /// initial state.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        let (observer, generation, state) = {
            let mut observers = lock(&self.observers);
            let id = observers.next_id;
            observers.next_id += 1;
            let observer = Arc::new(Observer::new(id, Arc::new(callback)));
            observers.entries.push(Arc::clone(&observer));

            let snapshot = lock(&self.snapshot);
            let generation = self.generation.load(Ordering::Acquire);
            (observer, generation, snapshot.state.clone())
        };

        observer.deliver(generation, &state);

        Subscription {
            id: observer.id,
            manager: Arc::downgrade(self),
        }
    }

    /// Run one sweep and return whether the service is reachable.
    ///
    /// Concurrent calls are serialized; a second caller waits for the running
    /// sweep and then performs its own.
    pub async fn check_now(&self) -> bool {
        let _sweep = self.sweep_lock.lock().await;
        let previous = self.state().active_endpoint;
        let deadline = self.profile.probe_timeout();

        if let Some(ref active) = previous {
            let result = self.prober.probe(active, deadline).await;
            if result.alive {
                self.apply(
                    ConnectionState::connected_to(active.clone()),
                    Some(result.models_available),
                );
                return true;
            }
            debug!(endpoint = %active, "Active endpoint failed, sweeping fallbacks");
        }

        for candidate in self.profile.candidates() {
            if previous.as_ref() == Some(&candidate) {
                continue;
            }
            let result = self.prober.probe(&candidate, deadline).await;
            if result.alive {
                info!(endpoint = %candidate, "Promoting endpoint");
                self.apply(
                    ConnectionState::connected_to(candidate),
                    Some(result.models_available),
                );
                return true;
            }
        }

        debug!("No inference endpoint answered");
        let lost = self.state().lost();
        self.apply(lost, None);
        false
    }

    /// Start periodic sweeps. The first sweep runs immediately.
    ///
    /// No-op if already running. Must be called within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let token = {
            let mut monitor = lock(&self.monitor);
            if monitor.is_some() {
                return;
            }
            let token = CancellationToken::new();
            *monitor = Some(token.clone());
            token
        };

        let period = self.profile.health_check_interval().max(MIN_SWEEP_PERIOD);
        let manager = Arc::downgrade(self);
        debug!(interval_ms = self.profile.health_check_interval_ms, "Starting health sweeps");

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        let connected = manager.check_now().await;
                        debug!(connected, "Health sweep finished");
                    }
                    () = token.cancelled() => {
                        debug!("Health sweeps cancelled");
                        break;
                    }
                }
            }
        });
    }

    /// Stop periodic sweeps (e.g. while the host application is hidden).
    pub fn pause(&self) {
        if let Some(token) = lock(&self.monitor).take() {
            token.cancel();
        }
    }

    /// Restart periodic sweeps with a fresh interval and sweep immediately.
    pub fn resume(self: &Arc<Self>) {
        self.pause();
        self.start();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.monitor).is_some()
    }

    /// Store `next` and notify observers if the connected flag flipped.
    fn apply(&self, next: ConnectionState, models: Option<Vec<String>>) {
        let (previous, generation) = {
            let mut snapshot = lock(&self.snapshot);
            if let Some(models) = models {
                snapshot.models = models;
            }
            let previous = std::mem::replace(&mut snapshot.state, next.clone());
            let generation = if previous.connected == next.connected {
                None
            } else {
                Some(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
            };
            (previous, generation)
        };

        match generation {
            Some(generation) => {
                info!(
                    connected = next.connected,
                    endpoint = next.active_endpoint.as_ref().map(Endpoint::as_str),
                    "Connection state changed"
                );
                self.notify(generation, &next);
            }
            None if previous.active_endpoint != next.active_endpoint && next.connected => {
                info!(
                    from = previous.active_endpoint.as_ref().map(Endpoint::as_str),
                    to = next.active_endpoint.as_ref().map(Endpoint::as_str),
                    "Active endpoint switched"
                );
            }
            None => {}
        }
    }

    fn notify(&self, generation: u64, state: &ConnectionState) {
        let observers: Vec<Arc<Observer>> = lock(&self.observers).entries.clone();

        for observer in observers {
            observer.deliver(generation, state);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.pause();
    }
}

impl ConnectivitySignal for ConnectionManager {
    fn report_success(&self, endpoint: &Endpoint) {
        if !self.profile.contains(endpoint) {
            debug!(endpoint = %endpoint, "Ignoring success from unknown endpoint");
            return;
        }
        self.apply(ConnectionState::connected_to(endpoint.clone()), None);
    }

    fn report_failure(&self, endpoint: &Endpoint, error: &str) {
        // The next sweep decides whether the service is gone.
        warn!(endpoint = %endpoint, error, "Requests to endpoint keep failing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use medassist_core::{HostDescriptor, resolve_profile};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const NUMERIC: &str = "http://127.0.0.1:11434";
    const HOSTNAME: &str = "http://localhost:11434";
    const IPV6: &str = "http://[::1]:11434";

    fn ep(url: &str) -> Endpoint {
        Endpoint::new(url)
    }

    fn manager_with(fake: &Arc<FakeTransport>) -> Arc<ConnectionManager> {
        let profile = resolve_profile(&HostDescriptor::new("linux"));
        Arc::new(ConnectionManager::new(
            profile,
            EndpointProber::new(fake.clone()),
        ))
    }

    fn recorder(manager: &Arc<ConnectionManager>) -> (Arc<Mutex<Vec<bool>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = manager.subscribe(move |state| sink.lock().unwrap().push(state.connected));
        (seen, sub)
    }

    #[tokio::test]
    async fn test_connects_to_first_alive_candidate() {
        let fake = Arc::new(
            FakeTransport::new()
                .with_alive(&ep(HOSTNAME), &["mistral:7b"])
                .with_alive(&ep(IPV6), &[]),
        );
        let manager = manager_with(&fake);

        assert!(manager.check_now().await);
        let snapshot = manager.snapshot();
        assert!(snapshot.state.connected);
        assert_eq!(snapshot.state.active_endpoint, Some(ep(HOSTNAME)));
        assert_eq!(snapshot.models, vec!["mistral:7b"]);
        // Priority order: numeric loopback was tried first
        assert_eq!(fake.pings()[0], ep(NUMERIC));
    }

    #[tokio::test]
    async fn test_nothing_alive_stays_disconnected() {
        let fake = Arc::new(FakeTransport::new());
        let manager = manager_with(&fake);
        let (seen, _sub) = recorder(&manager);

        assert!(!manager.check_now().await);
        assert_eq!(manager.state(), ConnectionState::disconnected());
        // Only the initial invocation: disconnected -> disconnected is no transition
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_fast_path_probes_active_endpoint_only() {
        let fake = Arc::new(
            FakeTransport::new()
                .with_alive(&ep(NUMERIC), &[])
                .with_alive(&ep(HOSTNAME), &[]),
        );
        let manager = manager_with(&fake);
        assert!(manager.check_now().await);
        fake.clear_pings();

        assert!(manager.check_now().await);
        assert_eq!(fake.pings(), vec![ep(NUMERIC)]);
    }

    #[tokio::test]
    async fn test_active_failure_with_alive_fallback_stays_connected() {
        let fake = Arc::new(
            FakeTransport::new()
                .with_alive(&ep(NUMERIC), &[])
                .with_alive(&ep(HOSTNAME), &[]),
        );
        let manager = manager_with(&fake);
        assert!(manager.check_now().await);
        let (seen, _sub) = recorder(&manager);

        fake.set_dead(&ep(NUMERIC));
        assert!(manager.check_now().await);

        let state = manager.state();
        assert!(state.connected);
        assert_eq!(state.active_endpoint, Some(ep(HOSTNAME)));
        // Promotion between live endpoints is not a transition
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_success_on_other_endpoint_does_not_notify() {
        let fake = Arc::new(FakeTransport::new().with_alive(&ep(NUMERIC), &[]));
        let manager = manager_with(&fake);
        assert!(manager.check_now().await);
        let (seen, _sub) = recorder(&manager);

        manager.report_success(&ep(HOSTNAME));

        assert_eq!(manager.state().active_endpoint, Some(ep(HOSTNAME)));
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_stale_state_is_not_delivered_after_newer_one() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer = Observer::new(
            7,
            Arc::new(move |state: &ConnectionState| sink.lock().unwrap().push(state.connected)),
        );

        // A transition lands before the initial call made at registration
        observer.deliver(1, &ConnectionState::connected_to(ep(NUMERIC)));
        observer.deliver(0, &ConnectionState::disconnected());
        observer.deliver(1, &ConnectionState::connected_to(ep(NUMERIC)));

        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_total_failure_disconnects_and_keeps_last_endpoint() {
        let fake = Arc::new(FakeTransport::new().with_alive(&ep(NUMERIC), &["llama3:8b"]));
        let manager = manager_with(&fake);
        assert!(manager.check_now().await);
        let (seen, _sub) = recorder(&manager);

        fake.set_dead(&ep(NUMERIC));
        assert!(!manager.check_now().await);

        let snapshot = manager.snapshot();
        assert!(!snapshot.state.connected);
        assert_eq!(snapshot.state.active_endpoint, Some(ep(NUMERIC)));
        assert_eq!(snapshot.models, vec!["llama3:8b"]);
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_transition_fires_each_callback_once() {
        let fake = Arc::new(FakeTransport::new().with_alive(&ep(NUMERIC), &[]));
        let manager = manager_with(&fake);
        let (first, _a) = recorder(&manager);
        let (second, _b) = recorder(&manager);

        assert!(manager.check_now().await);
        assert!(manager.check_now().await);

        assert_eq!(*first.lock().unwrap(), vec![false, true]);
        assert_eq!(*second.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_unsubscribe_right_after_subscribe() {
        let fake = Arc::new(FakeTransport::new().with_alive(&ep(NUMERIC), &[]));
        let manager = manager_with(&fake);
        let (seen, sub) = recorder(&manager);
        sub.unsubscribe();

        assert!(manager.check_now().await);
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_panicking_observer_is_isolated() {
        let fake = Arc::new(FakeTransport::new().with_alive(&ep(NUMERIC), &[]));
        let manager = manager_with(&fake);

        let calls = Arc::new(AtomicUsize::new(0));
        let _bad = manager.subscribe(|state| {
            if state.connected {
                panic!("observer bug");
            }
        });
        let counter = Arc::clone(&calls);
        let _good = manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(manager.check_now().await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(manager.state().connected);
    }

    #[tokio::test]
    async fn test_report_success_connects_known_endpoint() {
        let fake = Arc::new(FakeTransport::new());
        let manager = manager_with(&fake);
        let (seen, _sub) = recorder(&manager);

        manager.report_success(&ep("http://10.9.9.9:11434"));
        assert!(!manager.state().connected);

        manager.report_success(&ep(HOSTNAME));
        assert_eq!(manager.state(), ConnectionState::connected_to(ep(HOSTNAME)));
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_report_failure_does_not_flip_state() {
        let fake = Arc::new(FakeTransport::new().with_alive(&ep(NUMERIC), &[]));
        let manager = manager_with(&fake);
        assert!(manager.check_now().await);

        manager.report_failure(&ep(NUMERIC), "connection reset");
        assert!(manager.state().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweeps_pause_and_resume() {
        let fake = Arc::new(FakeTransport::new());
        let manager = manager_with(&fake);
        let interval = manager.profile().health_check_interval();

        manager.start();
        assert!(manager.is_running());
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Immediate first sweep probes all three candidates
        assert_eq!(fake.pings().len(), 3);

        tokio::time::sleep(interval).await;
        assert_eq!(fake.pings().len(), 6);

        manager.pause();
        assert!(!manager.is_running());
        fake.clear_pings();
        tokio::time::sleep(interval * 3).await;
        assert!(fake.pings().is_empty());

        fake.set_alive(&ep(NUMERIC), &[]);
        manager.resume();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(manager.state().connected);
        manager.pause();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_sweeps() {
        let fake = Arc::new(FakeTransport::new());
        let mut profile = resolve_profile(&HostDescriptor::new("linux"));
        profile.health_check_interval_ms = 0;
        let manager = Arc::new(ConnectionManager::new(
            profile,
            EndpointProber::new(fake.clone()),
        ));

        manager.start();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(manager.is_running());
        assert!(fake.pings().len() > 3);
        manager.pause();
    }
}
