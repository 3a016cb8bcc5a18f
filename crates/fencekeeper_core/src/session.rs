//! Session lifecycle.
//!
//! A [`Session`] wraps one store session and keeps it usable across
//! transient network loss:
//!
//! ```text
//! Connecting -> Connected <-> Suspended
//!                   \            /
//!                    -> Closed <-
//! ```
//!
//! A background heartbeat probes the store every
//! [`Config::heartbeat_interval`]. A failed probe (or a failed call)
//! suspends the session; a successful probe resumes it. If the store expired
//! the underlying session, the heartbeat opens a new one with the same
//! credentials while the [`Session`] handle, and its id, stay the same.

use crate::config::{Config, SuspendedPolicy};
use crate::error::{CoordError, CoordResult, OpKind};
use crate::identity::{Identity, IdentityBinding, IdentityProvider};
use fencekeeper_store::{
    ClientConfig, ConnectRequest, CoordinationStore, LoginEntry, SessionId, StoreError,
    StoreResult, ENABLE_CLIENT_SASL_KEY, LOGIN_CONTEXT_NAME_KEY, SERVICE_NAME_KEY,
};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Liveness state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The first connection attempt is in progress.
    Connecting,
    /// The store is reachable and the session is live.
    Connected,
    /// Connectivity was lost; waiting for it to come back.
    Suspended,
    /// The session was closed; every call fails.
    Closed,
}

impl SessionState {
    /// Returns true if calls can be issued right now.
    pub fn is_usable(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

struct SessionInner {
    id: Uuid,
    store: Arc<dyn CoordinationStore>,
    config: Config,
    request: ConnectRequest,
    store_session: RwLock<SessionId>,
    state: Mutex<SessionState>,
    state_changed: Condvar,
    binding: Mutex<Option<IdentityBinding>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInner {
    fn transition(&self, from: &[SessionState], to: SessionState) -> bool {
        let mut state = self.state.lock();
        if !from.contains(&*state) {
            return false;
        }
        let previous = std::mem::replace(&mut *state, to);
        self.state_changed.notify_all();
        drop(state);

        match to {
            SessionState::Suspended => warn!(session = %self.id, ?previous, "session suspended"),
            SessionState::Connected => info!(session = %self.id, ?previous, "session resumed"),
            _ => debug!(session = %self.id, ?previous, ?to, "session state changed"),
        }
        true
    }

    fn suspend(&self) {
        self.transition(&[SessionState::Connected], SessionState::Suspended);
    }

    /// One heartbeat tick: probe the store and update the state.
    fn probe(&self) {
        let sid = *self.store_session.read();
        match self.store.ping(sid) {
            Ok(()) => {
                self.transition(
                    &[SessionState::Suspended, SessionState::Connecting],
                    SessionState::Connected,
                );
            }
            Err(StoreError::SessionExpired) | Err(StoreError::Closed) => {
                self.suspend();
                self.reestablish(sid);
            }
            Err(err) => {
                debug!(session = %self.id, error = %err, "heartbeat failed");
                self.suspend();
            }
        }
    }

    /// Replaces an expired store session, keeping this session's identity.
    fn reestablish(&self, expired: SessionId) {
        let fresh = match self.store.connect(&self.request) {
            Ok(fresh) => fresh,
            Err(err) => {
                debug!(session = %self.id, error = %err, "reconnect attempt failed");
                return;
            }
        };

        let mut state = self.state.lock();
        if *state == SessionState::Closed {
            drop(state);
            let _ = self.store.close_session(fresh);
            return;
        }
        *self.store_session.write() = fresh;
        *state = SessionState::Connected;
        self.state_changed.notify_all();
        drop(state);

        let _ = self.store.close_session(expired);
        info!(session = %self.id, old = %expired, new = %fresh, "store session re-established");
    }

    /// Blocks until the session is connected, honouring the suspended policy.
    fn wait_connected(&self, op: OpKind, path: &str) -> CoordResult<SessionId> {
        let mut state = self.state.lock();
        let mut deadline: Option<Option<Instant>> = None;
        loop {
            match *state {
                SessionState::Connected => return Ok(*self.store_session.read()),
                SessionState::Closed => {
                    return Err(CoordError::SessionClosed {
                        op,
                        path: path.to_string(),
                    })
                }
                SessionState::Connecting | SessionState::Suspended => {
                    let max_wait = match self.config.suspended_policy {
                        SuspendedPolicy::FailFast => Duration::ZERO,
                        SuspendedPolicy::Block(max_wait) => max_wait,
                    };
                    let until = *deadline.get_or_insert_with(|| Instant::now().checked_add(max_wait));
                    match until {
                        Some(until) if Instant::now() >= until => {
                            return Err(CoordError::Unavailable {
                                op,
                                path: path.to_string(),
                                waited: max_wait,
                            });
                        }
                        Some(until) => {
                            self.state_changed.wait_until(&mut state, until);
                        }
                        // Wait too long to represent: block until the state changes.
                        None => self.state_changed.wait(&mut state),
                    }
                }
            }
        }
    }

    fn is_closed(&self) -> bool {
        *self.state.lock() == SessionState::Closed
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if *self.state.get_mut() != SessionState::Closed {
            let _ = self.store.close_session(*self.store_session.get_mut());
            debug!(session = %self.id, "session dropped without close");
        }
    }
}

/// A handle to one live session with the coordination store.
///
/// Cloning a `Session` yields another handle to the same session, so
/// several callers can share it. Sessions started separately never share
/// state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("connect_string", &self.inner.config.connect_string)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Returns the session's id, stable across reconnects.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Returns true if the session is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Returns true if the session was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Returns the configuration the session was started with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the connect string.
    #[must_use]
    pub fn connect_string(&self) -> &str {
        &self.inner.config.connect_string
    }

    /// Returns the session timeout.
    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        self.inner.config.session_timeout
    }

    /// Returns the id of the current underlying store session.
    #[must_use]
    pub fn store_session_id(&self) -> SessionId {
        *self.inner.store_session.read()
    }

    /// Returns the client properties the session connected with.
    #[must_use]
    pub fn client_config(&self) -> &ClientConfig {
        &self.inner.request.client_config
    }

    /// Returns the login context name the session authenticates with.
    #[must_use]
    pub fn login_context_name(&self) -> Option<&str> {
        self.inner.request.client_config.login_context_name()
    }

    /// Looks up the login material behind the session's login context.
    #[must_use]
    pub fn login_entry(&self) -> Option<LoginEntry> {
        self.inner
            .binding
            .lock()
            .as_ref()
            .and_then(IdentityBinding::entry)
    }

    /// Returns the underlying store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.inner.store
    }

    /// Blocks until the session is connected or `timeout` elapses.
    ///
    /// Returns true if the session is connected.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();
        while *state != SessionState::Connected {
            if *state == SessionState::Closed {
                return false;
            }
            match deadline {
                Some(deadline) => {
                    if self.inner.state_changed.wait_until(&mut state, deadline).timed_out() {
                        return *state == SessionState::Connected;
                    }
                }
                None => self.inner.state_changed.wait(&mut state),
            }
        }
        true
    }

    /// Closes the session.
    ///
    /// Calls blocked on reconnection fail with `SessionClosed`. Closing an
    /// already closed session does nothing.
    pub fn close(&self) {
        let sid = {
            let mut state = self.inner.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
            self.inner.state_changed.notify_all();
            *self.inner.store_session.read()
        };

        if let Err(err) = self.inner.store.close_session(sid) {
            debug!(session = %self.inner.id, error = %err, "store close failed");
        }
        self.inner.binding.lock().take();

        let heartbeat = self.inner.heartbeat.lock().take();
        if let Some(handle) = heartbeat {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        info!(session = %self.inner.id, "session closed");
    }

    /// Runs one store call once the session is connected.
    ///
    /// The outer result carries session-level failures (closed, unavailable,
    /// connection loss); the inner one carries the store's answer.
    pub(crate) fn call_raw<T>(
        &self,
        op: OpKind,
        path: &str,
        f: impl FnOnce(&dyn CoordinationStore, SessionId) -> StoreResult<T>,
    ) -> CoordResult<StoreResult<T>> {
        let sid = self.inner.wait_connected(op, path)?;
        match f(self.inner.store.as_ref(), sid) {
            Err(err) if err.is_transient() => {
                self.inner.suspend();
                Err(CoordError::from_store(op, path, err))
            }
            Err(StoreError::Closed) => {
                if self.is_closed() {
                    Err(CoordError::SessionClosed {
                        op,
                        path: path.to_string(),
                    })
                } else {
                    self.inner.suspend();
                    Err(CoordError::from_store(op, path, StoreError::SessionExpired))
                }
            }
            other => Ok(other),
        }
    }

    /// Runs one store call, mapping every failure to a [`CoordError`].
    pub(crate) fn call<T>(
        &self,
        op: OpKind,
        path: &str,
        f: impl FnOnce(&dyn CoordinationStore, SessionId) -> StoreResult<T>,
    ) -> CoordResult<T> {
        self.call_raw(op, path, f)?
            .map_err(|err| CoordError::from_store(op, path, err))
    }
}

/// Starts and closes sessions against one store.
///
/// The manager is stateless across sessions: starting two sessions never
/// serializes on anything but the identity registry insert.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CoordinationStore>,
    identities: IdentityProvider,
}

impl SessionManager {
    /// Creates a manager registering identities in the process-wide registry.
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self::with_identity_provider(store, IdentityProvider::global())
    }

    /// Creates a manager with a specific identity provider.
    pub fn with_identity_provider(
        store: Arc<dyn CoordinationStore>,
        identities: IdentityProvider,
    ) -> Self {
        Self { store, identities }
    }

    /// Returns the identity provider.
    #[must_use]
    pub fn identity_provider(&self) -> &IdentityProvider {
        &self.identities
    }

    /// Starts a session, authenticating as `identity` if given.
    ///
    /// Connection attempts are repeated with backoff until
    /// [`Config::connection_timeout`] elapses.
    ///
    /// # Errors
    ///
    /// Returns `Connect` if the store stays unreachable, `AuthFailed` if the
    /// store rejects the credentials, and `InvalidState` for an incomplete
    /// identity.
    pub fn start(&self, config: &Config, identity: Option<&Identity>) -> CoordResult<Session> {
        let binding = identity.map(|id| self.identities.bind(id)).transpose()?;

        let mut client_config = ClientConfig::new();
        if let Some(binding) = &binding {
            client_config.set_property(ENABLE_CLIENT_SASL_KEY, "true");
            client_config.set_property(LOGIN_CONTEXT_NAME_KEY, binding.context_name());
            client_config.set_property(SERVICE_NAME_KEY, binding.service_name());
        }
        let request = ConnectRequest::new(config.connect_string.clone(), config.session_timeout)
            .with_client_config(client_config)
            .with_auth(config.auth.clone());

        let store_session = self.connect(config, &request)?;

        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            store: Arc::clone(&self.store),
            config: config.clone(),
            request,
            store_session: RwLock::new(store_session),
            state: Mutex::new(SessionState::Connected),
            state_changed: Condvar::new(),
            binding: Mutex::new(binding),
            heartbeat: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let handle = thread::Builder::new()
            .name(format!("fencekeeper-heartbeat-{}", inner.id))
            .spawn(move || heartbeat_loop(weak))
            .map_err(|err| CoordError::Connect {
                connect_string: config.connect_string.clone(),
                reason: format!("cannot spawn heartbeat thread: {err}"),
            })?;
        *inner.heartbeat.lock() = Some(handle);

        info!(
            session = %inner.id,
            store_session = %store_session,
            connect_string = %config.connect_string,
            context = ?inner.request.client_config.login_context_name(),
            "session started"
        );
        Ok(Session { inner })
    }

    /// Closes a session. Idempotent.
    pub fn close(&self, session: &Session) {
        session.close();
    }

    fn connect(&self, config: &Config, request: &ConnectRequest) -> CoordResult<SessionId> {
        // `None` when the timeout is too large to represent; retry until connected.
        let deadline = Instant::now().checked_add(config.connection_timeout);
        let mut attempt = 0u32;
        loop {
            match self.store.connect(request) {
                Ok(sid) => return Ok(sid),
                Err(StoreError::AuthFailed(reason)) => {
                    return Err(CoordError::AuthFailed {
                        connect_string: config.connect_string.clone(),
                        reason,
                    })
                }
                Err(err) => {
                    let now = Instant::now();
                    let remaining = deadline.map(|d| d.saturating_duration_since(now));
                    if remaining == Some(Duration::ZERO) {
                        return Err(CoordError::Connect {
                            connect_string: config.connect_string.clone(),
                            reason: err.to_string(),
                        });
                    }
                    attempt += 1;
                    let delay = config
                        .retry
                        .delay_for_attempt(attempt)
                        .max(Duration::from_millis(10))
                        .min(remaining.unwrap_or(Duration::MAX));
                    debug!(attempt, ?delay, error = %err, "connect attempt failed");
                    thread::sleep(delay);
                }
            }
        }
    }
}

fn heartbeat_loop(session: Weak<SessionInner>) {
    loop {
        let Some(inner) = session.upgrade() else {
            return;
        };
        {
            let mut state = inner.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            let interval = inner.config.heartbeat_interval();
            inner.state_changed.wait_for(&mut state, interval);
            if *state == SessionState::Closed {
                return;
            }
        }
        inner.probe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fencekeeper_store::{InMemoryStore, LoginRegistry};

    fn setup() -> (Arc<InMemoryStore>, SessionManager, Config) {
        let registry = Arc::new(LoginRegistry::new());
        let store = Arc::new(InMemoryStore::with_login_registry(Arc::clone(&registry)));
        let manager = SessionManager::with_identity_provider(
            store.clone(),
            IdentityProvider::new(registry),
        );
        let config = Config::new(store.connect_string())
            .with_connection_timeout(Duration::from_millis(200))
            .with_heartbeat_interval(Duration::from_millis(10));
        (store, manager, config)
    }

    #[test]
    fn start_connects() {
        let (store, manager, config) = setup();
        let session = manager.start(&config, None).unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert!(store.is_session_alive(session.store_session_id()));
        assert_eq!(session.login_context_name(), None);
    }

    #[test]
    fn start_unreachable_fails_with_connect_error() {
        let (_store, manager, _config) = setup();
        let config = Config::new("192.0.2.1:2181").with_connection_timeout(Duration::from_millis(50));

        let started = Instant::now();
        let result = manager.start(&config, None);
        assert!(matches!(result, Err(CoordError::Connect { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn close_is_idempotent() {
        let (store, manager, config) = setup();
        let session = manager.start(&config, None).unwrap();
        let sid = session.store_session_id();

        manager.close(&session);
        manager.close(&session);
        assert!(session.is_closed());
        assert!(!store.is_session_alive(sid));
    }

    #[test]
    fn calls_after_close_fail() {
        let (_store, manager, config) = setup();
        let session = manager.start(&config, None).unwrap();
        session.close();

        let result = session.call(OpKind::Exists, "/", |store, sid| store.exists(sid, "/"));
        assert!(matches!(result, Err(CoordError::SessionClosed { .. })));
    }

    #[test]
    fn identity_sets_login_context() {
        let (store, manager, config) = setup();
        let identity = Identity::new("foo1", "bar1", "bar1.keytab");
        let session = manager.start(&config, Some(&identity)).unwrap();

        let context = session.login_context_name().unwrap().to_string();
        assert_eq!(session.client_config().property(SERVICE_NAME_KEY), Some("zookeeper"));
        assert_eq!(session.login_entry().unwrap().principal(), Some("bar1"));
        assert_eq!(
            store.session_principal(session.store_session_id()).as_deref(),
            Some("bar1")
        );

        session.close();
        assert!(!manager.identity_provider().registry().contains(&context));
    }

    #[test]
    fn suspend_and_resume() {
        let (store, manager, config) = setup();
        let session = manager.start(&config, None).unwrap();
        let id = session.id();

        store.set_reachable(false);
        let result = session.call(OpKind::Exists, "/", |store, sid| store.exists(sid, "/"));
        assert!(matches!(
            result,
            Err(CoordError::Retryable { .. } | CoordError::Unavailable { .. })
        ));
        assert_eq!(session.state(), SessionState::Suspended);

        store.set_reachable(true);
        assert!(session.wait_connected(Duration::from_secs(2)));
        assert_eq!(session.id(), id);
    }

    #[test]
    fn fail_fast_while_suspended() {
        let (store, manager, config) = setup();
        let config = config
            .with_suspended_policy(SuspendedPolicy::FailFast)
            .with_heartbeat_interval(Duration::from_secs(60));
        let session = manager.start(&config, None).unwrap();

        store.set_reachable(false);
        let _ = session.call(OpKind::Exists, "/", |store, sid| store.exists(sid, "/"));
        let result = session.call(OpKind::Exists, "/", |store, sid| store.exists(sid, "/"));
        assert!(matches!(result, Err(CoordError::Unavailable { .. })));
        session.close();
    }

    #[test]
    fn expired_store_session_is_replaced() {
        let (store, manager, config) = setup();
        let session = manager.start(&config, None).unwrap();
        let old = session.store_session_id();

        store.expire_session(old);
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.store_session_id() == old && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert_ne!(session.store_session_id(), old);
        assert!(session.wait_connected(Duration::from_secs(2)));
        assert!(store.is_session_alive(session.store_session_id()));
    }

    #[test]
    fn close_wakes_blocked_callers() {
        let (store, manager, config) = setup();
        let config = config
            .with_suspended_policy(SuspendedPolicy::Block(Duration::from_secs(30)))
            .with_heartbeat_interval(Duration::from_secs(60));
        let session = manager.start(&config, None).unwrap();

        store.set_reachable(false);
        let _ = session.call(OpKind::Exists, "/", |store, sid| store.exists(sid, "/"));

        let blocked = session.clone();
        let waiter = thread::spawn(move || {
            let started = Instant::now();
            let result = blocked.call(OpKind::GetData, "/a", |store, sid| store.get_data(sid, "/a"));
            (result, started.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        session.close();

        let (result, waited) = waiter.join().unwrap();
        assert!(matches!(result, Err(CoordError::SessionClosed { .. })));
        assert!(waited < Duration::from_secs(10));
    }

    #[test]
    fn unbounded_connection_timeout_connects() {
        let (store, manager, config) = setup();
        let config = config.with_connection_timeout(Duration::MAX);
        let session = manager.start(&config, None).unwrap();
        assert!(store.is_session_alive(session.store_session_id()));
    }

    #[test]
    fn unbounded_block_waits_for_resume() {
        let (store, manager, config) = setup();
        let config = config.with_suspended_policy(SuspendedPolicy::Block(Duration::MAX));
        let session = manager.start(&config, None).unwrap();

        store.set_reachable(false);
        let healer = {
            let store = store.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                store.set_reachable(true);
            })
        };
        let _ = session.call(OpKind::Exists, "/", |store, sid| store.exists(sid, "/"));
        let result = session.call(OpKind::Exists, "/", |store, sid| store.exists(sid, "/"));
        healer.join().unwrap();
        assert!(result.unwrap().is_some());
    }

    #[test]
    fn unbounded_wait_connected() {
        let (store, manager, config) = setup();
        let session = manager.start(&config, None).unwrap();
        assert!(session.wait_connected(Duration::MAX));

        store.set_reachable(false);
        let _ = session.call(OpKind::Exists, "/", |store, sid| store.exists(sid, "/"));
        let healer = {
            let store = store.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                store.set_reachable(true);
            })
        };
        assert!(session.wait_connected(Duration::MAX));
        healer.join().unwrap();
    }

    #[test]
    fn unbounded_wait_returns_on_close() {
        let (store, manager, config) = setup();
        let config = config.with_heartbeat_interval(Duration::from_secs(60));
        let session = manager.start(&config, None).unwrap();
        store.set_reachable(false);
        let _ = session.call(OpKind::Exists, "/", |store, sid| store.exists(sid, "/"));

        let closer = session.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            closer.close();
        });
        assert!(!session.wait_connected(Duration::MAX));
        handle.join().unwrap();
    }
}
