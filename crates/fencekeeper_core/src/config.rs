//! Client configuration.

use fencekeeper_store::{Acl, AuthInfo};
use std::time::Duration;

/// What an operation does while its session is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendedPolicy {
    /// Fail immediately with `Unavailable`.
    FailFast,
    /// Wait up to the given duration for reconnection, then fail with `Unavailable`.
    Block(Duration),
}

/// Configuration for starting a session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Comma separated `host:port` list of store servers.
    pub connect_string: String,
    /// Session timeout negotiated with the store.
    pub session_timeout: Duration,
    /// How long `start` keeps trying to reach the store.
    pub connection_timeout: Duration,
    /// Liveness probe interval; defaults to a third of the session timeout.
    pub heartbeat_interval: Option<Duration>,
    /// Retry policy for transient failures of node operations.
    pub retry: RetryConfig,
    /// ACL applied when a call does not name one.
    pub default_acl: Vec<Acl>,
    /// Scheme auth added to every session.
    pub auth: Vec<AuthInfo>,
    /// Behaviour of calls issued while suspended.
    pub suspended_policy: SuspendedPolicy,
    /// Whether transactions must name a fencing node.
    pub require_fencing: bool,
}

impl Config {
    /// Creates a configuration for the given connect string.
    pub fn new(connect_string: impl Into<String>) -> Self {
        let connection_timeout = Duration::from_secs(15);
        Self {
            connect_string: connect_string.into(),
            session_timeout: Duration::from_secs(10),
            connection_timeout,
            heartbeat_interval: None,
            retry: RetryConfig::default(),
            default_acl: Acl::open_unsafe(),
            auth: Vec::new(),
            suspended_policy: SuspendedPolicy::Block(connection_timeout),
            require_fencing: true,
        }
    }

    /// Sets the session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Sets the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the liveness probe interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the default ACL.
    pub fn with_default_acl(mut self, acl: Vec<Acl>) -> Self {
        self.default_acl = acl;
        self
    }

    /// Sets the scheme auth entries.
    pub fn with_auth(mut self, auth: Vec<AuthInfo>) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the suspended-session policy.
    pub fn with_suspended_policy(mut self, policy: SuspendedPolicy) -> Self {
        self.suspended_policy = policy;
        self
    }

    /// Sets whether transactions must name a fencing node.
    pub fn with_require_fencing(mut self, value: bool) -> Self {
        self.require_fencing = value;
        self
    }

    /// Returns the effective liveness probe interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
            .unwrap_or(self.session_timeout / 3)
            .max(Duration::from_millis(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("localhost:2181")
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets whether delays get jitter.
    pub fn with_jitter(mut self, value: bool) -> Self {
        self.add_jitter = value;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * rand_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Cheap pseudo-random jitter in `[0, 1)` from the clock's sub-second nanos.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
