//! Node, ACL, session and multi-op types shared by store implementations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Identifier of a store-side session.
///
/// Assigned by the store on connect and never reused while the store runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Creates a session ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Metadata the store keeps for every node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Transaction id that created the node.
    pub czxid: i64,
    /// Transaction id that last modified the node's data.
    pub mzxid: i64,
    /// Creation time (millis since the store started).
    pub ctime: i64,
    /// Last modification time.
    pub mtime: i64,
    /// Number of data changes.
    pub version: i32,
    /// Number of child changes.
    pub cversion: i32,
    /// Number of ACL changes.
    pub aversion: i32,
    /// Owning session for ephemeral nodes, 0 otherwise.
    pub ephemeral_owner: u64,
    /// Length of the data, 0 when absent.
    pub data_length: i32,
    /// Number of children.
    pub num_children: i32,
}

/// How a node is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    /// Survives the creating session.
    #[default]
    Persistent,
    /// Persistent, with a monotonically increasing suffix appended.
    PersistentSequential,
    /// Removed when the creating session ends.
    Ephemeral,
    /// Ephemeral, with a monotonically increasing suffix appended.
    EphemeralSequential,
}

impl CreateMode {
    /// Returns true if the node is tied to its session.
    #[must_use]
    pub const fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    /// Returns true if the store appends a sequence suffix.
    #[must_use]
    pub const fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Permission bits of an ACL entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Perms(pub u32);

impl Perms {
    /// Read data and list children.
    pub const READ: Perms = Perms(1);
    /// Set data.
    pub const WRITE: Perms = Perms(1 << 1);
    /// Create children.
    pub const CREATE: Perms = Perms(1 << 2);
    /// Delete children.
    pub const DELETE: Perms = Perms(1 << 3);
    /// Change the ACL.
    pub const ADMIN: Perms = Perms(1 << 4);
    /// Every permission.
    pub const ALL: Perms = Perms(0b1_1111);

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Perms) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Perms {
    type Output = Perms;

    fn bitor(self, rhs: Perms) -> Perms {
        Perms(self.0 | rhs.0)
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, c) in [
            (Perms::READ, 'r'),
            (Perms::WRITE, 'w'),
            (Perms::CREATE, 'c'),
            (Perms::DELETE, 'd'),
            (Perms::ADMIN, 'a'),
        ] {
            if self.contains(flag) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// An authentication scheme plus the identity within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    /// Scheme, e.g. `world`, `digest`, `sasl`.
    pub scheme: String,
    /// Identity within the scheme.
    pub id: String,
}

impl Id {
    /// Creates an ID.
    pub fn new(scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            id: id.into(),
        }
    }
}

/// One access-control entry attached to a node at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    /// Granted permissions.
    pub perms: Perms,
    /// Who they are granted to.
    pub id: Id,
}

impl Acl {
    /// Creates an ACL entry.
    #[must_use]
    pub fn new(perms: Perms, id: Id) -> Self {
        Self { perms, id }
    }

    /// The fully open ACL, `world:anyone:rwcda`.
    #[must_use]
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl::new(Perms::ALL, Id::new("world", "anyone"))]
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.id.scheme, self.id.id, self.perms)
    }
}

/// Scheme-specific authentication data added to a session on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// Scheme, e.g. `digest`.
    pub scheme: String,
    /// Raw authentication payload.
    pub auth: Vec<u8>,
}

impl AuthInfo {
    /// Creates an auth entry.
    pub fn new(scheme: impl Into<String>, auth: impl Into<Vec<u8>>) -> Self {
        Self {
            scheme: scheme.into(),
            auth: auth.into(),
        }
    }
}

/// One operation inside an atomic multi-op request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Create a node.
    Create {
        /// Node path.
        path: String,
        /// Initial data; `None` leaves the node without data.
        data: Option<Vec<u8>>,
        /// ACL attached to the node.
        acl: Vec<Acl>,
        /// Creation mode.
        mode: CreateMode,
    },
    /// Replace a node's data.
    SetData {
        /// Node path.
        path: String,
        /// New data.
        data: Option<Vec<u8>>,
        /// Expected version, `-1` for any.
        version: i32,
    },
    /// Delete a node.
    Delete {
        /// Node path.
        path: String,
        /// Expected version, `-1` for any.
        version: i32,
    },
    /// Assert a node exists at a version without changing it.
    Check {
        /// Node path.
        path: String,
        /// Expected version, `-1` for any.
        version: i32,
    },
}

impl Op {
    /// Returns the path the operation targets.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Op::Create { path, .. }
            | Op::SetData { path, .. }
            | Op::Delete { path, .. }
            | Op::Check { path, .. } => path,
        }
    }
}

/// Outcome of one operation of a successful multi-op request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    /// Node created at the given (possibly suffixed) path.
    Create {
        /// Actual path.
        path: String,
    },
    /// Data replaced.
    SetData {
        /// Node metadata after the write.
        stat: Stat,
    },
    /// Node deleted.
    Delete,
    /// Check passed.
    Check,
}

/// Property key naming the login context the client authenticates with.
pub const LOGIN_CONTEXT_NAME_KEY: &str = "sasl.login.context";
/// Property key enabling SASL authentication.
pub const ENABLE_CLIENT_SASL_KEY: &str = "sasl.client.enabled";
/// Property key naming the server's service principal.
pub const SERVICE_NAME_KEY: &str = "sasl.service.name";

/// Per-connection client properties, the counterpart of a client config file.
///
/// Each connection owns its own copy, so two connections never share
/// a login context by accident.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    properties: BTreeMap<String, String>,
}

impl ClientConfig {
    /// Creates an empty client config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Gets a property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns the login context name, if SASL is configured.
    #[must_use]
    pub fn login_context_name(&self) -> Option<&str> {
        self.property(LOGIN_CONTEXT_NAME_KEY)
    }

    /// Returns true if SASL authentication is enabled.
    #[must_use]
    pub fn is_sasl_enabled(&self) -> bool {
        self.property(ENABLE_CLIENT_SASL_KEY) == Some("true")
    }
}

/// Everything a store needs to open a session.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Comma separated `host:port` list.
    pub connect_string: String,
    /// Requested session timeout.
    pub session_timeout: Duration,
    /// Client properties, including the login context name.
    pub client_config: ClientConfig,
    /// Extra scheme auth added right after the session opens.
    pub auth: Vec<AuthInfo>,
}

impl ConnectRequest {
    /// Creates a connect request with no authentication.
    pub fn new(connect_string: impl Into<String>, session_timeout: Duration) -> Self {
        Self {
            connect_string: connect_string.into(),
            session_timeout,
            client_config: ClientConfig::new(),
            auth: Vec::new(),
        }
    }

    /// Sets the client config.
    #[must_use]
    pub fn with_client_config(mut self, client_config: ClientConfig) -> Self {
        self.client_config = client_config;
        self
    }

    /// Sets the auth entries.
    #[must_use]
    pub fn with_auth(mut self, auth: Vec<AuthInfo>) -> Self {
        self.auth = auth;
        self
    }
}
