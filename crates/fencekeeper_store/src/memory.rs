//! In-memory coordination store for testing.

use crate::error::{StoreError, StoreResult};
use crate::login::LoginRegistry;
use crate::path::{self, validate_path, ROOT};
use crate::store::CoordinationStore;
use crate::types::{
    Acl, AuthInfo, ConnectRequest, CreateMode, Op, OpResult, SessionId, Stat,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

static NEXT_STORE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct Node {
    data: Option<Vec<u8>>,
    acl: Vec<Acl>,
    stat: Stat,
    children: BTreeSet<String>,
}

impl Node {
    fn new(data: Option<Vec<u8>>, acl: Vec<Acl>, zxid: i64, now: i64, owner: u64) -> Self {
        let data_length = data.as_ref().map_or(0, |d| d.len() as i32);
        Self {
            data,
            acl,
            stat: Stat {
                czxid: zxid,
                mzxid: zxid,
                ctime: now,
                mtime: now,
                ephemeral_owner: owner,
                data_length,
                ..Stat::default()
            },
            children: BTreeSet::new(),
        }
    }
}

/// The node tree. Cloned wholesale by `multi` so a failing op leaves the
/// live tree untouched.
#[derive(Debug, Clone)]
struct Tree {
    nodes: HashMap<String, Node>,
    zxid: i64,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        let mut root = Node::new(None, Acl::open_unsafe(), 0, 0, 0);
        root.children.insert("zookeeper".to_string());
        root.stat.cversion = 1;
        root.stat.num_children = 1;
        nodes.insert(ROOT.to_string(), root);
        nodes.insert(
            "/zookeeper".to_string(),
            Node::new(None, Acl::open_unsafe(), 0, 0, 0),
        );
        Self { nodes, zxid: 0 }
    }

    fn node(&self, path: &str) -> StoreResult<&Node> {
        self.nodes.get(path).ok_or_else(|| StoreError::NoNode {
            path: path.to_string(),
        })
    }

    fn check_version(path: &str, node: &Node, version: i32) -> StoreResult<()> {
        if version != -1 && node.stat.version != version {
            return Err(StoreError::BadVersion {
                path: path.to_string(),
                expected: version,
                actual: node.stat.version,
            });
        }
        Ok(())
    }

    fn create(
        &mut self,
        path: &str,
        data: Option<&[u8]>,
        acl: &[Acl],
        mode: CreateMode,
        owner: SessionId,
        now: i64,
    ) -> StoreResult<String> {
        validate_path(path)?;
        let parent_path = match path::parent(path) {
            Some(p) => p.to_string(),
            None => {
                return Err(StoreError::NodeExists {
                    path: path.to_string(),
                })
            }
        };
        let parent = self.nodes.get(&parent_path).ok_or_else(|| StoreError::NoParent {
            path: path.to_string(),
        })?;
        if parent.stat.ephemeral_owner != 0 {
            return Err(StoreError::NoChildrenForEphemerals { path: parent_path });
        }
        let actual = if mode.is_sequential() {
            format!("{path}{:010}", parent.stat.cversion)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual) {
            return Err(StoreError::NodeExists { path: actual });
        }

        self.zxid += 1;
        let owner = if mode.is_ephemeral() { owner.as_u64() } else { 0 };
        let node = Node::new(data.map(<[u8]>::to_vec), acl.to_vec(), self.zxid, now, owner);
        self.nodes.insert(actual.clone(), node);

        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            parent.children.insert(path::node_name(&actual).to_string());
            parent.stat.cversion += 1;
            parent.stat.num_children = parent.children.len() as i32;
        }
        Ok(actual)
    }

    fn set_data(
        &mut self,
        path: &str,
        data: Option<&[u8]>,
        version: i32,
        now: i64,
    ) -> StoreResult<Stat> {
        validate_path(path)?;
        let zxid = self.zxid + 1;
        let node = self.nodes.get_mut(path).ok_or_else(|| StoreError::NoNode {
            path: path.to_string(),
        })?;
        Self::check_version(path, node, version)?;
        node.data = data.map(<[u8]>::to_vec);
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.mtime = now;
        node.stat.data_length = data.map_or(0, |d| d.len() as i32);
        let stat = node.stat;
        self.zxid = zxid;
        Ok(stat)
    }

    fn delete(&mut self, path: &str, version: i32) -> StoreResult<()> {
        validate_path(path)?;
        if path == ROOT {
            return Err(StoreError::invalid_path(path, "cannot delete the root"));
        }
        let node = self.node(path)?;
        Self::check_version(path, node, version)?;
        if !node.children.is_empty() {
            return Err(StoreError::NotEmpty {
                path: path.to_string(),
            });
        }
        self.nodes.remove(path);
        self.zxid += 1;
        if let Some(parent) = path::parent(path).and_then(|p| self.nodes.get_mut(p)) {
            parent.children.remove(path::node_name(path));
            parent.stat.cversion += 1;
            parent.stat.num_children = parent.children.len() as i32;
        }
        Ok(())
    }

    fn check(&self, path: &str, version: i32) -> StoreResult<()> {
        validate_path(path)?;
        let node = self.node(path)?;
        Self::check_version(path, node, version)
    }

    fn apply(&mut self, op: &Op, owner: SessionId, now: i64) -> StoreResult<OpResult> {
        match op {
            Op::Create {
                path,
                data,
                acl,
                mode,
            } => self
                .create(path, data.as_deref(), acl, *mode, owner, now)
                .map(|path| OpResult::Create { path }),
            Op::SetData {
                path,
                data,
                version,
            } => self
                .set_data(path, data.as_deref(), *version, now)
                .map(|stat| OpResult::SetData { stat }),
            Op::Delete { path, version } => self.delete(path, *version).map(|()| OpResult::Delete),
            Op::Check { path, version } => self.check(path, *version).map(|()| OpResult::Check),
        }
    }

    fn remove_ephemerals(&mut self, owner: SessionId) -> usize {
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.stat.ephemeral_owner == owner.as_u64())
            .map(|(path, _)| path.clone())
            .collect();
        owned
            .iter()
            .filter(|path| self.delete(path, -1).is_ok())
            .count()
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    timeout: Duration,
    login_context: Option<String>,
    principal: Option<String>,
    auth: Vec<AuthInfo>,
    expired: bool,
}

/// Data and version of one node, as captured by [`InMemoryStore::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node data.
    pub data: Option<Vec<u8>>,
    /// Data version.
    pub version: i32,
    /// Owning session for ephemeral nodes, 0 otherwise.
    pub ephemeral_owner: u64,
}

/// Point-in-time copy of every node, ordered by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Nodes by path.
    pub nodes: BTreeMap<String, NodeSnapshot>,
}

/// An in-memory coordination store.
///
/// This store emulates a single-server hierarchical store faithfully enough
/// for tests and embedded use:
/// - Versioned nodes with optimistic concurrency
/// - Ephemeral and sequential nodes
/// - Atomic multi-op requests
/// - Login context resolution through a [`LoginRegistry`]
/// - Fault injection (partitions and session expiry)
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use fencekeeper_store::{ConnectRequest, CoordinationStore, CreateMode, InMemoryStore, Acl};
/// use std::time::Duration;
///
/// let store = InMemoryStore::new();
/// let request = ConnectRequest::new(store.connect_string(), Duration::from_secs(10));
/// let session = store.connect(&request).unwrap();
/// store.create(session, "/a", Some(b"x"), &Acl::open_unsafe(), CreateMode::Persistent).unwrap();
/// assert!(store.exists(session, "/a").unwrap().is_some());
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    connect_string: String,
    tree: RwLock<Tree>,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    next_session: AtomicU64,
    reachable: AtomicBool,
    login: Arc<LoginRegistry>,
    started: Instant,
}

impl InMemoryStore {
    /// Creates a store that resolves logins through the process-wide registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_login_registry(LoginRegistry::global())
    }

    /// Creates a store that resolves logins through `login`.
    #[must_use]
    pub fn with_login_registry(login: Arc<LoginRegistry>) -> Self {
        let n = NEXT_STORE.fetch_add(1, Ordering::Relaxed);
        Self {
            connect_string: format!("127.0.0.1:{}", 21800 + n),
            tree: RwLock::new(Tree::new()),
            sessions: RwLock::new(HashMap::new()),
            next_session: AtomicU64::new(0x1000 * n + 1),
            reachable: AtomicBool::new(true),
            login,
            started: Instant::now(),
        }
    }

    /// Returns the connect string clients must use.
    #[must_use]
    pub fn connect_string(&self) -> &str {
        &self.connect_string
    }

    /// Returns the registry logins are resolved against.
    #[must_use]
    pub fn login_registry(&self) -> &Arc<LoginRegistry> {
        &self.login
    }

    /// Simulates a network partition (`false`) or its end (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        debug!(connect_string = %self.connect_string, reachable, "store reachability changed");
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Returns true unless a partition is being simulated.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Expires a session as if its timeout elapsed; its ephemerals go away.
    pub fn expire_session(&self, session: SessionId) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(&session) {
            entry.expired = true;
            let removed = self.tree.write().remove_ephemerals(session);
            debug!(%session, removed, "session expired");
        }
    }

    /// Returns true if the session is open and not expired.
    #[must_use]
    pub fn is_session_alive(&self, session: SessionId) -> bool {
        self.sessions
            .read()
            .get(&session)
            .is_some_and(|entry| !entry.expired)
    }

    /// Returns the number of open (possibly expired) sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns the principal a session authenticated as.
    #[must_use]
    pub fn session_principal(&self, session: SessionId) -> Option<String> {
        self.sessions
            .read()
            .get(&session)
            .and_then(|entry| entry.principal.clone())
    }

    /// Returns the login context name a session authenticated with.
    #[must_use]
    pub fn session_login_context(&self, session: SessionId) -> Option<String> {
        self.sessions
            .read()
            .get(&session)
            .and_then(|entry| entry.login_context.clone())
    }

    /// Returns the scheme auth a session added on connect.
    #[must_use]
    pub fn session_auth(&self, session: SessionId) -> Vec<AuthInfo> {
        self.sessions
            .read()
            .get(&session)
            .map(|entry| entry.auth.clone())
            .unwrap_or_default()
    }

    /// Returns the negotiated timeout of a session.
    #[must_use]
    pub fn session_timeout(&self, session: SessionId) -> Option<Duration> {
        self.sessions.read().get(&session).map(|entry| entry.timeout)
    }

    /// Captures the data and version of every node.
    #[must_use]
    pub fn snapshot(&self) -> TreeSnapshot {
        let tree = self.tree.read();
        let nodes = tree
            .nodes
            .iter()
            .map(|(path, node)| {
                (
                    path.clone(),
                    NodeSnapshot {
                        data: node.data.clone(),
                        version: node.stat.version,
                        ephemeral_owner: node.stat.ephemeral_owner,
                    },
                )
            })
            .collect();
        TreeSnapshot { nodes }
    }

    fn now(&self) -> i64 {
        self.started.elapsed().as_millis() as i64
    }

    fn check_session(&self, session: SessionId) -> StoreResult<()> {
        if !self.is_reachable() {
            return Err(StoreError::ConnectionLoss);
        }
        match self.sessions.read().get(&session) {
            Some(entry) if entry.expired => Err(StoreError::SessionExpired),
            Some(_) => Ok(()),
            None => Err(StoreError::Closed),
        }
    }

    fn authenticate(&self, request: &ConnectRequest) -> StoreResult<(Option<String>, Option<String>)> {
        for info in &request.auth {
            if info.scheme == "digest" && !info.auth.contains(&b':') {
                return Err(StoreError::AuthFailed(
                    "digest auth must be user:password".to_string(),
                ));
            }
        }
        let config = &request.client_config;
        if !config.is_sasl_enabled() {
            return Ok((None, None));
        }
        let name = config
            .login_context_name()
            .ok_or_else(|| StoreError::AuthFailed("no login context configured".to_string()))?;
        let entry = self
            .login
            .entry(name)
            .ok_or_else(|| StoreError::AuthFailed(format!("no login context named {name}")))?;
        let principal = entry
            .principal()
            .ok_or_else(|| StoreError::AuthFailed(format!("login context {name} has no principal")))?
            .to_string();
        Ok((Some(name.to_string()), Some(principal)))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinationStore for InMemoryStore {
    fn connect(&self, request: &ConnectRequest) -> StoreResult<SessionId> {
        if !self.is_reachable() || request.connect_string != self.connect_string {
            return Err(StoreError::Unreachable {
                connect_string: request.connect_string.clone(),
            });
        }
        let (login_context, principal) = self.authenticate(request)?;
        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::SeqCst));
        debug!(session = %id, principal = ?principal, "session opened");
        self.sessions.write().insert(
            id,
            SessionEntry {
                timeout: request.session_timeout,
                login_context,
                principal,
                auth: request.auth.clone(),
                expired: false,
            },
        );
        Ok(id)
    }

    fn close_session(&self, session: SessionId) -> StoreResult<()> {
        if self.sessions.write().remove(&session).is_some() {
            let removed = self.tree.write().remove_ephemerals(session);
            debug!(%session, removed, "session closed");
        }
        Ok(())
    }

    fn ping(&self, session: SessionId) -> StoreResult<()> {
        self.check_session(session)
    }

    fn exists(&self, session: SessionId, path: &str) -> StoreResult<Option<Stat>> {
        self.check_session(session)?;
        validate_path(path)?;
        Ok(self.tree.read().nodes.get(path).map(|node| node.stat))
    }

    fn create(
        &self,
        session: SessionId,
        path: &str,
        data: Option<&[u8]>,
        acl: &[Acl],
        mode: CreateMode,
    ) -> StoreResult<String> {
        self.check_session(session)?;
        let now = self.now();
        self.tree.write().create(path, data, acl, mode, session, now)
    }

    fn get_data(&self, session: SessionId, path: &str) -> StoreResult<(Option<Vec<u8>>, Stat)> {
        self.check_session(session)?;
        validate_path(path)?;
        let tree = self.tree.read();
        let node = tree.node(path)?;
        Ok((node.data.clone(), node.stat))
    }

    fn set_data(
        &self,
        session: SessionId,
        path: &str,
        data: Option<&[u8]>,
        version: i32,
    ) -> StoreResult<Stat> {
        self.check_session(session)?;
        let now = self.now();
        self.tree.write().set_data(path, data, version, now)
    }

    fn delete(&self, session: SessionId, path: &str, version: i32) -> StoreResult<()> {
        self.check_session(session)?;
        self.tree.write().delete(path, version)
    }

    fn get_children(&self, session: SessionId, path: &str) -> StoreResult<Vec<String>> {
        self.check_session(session)?;
        validate_path(path)?;
        let tree = self.tree.read();
        Ok(tree.node(path)?.children.iter().cloned().collect())
    }

    fn get_acl(&self, session: SessionId, path: &str) -> StoreResult<(Vec<Acl>, Stat)> {
        self.check_session(session)?;
        validate_path(path)?;
        let tree = self.tree.read();
        let node = tree.node(path)?;
        Ok((node.acl.clone(), node.stat))
    }

    fn multi(&self, session: SessionId, ops: &[Op]) -> StoreResult<Vec<OpResult>> {
        self.check_session(session)?;
        let now = self.now();
        let mut tree = self.tree.write();
        let mut scratch = tree.clone();
        let mut results = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            match scratch.apply(op, session, now) {
                Ok(result) => results.push(result),
                Err(cause) => {
                    return Err(StoreError::MultiFailed {
                        index,
                        cause: Box::new(cause),
                    })
                }
            }
        }
        *tree = scratch;
        Ok(results)
    }
}
