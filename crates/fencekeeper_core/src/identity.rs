//! Per-session authentication identities.
//!
//! The connection layer looks credentials up by login context name in one
//! process-wide [`LoginRegistry`]. To let several sessions with different
//! principals coexist, every [`Identity`] is registered under a freshly
//! generated name and the session is told to use exactly that name.
//!
//! ## Invariants
//!
//! - Generated names are unique for the life of the process and never reused
//! - Registration is a single insert that never overwrites an existing entry
//! - A default context installed by the hosting process wins over generated
//!   names and is never modified
//! - The generated entry is removed when its [`IdentityBinding`] drops

use crate::error::{CoordError, CoordResult, OpKind};
use fencekeeper_store::{LoginEntry, LoginRegistry};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of generated login context names.
pub const LOGIN_CONTEXT_PREFIX: &str = "FencekeeperClient";

/// Service name of the store's server principal when none is given.
pub const DEFAULT_SERVICE_NAME: &str = "zookeeper";

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// A logical service identity: one principal and its keytab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Identifier of the client presenting the identity.
    pub client_id: String,
    /// Service name of the store's server principal.
    pub service_name: String,
    /// Kerberos principal to log in as.
    pub principal: String,
    /// Keytab holding the principal's key.
    pub keytab: PathBuf,
}

impl Identity {
    /// Creates an identity using the default service name.
    pub fn new(
        client_id: impl Into<String>,
        principal: impl Into<String>,
        keytab: impl AsRef<Path>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            principal: principal.into(),
            keytab: keytab.as_ref().to_path_buf(),
        }
    }

    /// Sets the service name.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }
}

/// Registers identities in a [`LoginRegistry`] under unique names.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    registry: Arc<LoginRegistry>,
}

impl IdentityProvider {
    /// Creates a provider registering into `registry`.
    #[must_use]
    pub fn new(registry: Arc<LoginRegistry>) -> Self {
        Self { registry }
    }

    /// Creates a provider registering into the process-wide registry.
    #[must_use]
    pub fn global() -> Self {
        Self::new(LoginRegistry::global())
    }

    /// Returns the registry this provider writes to.
    #[must_use]
    pub fn registry(&self) -> &Arc<LoginRegistry> {
        &self.registry
    }

    /// Makes `identity` available to the connection layer.
    ///
    /// Returns a binding naming the login context the session must use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the identity has no client id or principal.
    pub fn bind(&self, identity: &Identity) -> CoordResult<IdentityBinding> {
        if identity.client_id.is_empty() {
            return Err(CoordError::invalid_state(
                OpKind::Connect,
                "identity has no client id",
            ));
        }
        if identity.principal.is_empty() {
            return Err(CoordError::invalid_state(
                OpKind::Connect,
                "identity has no principal",
            ));
        }

        if let Some(name) = self.registry.default_context() {
            info!(
                client_id = %identity.client_id,
                context = %name,
                "using login context installed by the host process"
            );
            return Ok(IdentityBinding {
                context_name: name,
                service_name: identity.service_name.clone(),
                owned: false,
                registry: Arc::clone(&self.registry),
            });
        }

        let entry = LoginEntry::keytab(&identity.principal, &identity.keytab);
        loop {
            let seq = NEXT_CONTEXT.fetch_add(1, Ordering::SeqCst);
            let name = format!("{LOGIN_CONTEXT_PREFIX}-{}-{seq}", identity.client_id);
            if self.registry.insert_if_absent(&name, entry.clone()) {
                debug!(client_id = %identity.client_id, context = %name, "registered login context");
                return Ok(IdentityBinding {
                    context_name: name,
                    service_name: identity.service_name.clone(),
                    owned: true,
                    registry: Arc::clone(&self.registry),
                });
            }
        }
    }
}

/// A live registration of an identity, held by its session.
#[derive(Debug)]
pub struct IdentityBinding {
    context_name: String,
    service_name: String,
    owned: bool,
    registry: Arc<LoginRegistry>,
}

impl IdentityBinding {
    /// Returns the login context name the session authenticates with.
    #[must_use]
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// Returns the service name of the server principal.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns true if the entry was generated for this binding.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Looks up the login material currently registered under the name.
    #[must_use]
    pub fn entry(&self) -> Option<LoginEntry> {
        self.registry.entry(&self.context_name)
    }
}

impl Drop for IdentityBinding {
    fn drop(&mut self) {
        if self.owned {
            self.registry.remove(&self.context_name);
            debug!(context = %self.context_name, "released login context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> IdentityProvider {
        IdentityProvider::new(Arc::new(LoginRegistry::new()))
    }

    #[test]
    fn bind_registers_unique_names() {
        let provider = provider();
        let first = provider.bind(&Identity::new("foo1", "bar1", "bar1.keytab")).unwrap();
        let second = provider.bind(&Identity::new("foo2", "bar2", "bar2.keytab")).unwrap();

        assert_ne!(first.context_name(), second.context_name());
        assert!(first.context_name().starts_with(LOGIN_CONTEXT_PREFIX));
        assert_eq!(first.entry().unwrap().principal(), Some("bar1"));
        assert_eq!(second.entry().unwrap().principal(), Some("bar2"));
        assert_eq!(
            second.entry().unwrap().keytab_path(),
            Some(PathBuf::from("bar2.keytab"))
        );
    }

    #[test]
    fn same_identity_twice_gets_two_names() {
        let provider = provider();
        let identity = Identity::new("foo", "bar", "bar.keytab");
        let a = provider.bind(&identity).unwrap();
        let b = provider.bind(&identity).unwrap();
        assert_ne!(a.context_name(), b.context_name());
        assert_eq!(provider.registry().len(), 2);
    }

    #[test]
    fn drop_removes_generated_entry() {
        let provider = provider();
        let binding = provider.bind(&Identity::new("foo", "bar", "bar.keytab")).unwrap();
        let name = binding.context_name().to_string();
        assert!(provider.registry().contains(&name));

        drop(binding);
        assert!(!provider.registry().contains(&name));
    }

    #[test]
    fn host_default_context_takes_precedence() {
        let provider = provider();
        provider
            .registry()
            .install("TestClientConfig", LoginEntry::keytab("test", "test.keytab"));
        provider.registry().set_default_context("TestClientConfig");

        let binding = provider.bind(&Identity::new("foo3", "bar3", "bar3.keytab")).unwrap();
        assert_eq!(binding.context_name(), "TestClientConfig");
        assert!(!binding.is_owned());
        assert_eq!(binding.entry().unwrap().principal(), Some("test"));
        assert_eq!(provider.registry().len(), 1);

        drop(binding);
        assert!(provider.registry().contains("TestClientConfig"));
    }

    #[test]
    fn reject_incomplete_identity() {
        let provider = provider();
        assert!(provider.bind(&Identity::new("", "bar", "k")).is_err());
        assert!(provider.bind(&Identity::new("foo", "", "k")).is_err());
    }

    #[test]
    fn service_name_defaults() {
        let identity = Identity::new("foo", "bar", "bar.keytab");
        assert_eq!(identity.service_name, DEFAULT_SERVICE_NAME);
        let identity = identity.with_service_name("coord");
        assert_eq!(identity.service_name, "coord");
    }
}
