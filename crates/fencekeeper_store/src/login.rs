//! Process-wide login configuration.
//!
//! The connection layer authenticates by looking up a *login context name*
//! in one table shared by the whole process. Each entry holds the login
//! module options for one principal.
//!
//! ## Invariants
//!
//! - An entry is inserted exactly once; [`LoginRegistry::insert_if_absent`]
//!   never overwrites, so a reader sees either no entry or a complete one.
//! - [`LoginRegistry::install`] is reserved for the hosting process and
//!   replaces whatever was there.
//! - A default context name installed by the hosting process takes
//!   precedence over generated per-client names.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Login module used for keytab-based Kerberos logins.
pub const KERBEROS_LOGIN_MODULE: &str = "com.sun.security.auth.module.Krb5LoginModule";

/// Option key holding the principal.
pub const PRINCIPAL_OPTION: &str = "principal";
/// Option key holding the keytab path.
pub const KEYTAB_OPTION: &str = "keyTab";

/// Login material registered under one context name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEntry {
    /// Login module to run.
    pub login_module: String,
    /// Module options.
    pub options: BTreeMap<String, String>,
}

impl LoginEntry {
    /// Creates a keytab login entry for `principal`.
    pub fn keytab(principal: impl Into<String>, keytab: impl AsRef<Path>) -> Self {
        let mut options = BTreeMap::new();
        options.insert(
            KEYTAB_OPTION.to_string(),
            keytab.as_ref().to_string_lossy().into_owned(),
        );
        options.insert(PRINCIPAL_OPTION.to_string(), principal.into());
        options.insert("useKeyTab".to_string(), "true".to_string());
        options.insert("storeKey".to_string(), "true".to_string());
        options.insert("useTicketCache".to_string(), "false".to_string());
        options.insert("doNotPrompt".to_string(), "true".to_string());
        options.insert("refreshKrb5Config".to_string(), "true".to_string());
        Self {
            login_module: KERBEROS_LOGIN_MODULE.to_string(),
            options,
        }
    }

    /// Returns the principal option.
    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.options.get(PRINCIPAL_OPTION).map(String::as_str)
    }

    /// Returns the keytab option.
    #[must_use]
    pub fn keytab_path(&self) -> Option<PathBuf> {
        self.options.get(KEYTAB_OPTION).map(PathBuf::from)
    }
}

/// Table from login context name to login material.
#[derive(Debug, Default)]
pub struct LoginRegistry {
    entries: RwLock<HashMap<String, LoginEntry>>,
    default_context: RwLock<Option<String>>,
}

static GLOBAL: OnceLock<Arc<LoginRegistry>> = OnceLock::new();

impl LoginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> Arc<LoginRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(LoginRegistry::new())))
    }

    /// Inserts `entry` under `name` unless the name is taken.
    ///
    /// Returns true if the entry was inserted.
    pub fn insert_if_absent(&self, name: &str, entry: LoginEntry) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return false;
        }
        entries.insert(name.to_string(), entry);
        true
    }

    /// Installs `entry` under `name`, replacing any previous entry.
    pub fn install(&self, name: &str, entry: LoginEntry) {
        self.entries.write().insert(name.to_string(), entry);
    }

    /// Removes the entry registered under `name`.
    pub fn remove(&self, name: &str) -> Option<LoginEntry> {
        self.entries.write().remove(name)
    }

    /// Looks up the entry registered under `name`.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<LoginEntry> {
        self.entries.read().get(name).cloned()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Returns the number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Sets the context name every client should use, overriding generated names.
    pub fn set_default_context(&self, name: impl Into<String>) {
        *self.default_context.write() = Some(name.into());
    }

    /// Clears the process default context name.
    pub fn clear_default_context(&self) {
        *self.default_context.write() = None;
    }

    /// Returns the process default context name, if one is installed.
    #[must_use]
    pub fn default_context(&self) -> Option<String> {
        self.default_context.read().clone()
    }
}
