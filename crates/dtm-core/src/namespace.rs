//! Environment-scoped datamart namespaces.
//!
//! Every datamart owns a root node at `/{env}/{datamart}` in the coordination
//! store. Components that keep per-datamart state (the delta service, for
//! one) require this root to exist before they run.
//!
//! # Security
//!
//! Environment and datamart names are validated at construction: non-empty,
//! ASCII lowercase alphanumeric plus `_` and `-`, so a name can never inject
//! extra path segments.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::store::{CoordinationStore, WriteResult, join_path};

/// Creates and resolves datamart roots for one environment.
#[derive(Clone)]
pub struct NamespaceRegistry {
    store: Arc<dyn CoordinationStore>,
    env_name: String,
}

impl std::fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceRegistry")
            .field("env_name", &self.env_name)
            .finish_non_exhaustive()
    }
}

impl NamespaceRegistry {
    /// Creates a registry for `env_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if `env_name` is not a valid identifier.
    pub fn new(store: Arc<dyn CoordinationStore>, env_name: impl Into<String>) -> Result<Self> {
        let env_name = env_name.into();
        validate_name(&env_name, "env_name")?;
        Ok(Self { store, env_name })
    }

    /// Returns the environment name.
    #[must_use]
    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Returns the environment root path, `/{env}`.
    #[must_use]
    pub fn env_path(&self) -> String {
        join_path("/", &self.env_name)
    }

    /// Returns the root path for `datamart` without touching the store.
    ///
    /// # Errors
    ///
    /// Returns an error if `datamart` is not a valid identifier.
    pub fn root_path(&self, datamart: &str) -> Result<String> {
        validate_name(datamart, "datamart")?;
        Ok(join_path(&self.env_path(), datamart))
    }

    /// Returns true if the datamart root exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the store is unavailable.
    pub async fn exists(&self, datamart: &str) -> Result<bool> {
        let root = self.root_path(datamart)?;
        Ok(self.store.exists(&root).await?.is_some())
    }

    /// Creates the datamart root if it is missing and returns its path.
    ///
    /// Idempotent: concurrent callers all observe success.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the store is unavailable.
    pub async fn ensure_exists(&self, datamart: &str) -> Result<String> {
        let root = self.root_path(datamart)?;
        for path in [self.env_path(), root.clone()] {
            match self.store.create(&path, Bytes::new()).await? {
                WriteResult::Success { .. } => {
                    tracing::debug!(path = %path, "created namespace node");
                }
                WriteResult::PreconditionFailed { .. } => {}
            }
        }
        Ok(root)
    }
}

/// Validates an environment or datamart identifier.
///
/// # Errors
///
/// Returns `Error::InvalidInput` describing the offending `field`.
pub fn validate_name(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{field} cannot be empty")));
    }
    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
    {
        return Err(Error::InvalidInput(format!(
            "{field} contains invalid character {ch:?}: {value}"
        )));
    }
    Ok(())
}
