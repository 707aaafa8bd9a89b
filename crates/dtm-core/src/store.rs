//! Coordination store abstraction: a hierarchical namespace of versioned nodes.
//!
//! The contract mirrors what ZooKeeper-like services offer:
//! - Nodes live at absolute `/`-separated paths; a node's parent must exist
//! - Every node carries a version that starts at 0 and increments on each write
//! - Writes and deletes can be conditioned on an expected version (CAS)
//! - Several operations can be committed as one all-or-nothing transaction
//!
//! Precondition failures are normal results ([`WriteResult::PreconditionFailed`],
//! [`TxnResult::Aborted`]), never errors. [`Error::Storage`] is reserved for
//! connectivity and session failures, after which the effect of the request is
//! unknown.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Node version token used for compare-and-swap.
pub type Version = i32;

/// Metadata about a stored node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStat {
    /// Absolute node path.
    pub path: String,
    /// Data version; 0 right after creation.
    pub version: Version,
    /// Payload size in bytes.
    pub data_length: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub modified_at: DateTime<Utc>,
}

/// A node payload together with its metadata.
#[derive(Debug, Clone)]
pub struct Node {
    /// Stored payload.
    pub data: Bytes,
    /// Node metadata, including the version to use for conditional writes.
    pub stat: NodeStat,
}

/// Result of a single conditional write, create, or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// The mutation was applied.
    Success {
        /// The node version after the write (or the deleted version).
        version: Version,
    },
    /// The precondition did not hold; nothing was changed.
    PreconditionFailed {
        /// The current version, or `None` if the node does not exist.
        current_version: Option<Version>,
    },
}

impl WriteResult {
    /// Returns true if the mutation was applied.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One operation inside a [`CoordinationStore::multi`] transaction.
#[derive(Debug, Clone)]
pub enum TxnOp {
    /// Create a node; fails if it exists or its parent is missing.
    Create {
        /// Node path.
        path: String,
        /// Initial payload.
        data: Bytes,
    },
    /// Replace a node's payload, optionally checking its version.
    SetData {
        /// Node path.
        path: String,
        /// New payload.
        data: Bytes,
        /// Expected current version; `None` writes unconditionally.
        expected_version: Option<Version>,
    },
    /// Delete a childless node, optionally checking its version.
    Delete {
        /// Node path.
        path: String,
        /// Expected current version; `None` deletes unconditionally.
        expected_version: Option<Version>,
    },
    /// Assert a node exists at the given version without modifying it.
    Check {
        /// Node path.
        path: String,
        /// Required version.
        expected_version: Version,
    },
}

impl TxnOp {
    /// Creates a [`TxnOp::Create`].
    #[must_use]
    pub fn create(path: impl Into<String>, data: Bytes) -> Self {
        Self::Create {
            path: path.into(),
            data,
        }
    }

    /// Creates a version-checked [`TxnOp::SetData`].
    #[must_use]
    pub fn set_data(path: impl Into<String>, data: Bytes, expected_version: Version) -> Self {
        Self::SetData {
            path: path.into(),
            data,
            expected_version: Some(expected_version),
        }
    }

    /// Creates a version-checked [`TxnOp::Delete`].
    #[must_use]
    pub fn delete(path: impl Into<String>, expected_version: Version) -> Self {
        Self::Delete {
            path: path.into(),
            expected_version: Some(expected_version),
        }
    }

    /// Creates a [`TxnOp::Check`].
    #[must_use]
    pub fn check(path: impl Into<String>, expected_version: Version) -> Self {
        Self::Check {
            path: path.into(),
            expected_version,
        }
    }

    /// Returns the path this operation targets.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Create { path, .. }
            | Self::SetData { path, .. }
            | Self::Delete { path, .. }
            | Self::Check { path, .. } => path,
        }
    }
}

/// Why a transaction operation could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnConflict {
    /// `Create` targeted an existing node.
    NodeExists,
    /// The node (or, for `Create`, its parent) does not exist.
    NoNode,
    /// The node's version differs from the expected one.
    BadVersion {
        /// Version found in the store.
        current_version: Version,
    },
    /// `Delete` targeted a node that still has children.
    NotEmpty,
}

/// Result of a multi-operation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnResult {
    /// Every operation was applied atomically.
    Committed,
    /// No operation was applied; `index` names the first one that failed.
    Aborted {
        /// Position of the failing operation in the submitted list.
        index: usize,
        /// Path of the failing operation.
        path: String,
        /// Reason the operation failed.
        conflict: TxnConflict,
    },
}

impl TxnResult {
    /// Returns true if the transaction committed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

/// Coordination store client contract.
///
/// Implementations must make every single-node call linearizable and
/// [`CoordinationStore::multi`] all-or-nothing. Retries on conflict are never
/// automatic; callers own their conflict handling.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Returns node metadata, or `None` if the node does not exist.
    async fn exists(&self, path: &str) -> Result<Option<NodeStat>>;

    /// Reads a node's payload and metadata, or `None` if it does not exist.
    async fn get(&self, path: &str) -> Result<Option<Node>>;

    /// Creates a node.
    ///
    /// Returns `PreconditionFailed` if the node exists and `Error::NotFound`
    /// if its parent is missing.
    async fn create(&self, path: &str, data: Bytes) -> Result<WriteResult>;

    /// Replaces a node's payload if its version matches `expected_version`.
    async fn set_data(
        &self,
        path: &str,
        data: Bytes,
        expected_version: Option<Version>,
    ) -> Result<WriteResult>;

    /// Deletes a childless node if its version matches `expected_version`.
    async fn delete(&self, path: &str, expected_version: Option<Version>) -> Result<WriteResult>;

    /// Lists child names (not full paths) in lexicographic order.
    ///
    /// Returns `Error::NotFound` if the node does not exist.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Applies all operations atomically, or none of them.
    async fn multi(&self, ops: Vec<TxnOp>) -> Result<TxnResult>;
}

/// Joins a parent path and a child name.
#[must_use]
pub fn join_path(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Validates an absolute node path.
///
/// # Errors
///
/// Returns `Error::InvalidInput` for relative paths, trailing or doubled
/// separators, and `.`/`..` segments.
pub fn validate_path(path: &str) -> Result<()> {
    if path == "/" {
        return Ok(());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(Error::InvalidInput(format!(
            "path must be absolute: {path}"
        )));
    };
    for segment in rest.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(Error::InvalidInput(format!("malformed path: {path}")));
        }
    }
    Ok(())
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// In-memory coordination store for tests and single-process deployments.
///
/// Thread-safe via `RwLock`. Transactions are applied to a staged copy of the
/// tree and swapped in only if every operation succeeds.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    nodes: Arc<RwLock<BTreeMap<String, StoredNode>>>,
}

#[derive(Debug, Clone)]
struct StoredNode {
    data: Bytes,
    version: Version,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl StoredNode {
    fn root() -> Self {
        Self {
            data: Bytes::new(),
            version: 0,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            modified_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn stat(&self, path: &str) -> NodeStat {
        NodeStat {
            path: path.to_string(),
            version: self.version,
            data_length: self.data.len() as u64,
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }
}

type Tree = BTreeMap<String, StoredNode>;

impl MemoryStore {
    /// Creates a new empty store. Only the root `/` exists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_tree(&self) -> Result<std::sync::RwLockReadGuard<'_, Tree>> {
        self.nodes.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })
    }

    fn write_tree(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tree>> {
        self.nodes.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })
    }
}

fn node_exists(tree: &Tree, path: &str) -> bool {
    path == "/" || tree.contains_key(path)
}

/// Looks up `path`, answering for the implicit root when it is not stored.
fn lookup(tree: &Tree, path: &str) -> Option<StoredNode> {
    tree.get(path)
        .cloned()
        .or_else(|| (path == "/").then(StoredNode::root))
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    }
}

fn child_names(tree: &Tree, path: &str) -> Vec<String> {
    let prefix = child_prefix(path);
    tree.range(prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(&prefix))
        .filter_map(|(key, _)| {
            let rest = &key[prefix.len()..];
            (!rest.contains('/')).then(|| rest.to_string())
        })
        .collect()
}

fn has_children(tree: &Tree, path: &str) -> bool {
    let prefix = child_prefix(path);
    tree.range(prefix.clone()..)
        .next()
        .is_some_and(|(key, _)| key.starts_with(&prefix))
}

/// Applies one operation to `tree`, returning the resulting node version.
fn apply(tree: &mut Tree, op: TxnOp) -> Result<std::result::Result<Version, TxnConflict>> {
    validate_path(op.path())?;
    let now = Utc::now();

    let outcome = match op {
        TxnOp::Create { path, data } => {
            if node_exists(tree, &path) {
                Err(TxnConflict::NodeExists)
            } else if !parent_of(&path).is_some_and(|parent| node_exists(tree, parent)) {
                Err(TxnConflict::NoNode)
            } else {
                tree.insert(
                    path,
                    StoredNode {
                        data,
                        version: 0,
                        created_at: now,
                        modified_at: now,
                    },
                );
                Ok(0)
            }
        }
        TxnOp::SetData {
            path,
            data,
            expected_version,
        } => match tree.get_mut(&path) {
            None => Err(TxnConflict::NoNode),
            Some(node) if expected_version.is_some_and(|v| v != node.version) => {
                Err(TxnConflict::BadVersion {
                    current_version: node.version,
                })
            }
            Some(node) => {
                node.data = data;
                node.version += 1;
                node.modified_at = now;
                Ok(node.version)
            }
        },
        TxnOp::Delete {
            path,
            expected_version,
        } => match tree.get(&path) {
            None => Err(TxnConflict::NoNode),
            Some(node) if expected_version.is_some_and(|v| v != node.version) => {
                Err(TxnConflict::BadVersion {
                    current_version: node.version,
                })
            }
            Some(_) if has_children(tree, &path) => Err(TxnConflict::NotEmpty),
            Some(node) => {
                let version = node.version;
                tree.remove(&path);
                Ok(version)
            }
        },
        TxnOp::Check {
            path,
            expected_version,
        } => match lookup(tree, &path) {
            None => Err(TxnConflict::NoNode),
            Some(node) if node.version != expected_version => Err(TxnConflict::BadVersion {
                current_version: node.version,
            }),
            Some(node) => Ok(node.version),
        },
    };
    Ok(outcome)
}

fn to_write_result(
    tree: &Tree,
    path: &str,
    outcome: std::result::Result<Version, TxnConflict>,
) -> WriteResult {
    match outcome {
        Ok(version) => WriteResult::Success { version },
        Err(_) => WriteResult::PreconditionFailed {
            current_version: lookup(tree, path).map(|node| node.version),
        },
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn exists(&self, path: &str) -> Result<Option<NodeStat>> {
        validate_path(path)?;
        let tree = self.read_tree()?;
        Ok(lookup(&tree, path).map(|node| node.stat(path)))
    }

    async fn get(&self, path: &str) -> Result<Option<Node>> {
        validate_path(path)?;
        let tree = self.read_tree()?;
        Ok(lookup(&tree, path).map(|node| Node {
            stat: node.stat(path),
            data: node.data,
        }))
    }

    async fn create(&self, path: &str, data: Bytes) -> Result<WriteResult> {
        let mut tree = self.write_tree()?;
        let outcome = apply(&mut tree, TxnOp::create(path, data))?;
        if outcome == Err(TxnConflict::NoNode) {
            return Err(Error::NotFound(format!("parent node missing for {path}")));
        }
        Ok(to_write_result(&tree, path, outcome))
    }

    async fn set_data(
        &self,
        path: &str,
        data: Bytes,
        expected_version: Option<Version>,
    ) -> Result<WriteResult> {
        let mut tree = self.write_tree()?;
        let outcome = apply(
            &mut tree,
            TxnOp::SetData {
                path: path.to_string(),
                data,
                expected_version,
            },
        )?;
        Ok(to_write_result(&tree, path, outcome))
    }

    async fn delete(&self, path: &str, expected_version: Option<Version>) -> Result<WriteResult> {
        let mut tree = self.write_tree()?;
        let outcome = apply(
            &mut tree,
            TxnOp::Delete {
                path: path.to_string(),
                expected_version,
            },
        )?;
        if outcome == Err(TxnConflict::NotEmpty) {
            return Err(Error::InvalidInput(format!(
                "cannot delete {path}: node has children"
            )));
        }
        Ok(to_write_result(&tree, path, outcome))
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        validate_path(path)?;
        let tree = self.read_tree()?;
        if !node_exists(&tree, path) {
            return Err(Error::NotFound(format!("node not found: {path}")));
        }
        Ok(child_names(&tree, path))
    }

    async fn multi(&self, ops: Vec<TxnOp>) -> Result<TxnResult> {
        let mut tree = self.write_tree()?;
        let mut staged = tree.clone();

        for (index, op) in ops.into_iter().enumerate() {
            let path = op.path().to_string();
            if let Err(conflict) = apply(&mut staged, op)? {
                return Ok(TxnResult::Aborted {
                    index,
                    path,
                    conflict,
                });
            }
        }

        *tree = staged;
        Ok(TxnResult::Committed)
    }
}
