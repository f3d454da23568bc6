//! Script sources.
//!
//! A [`ScriptSource`] resolves an identifier to traversal text so callers
//! can keep scripts outside their code. [`FsScriptSource`] reads them from
//! a directory.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// ScriptSource
// ============================================================================

/// Resolves script identifiers to script text.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    /// Loads the script named `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptNotFound`] if no such script exists, or
    /// [`Error::Io`] if it exists but cannot be read.
    async fn load(&self, identifier: &str) -> Result<String>;
}

// ============================================================================
// FsScriptSource
// ============================================================================

/// Loads scripts from files under a root directory.
///
/// Identifiers are relative paths (`"people/by_name.groovy"`). Absolute
/// paths and `..` components are rejected as not found.
#[derive(Debug, Clone)]
pub struct FsScriptSource {
    root: PathBuf,
}

impl FsScriptSource {
    /// Creates a source rooted at `root`.
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, identifier: &str) -> Option<PathBuf> {
        let relative = Path::new(identifier);
        let contained = !identifier.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        contained.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl ScriptSource for FsScriptSource {
    async fn load(&self, identifier: &str) -> Result<String> {
        let path = self
            .resolve(identifier)
            .ok_or_else(|| Error::script_not_found(identifier))?;

        match tokio::fs::read_to_string(&path).await {
            Ok(script) => {
                trace!(identifier, path = %path.display(), "Script loaded");
                Ok(script)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::script_not_found(identifier)),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
