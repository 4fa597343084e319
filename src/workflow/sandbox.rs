//! Code execution collaborator and its virtual filesystem.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ColloquyError;
use crate::types::ExecutionOutput;

/// In-memory file tree shared with the sandbox around each execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl VirtualFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn read(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Sandboxed runtime for code nodes.
///
/// A failing program is reported through [`ExecutionOutput::is_error`];
/// `Err` means the sandbox itself could not run.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    /// Load the executor's files before running.
    async fn sync_in(&self, fs: &VirtualFs) -> Result<(), ColloquyError>;

    async fn execute(&self, code: &str) -> Result<ExecutionOutput, ColloquyError>;

    /// The sandbox's files after running.
    async fn sync_out(&self) -> Result<VirtualFs, ColloquyError>;
}
