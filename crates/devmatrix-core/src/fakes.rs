//! In-memory fakes for the shell and workspace seams (testing only)
//!
//! Provides `RecordingShell`, `MemoryProbe` and `SharedBuffer` so command
//! resolution, matrix runs and console output can be exercised without
//! spawning processes or touching real checkouts.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{MatrixError, Result};
use crate::probe::WorkspaceProbe;
use crate::shell::{Invocation, OutputMode, Shell, ShellOutcome};

// ---------------------------------------------------------------------------
// RecordingShell
// ---------------------------------------------------------------------------

/// Shell that records every invocation and succeeds unless told otherwise.
#[derive(Debug, Default)]
pub struct RecordingShell {
    calls: Mutex<Vec<Invocation>>,
    failing: Mutex<Vec<String>>,
    unspawnable: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, String)>>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command lines containing `fragment` exit non-zero.
    pub fn fail_when(&self, fragment: &str) {
        self.failing.lock().unwrap().push(fragment.to_string());
    }

    /// Command lines containing `fragment` cannot be spawned.
    pub fn refuse_when(&self, fragment: &str) {
        self.unspawnable.lock().unwrap().push(fragment.to_string());
    }

    /// Captured output for command lines containing `fragment`.
    pub fn respond_with(&self, fragment: &str, output: &str) {
        self.responses
            .lock()
            .unwrap()
            .push((fragment.to_string(), output.to_string()));
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .map(|inv| inv.command_line)
            .collect()
    }
}

#[async_trait]
impl Shell for RecordingShell {
    async fn execute(&self, invocation: &Invocation) -> Result<ShellOutcome> {
        self.calls.lock().unwrap().push(invocation.clone());
        let line = &invocation.command_line;

        if self
            .unspawnable
            .lock()
            .unwrap()
            .iter()
            .any(|f| line.contains(f.as_str()))
        {
            return Err(MatrixError::Shell(format!("failed to spawn `{line}`")));
        }

        let success = !self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|f| line.contains(f.as_str()));

        let output = match invocation.output {
            OutputMode::Capture => Some(
                self.responses
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|(f, _)| line.contains(f.as_str()))
                    .map(|(_, out)| out.clone())
                    .unwrap_or_else(|| format!("ran: {line}")),
            ),
            _ => None,
        };

        Ok(ShellOutcome {
            exit_code: if success { 0 } else { 1 },
            success,
            output,
            duration: Duration::from_millis(1),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryProbe
// ---------------------------------------------------------------------------

/// Workspace probe backed by in-memory sets.
///
/// With [`MemoryProbe::over_filesystem`], directory and file checks also
/// consult the real filesystem; revisions and cleanliness stay in memory.
#[derive(Debug, Default)]
pub struct MemoryProbe {
    directories: Mutex<HashSet<PathBuf>>,
    files: Mutex<HashSet<PathBuf>>,
    heads: Mutex<HashMap<PathBuf, String>>,
    dirty: Mutex<HashSet<PathBuf>>,
    filesystem: bool,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn over_filesystem() -> Self {
        Self {
            filesystem: true,
            ..Self::default()
        }
    }

    pub fn add_directory(&self, path: impl Into<PathBuf>) {
        self.directories.lock().unwrap().insert(path.into());
    }

    pub fn remove_directory(&self, path: &Path) {
        self.directories.lock().unwrap().remove(path);
    }

    pub fn add_file(&self, path: impl Into<PathBuf>) {
        self.files.lock().unwrap().insert(path.into());
    }

    pub fn set_head(&self, path: impl Into<PathBuf>, revision: &str) {
        self.heads
            .lock()
            .unwrap()
            .insert(path.into(), revision.to_string());
    }

    pub fn set_dirty(&self, path: impl Into<PathBuf>, dirty: bool) {
        let path = path.into();
        let mut set = self.dirty.lock().unwrap();
        if dirty {
            set.insert(path);
        } else {
            set.remove(&path);
        }
    }
}

impl WorkspaceProbe for MemoryProbe {
    fn is_directory(&self, path: &Path) -> bool {
        self.directories.lock().unwrap().contains(path) || (self.filesystem && path.is_dir())
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains(path) || (self.filesystem && path.is_file())
    }

    fn head_revision(&self, path: &Path) -> Option<String> {
        self.heads.lock().unwrap().get(path).cloned()
    }

    fn is_clean(&self, path: &Path) -> bool {
        !self.dirty.lock().unwrap().contains(path)
    }
}

// ---------------------------------------------------------------------------
// SharedBuffer
// ---------------------------------------------------------------------------

/// Cloneable in-memory sink for [`crate::Logger`] output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
