//! Supervisor configuration.
//!
//! Everything here has a working default; a host only needs a config file
//! when it ships the child executable somewhere other than next to itself.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SupervisorError};

/// Base name of the child executable. Not configurable.
pub const CHILD_EXECUTABLE: &str = "core";

// 16KB per read, same as a pipe buffer on most systems
const DEFAULT_READ_BUFFER: usize = 16384;
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 250;

/// What `launch` does while a previous child is still live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaunchPolicy {
    /// Kill and reap the previous child silently, then launch.
    #[default]
    Replace,
    /// Keep the previous child and report the new launch as an error.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Directory holding the child executable. `None` means the directory
    /// of the running program.
    pub executable_dir: Option<PathBuf>,
    pub relaunch: RelaunchPolicy,
    /// Max bytes per stdout/stderr read; each read is one chunk.
    pub read_buffer_size: usize,
    /// How long to wait after exit for the output readers to hit EOF.
    pub drain_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            executable_dir: None,
            relaunch: RelaunchPolicy::default(),
            read_buffer_size: DEFAULT_READ_BUFFER,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl SupervisorConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: SupervisorConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config JSON at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(SupervisorError::Config(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Full path of the child: `<dir>/core` plus the platform suffix.
    pub fn executable_path(&self) -> Result<PathBuf> {
        let dir = match &self.executable_dir {
            Some(dir) => dir.clone(),
            None => {
                let exe = std::env::current_exe().map_err(SupervisorError::ExecutablePath)?;
                exe.parent()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| {
                        SupervisorError::ExecutablePath(std::io::Error::other(format!(
                            "{} has no parent directory",
                            exe.display()
                        )))
                    })?
            }
        };
        Ok(dir.join(format!("{}{}", CHILD_EXECUTABLE, std::env::consts::EXE_SUFFIX)))
    }
}
