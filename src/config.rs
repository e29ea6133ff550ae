//! Optional TOML configuration file
//!
//! ```toml
//! log_file = "mirror.log"
//!
//! [ftp]
//! port = 2121
//! connect_timeout_ms = 5000
//! io_timeout_ms = 30000
//!
//! [pacing]
//! settle_ms = 0
//! step_ms = 100
//! transfer_ms = 0
//! finish_ms = 1000
//! ```
//!
//! Every key is optional. Command-line flags win over the file.

use crate::error::{MirrorError, Result};
use crate::protocol::timeouts;
use crate::signal::Pacing;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FtpSection {
    pub port: Option<u16>,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
}

impl Default for FtpSection {
    fn default() -> Self {
        Self {
            port: None,
            connect_timeout_ms: timeouts::CONNECT_MS,
            io_timeout_ms: timeouts::IO_MS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PacingSection {
    pub settle_ms: u64,
    pub step_ms: u64,
    pub transfer_ms: u64,
    pub finish_ms: u64,
}

impl Default for PacingSection {
    fn default() -> Self {
        let pacing = Pacing::default();
        Self {
            settle_ms: pacing.settle.as_millis() as u64,
            step_ms: pacing.step.as_millis() as u64,
            transfer_ms: pacing.transfer.as_millis() as u64,
            finish_ms: pacing.finish.as_millis() as u64,
        }
    }
}

impl From<&PacingSection> for Pacing {
    fn from(section: &PacingSection) -> Self {
        Pacing {
            settle: Duration::from_millis(section.settle_ms),
            step: Duration::from_millis(section.step_ms),
            transfer: Duration::from_millis(section.transfer_ms),
            finish: Duration::from_millis(section.finish_ms),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub log_file: Option<PathBuf>,
    pub ftp: FtpSection,
    pub pacing: PacingSection,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| MirrorError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sockets refuse a zero timeout
    fn validate(&self) -> Result<()> {
        if self.ftp.connect_timeout_ms == 0 {
            crate::bail!(Configuration, "ftp.connect_timeout_ms must be greater than 0");
        }
        if self.ftp.io_timeout_ms == 0 {
            crate::bail!(Configuration, "ftp.io_timeout_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            crate::error!(Configuration, "cannot read {}: {}", path.display(), e)
        })?;
        Self::parse(&text).map_err(|e| match e {
            MirrorError::Configuration(msg) => {
                crate::error!(Configuration, "{}: {}", path.display(), msg)
            }
            other => other,
        })
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::from(&self.pacing)
    }
}
