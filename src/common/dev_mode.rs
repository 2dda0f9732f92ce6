use std::path::PathBuf;
use std::fs;
use crate::common::error::Result;

#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(&base_dir)?;
            fs::create_dir_all(base_dir.join("privacy"))?;
            fs::create_dir_all(base_dir.join("config"))?;

            tracing::info!("Development mode enabled - data will be saved to: {}",
                     base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Consent documents directory. Falls back to the system location outside dev mode.
    pub fn consent_dir(&self) -> PathBuf {
        if self.enabled {
            self.base_dir.join("privacy")
        } else {
            crate::common::paths::system_consent_dir()
        }
    }

    pub fn config_file(&self) -> PathBuf {
        if self.enabled {
            self.base_dir.join("config").join("facegate.toml")
        } else {
            crate::common::paths::system_config_file()
        }
    }

    pub fn matcher_socket(&self) -> PathBuf {
        if self.enabled {
            PathBuf::from("/tmp/facegate-matcher.sock")
        } else {
            crate::common::paths::system_matcher_socket()
        }
    }
}
