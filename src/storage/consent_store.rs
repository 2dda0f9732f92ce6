use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::common::config::ConsentConfig;
use crate::common::{AuthError, DevMode, Result};
use crate::core::consent::{ConsentCategory, ConsentState, ConsentStore};

/// Consent documents on disk, one `<user>_privacy.json` per user.
///
/// A user with no document has granted nothing.
pub struct FileConsentStore {
    privacy_dir: PathBuf,
}

impl FileConsentStore {
    pub fn new_with_paths(privacy_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&privacy_dir)?;
        Ok(Self { privacy_dir })
    }

    /// An explicit `store_dir` in the config wins over the dev/system location.
    pub fn new_with_dev_mode(config: &ConsentConfig, dev_mode: &DevMode) -> Result<Self> {
        let privacy_dir = match &config.store_dir {
            Some(dir) => dir.clone(),
            None => dev_mode.consent_dir(),
        };

        fs::create_dir_all(&privacy_dir).map_err(|e| {
            AuthError::Storage(format!(
                "Failed to create consent directory {}: {}",
                privacy_dir.display(),
                e
            ))
        })?;

        if dev_mode.is_enabled() {
            tracing::debug!("FileConsentStore using dev directory: {:?}", privacy_dir);
        }

        Ok(Self { privacy_dir })
    }

    pub fn privacy_dir(&self) -> &Path {
        &self.privacy_dir
    }

    fn user_file(&self, user_id: &str) -> Result<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.privacy_dir.join(format!("{}_privacy.json", user_id)))
    }

    pub fn load(&self, user_id: &str) -> Result<ConsentState> {
        let user_file = self.user_file(user_id)?;

        if !user_file.exists() {
            return Ok(ConsentState::default());
        }

        let data = fs::read_to_string(&user_file)?;
        serde_json::from_str(&data).map_err(|e| {
            AuthError::Storage(format!("Failed to parse {}: {}", user_file.display(), e))
        })
    }

    /// Records a grant or revocation, keeping other categories as they were.
    pub fn set_consent(&self, user_id: &str, category: ConsentCategory, granted: bool) -> Result<ConsentState> {
        let user_file = self.user_file(user_id)?;
        let state = self.load(user_id)?.with(category, granted);

        let encoded = serde_json::to_string_pretty(&state)
            .map_err(|e| AuthError::Storage(format!("Failed to serialize consent: {}", e)))?;

        // Write then rename so a reader never sees a half-written document
        let tmp_file = user_file.with_extension("json.tmp");
        fs::write(&tmp_file, encoded)?;
        fs::rename(&tmp_file, &user_file)?;

        tracing::info!(user_id, %category, granted, "Consent updated");
        Ok(state)
    }
}

#[async_trait]
impl ConsentStore for FileConsentStore {
    async fn get_consent(&self, user_id: &str) -> Result<ConsentState> {
        self.load(user_id)
    }
}

/// In-process consent table for simulations and tests.
#[derive(Default)]
pub struct MemoryConsentStore {
    users: Mutex<HashMap<String, ConsentState>>,
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: &str, category: ConsentCategory, granted: bool) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let state = users.remove(user_id).unwrap_or_default().with(category, granted);
        users.insert(user_id.to_string(), state);
    }
}

#[async_trait]
impl ConsentStore for MemoryConsentStore {
    async fn get_consent(&self, user_id: &str) -> Result<ConsentState> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(user_id).cloned().unwrap_or_default())
    }
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() || user_id.contains('/') || user_id.contains('\\') || user_id.contains("..") {
        return Err(AuthError::InvalidUser(user_id.to_string()));
    }
    Ok(())
}
