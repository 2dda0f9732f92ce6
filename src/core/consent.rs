use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::common::config::ConsentConfig;
use crate::common::error::Result;
use crate::core::session::Mode;

/// Data categories tracked by the privacy subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentCategory {
    VoiceData,
    FacialData,
    BiometricData,
    PersonalData,
    Preferences,
    InteractionHistory,
    LocationData,
}

impl ConsentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentCategory::VoiceData => "voice_data",
            ConsentCategory::FacialData => "facial_data",
            ConsentCategory::BiometricData => "biometric_data",
            ConsentCategory::PersonalData => "personal_data",
            ConsentCategory::Preferences => "preferences",
            ConsentCategory::InteractionHistory => "interaction_history",
            ConsentCategory::LocationData => "location_data",
        }
    }
}

impl fmt::Display for ConsentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConsentCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("Unknown consent category: {}", s))
    }
}

/// Consent flags for one user. Categories that are absent count as not granted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentState {
    #[serde(default)]
    pub consents: HashMap<ConsentCategory, bool>,
}

impl ConsentState {
    pub fn granted(&self, category: ConsentCategory) -> bool {
        self.consents.get(&category).copied().unwrap_or(false)
    }

    pub fn with(mut self, category: ConsentCategory, granted: bool) -> Self {
        self.consents.insert(category, granted);
        self
    }
}

/// Read side of the external privacy subsystem.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    async fn get_consent(&self, user_id: &str) -> Result<ConsentState>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentDecision {
    Allow,
    Deny(String),
}

impl ConsentDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ConsentDecision::Allow)
    }
}

#[derive(Debug, Clone)]
pub struct ConsentGate {
    enroll_requires: Vec<ConsentCategory>,
    verify_requires: Vec<ConsentCategory>,
}

impl ConsentGate {
    pub fn new(config: &ConsentConfig) -> Self {
        Self {
            enroll_requires: config.enroll_requires.clone(),
            verify_requires: config.verify_requires.clone(),
        }
    }

    pub fn required_for(&self, mode: Mode) -> &[ConsentCategory] {
        match mode {
            Mode::Enroll => &self.enroll_requires,
            Mode::Verify => &self.verify_requires,
        }
    }

    /// Pure decision over an already-fetched consent state.
    pub fn evaluate(&self, mode: Mode, state: &ConsentState) -> ConsentDecision {
        let required = self.required_for(mode);
        if required.is_empty() {
            // An empty requirement list would let anything through.
            return ConsentDecision::Deny(format!("no consent categories configured for {}", mode));
        }

        let missing: Vec<&str> = required
            .iter()
            .filter(|c| !state.granted(**c))
            .map(|c| c.as_str())
            .collect();

        if missing.is_empty() {
            ConsentDecision::Allow
        } else {
            ConsentDecision::Deny(format!("missing consent: {}", missing.join(", ")))
        }
    }

    /// Fetches consent for the user and evaluates it. Store failures deny.
    pub async fn check(&self, store: &dyn ConsentStore, user_id: &str, mode: Mode) -> ConsentDecision {
        match store.get_consent(user_id).await {
            Ok(state) => self.evaluate(mode, &state),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Consent lookup failed, denying");
                ConsentDecision::Deny(format!("consent unavailable: {}", e))
            }
        }
    }
}

impl Default for ConsentGate {
    fn default() -> Self {
        Self::new(&ConsentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::AuthError;

    struct FailingStore;

    #[async_trait]
    impl ConsentStore for FailingStore {
        async fn get_consent(&self, _user_id: &str) -> Result<ConsentState> {
            Err(AuthError::Storage("disk on fire".into()))
        }
    }

    struct FixedStore(ConsentState);

    #[async_trait]
    impl ConsentStore for FixedStore {
        async fn get_consent(&self, _user_id: &str) -> Result<ConsentState> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_allows_with_facial_consent() {
        let gate = ConsentGate::default();
        let state = ConsentState::default().with(ConsentCategory::FacialData, true);
        assert_eq!(gate.evaluate(Mode::Enroll, &state), ConsentDecision::Allow);
        assert_eq!(gate.evaluate(Mode::Verify, &state), ConsentDecision::Allow);
    }

    #[test]
    fn test_absent_flag_denies() {
        let gate = ConsentGate::default();
        let state = ConsentState::default().with(ConsentCategory::VoiceData, true);
        let decision = gate.evaluate(Mode::Verify, &state);
        assert_eq!(decision, ConsentDecision::Deny("missing consent: facial_data".into()));
    }

    #[test]
    fn test_false_flag_denies() {
        let gate = ConsentGate::default();
        let state = ConsentState::default().with(ConsentCategory::FacialData, false);
        assert!(!gate.evaluate(Mode::Enroll, &state).is_allowed());
    }

    #[test]
    fn test_extra_required_category() {
        let gate = ConsentGate::new(&ConsentConfig {
            enroll_requires: vec![ConsentCategory::FacialData, ConsentCategory::BiometricData],
            verify_requires: vec![ConsentCategory::FacialData],
            store_dir: None,
        });
        let state = ConsentState::default().with(ConsentCategory::FacialData, true);
        assert!(!gate.evaluate(Mode::Enroll, &state).is_allowed());
        assert!(gate.evaluate(Mode::Verify, &state).is_allowed());
    }

    #[test]
    fn test_empty_requirements_fail_closed() {
        let gate = ConsentGate::new(&ConsentConfig {
            enroll_requires: vec![],
            verify_requires: vec![],
            store_dir: None,
        });
        let state = ConsentState::default().with(ConsentCategory::FacialData, true);
        assert!(!gate.evaluate(Mode::Enroll, &state).is_allowed());
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("facial_data".parse::<ConsentCategory>(), Ok(ConsentCategory::FacialData));
        assert!("face".parse::<ConsentCategory>().is_err());
    }

    #[tokio::test]
    async fn test_store_error_denies() {
        let gate = ConsentGate::default();
        let decision = gate.check(&FailingStore, "alice", Mode::Verify).await;
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_check_reads_store() {
        let gate = ConsentGate::default();
        let store = FixedStore(ConsentState::default().with(ConsentCategory::FacialData, true));
        assert!(gate.check(&store, "alice", Mode::Enroll).await.is_allowed());
    }
}
