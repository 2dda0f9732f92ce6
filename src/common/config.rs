use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::common::error::{AuthError, Result};
use crate::core::consent::ConsentCategory;

/// Upper bound for every duration setting (one week).
pub const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub centering: CenteringConfig,
    #[serde(default)]
    pub consent: ConsentConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_lockout_cooldown")]
    pub lockout_cooldown_secs: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_session_ttl() -> u64 { 120 }
fn default_lockout_cooldown() -> u64 { 30 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            ttl_secs: default_session_ttl(),
            lockout_cooldown_secs: default_lockout_cooldown(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QualityConfig {
    #[serde(default = "default_size_weight")]
    pub size_weight: f32,
    #[serde(default = "default_centering_weight")]
    pub centering_weight: f32,
    #[serde(default = "default_baseline_weight")]
    pub baseline_weight: f32,
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f32,
    #[serde(default = "default_min_face_px")]
    pub min_face_px: f32,
    #[serde(default = "default_max_face_px")]
    pub max_face_px: f32,
    #[serde(default = "default_reference_width")]
    pub reference_width: u32,
    #[serde(default = "default_reference_height")]
    pub reference_height: u32,
    /// Reject every off-centre face, even when the composite score passes.
    #[serde(default)]
    pub require_centered: bool,
}

fn default_size_weight() -> f32 { 0.4 }
fn default_centering_weight() -> f32 { 0.3 }
fn default_baseline_weight() -> f32 { 0.3 }
fn default_pass_threshold() -> f32 { 0.7 }
fn default_min_face_px() -> f32 { 100.0 }
fn default_max_face_px() -> f32 { 240.0 }
fn default_reference_width() -> u32 { 640 }
fn default_reference_height() -> u32 { 480 }

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            size_weight: default_size_weight(),
            centering_weight: default_centering_weight(),
            baseline_weight: default_baseline_weight(),
            pass_threshold: default_pass_threshold(),
            min_face_px: default_min_face_px(),
            max_face_px: default_max_face_px(),
            reference_width: default_reference_width(),
            reference_height: default_reference_height(),
            require_centered: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CenteringConfig {
    /// Fraction of each axis, centred on the frame, that the face centroid must fall in.
    #[serde(default = "default_band")]
    pub band: f32,
}

fn default_band() -> f32 { 0.4 }

impl Default for CenteringConfig {
    fn default() -> Self {
        Self { band: default_band() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConsentConfig {
    #[serde(default = "default_required_consent")]
    pub enroll_requires: Vec<ConsentCategory>,
    #[serde(default = "default_required_consent")]
    pub verify_requires: Vec<ConsentCategory>,
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

fn default_required_consent() -> Vec<ConsentCategory> {
    vec![ConsentCategory::FacialData]
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            enroll_requires: default_required_consent(),
            verify_requires: default_required_consent(),
            store_dir: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenConfig {
    #[serde(default = "default_token_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// HS256 signing secret. Empty means a random per-process secret.
    #[serde(default)]
    pub secret: String,
}

fn default_token_ttl() -> u64 { 900 }
fn default_scopes() -> Vec<String> { vec!["authenticated".to_string()] }

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_token_ttl(),
            scopes: default_scopes(),
            secret: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default = "default_matcher_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_matcher_timeout() -> u64 { 10_000 }
fn default_max_message_bytes() -> usize { 8 * 1024 * 1024 }

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout_ms: default_matcher_timeout(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "configs/facegate.toml";
        Self::load_from_path(&std::path::PathBuf::from(config_path))
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Err(AuthError::Config(format!(
                "Config file not found: {}. Please create it from the example.", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AuthError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.max_attempts == 0 {
            return Err(AuthError::Config("max_attempts must be at least 1".into()));
        }
        if self.session.ttl_secs == 0 || self.session.ttl_secs > MAX_TTL_SECS {
            return Err(AuthError::Config(format!(
                "Session TTL must be between 1 and {} seconds, got {}", MAX_TTL_SECS, self.session.ttl_secs
            )));
        }
        if self.session.lockout_cooldown_secs > MAX_TTL_SECS {
            return Err(AuthError::Config(format!(
                "Lockout cooldown must be at most {} seconds", MAX_TTL_SECS
            )));
        }

        let q = &self.quality;
        for (name, weight) in [
            ("size_weight", q.size_weight),
            ("centering_weight", q.centering_weight),
            ("baseline_weight", q.baseline_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(AuthError::Config(format!(
                    "{} must be between 0.0 and 1.0, got {}", name, weight
                )));
            }
        }
        let weight_sum = q.size_weight + q.centering_weight + q.baseline_weight;
        if (weight_sum - 1.0).abs() > 1e-3 {
            return Err(AuthError::Config(format!(
                "Quality weights must sum to 1.0, got {}", weight_sum
            )));
        }
        if !(0.0..=1.0).contains(&q.pass_threshold) {
            return Err(AuthError::Config(format!(
                "Pass threshold must be between 0.0 and 1.0, got {}", q.pass_threshold
            )));
        }
        if !(q.min_face_px > 0.0 && q.min_face_px < q.max_face_px && q.max_face_px.is_finite()) {
            return Err(AuthError::Config(format!(
                "Face size range is invalid: {}..{}", q.min_face_px, q.max_face_px
            )));
        }
        if q.reference_width == 0 || q.reference_height == 0 {
            return Err(AuthError::Config("Reference resolution must be non-zero".into()));
        }

        if !(self.centering.band > 0.0 && self.centering.band <= 1.0) {
            return Err(AuthError::Config(format!(
                "Centering band must be in (0.0, 1.0], got {}", self.centering.band
            )));
        }

        if self.token.ttl_secs == 0 || self.token.ttl_secs > MAX_TTL_SECS {
            return Err(AuthError::Config(format!(
                "Token TTL must be between 1 and {} seconds, got {}", MAX_TTL_SECS, self.token.ttl_secs
            )));
        }
        if !self.token.scopes.iter().any(|s| s == "authenticated") {
            return Err(AuthError::Config(
                "Token scopes must include \"authenticated\"".into()
            ));
        }

        if self.matcher.timeout_ms == 0 {
            return Err(AuthError::Config("Matcher timeout must be non-zero".into()));
        }

        Ok(())
    }
}
