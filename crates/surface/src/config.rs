//! Surface settings: agent identity, call timeout, title language and the
//! inbound payload limit. Loaded from TOML with defaults for missing keys.

use std::{fmt, path::Path, str::FromStr, time::Duration};

use {
    companion_protocol::{DEFAULT_AGENT_IDENTITY, DEFAULT_CALL_TIMEOUT_MS, MAX_PAYLOAD_BYTES},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Which half of a bilingual text pair is used for titles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::En),
            "ar" | "arabic" => Ok(Self::Ar),
            other => Err(Error::Config(format!("unknown title language '{other}'"))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::En => f.write_str("en"),
            Self::Ar => f.write_str("ar"),
        }
    }
}

/// Runtime settings for one client surface session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Participant identity that selection events are addressed to.
    pub agent_identity: String,

    /// Per-call timeout handed to the transport for outbound calls.
    pub call_timeout_ms: u64,

    /// Language used when extracting entity titles.
    pub title_language: Language,

    /// Inbound payloads above this size are rejected before decoding.
    pub max_payload_bytes: usize,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            agent_identity: DEFAULT_AGENT_IDENTITY.into(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            title_language: Language::default(),
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

impl SurfaceConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_identity.trim().is_empty() {
            return Err(Error::Config("agent_identity must not be empty".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(Error::Config("call_timeout_ms must be positive".into()));
        }
        if self.max_payload_bytes == 0 {
            return Err(Error::Config("max_payload_bytes must be positive".into()));
        }
        Ok(())
    }
}
