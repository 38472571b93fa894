use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sanctuary_contracts::payload::FramingPolicy;
use sanctuary_contracts::rooms::UserId;

use crate::downscale::{DownscaleAttempt, DEFAULT_ATTEMPTS, DEFAULT_MAX_BYTES};

pub const DEFAULT_DATA_DIR: &str = ".sanctuary";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 20.0;
pub const MIN_REQUEST_TIMEOUT_S: f64 = 1.0;
pub const MAX_REQUEST_TIMEOUT_S: f64 = 120.0;
pub const DEFAULT_PERSIST_BACKOFF_MS: u64 = 250;
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const ROOM_STATE_FILE: &str = "room_state.json";
const LEDGER_FILE: &str = "ledger.json";
const MESSAGES_FILE: &str = "messages.json";
const EVENTS_FILE: &str = "events.jsonl";

/// Runtime settings for one engine session.
#[derive(Debug, Clone)]
pub struct SanctuaryConfig {
    pub data_dir: PathBuf,
    pub user: UserId,
    /// Provider preferred when a model is picked by capability.
    pub provider: Option<String>,
    pub vision_model: Option<String>,
    pub text_model: Option<String>,
    pub request_timeout: Duration,
    pub persist_backoff: Duration,
    pub downscale_attempts: Vec<DownscaleAttempt>,
    pub downscale_max_bytes: usize,
    pub framing: FramingPolicy,
    pub api_key: Option<String>,
    pub api_base: String,
}

impl Default for SanctuaryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            user: UserId::guest(),
            provider: None,
            vision_model: None,
            text_model: None,
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S),
            persist_backoff: Duration::from_millis(DEFAULT_PERSIST_BACKOFF_MS),
            downscale_attempts: DEFAULT_ATTEMPTS.to_vec(),
            downscale_max_bytes: DEFAULT_MAX_BYTES,
            framing: FramingPolicy::default(),
            api_key: None,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
        }
    }
}

impl SanctuaryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();
        if let Some(dir) = read("SANCTUARY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.user = UserId::resolve(read("SANCTUARY_USER").as_deref());
        config.provider = read("SANCTUARY_PROVIDER");
        config.vision_model = read("SANCTUARY_VISION_MODEL");
        config.text_model = read("SANCTUARY_TEXT_MODEL");
        if let Some(raw) = read("SANCTUARY_REQUEST_TIMEOUT") {
            match raw.parse::<f64>() {
                Ok(seconds) => config.request_timeout = clamp_timeout(seconds),
                Err(_) => tracing::warn!("ignoring unparseable SANCTUARY_REQUEST_TIMEOUT={raw}"),
            }
        }
        config.api_key = read("GEMINI_API_KEY").or_else(|| read("GOOGLE_API_KEY"));
        if let Some(base) = read("GEMINI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        config
    }

    pub fn with_timeout_secs(mut self, seconds: f64) -> Self {
        self.request_timeout = clamp_timeout(seconds);
        self
    }

    /// The provider used when none is named: gemini with a key, dryrun without.
    pub fn effective_provider(&self) -> &str {
        match self.provider.as_deref() {
            Some(provider) => provider,
            None if self.api_key.is_some() => "gemini",
            None => "dryrun",
        }
    }

    pub fn room_state_path(&self) -> PathBuf {
        self.data_path(ROOM_STATE_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_path(LEDGER_FILE)
    }

    pub fn messages_path(&self) -> PathBuf {
        self.data_path(MESSAGES_FILE)
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_path(EVENTS_FILE)
    }

    fn data_path(&self, name: &str) -> PathBuf {
        Path::new(&self.data_dir).join(name)
    }
}

/// Non-finite values fall back to the default.
pub fn clamp_timeout(seconds: f64) -> Duration {
    let seconds = if seconds.is_finite() {
        seconds.clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S)
    } else {
        DEFAULT_REQUEST_TIMEOUT_S
    };
    Duration::from_secs_f64(seconds)
}
