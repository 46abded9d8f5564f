//! Application settings
//!
//! Credentials come from the environment (optionally via a `.env` file).
//! Tunables come from an optional JSON settings file, and `SMART_EDU_*`
//! environment variables take precedence over the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const BIND_VAR: &str = "SMART_EDU_BIND";
pub const DEFAULT_BIND: &str = "127.0.0.1:7860";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Which text the Q&A session and quiz generator are grounded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QaContext {
    /// The full extracted material text
    #[default]
    Material,
    /// The digest produced from the material
    Digest,
}

impl FromStr for QaContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "material" => Ok(QaContext::Material),
            "digest" => Ok(QaContext::Digest),
            other => Err(other.to_string()),
        }
    }
}

/// Tunables that may live in the JSON settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_digest_max_tokens")]
    pub digest_max_tokens: u32,
    #[serde(default = "default_reply_max_tokens")]
    pub qa_max_tokens: u32,
    #[serde(default = "default_reply_max_tokens")]
    pub quiz_max_tokens: u32,
    /// Prompt hint passed to the transcription model
    #[serde(default = "default_transcription_prompt")]
    pub transcription_prompt: String,
    /// ISO-639-1 language code of the spoken material
    #[serde(default = "default_transcription_language")]
    pub transcription_language: String,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default)]
    pub qa_context: QaContext,
    /// Unset means no local timeout; the remote service's own limits apply
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_chat_model() -> String {
    "gpt-4.1-nano".to_string()
}

fn default_transcription_model() -> String {
    "gpt-4o-mini-transcribe".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_digest_max_tokens() -> u32 {
    2000
}

fn default_reply_max_tokens() -> u32 {
    500
}

fn default_transcription_prompt() -> String {
    "Transcribe the following educational audio material into text.".to_string()
}

fn default_transcription_language() -> String {
    "ja".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_max_upload_mb() -> usize {
    200
}

fn default_session_ttl() -> u64 {
    6 * 60 * 60
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            transcription_model: default_transcription_model(),
            temperature: default_temperature(),
            digest_max_tokens: default_digest_max_tokens(),
            qa_max_tokens: default_reply_max_tokens(),
            quiz_max_tokens: default_reply_max_tokens(),
            transcription_prompt: default_transcription_prompt(),
            transcription_language: default_transcription_language(),
            ffmpeg_path: default_ffmpeg_path(),
            max_upload_mb: default_max_upload_mb(),
            session_ttl_secs: default_session_ttl(),
            qa_context: QaContext::default(),
            request_timeout_secs: None,
        }
    }
}

impl Tunables {
    /// Load tunables from a JSON file; a missing file is an error, missing keys are not
    fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `SMART_EDU_*` overrides using the given variable lookup
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SMART_EDU_CHAT_MODEL") {
            self.chat_model = v;
        }
        if let Some(v) = lookup("SMART_EDU_TRANSCRIPTION_MODEL") {
            self.transcription_model = v;
        }
        if let Some(v) = lookup("SMART_EDU_TEMPERATURE") {
            self.temperature = parse_var("SMART_EDU_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("SMART_EDU_DIGEST_MAX_TOKENS") {
            self.digest_max_tokens = parse_var("SMART_EDU_DIGEST_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("SMART_EDU_QA_MAX_TOKENS") {
            self.qa_max_tokens = parse_var("SMART_EDU_QA_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("SMART_EDU_QUIZ_MAX_TOKENS") {
            self.quiz_max_tokens = parse_var("SMART_EDU_QUIZ_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("SMART_EDU_TRANSCRIPTION_PROMPT") {
            self.transcription_prompt = v;
        }
        if let Some(v) = lookup("SMART_EDU_TRANSCRIPTION_LANGUAGE") {
            self.transcription_language = v;
        }
        if let Some(v) = lookup("SMART_EDU_FFMPEG_PATH") {
            self.ffmpeg_path = v;
        }
        if let Some(v) = lookup("SMART_EDU_MAX_UPLOAD_MB") {
            self.max_upload_mb = parse_var("SMART_EDU_MAX_UPLOAD_MB", &v)?;
        }
        if let Some(v) = lookup("SMART_EDU_SESSION_TTL_SECS") {
            self.session_ttl_secs = parse_var("SMART_EDU_SESSION_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("SMART_EDU_QA_CONTEXT") {
            self.qa_context = parse_var("SMART_EDU_QA_CONTEXT", &v)?;
        }
        if let Some(v) = lookup("SMART_EDU_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = Some(parse_var("SMART_EDU_REQUEST_TIMEOUT_SECS", &v)?);
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Complete configuration, constructed once at startup and passed to each component
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub tunables: Tunables,
}

impl Settings {
    /// Build settings from the process environment (after loading `.env` if present)
    pub fn from_env(settings_file: Option<&Path>) -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(settings_file, |key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup
    pub fn from_lookup<F>(settings_file: Option<&Path>, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty(API_KEY_VAR).ok_or(SettingsError::Missing(API_KEY_VAR))?;
        let base_url = non_empty(BASE_URL_VAR).ok_or(SettingsError::Missing(BASE_URL_VAR))?;

        let mut tunables = match settings_file {
            Some(path) => Tunables::load(path)?,
            None => Tunables::default(),
        };
        tunables.apply_overrides(non_empty)?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            tunables,
        })
    }

    /// Masked API key for display (shows first/last 4 chars)
    pub fn masked_api_key(&self) -> String {
        let key = &self.api_key;
        if key.len() > 12 && key.is_char_boundary(8) && key.is_char_boundary(key.len() - 4) {
            format!("{}...{}", &key[..8], &key[key.len() - 4..])
        } else {
            "*".repeat(key.chars().count())
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.tunables.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.tunables.session_ttl_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.tunables.request_timeout_secs.map(Duration::from_secs)
    }
}
