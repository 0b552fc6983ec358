//! Process configuration
//!
//! Values come from the environment, falling back to a `.env` file in the
//! working directory. The environment is only read, never written; the
//! credential is carried in `AppConfig` and handed to the client explicitly.

use crate::persona::{PersonaConfig, PersonaError};
use crate::runtime::RuntimeSettings;
use crate::verifier::{JudgeSettings, VerdictMode, DEFAULT_JUDGE_TIMEOUT};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TYPEWRITER_MS: u64 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ANTHROPIC_API_KEY is not set; no completion is possible")]
    MissingCredential,
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Persona(#[from] PersonaError),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    /// Alternate base URL for the Messages API
    pub gateway: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub judge_model: String,
    pub judge_max_tokens: u32,
    pub verify_timeout: Duration,
    pub verdict_mode: VerdictMode,
    pub persona_path: Option<PathBuf>,
    /// Per-character reveal delay for console output; zero prints at once
    pub typewriter_delay: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let dotenv = read_dotenv(Path::new(".env"));
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| dotenv.get(key).cloned()))
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("ANTHROPIC_API_KEY").ok_or(ConfigError::MissingCredential)?;
        let model = get("SYMPOSIUM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_tokens = parse_or("SYMPOSIUM_MAX_TOKENS", get("SYMPOSIUM_MAX_TOKENS"), DEFAULT_MAX_TOKENS)?;

        let judge_model = get("SYMPOSIUM_JUDGE_MODEL").unwrap_or_else(|| model.clone());
        let judge_max_tokens = parse_or(
            "SYMPOSIUM_JUDGE_MAX_TOKENS",
            get("SYMPOSIUM_JUDGE_MAX_TOKENS"),
            DEFAULT_MAX_TOKENS,
        )?;
        let verify_timeout = Duration::from_secs(parse_or(
            "SYMPOSIUM_VERIFY_TIMEOUT_SECS",
            get("SYMPOSIUM_VERIFY_TIMEOUT_SECS"),
            DEFAULT_JUDGE_TIMEOUT.as_secs(),
        )?);
        let verdict_mode = match get("SYMPOSIUM_STRICT_VERDICT").as_deref() {
            None | Some("0" | "false") => VerdictMode::Contains,
            Some("1" | "true") => VerdictMode::Strict,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "SYMPOSIUM_STRICT_VERDICT",
                    value: other.to_string(),
                })
            }
        };
        let typewriter_delay = Duration::from_millis(parse_or(
            "SYMPOSIUM_TYPEWRITER_MS",
            get("SYMPOSIUM_TYPEWRITER_MS"),
            DEFAULT_TYPEWRITER_MS,
        )?);

        Ok(Self {
            api_key,
            gateway: get("LLM_GATEWAY"),
            model,
            max_tokens,
            judge_model,
            judge_max_tokens,
            verify_timeout,
            verdict_mode,
            persona_path: get("SYMPOSIUM_PERSONA").map(PathBuf::from),
            typewriter_delay,
        })
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            judge: JudgeSettings {
                timeout: self.verify_timeout,
                verdict_mode: self.verdict_mode,
                ..JudgeSettings::new(self.judge_model.clone(), self.judge_max_tokens)
            },
        }
    }

    /// Persona from `SYMPOSIUM_PERSONA`, or the stock persona
    pub fn persona(&self) -> Result<PersonaConfig, ConfigError> {
        match &self.persona_path {
            Some(path) => Ok(PersonaConfig::load(path)?),
            None => Ok(PersonaConfig::default()),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

/// Values from a dotenv file, without touching the process environment.
/// A missing or unreadable file is empty; bad lines end the read early.
pub fn read_dotenv(path: &Path) -> HashMap<String, String> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No .env file loaded");
            return HashMap::new();
        }
    };
    let mut values = HashMap::new();
    for item in iter {
        match item {
            Ok((key, value)) => {
                values.insert(key, value);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Stopped reading .env");
                break;
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_credential() {
        let result = AppConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(ConfigError::MissingCredential)));

        let blank = AppConfig::from_lookup(lookup(&[("ANTHROPIC_API_KEY", "   ")]));
        assert!(matches!(blank, Err(ConfigError::MissingCredential)));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("ANTHROPIC_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.judge_model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.verify_timeout, Duration::from_secs(30));
        assert_eq!(config.verdict_mode, VerdictMode::Contains);
        assert_eq!(config.typewriter_delay, Duration::from_millis(50));
        assert!(config.gateway.is_none());
        assert_eq!(config.persona().unwrap(), PersonaConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("SYMPOSIUM_MODEL", "chat"),
            ("SYMPOSIUM_JUDGE_MODEL", "judge"),
            ("SYMPOSIUM_JUDGE_MAX_TOKENS", "8"),
            ("SYMPOSIUM_STRICT_VERDICT", "true"),
            ("SYMPOSIUM_TYPEWRITER_MS", "0"),
            ("LLM_GATEWAY", "https://gw.example.com"),
        ]))
        .unwrap();

        let settings = config.runtime_settings();
        assert_eq!(settings.model, "chat");
        assert_eq!(settings.judge.model, "judge");
        assert_eq!(settings.judge.max_tokens, 8);
        assert_eq!(settings.judge.verdict_mode, VerdictMode::Strict);
        assert_eq!(config.typewriter_delay, Duration::ZERO);
        assert_eq!(config.gateway.as_deref(), Some("https://gw.example.com"));
    }

    #[test]
    fn test_invalid_number() {
        let result = AppConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("SYMPOSIUM_MAX_TOKENS", "lots"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "SYMPOSIUM_MAX_TOKENS", .. })
        ));
    }

    #[test]
    fn test_read_dotenv_forms() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "# comment\n\nexport ANTHROPIC_API_KEY=sk-a\nSYMPOSIUM_MODEL='chat'\nLLM_GATEWAY=\"https://gw.example.com\"\n"
        )
        .unwrap();

        let values = read_dotenv(file.path());
        assert_eq!(values.get("ANTHROPIC_API_KEY").map(String::as_str), Some("sk-a"));
        assert_eq!(values.get("SYMPOSIUM_MODEL").map(String::as_str), Some("chat"));
        assert_eq!(values.get("LLM_GATEWAY").map(String::as_str), Some("https://gw.example.com"));
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_read_dotenv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ANTHROPIC_API_KEY=from-file").unwrap();

        let values = read_dotenv(file.path());
        let config = AppConfig::from_lookup(|key| values.get(key).cloned()).unwrap();
        assert_eq!(config.api_key, "from-file");

        assert!(read_dotenv(Path::new("/nonexistent/.env")).is_empty());
    }

    #[test]
    fn test_persona_path_errors_surface() {
        let config = AppConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("SYMPOSIUM_PERSONA", "/nonexistent/persona.json"),
        ]))
        .unwrap();
        assert!(matches!(config.persona(), Err(ConfigError::Persona(_))));
    }
}
