//! Environment and provider defaults for wiring up a loop.
//!
//! Each `get_*` function reads one environment variable and falls back to the
//! caller's value. The matching `resolve_*` function does the same work on an
//! already-read value, which keeps the priority rules testable.

use crate::types::DEFAULT_MAX_ITERATIONS;
use std::env;

pub const BASE_URL_ENV: &str = "OPEN_AGENT_LOOP_BASE_URL";
pub const MODEL_ENV: &str = "OPEN_AGENT_LOOP_MODEL";
pub const MAX_ITERATIONS_ENV: &str = "OPEN_AGENT_LOOP_MAX_ITERATIONS";

/// Local OpenAI-compatible servers with well-known default ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    LMStudio,
    Ollama,
    LlamaCpp,
    VLLM,
}

impl Provider {
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::LMStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LlamaCpp => "http://localhost:8080/v1",
            Provider::VLLM => "http://localhost:8000/v1",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Provider::LMStudio),
            "ollama" => Ok(Provider::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(Provider::LlamaCpp),
            "vllm" => Ok(Provider::VLLM),
            other => Err(crate::Error::config(format!("Unknown provider '{}'", other))),
        }
    }
}

/// Base URL for the inference server.
///
/// Priority: `OPEN_AGENT_LOOP_BASE_URL`, then the provider default, then
/// `fallback`, then LM Studio's default.
///
/// ```rust,no_run
/// use open_agent_loop::config::{Provider, get_base_url};
///
/// let url = get_base_url(Some(Provider::Ollama), None);
/// ```
pub fn get_base_url(provider: Option<Provider>, fallback: Option<&str>) -> String {
    resolve_base_url(env::var(BASE_URL_ENV).ok(), provider, fallback)
}

pub fn resolve_base_url(
    from_env: Option<String>,
    provider: Option<Provider>,
    fallback: Option<&str>,
) -> String {
    if let Some(url) = from_env.filter(|url| !url.trim().is_empty()) {
        return url;
    }

    if let Some(p) = provider {
        return p.default_url().to_string();
    }

    fallback
        .unwrap_or(Provider::LMStudio.default_url())
        .to_string()
}

/// Model name from `OPEN_AGENT_LOOP_MODEL` (when `prefer_env`) or `fallback`.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    let from_env = if prefer_env {
        env::var(MODEL_ENV).ok()
    } else {
        None
    };
    resolve_model(from_env, fallback)
}

pub fn resolve_model(from_env: Option<String>, fallback: Option<&str>) -> Option<String> {
    from_env
        .filter(|model| !model.trim().is_empty())
        .or_else(|| fallback.map(str::to_string))
}

/// Iteration ceiling from `OPEN_AGENT_LOOP_MAX_ITERATIONS`.
///
/// A value that is not a positive integer is an error rather than a silent
/// fallback, since a typo here changes when the loop gives up.
pub fn get_max_iterations(fallback: Option<u32>) -> crate::Result<u32> {
    resolve_max_iterations(env::var(MAX_ITERATIONS_ENV).ok(), fallback)
}

pub fn resolve_max_iterations(from_env: Option<String>, fallback: Option<u32>) -> crate::Result<u32> {
    match from_env {
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(0) | Err(_) => Err(crate::Error::config(format!(
                "{} must be a positive integer, got '{}'",
                MAX_ITERATIONS_ENV, raw
            ))),
            Ok(n) => Ok(n),
        },
        None => Ok(fallback.unwrap_or(DEFAULT_MAX_ITERATIONS)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_default_urls() {
        assert_eq!(Provider::LMStudio.default_url(), "http://localhost:1234/v1");
        assert_eq!(Provider::Ollama.default_url(), "http://localhost:11434/v1");
        assert_eq!(Provider::LlamaCpp.default_url(), "http://localhost:8080/v1");
        assert_eq!(Provider::VLLM.default_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("lmstudio".parse::<Provider>().ok(), Some(Provider::LMStudio));
        assert_eq!("LM-Studio".parse::<Provider>().ok(), Some(Provider::LMStudio));
        assert_eq!("llama.cpp".parse::<Provider>().ok(), Some(Provider::LlamaCpp));
        assert_eq!("vllm".parse::<Provider>().ok(), Some(Provider::VLLM));
        assert!(matches!(
            "unknown".parse::<Provider>(),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_base_url_priority() {
        assert_eq!(
            resolve_base_url(Some("http://env:1/v1".into()), Some(Provider::Ollama), None),
            "http://env:1/v1"
        );
        assert_eq!(
            resolve_base_url(None, Some(Provider::Ollama), Some("http://custom/v1")),
            "http://localhost:11434/v1"
        );
        assert_eq!(
            resolve_base_url(Some("  ".into()), None, Some("http://custom:8080/v1")),
            "http://custom:8080/v1"
        );
        assert_eq!(resolve_base_url(None, None, None), "http://localhost:1234/v1");
    }

    #[test]
    fn test_model_priority() {
        assert_eq!(
            resolve_model(Some("env-model".into()), Some("fallback")),
            Some("env-model".to_string())
        );
        assert_eq!(resolve_model(None, Some("fallback")), Some("fallback".to_string()));
        assert_eq!(resolve_model(None, None), None);
    }

    #[test]
    fn test_max_iterations() {
        assert_eq!(resolve_max_iterations(None, None).unwrap(), DEFAULT_MAX_ITERATIONS);
        assert_eq!(resolve_max_iterations(None, Some(4)).unwrap(), 4);
        assert_eq!(resolve_max_iterations(Some(" 25 ".into()), Some(4)).unwrap(), 25);
        assert!(resolve_max_iterations(Some("0".into()), None).is_err());
        assert!(resolve_max_iterations(Some("lots".into()), None).is_err());
    }
}
