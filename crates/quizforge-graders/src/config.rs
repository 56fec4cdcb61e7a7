//! Grader configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizforge_core::dispatcher::DEFAULT_CORRECT_THRESHOLD;
use quizforge_core::traits::Grader;

use crate::ollama::OllamaGrader;
use crate::openai::OpenAiGrader;

/// Configuration for a single grading backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_model")]
        model: String,
    },
}

impl std::fmt::Debug for GraderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraderConfig::OpenAI {
                api_key: _,
                base_url,
                model,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            GraderConfig::Ollama { base_url, model } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1".to_string()
}

/// Top-level quizforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizforgeConfig {
    /// Grader configurations keyed by name.
    #[serde(default)]
    pub graders: HashMap<String, GraderConfig>,
    /// Default grader to use.
    #[serde(default = "default_grader_name")]
    pub default_grader: String,
    /// Score at or above which a graded answer counts as correct.
    #[serde(default = "default_correct_threshold")]
    pub correct_threshold: u8,
}

fn default_grader_name() -> String {
    "openai".to_string()
}

fn default_correct_threshold() -> u8 {
    DEFAULT_CORRECT_THRESHOLD
}

impl Default for QuizforgeConfig {
    fn default() -> Self {
        Self {
            graders: HashMap::new(),
            default_grader: default_grader_name(),
            correct_threshold: default_correct_threshold(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a grader config.
fn resolve_grader_config(config: &GraderConfig) -> GraderConfig {
    match config {
        GraderConfig::OpenAI {
            api_key,
            base_url,
            model,
        } => GraderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            model: model.clone(),
        },
        GraderConfig::Ollama { base_url, model } => GraderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
            model: model.clone(),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizforge.toml` in the current directory
/// 2. `~/.config/quizforge/config.toml`
///
/// Environment variable override: `QUIZFORGE_OPENAI_KEY`.
pub fn load_config() -> Result<QuizforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizforgeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizforge.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<QuizforgeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QuizforgeConfig::default(),
    };

    // Apply env var overrides
    if let Ok(key) = std::env::var("QUIZFORGE_OPENAI_KEY") {
        config
            .graders
            .entry("openai".into())
            .or_insert(GraderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                model: None,
            });
        if let Some(GraderConfig::OpenAI { api_key, .. }) = config.graders.get_mut("openai") {
            *api_key = key;
        }
    }

    // Resolve env vars in all grader configs
    let resolved: HashMap<String, GraderConfig> = config
        .graders
        .iter()
        .map(|(k, v)| (k.clone(), resolve_grader_config(v)))
        .collect();
    config.graders = resolved;

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizforge"))
}

/// Create a grader instance from its configuration.
pub fn create_grader(config: &GraderConfig) -> Result<Box<dyn Grader>> {
    match config {
        GraderConfig::OpenAI {
            api_key,
            base_url,
            model,
        } => Ok(Box::new(OpenAiGrader::new(
            api_key,
            base_url.clone(),
            model.clone(),
        ))),
        GraderConfig::Ollama { base_url, model } => {
            Ok(Box::new(OllamaGrader::new(base_url, model)))
        }
    }
}
