//! Configuration for benchmark runs.
//!
//! Handles YAML run configuration, judge credentials from the environment,
//! the standards catalog used to build the audit reference block, and the
//! catalog of judge models that can be benchmarked.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default OpenAI-compatible gateway used when no base URL is configured
pub const DEFAULT_BASE_URL: &str = "https://api.zhizengzeng.com/v1/";

/// Environment variables checked for the API key, in priority order
pub const API_KEY_VARS: [&str; 2] = ["ZZZ_API_KEY", "OPENAI_API_KEY"];

/// Environment variables checked for the base URL, in priority order
pub const BASE_URL_VARS: [&str; 2] = ["ZZZ_BASE_URL", "OPENAI_BASE_URL"];

const STANDARDS_MISSING: &str =
    "Standard definitions file not found. Focus on clear ethical reasoning.";
const STANDARDS_UNREADABLE: &str =
    "Standard definitions unavailable due to loading error. Focus on clear ethical reasoning.";
const STANDARDS_EMPTY: &str = "Standard definitions unavailable. Focus on ethical reasoning.";

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON catalog: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API key not configured. Set one of: {}", API_KEY_VARS.join(", "))]
    MissingCredentials,

    #[error("Unknown model selection: {0}")]
    InvalidSelection(String),
}

/// Top-level benchmark configuration loaded from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BenchConfig {
    /// Judge client settings
    #[serde(default)]
    pub judge: JudgeSettings,
    /// Run driver settings
    #[serde(default)]
    pub run: RunSettings,
    /// Path to `standards.json`
    #[serde(default = "default_standards_path")]
    pub standards_path: PathBuf,
    /// Explicit model ids to benchmark (empty means use the catalog selection)
    #[serde(default)]
    pub models: Vec<String>,
}

/// Judge client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeSettings {
    /// Base URL override (falls back to the environment, then the default gateway)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sampling temperature sent with every request
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Run driver settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    /// Fixed delay after every judge call, in seconds
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
    /// Directory where `benchmark_results_*.json` files are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

const fn default_temperature() -> f64 {
    0.3
}
const fn default_timeout_secs() -> u64 {
    120
}
const fn default_delay_secs() -> f64 {
    1.0
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_standards_path() -> PathBuf {
    PathBuf::from("standards.json")
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            delay_secs: default_delay_secs(),
            output_dir: default_output_dir(),
        }
    }
}

impl BenchConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}

/// Credentials and endpoint for the judge API
#[derive(Clone, PartialEq, Eq)]
pub struct JudgeCredentials {
    /// Bearer token
    pub api_key: String,
    /// OpenAI-compatible base URL
    pub base_url: String,
}

impl std::fmt::Debug for JudgeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeCredentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl JudgeCredentials {
    /// Resolve credentials from the process environment (after loading `.env`)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingCredentials` if no API key variable is set.
    pub fn from_env(base_url_override: Option<&str>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok(), base_url_override)
    }

    /// Resolve credentials through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingCredentials` if no non-blank API key is found.
    pub fn from_lookup<F>(lookup: F, base_url_override: Option<&str>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_set = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(*name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let api_key = first_set(API_KEY_VARS.as_slice()).ok_or(ConfigError::MissingCredentials)?;
        let base_url = base_url_override
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .or_else(|| first_set(BASE_URL_VARS.as_slice()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self { api_key, base_url })
    }
}

/// A single ethical standard
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Standard {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A category grouping related standards
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StandardCategory {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub standards: Vec<Standard>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Catalog of ethical standards, built once at start-up
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StandardsCatalog {
    #[serde(default)]
    pub categories: Vec<StandardCategory>,
}

impl StandardsCatalog {
    /// Load the catalog from a `standards.json` file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse the catalog from JSON text
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the catalog layout.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the reference block interpolated into every audit instruction
    #[must_use]
    pub fn reference_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        for category in &self.categories {
            let header = join_nonempty(&category.id, &category.name);
            if !header.is_empty() {
                lines.push(format!("{header}:"));
            }
            for standard in &category.standards {
                let title = join_nonempty(&standard.id, &standard.name);
                let description = standard.description.trim();
                let entry = match (title.is_empty(), description.is_empty()) {
                    (false, false) => format!("{title}: {description}"),
                    (false, true) => title,
                    (true, false) => description.to_string(),
                    (true, true) => continue,
                };
                lines.push(format!("- {entry}"));
            }
            if lines.last().is_some_and(|l| !l.is_empty()) {
                lines.push(String::new());
            }
        }

        if lines.last().is_some_and(String::is_empty) {
            lines.pop();
        }

        if lines.is_empty() {
            STANDARDS_EMPTY.to_string()
        } else {
            lines.join("\n")
        }
    }

    /// Build the reference block for a catalog path, degrading to a fixed
    /// sentence when the file is missing or unreadable
    #[must_use]
    pub fn reference_for_path(path: &Path) -> String {
        match Self::load(path) {
            Ok(catalog) => catalog.reference_text(),
            Err(ConfigError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Standards catalog not found");
                STANDARDS_MISSING.to_string()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Standards catalog unreadable");
                STANDARDS_UNREADABLE.to_string()
            }
        }
    }
}

fn join_nonempty(a: &str, b: &str) -> String {
    format!("{} {}", a.trim(), b.trim()).trim().to_string()
}

/// Descriptor of a judge model available through the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub provider: String,
    /// Price tier for benchmark selections
    #[serde(default)]
    pub tier: Option<String>,
}

impl ModelDescriptor {
    #[must_use]
    pub fn new(id: &str, name: &str, provider: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            provider: provider.to_string(),
            tier: None,
        }
    }

    fn tiered(id: &str, name: &str, provider: &str, tier: &str) -> Self {
        Self {
            tier: Some(tier.to_string()),
            ..Self::new(id, name, provider)
        }
    }

    /// Descriptor for an id the catalog does not know
    #[must_use]
    pub fn unlisted(id: &str) -> Self {
        Self::new(id, id, "Unknown")
    }
}

/// Named model selections exposed on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSelection {
    /// Representative models across providers
    Benchmark,
    /// Every catalogued model
    All,
    /// OpenAI models only
    Openai,
    /// Alibaba, Baidu and Zhipu models
    Chinese,
}

impl std::str::FromStr for ModelSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "benchmark" => Ok(Self::Benchmark),
            "all" => Ok(Self::All),
            "openai" => Ok(Self::Openai),
            "chinese" => Ok(Self::Chinese),
            _ => Err(ConfigError::InvalidSelection(s.to_string())),
        }
    }
}

/// Immutable lookup of judge models by id
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
    benchmark: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// Catalog of the models served by the default gateway
    #[must_use]
    pub fn builtin() -> Self {
        let d = ModelDescriptor::new;
        let models = vec![
            d("gpt-4o", "GPT-4o", "OpenAI"),
            d("gpt-4o-mini", "GPT-4o Mini", "OpenAI"),
            d("gpt-4-turbo", "GPT-4 Turbo", "OpenAI"),
            d("gpt-4", "GPT-4", "OpenAI"),
            d("gpt-3.5-turbo", "GPT-3.5 Turbo", "OpenAI"),
            d("gpt-3.5-turbo-16k", "GPT-3.5 Turbo 16K", "OpenAI"),
            d("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet", "Anthropic"),
            d("claude-3-opus-20240229", "Claude 3 Opus", "Anthropic"),
            d("claude-3-sonnet-20240229", "Claude 3 Sonnet", "Anthropic"),
            d("claude-3-haiku-20240307", "Claude 3 Haiku", "Anthropic"),
            d("deepseek-chat", "DeepSeek Chat", "DeepSeek"),
            d("deepseek-coder", "DeepSeek Coder", "DeepSeek"),
            d("gemini-pro", "Gemini Pro", "Google"),
            d("gemini-1.5-pro", "Gemini 1.5 Pro", "Google"),
            d("gemini-1.5-flash", "Gemini 1.5 Flash", "Google"),
            d("qwen-turbo", "Qwen Turbo", "Alibaba"),
            d("qwen-plus", "Qwen Plus", "Alibaba"),
            d("qwen-max", "Qwen Max", "Alibaba"),
            d("qwen-max-longcontext", "Qwen Max Long", "Alibaba"),
            d("ernie-bot", "ERNIE Bot", "Baidu"),
            d("ernie-bot-turbo", "ERNIE Bot Turbo", "Baidu"),
            d("ernie-bot-4", "ERNIE Bot 4.0", "Baidu"),
            d("glm-4", "ChatGLM-4", "Zhipu"),
            d("glm-4-plus", "ChatGLM-4 Plus", "Zhipu"),
            d("glm-3-turbo", "ChatGLM-3 Turbo", "Zhipu"),
            d("doubao-pro-32k", "Doubao Pro 32K", "ByteDance"),
            d("doubao-lite-32k", "Doubao Lite 32K", "ByteDance"),
            d("baichuan2-turbo", "Baichuan2 Turbo", "Baichuan"),
            d("baichuan2-turbo-192k", "Baichuan2 Turbo 192K", "Baichuan"),
            d("spark-3.5", "Spark 3.5", "iFlytek"),
            d("spark-3.0", "Spark 3.0", "iFlytek"),
            d("grok-beta", "Grok Beta", "xAI"),
            d("llama-3-70b", "Llama 3 70B", "Meta"),
            d("llama-3-8b", "Llama 3 8B", "Meta"),
        ];

        let t = ModelDescriptor::tiered;
        let benchmark = vec![
            t("gpt-4o", "GPT-4o", "OpenAI", "premium"),
            t("gpt-4o-mini", "GPT-4o Mini", "OpenAI", "mid"),
            t("gpt-3.5-turbo", "GPT-3.5 Turbo", "OpenAI", "budget"),
            t("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet", "Anthropic", "premium"),
            t("claude-3-haiku-20240307", "Claude 3 Haiku", "Anthropic", "budget"),
            t("deepseek-chat", "DeepSeek Chat", "DeepSeek", "mid"),
            t("qwen-max", "Qwen Max", "Alibaba", "premium"),
            t("qwen-turbo", "Qwen Turbo", "Alibaba", "budget"),
            t("glm-4", "ChatGLM-4", "Zhipu", "mid"),
            t("ernie-bot-4", "ERNIE Bot 4.0", "Baidu", "premium"),
            t("gemini-1.5-pro", "Gemini 1.5 Pro", "Google", "premium"),
            t("gemini-1.5-flash", "Gemini 1.5 Flash", "Google", "budget"),
        ];

        Self { models, benchmark }
    }

    /// Catalog over the given models, all of them in the benchmark selection
    #[must_use]
    pub fn from_models(models: Vec<ModelDescriptor>) -> Self {
        Self {
            benchmark: models.clone(),
            models,
        }
    }

    /// Look up a model by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .chain(self.benchmark.iter())
            .find(|m| m.id == id)
    }

    /// Look up a model by id, synthesizing a descriptor for unknown ids
    #[must_use]
    pub fn resolve(&self, id: &str) -> ModelDescriptor {
        self.get(id)
            .cloned()
            .unwrap_or_else(|| ModelDescriptor::unlisted(id))
    }

    /// All catalogued models
    #[must_use]
    pub fn all(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Models for a named selection
    #[must_use]
    pub fn select(&self, selection: ModelSelection) -> Vec<ModelDescriptor> {
        let by_provider = |providers: &[&str]| {
            self.models
                .iter()
                .filter(|m| providers.contains(&m.provider.as_str()))
                .cloned()
                .collect()
        };
        match selection {
            ModelSelection::Benchmark => self.benchmark.clone(),
            ModelSelection::All => self.models.clone(),
            ModelSelection::Openai => by_provider(&["OpenAI"]),
            ModelSelection::Chinese => by_provider(&["Alibaba", "Baidu", "Zhipu"]),
        }
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_bench_config_defaults() {
        let config = BenchConfig::default();
        assert!((config.judge.temperature - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.judge.timeout_secs, 120);
        assert!((config.run.delay_secs - 1.0).abs() < f64::EPSILON);
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_bench_config_from_yaml() {
        let yaml = r#"
judge:
  base_url: "http://localhost:8080/v1"
  temperature: 0.0
run:
  delay_secs: 0.25
  output_dir: results
standards_path: data/standards.json
models:
  - gpt-4o
  - claude-3-haiku-20240307
"#;
        let config = BenchConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.judge.base_url.as_deref(),
            Some("http://localhost:8080/v1")
        );
        assert_eq!(config.judge.timeout_secs, 120); // default
        assert!((config.run.delay_secs - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.run.output_dir, PathBuf::from("results"));
        assert_eq!(config.models.len(), 2);
    }

    #[test]
    fn test_bench_config_minimal_yaml() {
        let config = BenchConfig::from_yaml("models: []").unwrap();
        assert_eq!(config.standards_path, PathBuf::from("standards.json"));
        assert_eq!(config.run, RunSettings::default());
    }

    #[test]
    fn test_bench_config_yaml_roundtrip() {
        let config = BenchConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(BenchConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_credentials_prefer_gateway_key() {
        let creds = JudgeCredentials::from_lookup(
            lookup(&[("ZZZ_API_KEY", " zzz-key \n"), ("OPENAI_API_KEY", "sk-other")]),
            None,
        )
        .unwrap();
        assert_eq!(creds.api_key, "zzz-key");
        assert_eq!(creds.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_credentials_fall_back_to_openai_vars() {
        let creds = JudgeCredentials::from_lookup(
            lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(creds.api_key, "sk-test");
        assert_eq!(creds.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_credentials_override_base_url() {
        let creds = JudgeCredentials::from_lookup(
            lookup(&[("ZZZ_API_KEY", "k"), ("ZZZ_BASE_URL", "https://env")]),
            Some("https://override"),
        )
        .unwrap();
        assert_eq!(creds.base_url, "https://override");
    }

    #[test]
    fn test_credentials_missing_key() {
        let result = JudgeCredentials::from_lookup(lookup(&[("ZZZ_API_KEY", "   ")]), None);
        assert!(matches!(result, Err(ConfigError::MissingCredentials)));
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let creds = JudgeCredentials::from_lookup(lookup(&[("ZZZ_API_KEY", "secret")]), None)
            .unwrap();
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn test_standards_reference_text() {
        let json = r#"{
            "categories": [
                {"id": 1, "name": "Transparency", "standards": [
                    {"id": "1.1", "name": "Disclosure", "description": "Disclose sponsored content."},
                    {"id": "1.2", "name": "Honesty", "description": ""}
                ]},
                {"id": "2", "name": "Privacy", "standards": [
                    {"id": "", "name": "", "description": "Never infer income."}
                ]}
            ]
        }"#;
        let catalog = StandardsCatalog::from_json(json).unwrap();
        assert_eq!(
            catalog.reference_text(),
            "1 Transparency:\n- 1.1 Disclosure: Disclose sponsored content.\n- 1.2 Honesty\n\n2 Privacy:\n- Never infer income."
        );
    }

    #[test]
    fn test_standards_reference_empty_catalog() {
        let catalog = StandardsCatalog::from_json("{}").unwrap();
        assert_eq!(catalog.reference_text(), STANDARDS_EMPTY);
    }

    #[test]
    fn test_standards_reference_missing_file() {
        let text = StandardsCatalog::reference_for_path(Path::new("/nonexistent/standards.json"));
        assert_eq!(text, STANDARDS_MISSING);
    }

    #[test]
    fn test_standards_reference_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standards.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(StandardsCatalog::reference_for_path(&path), STANDARDS_UNREADABLE);
    }

    #[test]
    fn test_model_selection_parsing() {
        assert_eq!(
            ModelSelection::from_str("Benchmark").unwrap(),
            ModelSelection::Benchmark
        );
        assert_eq!(ModelSelection::from_str("all").unwrap(), ModelSelection::All);
        assert!(matches!(
            ModelSelection::from_str("everything"),
            Err(ConfigError::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_model_catalog_selections() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.select(ModelSelection::Benchmark).len(), 12);
        assert!(catalog
            .select(ModelSelection::Openai)
            .iter()
            .all(|m| m.provider == "OpenAI"));
        let chinese = catalog.select(ModelSelection::Chinese);
        assert!(chinese.iter().any(|m| m.id == "glm-4"));
        assert!(chinese.iter().all(|m| m.provider != "OpenAI"));
        assert_eq!(catalog.select(ModelSelection::All).len(), catalog.all().len());
    }

    #[test]
    fn test_model_catalog_resolve_unknown() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.resolve("gpt-4o").name, "GPT-4o");
        let unknown = catalog.resolve("my-local-model");
        assert_eq!(unknown.name, "my-local-model");
        assert_eq!(unknown.provider, "Unknown");
    }
}
