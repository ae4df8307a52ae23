use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::core::ops::templates::TemplateStep;
use crate::platform::{NativePlatform, Platform};

pub const CONFIG_FILE_NAME: &str = "missionops.toml";
pub const DB_FILE_NAME: &str = "ops.db";

/// Process-wide settings, resolved once at startup and handed to every
/// component explicitly.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub db_path: Option<PathBuf>,
    pub api_host: String,
    pub api_port: u16,
    pub api_key: Option<String>,
    pub cors_origin: String,
    pub max_body_bytes: usize,
    pub heartbeat_interval_secs: u64,
    pub worker_poll_secs: u64,
    pub capability_timeout_secs: u64,
    pub completion_url: String,
    pub default_model: String,
    pub fallback_model: String,
    pub static_model_overrides: BTreeMap<String, String>,
    pub env_model_overrides: HashMap<String, String>,
    /// Extra or replacement step templates keyed by proposal kind.
    pub step_templates: BTreeMap<String, Vec<TemplateStep>>,
    pub log_level: String,
    /// Explicit worker id; `--id` still wins over it.
    pub worker_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut static_model_overrides = BTreeMap::new();
        static_model_overrides.insert("coder".to_string(), "qwen2.5-coder:14b".to_string());
        static_model_overrides.insert(
            "marketing".to_string(),
            "qwen2.5-7b-heretic".to_string(),
        );
        Self {
            data_dir: NativePlatform::data_dir(),
            db_path: None,
            api_host: "127.0.0.1".to_string(),
            api_port: 8787,
            api_key: None,
            cors_origin: "http://localhost:8787".to_string(),
            max_body_bytes: 1024 * 1024,
            heartbeat_interval_secs: 300,
            worker_poll_secs: 5,
            capability_timeout_secs: 600,
            completion_url: "http://127.0.0.1:11434/api/generate".to_string(),
            default_model: "qwen2.5:14b".to_string(),
            fallback_model: "llama3.2:3b".to_string(),
            static_model_overrides,
            env_model_overrides: HashMap::new(),
            step_templates: BTreeMap::new(),
            log_level: "info".to_string(),
            worker_id: None,
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file (explicit path or `<data_dir>/missionops.toml`),
    /// then the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let env: Vec<(String, String)> = std::env::vars().collect();
        let mut settings = Settings::default();

        let data_dir = env
            .iter()
            .find(|(k, _)| k == "MISSIONOPS_DATA_DIR")
            .map(|(_, v)| PathBuf::from(v))
            .unwrap_or_else(|| settings.data_dir.clone());

        let file = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME));
        if file.exists() {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading config file {}", file.display()))?;
            settings = Self::from_toml(&text)
                .with_context(|| format!("parsing config file {}", file.display()))?;
        } else if config_path.is_some() {
            anyhow::bail!("config file {} does not exist", file.display());
        }

        settings.apply_env(env);
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay environment variables. Unparseable numeric values keep the
    /// previous setting.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "MISSIONOPS_DATA_DIR" => self.data_dir = PathBuf::from(value),
                "MISSIONOPS_DB" => self.db_path = Some(PathBuf::from(value)),
                "MISSIONOPS_LOG" => self.log_level = value,
                "MC_API_KEY" => self.api_key = Some(value),
                "MC_PORT" => self.api_port = value.parse().unwrap_or(self.api_port),
                "MC_BIND_ALL" => {
                    if value == "1" {
                        self.api_host = "0.0.0.0".to_string();
                    }
                }
                "MC_CORS_ORIGIN" => self.cors_origin = value,
                "MC_MAX_BODY" => self.max_body_bytes = value.parse().unwrap_or(self.max_body_bytes),
                "OPS_HEARTBEAT_INTERVAL" => {
                    self.heartbeat_interval_secs =
                        value.parse().unwrap_or(self.heartbeat_interval_secs)
                }
                "OPS_WORKER_POLL" => {
                    self.worker_poll_secs = value.parse().unwrap_or(self.worker_poll_secs)
                }
                "OPS_WORKER_ID" => self.worker_id = Some(value),
                "OLLAMA_URL" => self.completion_url = value,
                "AGENT_OLLAMA_MODEL" => self.default_model = value,
                "AGENT_OLLAMA_FALLBACK" => self.fallback_model = value,
                other => {
                    if let Some(agent) = other.strip_prefix("OPS_MODEL_") {
                        if agent.is_empty() {
                            continue;
                        }
                        self.env_model_overrides.insert(agent.to_lowercase(), value);
                    }
                }
            }
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DB_FILE_NAME))
    }

    pub fn is_loopback(&self) -> bool {
        matches!(self.api_host.as_str(), "127.0.0.1" | "::1" | "localhost")
    }

    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level
            .parse::<tracing::Level>()
            .unwrap_or(tracing::Level::INFO)
    }
}
