use crate::error::{KismetError, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KismetConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Custom path for the SQLite database. Defaults to `~/.config/kismet/kismet.db`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Root directory for saved images. Defaults to the platform data dir.
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            env_var: None,
            max_tokens: default_llm_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_provider")]
    pub provider: String,
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
    /// Requested output size, only honoured by providers that take one (openai).
    #[serde(default = "default_image_size")]
    pub size: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: default_image_provider(),
            model: default_image_model(),
            api_key: None,
            base_url: None,
            env_var: None,
            size: default_image_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Show the most recently saved record on startup instead of generating.
    #[serde(default = "default_true")]
    pub restore_last: bool,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self { restore_last: true }
    }
}

/// Valid text-generation provider names.
pub const VALID_LLM_PROVIDERS: &[&str] = &["gemini", "openai", "anthropic", "claude", "ollama"];

/// Valid image-generation provider names.
pub const VALID_IMAGE_PROVIDERS: &[&str] = &["gemini", "openai"];

// -- Defaults --

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_llm_max_tokens() -> usize {
    8192
}
fn default_image_provider() -> String {
    "gemini".to_string()
}
fn default_image_model() -> String {
    "gemini-2.0-flash-preview-image-generation".to_string()
}
fn default_image_size() -> String {
    "1024x1024".to_string()
}
fn default_true() -> bool {
    true
}

impl KismetConfig {
    /// Load configuration with three-layer TOML merge:
    /// 1. ~/.config/kismet/config.toml (global)
    /// 2. .kismet/config.toml (project)
    /// 3. .kismet/config.local.toml (local, gitignored)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        if let Some(dir) = project_dir {
            let project_config = dir.join(".kismet").join("config.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }

            let local_config = dir.join(".kismet").join("config.local.toml");
            if local_config.exists() {
                builder = builder.add_source(File::from(local_config).required(false));
            }
        }

        let config = builder
            .build()
            .map_err(|e| KismetError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| KismetError::Config(e.to_string()))?;

        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files).
    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig::default(),
            files: FilesConfig::default(),
            llm: LlmConfig::default(),
            image: ImageConfig::default(),
            screen: ScreenConfig::default(),
        }
    }

    /// Validate config values, fixing what can be fixed and logging warnings.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !VALID_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            warnings.push(format!(
                "unknown LLM provider '{}', valid: {}",
                self.llm.provider,
                VALID_LLM_PROVIDERS.join(", ")
            ));
        }

        if !VALID_IMAGE_PROVIDERS.contains(&self.image.provider.as_str()) {
            warnings.push(format!(
                "unknown image provider '{}', valid: {}",
                self.image.provider,
                VALID_IMAGE_PROVIDERS.join(", ")
            ));
        }

        if self.llm.max_tokens == 0 {
            warnings.push("llm.max_tokens = 0, setting to 1024".to_string());
            self.llm.max_tokens = 1024;
        }

        if self.llm.model.trim().is_empty() {
            warnings.push(format!(
                "llm.model is empty, using '{}'",
                default_llm_model()
            ));
            self.llm.model = default_llm_model();
        }

        if self.image.model.trim().is_empty() {
            warnings.push(format!(
                "image.model is empty, using '{}'",
                default_image_model()
            ));
            self.image.model = default_image_model();
        }

        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }

    /// Resolved SQLite path: `[storage] path` or `~/.config/kismet/kismet.db`.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.storage.path {
            Some(p) => Ok(PathBuf::from(p)),
            None => dirs::config_dir()
                .map(|p| p.join("kismet").join("kismet.db"))
                .ok_or_else(|| {
                    KismetError::Config("cannot determine config directory".to_string())
                }),
        }
    }

    /// Resolved root for saved images: `[files] root` or `<data dir>/kismet`.
    pub fn files_root(&self) -> Result<PathBuf> {
        match &self.files.root {
            Some(p) => Ok(PathBuf::from(p)),
            None => dirs::data_dir()
                .map(|p| p.join("kismet"))
                .ok_or_else(|| KismetError::Config("cannot determine data directory".to_string())),
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("kismet").join("config.toml"))
}

/// Resolve an API key from config, a custom env var, or a default env var.
pub(crate) fn resolve_api_key(
    api_key: Option<&str>,
    env_var: Option<&str>,
    default_env_var: &str,
    provider: &str,
) -> Result<String> {
    if let Some(key) = api_key {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    let env_var_name = env_var.unwrap_or(default_env_var);

    std::env::var(env_var_name).map_err(|_| {
        KismetError::Config(format!(
            "{provider} provider requires an API key (set api_key or {env_var_name})"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KismetConfig::default_config();
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.image.provider, "gemini");
        assert_eq!(
            config.image.model,
            "gemini-2.0-flash-preview-image-generation"
        );
        assert!(config.screen.restore_last);
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_load_config_no_files() {
        let config = KismetConfig::load(Some(Path::new("/nonexistent/path"))).unwrap();
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.image.size, "1024x1024");
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = KismetConfig::default_config();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: KismetConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.model, config.llm.model);
        assert_eq!(parsed.image.model, config.image.model);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"

[screen]
restore_last = false
"#;
        let config: KismetConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.image.provider, "gemini");
        assert!(!config.screen.restore_last);
    }

    #[test]
    fn test_project_layer_overrides() {
        let dir = std::env::temp_dir().join(format!("kismet-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(dir.join(".kismet")).unwrap();
        std::fs::write(
            dir.join(".kismet").join("config.toml"),
            "[llm]\nprovider = \"ollama\"\nmodel = \"llama3.2\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.join(".kismet").join("config.local.toml"),
            "[llm]\nmodel = \"qwen2.5\"\n",
        )
        .unwrap();

        let config = KismetConfig::load(Some(&dir)).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "qwen2.5");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validate_fixes_values() {
        let mut config = KismetConfig::default_config();
        config.llm.max_tokens = 0;
        config.image.model = "  ".into();
        config.llm.provider = "banana".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.llm.max_tokens, 1024);
        assert_eq!(
            config.image.model,
            "gemini-2.0-flash-preview-image-generation"
        );
    }

    #[test]
    fn test_database_path_override() {
        let mut config = KismetConfig::default_config();
        config.storage.path = Some("/tmp/kismet-custom.db".into());
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/kismet-custom.db")
        );
    }

    #[test]
    fn test_resolve_api_key_from_config() {
        let key = resolve_api_key(Some("config-key"), None, "GEMINI_API_KEY", "gemini").unwrap();
        assert_eq!(key, "config-key");
    }

    #[test]
    fn test_resolve_api_key_custom_env_var() {
        std::env::set_var("KISMET_TEST_KEY", "env-key");
        let key =
            resolve_api_key(None, Some("KISMET_TEST_KEY"), "GEMINI_API_KEY", "gemini").unwrap();
        assert_eq!(key, "env-key");
        std::env::remove_var("KISMET_TEST_KEY");
    }

    #[test]
    fn test_resolve_api_key_missing() {
        let err = resolve_api_key(None, Some("KISMET_SURELY_UNSET_VAR"), "X", "gemini")
            .unwrap_err();
        assert!(err.to_string().contains("API key"));
    }
}
