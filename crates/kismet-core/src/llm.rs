use std::future::Future;

use crate::config::{resolve_api_key, LlmConfig};
use crate::error::{KismetError, Result};

/// Anything that turns a prompt into generated text.
pub trait TextGenerator: Send + Sync + 'static {
    fn generate_text(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Text generation over HTTP (Gemini, OpenAI, Anthropic or Ollama).
pub struct LlmService {
    provider: LlmProvider,
    config: LlmConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for LlmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmService")
            .field("provider", &self.provider)
            .field("model", &self.config.model)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LlmProvider {
    Ollama,
    OpenAI,
    Gemini,
    Anthropic,
}

impl LlmProvider {
    fn default_env_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl LlmService {
    /// Create an LLM service from configuration.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider = match config.provider.as_str() {
            "ollama" => LlmProvider::Ollama,
            "openai" => LlmProvider::OpenAI,
            "gemini" => LlmProvider::Gemini,
            "anthropic" | "claude" => LlmProvider::Anthropic,
            other => {
                return Err(KismetError::Config(format!(
                    "unknown LLM provider: '{other}' (expected 'gemini', 'openai', 'anthropic', or 'ollama')"
                )));
            }
        };

        // Fail early for providers that need a key.
        if provider.default_env_var().is_some() {
            api_key(config, provider)?;
        }

        Ok(Self {
            provider,
            config: config.clone(),
            client: reqwest::Client::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generate text from a prompt with an optional system message.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(KismetError::InvalidInput("Prompt cannot be empty".into()));
        }
        tracing::debug!(provider = ?self.provider, model = %self.config.model, "text generation request");
        match self.provider {
            LlmProvider::Ollama => self.generate_ollama(prompt, system).await,
            LlmProvider::OpenAI => self.generate_openai(prompt, system).await,
            LlmProvider::Gemini => self.generate_gemini(prompt, system).await,
            LlmProvider::Anthropic => self.generate_anthropic(prompt, system).await,
        }
    }

    /// Ollama: POST {base_url}/api/generate
    async fn generate_ollama(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("http://localhost:11434");

        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": self.config.max_tokens,
            }
        });

        if let Some(sys) = system {
            body["system"] = serde_json::Value::String(sys.to_string());
        }

        let json = self.post("Ollama", self.client.post(&url).json(&body)).await?;

        json["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| missing("Ollama", "'response' field"))
    }

    /// OpenAI: POST {base_url}/v1/chat/completions
    async fn generate_openai(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let api_key = api_key(&self.config, self.provider)?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com");

        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));

        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(serde_json::json!({"role": "system", "content": sys}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
        });

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body);
        let json = self.post("OpenAI", request).await?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| missing("OpenAI", "content"))
    }

    /// Anthropic: POST {base_url}/v1/messages
    async fn generate_anthropic(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let api_key = api_key(&self.config, self.provider)?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com");

        let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        if let Some(sys) = system {
            body["system"] = serde_json::Value::String(sys.to_string());
        }

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body);
        let json = self.post("Anthropic", request).await?;

        // {"content": [{"type": "text", "text": "..."}]}
        json["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| missing("Anthropic", "text content"))
    }

    /// Gemini: POST generativelanguage.googleapis.com/v1beta/models/{model}:generateContent
    async fn generate_gemini(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let api_key = api_key(&self.config, self.provider)?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com");

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            base_url.trim_end_matches('/'),
            self.config.model,
            api_key,
        );

        let mut body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "maxOutputTokens": self.config.max_tokens,
            }
        });

        if let Some(sys) = system {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": sys}]});
        }

        let json = self.post("Gemini", self.client.post(&url).json(&body)).await?;
        gemini_text(&json)
    }

    async fn post(
        &self,
        provider: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value> {
        let resp = request
            .send()
            .await
            .map_err(|e| KismetError::ExternalService(format!("{provider} request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(service_error(provider, status.as_u16(), &text));
        }

        resp.json().await.map_err(|e| {
            KismetError::ExternalService(format!("{provider} response parse error: {e}"))
        })
    }
}

impl TextGenerator for LlmService {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        self.generate(prompt, None).await
    }
}

fn api_key(config: &LlmConfig, provider: LlmProvider) -> Result<String> {
    resolve_api_key(
        config.api_key.as_deref(),
        config.env_var.as_deref(),
        provider.default_env_var().unwrap_or_default(),
        &config.provider,
    )
}

fn missing(provider: &str, what: &str) -> KismetError {
    KismetError::ExternalService(format!("{provider} response missing {what}"))
}

/// Concatenated text parts of the first Gemini candidate.
fn gemini_text(json: &serde_json::Value) -> Result<String> {
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| missing("Gemini", "text"))?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        return Err(missing("Gemini", "text"));
    }
    Ok(text)
}

/// Build an error from a non-success response, preferring the provider's own
/// `error.message` so it can be shown to the user as is.
pub(crate) fn service_error(provider: &str, status: u16, body: &str) -> KismetError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .map(str::to_string)
        });
    KismetError::ExternalService(
        message.unwrap_or_else(|| format!("{provider} error {status}: {body}")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_ollama() {
        let config = LlmConfig {
            provider: "ollama".into(),
            model: "llama3.2".into(),
            ..Default::default()
        };
        let service = LlmService::from_config(&config);
        assert!(service.is_ok());
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = LlmConfig {
            provider: "banana".into(),
            ..Default::default()
        };
        let result = LlmService::from_config(&config);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("unknown LLM provider"));
    }

    #[test]
    fn test_from_config_openai_without_key_errors() {
        let config = LlmConfig {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            env_var: Some("KISMET_TEST_UNSET_OPENAI_KEY".into()),
            ..Default::default()
        };
        let result = LlmService::from_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key"));
    }

    #[test]
    fn test_from_config_with_key() {
        for provider in ["openai", "gemini", "anthropic", "claude"] {
            let config = LlmConfig {
                provider: provider.into(),
                api_key: Some("sk-test".into()),
                ..Default::default()
            };
            assert!(LlmService::from_config(&config).is_ok(), "{provider}");
        }
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected_before_request() {
        let config = LlmConfig {
            provider: "ollama".into(),
            base_url: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        };
        let service = LlmService::from_config(&config).unwrap();
        let err = service.generate_text("   \n").await.unwrap_err();
        assert!(matches!(err, KismetError::InvalidInput(_)));
    }

    #[test]
    fn test_gemini_text_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "world"}]}}]
        });
        assert_eq!(gemini_text(&json).unwrap(), "Hello world");

        let blocked = serde_json::json!({"candidates": [{"finishReason": "SAFETY"}]});
        assert!(gemini_text(&blocked).is_err());
    }

    #[test]
    fn test_service_error_prefers_provider_message() {
        let err = service_error(
            "Gemini",
            429,
            r#"{"error": {"code": 429, "message": "Resource has been exhausted"}}"#,
        );
        assert_eq!(err.user_message(), "Resource has been exhausted");

        let err = service_error("Ollama", 500, "boom");
        assert_eq!(err.user_message(), "Ollama error 500: boom");
    }
}
