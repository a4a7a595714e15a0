use std::future::Future;

use base64::Engine as _;

use crate::config::{resolve_api_key, ImageConfig};
use crate::error::{KismetError, Result};
use crate::llm::service_error;

/// Anything that turns a prompt into image bytes.
///
/// `Ok(None)` means the service answered but produced no image, which is
/// not the same as a failed call.
pub trait ImageGenerator: Send + Sync + 'static {
    fn generate_image(&self, prompt: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;
}

/// Image generation over HTTP (Gemini inline image data or OpenAI images).
pub struct ImageService {
    provider: ImageProvider,
    config: ImageConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for ImageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageService")
            .field("provider", &self.provider)
            .field("model", &self.config.model)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageProvider {
    Gemini,
    OpenAI,
}

impl ImageProvider {
    fn default_env_var(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl ImageService {
    pub fn from_config(config: &ImageConfig) -> Result<Self> {
        let provider = match config.provider.as_str() {
            "gemini" => ImageProvider::Gemini,
            "openai" => ImageProvider::OpenAI,
            other => {
                return Err(KismetError::Config(format!(
                    "unknown image provider: '{other}' (expected 'gemini' or 'openai')"
                )));
            }
        };
        api_key(config, provider)?;

        Ok(Self {
            provider,
            config: config.clone(),
            client: reqwest::Client::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Gemini: generateContent with image output, first inline image part.
    async fn generate_gemini(&self, prompt: &str) -> Result<Option<Vec<u8>>> {
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

        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            }
        });

        let json = self.post("Gemini", self.client.post(&url).json(&body)).await?;
        gemini_image(&json)
    }

    /// OpenAI: POST {base_url}/v1/images/generations
    async fn generate_openai(&self, prompt: &str) -> Result<Option<Vec<u8>>> {
        let api_key = api_key(&self.config, self.provider)?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com");

        let url = format!("{}/v1/images/generations", base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "n": 1,
            "size": self.config.size,
            "response_format": "b64_json",
        });

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body);
        let json = self.post("OpenAI", request).await?;

        json["data"][0]["b64_json"]
            .as_str()
            .map(decode)
            .transpose()
    }

    async fn post(
        &self,
        provider: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value> {
        let resp = request.send().await.map_err(|e| {
            KismetError::ExternalService(format!("{provider} image request failed: {e}"))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(service_error(provider, status.as_u16(), &text));
        }

        resp.json().await.map_err(|e| {
            KismetError::ExternalService(format!("{provider} image response parse error: {e}"))
        })
    }
}

impl ImageGenerator for ImageService {
    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>> {
        if prompt.trim().is_empty() {
            return Err(KismetError::InvalidInput("Image prompt cannot be empty".into()));
        }
        tracing::debug!(provider = ?self.provider, model = %self.config.model, "image generation request");
        match self.provider {
            ImageProvider::Gemini => self.generate_gemini(prompt).await,
            ImageProvider::OpenAI => self.generate_openai(prompt).await,
        }
    }
}

fn api_key(config: &ImageConfig, provider: ImageProvider) -> Result<String> {
    resolve_api_key(
        config.api_key.as_deref(),
        config.env_var.as_deref(),
        provider.default_env_var(),
        &config.provider,
    )
}

fn decode(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| KismetError::ExternalService(format!("invalid image data: {e}")))
}

/// First inline image of the first candidate. A response without candidates
/// is an error; a candidate with only text parts is "no image".
fn gemini_image(json: &serde_json::Value) -> Result<Option<Vec<u8>>> {
    let candidate = json["candidates"]
        .get(0)
        .ok_or_else(|| KismetError::ExternalService("Gemini returned no candidates".into()))?;
    candidate["content"]["parts"]
        .as_array()
        .into_iter()
        .flatten()
        .find_map(|part| part["inlineData"]["data"].as_str())
        .map(decode)
        .transpose()
}
