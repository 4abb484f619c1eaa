//! Minimal Google Gemini API client.
//!
//! This crate provides a focused client for the Gemini generateContent API with:
//! - Structured text generation against a JSON response schema
//! - Image generation with reference images
//! - An on-disk prompt cache for image calls (keyed by a SHA-256 digest)

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// Errors that can occur when using the Gemini client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Model returned no usable content: {0}")]
    EmptyResponse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Gemini API client.
#[derive(Clone)]
pub struct Gemini {
    client: reqwest::Client,
    api_key: String,
    text_model: String,
    image_model: String,
    cache_dir: Option<PathBuf>,
}

impl Gemini {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .connect_timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: api_key.into(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            cache_dir: None,
        }
    }

    /// Create a Gemini client from the GOOGLE_API_KEY (or GEMINI_API_KEY)
    /// environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| Error::NoApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Set the model used for structured text generation.
    pub fn with_text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = model.into();
        self
    }

    /// Set the model used for image generation.
    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    /// Enable the on-disk image prompt cache rooted at the given directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// The configured image model name (recorded into asset metadata).
    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    /// The configured text model name.
    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    /// Generate structured output conforming to a JSON schema and parse it
    /// into `T`.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        request: StructuredRequest,
    ) -> Result<Structured<T>, Error> {
        let model = request.model.clone().unwrap_or_else(|| self.text_model.clone());

        let api_request = ApiRequest {
            system_instruction: request.system_instruction.as_ref().map(|s| ApiContent {
                role: None,
                parts: vec![ApiPart::text(s)],
            }),
            contents: vec![ApiContent {
                role: Some("user".to_string()),
                parts: vec![ApiPart::text(&request.prompt)],
            }],
            generation_config: Some(ApiGenerationConfig {
                temperature: request.temperature,
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(request.schema),
                image_config: None,
            }),
        };

        let api_response = self.post(&model, &api_request).await?;
        let meta = ResponseMeta::from_api(&model, &api_response);

        let text = api_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::EmptyResponse("no text candidate".to_string()))?;

        let value: T = serde_json::from_str(&text)
            .map_err(|e| Error::Parse(format!("structured output did not match schema: {e}")))?;

        Ok(Structured { value, raw: text, meta })
    }

    /// Generate an image, optionally conditioned on reference images.
    ///
    /// When a cache directory is configured and `overwrite_cache` is false,
    /// a previous result for the identical request is returned without
    /// calling the API.
    pub async fn generate_image(&self, request: ImageRequest) -> Result<GeneratedImage, Error> {
        let model = request.model.clone().unwrap_or_else(|| self.image_model.clone());
        let cache_key = request.cache_key(&model);

        if !request.overwrite_cache {
            if let Some(cached) = self.read_cache(&cache_key).await? {
                return Ok(cached);
            }
        }

        let mut parts = Vec::new();
        for reference in &request.reference_images {
            let bytes = tokio::fs::read(&reference.path).await?;
            parts.push(ApiPart::inline_image(
                mime_for_path(&reference.path),
                &base64::engine::general_purpose::STANDARD.encode(&bytes),
            ));
            if !reference.note.is_empty() {
                parts.push(ApiPart::text(&format!("Reference: {}", reference.note)));
            }
        }
        parts.push(ApiPart::text(&request.prompt));

        let api_request = ApiRequest {
            system_instruction: None,
            contents: vec![ApiContent {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: Some(image_generation_config(&request)),
        };

        let api_response = self.post(&model, &api_request).await?;
        let meta = ResponseMeta::from_api(&model, &api_response);

        let inline = api_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.inline_data))
            .ok_or_else(|| Error::EmptyResponse("no image candidate".to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| Error::Parse(format!("invalid image payload: {e}")))?;

        let image = GeneratedImage {
            bytes,
            mime_type: inline.mime_type,
            meta,
            from_cache: false,
        };

        self.write_cache(&cache_key, &image).await?;

        Ok(image)
    }

    async fn post(&self, model: &str, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let url = format!("{API_BASE}/models/{model}:generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    async fn read_cache(&self, key: &str) -> Result<Option<GeneratedImage>, Error> {
        let Some(ref dir) = self.cache_dir else {
            return Ok(None);
        };
        let data_path = dir.join(format!("{key}.bin"));
        let meta_path = dir.join(format!("{key}.json"));
        if !data_path.exists() || !meta_path.exists() {
            return Ok(None);
        }

        let bytes = tokio::fs::read(&data_path).await?;
        let meta_text = tokio::fs::read_to_string(&meta_path).await?;
        let cached: CachedImageMeta =
            serde_json::from_str(&meta_text).map_err(|e| Error::Parse(e.to_string()))?;

        Ok(Some(GeneratedImage {
            bytes,
            mime_type: cached.mime_type,
            meta: cached.meta,
            from_cache: true,
        }))
    }

    async fn write_cache(&self, key: &str, image: &GeneratedImage) -> Result<(), Error> {
        let Some(ref dir) = self.cache_dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir).await?;

        let cached = CachedImageMeta {
            mime_type: image.mime_type.clone(),
            meta: image.meta.clone(),
        };
        let meta_text = serde_json::to_string(&cached).map_err(|e| Error::Parse(e.to_string()))?;

        tokio::fs::write(dir.join(format!("{key}.bin")), &image.bytes).await?;
        tokio::fs::write(dir.join(format!("{key}.json")), meta_text).await?;
        Ok(())
    }
}

/// Image output parameters travel in the generation config's image
/// config block; style is a prompt-level concern and stays out of it.
fn image_generation_config(request: &ImageRequest) -> ApiGenerationConfig {
    ApiGenerationConfig {
        temperature: None,
        response_mime_type: None,
        response_schema: None,
        image_config: Some(ApiImageConfig {
            aspect_ratio: request.aspect_ratio.clone(),
            image_size: request.resolution.clone(),
        }),
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A structured generation request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub prompt: String,
    pub schema: serde_json::Value,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub model: Option<String>,
}

impl StructuredRequest {
    /// Create a request with a prompt and a JSON response schema.
    pub fn new(prompt: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            prompt: prompt.into(),
            schema,
            system_instruction: None,
            temperature: None,
            model: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A parsed structured response plus the raw text and response metadata.
#[derive(Debug, Clone)]
pub struct Structured<T> {
    pub value: T,
    pub raw: String,
    pub meta: ResponseMeta,
}

/// An image generation request.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub reference_images: Vec<ReferenceImage>,
    pub aspect_ratio: String,
    pub resolution: String,
    pub style: String,
    pub overwrite_cache: bool,
    pub model: Option<String>,
}

impl ImageRequest {
    /// Create an image request with defaults (9:16, 1K, webtoon style).
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_images: Vec::new(),
            aspect_ratio: "9:16".to_string(),
            resolution: "1K".to_string(),
            style: "webtoon".to_string(),
            overwrite_cache: false,
            model: None,
        }
    }

    pub fn with_reference(mut self, path: impl Into<PathBuf>, note: impl Into<String>) -> Self {
        self.reference_images.push(ReferenceImage {
            path: path.into(),
            note: note.into(),
        });
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = aspect_ratio.into();
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_overwrite_cache(mut self, overwrite: bool) -> Self {
        self.overwrite_cache = overwrite;
        self
    }

    /// Deterministic cache key for this request.
    ///
    /// Reference images participate by path only; the gate in the core
    /// decides when a regenerate is forced, so stale-file hashing is not
    /// needed here.
    fn cache_key(&self, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0]);
        hasher.update(self.prompt.as_bytes());
        hasher.update([0]);
        hasher.update(self.aspect_ratio.as_bytes());
        hasher.update([0]);
        hasher.update(self.resolution.as_bytes());
        hasher.update([0]);
        hasher.update(self.style.as_bytes());
        for reference in &self.reference_images {
            hasher.update([0]);
            hasher.update(reference.path.to_string_lossy().as_bytes());
        }
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// A reference image supplied to image generation for consistency.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub path: PathBuf,
    pub note: String,
}

/// A generated image with its payload and response metadata.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub meta: ResponseMeta,
    pub from_cache: bool,
}

/// Metadata about a generation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub model: String,
    pub finish_reason: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl ResponseMeta {
    fn from_api(model: &str, response: &ApiResponse) -> Self {
        Self {
            model: response
                .model_version
                .clone()
                .unwrap_or_else(|| model.to_string()),
            finish_reason: response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone()),
            input_tokens: response
                .usage_metadata
                .as_ref()
                .and_then(|u| u.prompt_token_count),
            output_tokens: response
                .usage_metadata
                .as_ref()
                .and_then(|u| u.candidates_token_count),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedImageMeta {
    mime_type: String,
    meta: ResponseMeta,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<ApiInlineData>,
}

impl ApiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn inline_image(mime_type: &str, data: &str) -> Self {
        Self {
            text: None,
            inline_data: Some(ApiInlineData {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ApiImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiImageConfig {
    aspect_ratio: String,
    image_size: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    usage_metadata: Option<ApiUsage>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Gemini::new("test-key");
        assert_eq!(client.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(client.image_model, DEFAULT_IMAGE_MODEL);
        assert!(client.cache_dir.is_none());
    }

    #[test]
    fn test_client_with_models() {
        let client = Gemini::new("test-key")
            .with_text_model("gemini-2.5-pro")
            .with_image_model("imagen-4");
        assert_eq!(client.text_model(), "gemini-2.5-pro");
        assert_eq!(client.image_model(), "imagen-4");
    }

    #[test]
    fn test_structured_request_builder() {
        let request = StructuredRequest::new("expand this", serde_json::json!({"type": "object"}))
            .with_system_instruction("You are a writer")
            .with_temperature(0.8);

        assert_eq!(request.prompt, "expand this");
        assert!(request.system_instruction.is_some());
        assert_eq!(request.temperature, Some(0.8));
    }

    #[test]
    fn test_image_request_defaults() {
        let request = ImageRequest::new("a castle at dusk");
        assert_eq!(request.aspect_ratio, "9:16");
        assert_eq!(request.resolution, "1K");
        assert_eq!(request.style, "webtoon");
        assert!(!request.overwrite_cache);
    }

    #[test]
    fn test_cache_key_deterministic() {
        let a = ImageRequest::new("a castle").with_reference("/tmp/ref.png", "hero");
        let b = ImageRequest::new("a castle").with_reference("/tmp/ref.png", "hero");
        assert_eq!(a.cache_key("m"), b.cache_key("m"));
    }

    #[test]
    fn test_cache_key_varies_by_parameters() {
        let base = ImageRequest::new("a castle");
        let other_prompt = ImageRequest::new("a cottage");
        let other_ratio = ImageRequest::new("a castle").with_aspect_ratio("16:9");

        assert_ne!(base.cache_key("m"), other_prompt.cache_key("m"));
        assert_ne!(base.cache_key("m"), other_ratio.cache_key("m"));
        assert_ne!(base.cache_key("m"), base.cache_key("other-model"));
    }

    #[test]
    fn test_image_parameters_reach_generation_config() {
        let request = ImageRequest::new("a castle")
            .with_aspect_ratio("16:9")
            .with_resolution("2K");
        let config = serde_json::to_value(image_generation_config(&request)).expect("serialize");
        assert_eq!(config["imageConfig"]["aspectRatio"], "16:9");
        assert_eq!(config["imageConfig"]["imageSize"], "2K");
        assert!(config.get("responseSchema").is_none());
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a.png")), "image/png");
        assert_eq!(mime_for_path(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_for_path(Path::new("a")), "image/png");
    }

    #[tokio::test]
    async fn test_image_cache_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = Gemini::new("test-key").with_cache_dir(dir.path());

        let image = GeneratedImage {
            bytes: vec![1, 2, 3, 4],
            mime_type: "image/png".to_string(),
            meta: ResponseMeta {
                model: "m".to_string(),
                finish_reason: Some("STOP".to_string()),
                input_tokens: Some(10),
                output_tokens: Some(20),
            },
            from_cache: false,
        };

        client.write_cache("abc123", &image).await.expect("write");
        let cached = client
            .read_cache("abc123")
            .await
            .expect("read")
            .expect("cache hit");

        assert_eq!(cached.bytes, vec![1, 2, 3, 4]);
        assert_eq!(cached.mime_type, "image/png");
        assert!(cached.from_cache);
    }

    #[tokio::test]
    async fn test_cache_miss_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = Gemini::new("test-key").with_cache_dir(dir.path());
        assert!(client.read_cache("missing").await.expect("read").is_none());
    }
}
