//! Generation backend abstraction and prompt construction.
//!
//! Prompt building is separated from API calls throughout this module so
//! prompts can be reviewed (and unit-tested) without a live backend.

use crate::error::ServiceError;
use async_trait::async_trait;
use gemini::{Gemini, GeneratedImage, ImageRequest, ResponseMeta, StructuredRequest};

pub mod chapter;
pub mod character;
pub mod location;
pub mod panel;
pub mod story;

/// The model calls the services depend on. Implemented by the Gemini
/// client in production and by a scripted mock in tests.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate structured JSON conforming to the request's schema.
    async fn structured(
        &self,
        request: StructuredRequest,
    ) -> Result<(serde_json::Value, ResponseMeta), ServiceError>;

    /// Generate an image.
    async fn image(&self, request: ImageRequest) -> Result<GeneratedImage, ServiceError>;

    /// Model name recorded into asset sidecars.
    fn image_model(&self) -> String;
}

#[async_trait]
impl GenerationBackend for Gemini {
    async fn structured(
        &self,
        request: StructuredRequest,
    ) -> Result<(serde_json::Value, ResponseMeta), ServiceError> {
        let response = self
            .generate_structured::<serde_json::Value>(request)
            .await?;
        Ok((response.value, response.meta))
    }

    async fn image(&self, request: ImageRequest) -> Result<GeneratedImage, ServiceError> {
        Ok(self.generate_image(request).await?)
    }

    fn image_model(&self) -> String {
        Gemini::image_model(self).to_string()
    }
}
