//! Test support: a scripted generation backend.
//!
//! `MockBackend` implements [`GenerationBackend`] without any network.
//! Structured responses are queued up front; image calls return a tiny
//! fixed payload unless the prompt matches a scripted failure.

use crate::error::ServiceError;
use crate::generate::GenerationBackend;
use async_trait::async_trait;
use gemini::{GeneratedImage, ImageRequest, ResponseMeta, StructuredRequest};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct MockBackend {
    structured_queue: Mutex<VecDeque<serde_json::Value>>,
    structured_prompts: Mutex<Vec<String>>,
    structured_temperatures: Mutex<Vec<Option<f32>>>,
    image_prompts: Mutex<Vec<String>>,
    image_references: Mutex<Vec<Vec<String>>>,
    image_failures: Mutex<Vec<String>>,
    structured_calls: AtomicUsize,
    image_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            structured_queue: Mutex::new(VecDeque::new()),
            structured_prompts: Mutex::new(Vec::new()),
            structured_temperatures: Mutex::new(Vec::new()),
            image_prompts: Mutex::new(Vec::new()),
            image_references: Mutex::new(Vec::new()),
            image_failures: Mutex::new(Vec::new()),
            structured_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
        }
    }

    /// Queue the next structured response.
    pub fn push_structured(&self, value: serde_json::Value) {
        self.structured_queue.lock().unwrap().push_back(value);
    }

    /// Make image generation fail whenever the prompt contains `needle`.
    pub fn fail_images_containing(&self, needle: impl Into<String>) {
        self.image_failures.lock().unwrap().push(needle.into());
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    /// All structured prompts seen so far.
    pub fn structured_prompts(&self) -> Vec<String> {
        self.structured_prompts.lock().unwrap().clone()
    }

    /// Temperature of each structured request, in call order.
    pub fn structured_temperatures(&self) -> Vec<Option<f32>> {
        self.structured_temperatures.lock().unwrap().clone()
    }

    /// All image prompts seen so far.
    pub fn image_prompts(&self) -> Vec<String> {
        self.image_prompts.lock().unwrap().clone()
    }

    /// Reference image notes per image call, in call order.
    pub fn image_references(&self) -> Vec<Vec<String>> {
        self.image_references.lock().unwrap().clone()
    }

    fn meta() -> ResponseMeta {
        ResponseMeta {
            model: "mock".to_string(),
            finish_reason: Some("STOP".to_string()),
            input_tokens: None,
            output_tokens: None,
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn structured(
        &self,
        request: StructuredRequest,
    ) -> Result<(serde_json::Value, ResponseMeta), ServiceError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.structured_prompts.lock().unwrap().push(request.prompt);
        self.structured_temperatures
            .lock()
            .unwrap()
            .push(request.temperature);

        let value = self
            .structured_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ServiceError::Backend("mock: no scripted response".to_string()))?;
        Ok((value, Self::meta()))
    }

    async fn image(&self, request: ImageRequest) -> Result<GeneratedImage, ServiceError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.image_prompts
            .lock()
            .unwrap()
            .push(request.prompt.clone());
        self.image_references.lock().unwrap().push(
            request
                .reference_images
                .iter()
                .map(|r| r.note.clone())
                .collect(),
        );

        let failing = self
            .image_failures
            .lock()
            .unwrap()
            .iter()
            .any(|needle| request.prompt.contains(needle));
        if failing {
            return Err(ServiceError::Backend("mock: scripted image failure".to_string()));
        }

        Ok(GeneratedImage {
            bytes: b"mock-image".to_vec(),
            mime_type: "image/png".to_string(),
            meta: Self::meta(),
            from_cache: false,
        })
    }

    fn image_model(&self) -> String {
        "mock".to_string()
    }
}
