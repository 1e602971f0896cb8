//! Embedding backends.
//!
//! A backend turns images and text into vectors of one shared metric space.
//! Backends can be built from plain closures or served by a remote embedding
//! endpoint.

use std::io::Cursor;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ImageFormat;
use image::imageops::FilterType;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::{Embedding, SourceImage};

/// Trait for embedding backends.
///
/// Both embedding functions must be deterministic for fixed model weights.
/// Vectors from different backends are never comparable.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Get the registered name of this backend.
    fn name(&self) -> &str;

    /// Get the dimensionality of every vector this backend produces.
    fn dimension(&self) -> usize;

    /// Load whatever the backend needs before its first embedding.
    ///
    /// Must be idempotent: once it has succeeded, later calls are no-ops.
    async fn activate(&self) -> Result<()> {
        Ok(())
    }

    /// Embed a decoded image.
    async fn embed_image(&self, image: &SourceImage) -> Result<Embedding>;

    /// Embed a text query. The empty string is passed through to the model.
    async fn embed_text(&self, text: &str) -> Result<Embedding>;
}

/// Verify that a vector has the dimensionality its backend declares.
pub fn check_dimension(expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}

fn ensure_supported(image: &SourceImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(EmbeddingError::UnsupportedInput(format!(
            "image has no pixels ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

fn unavailable(name: &str, err: EmbeddingError) -> EmbeddingError {
    match err {
        err @ EmbeddingError::BackendUnavailable { .. } => err,
        other => EmbeddingError::BackendUnavailable {
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}

type ImageFn = dyn Fn(&SourceImage) -> Result<Embedding> + Send + Sync;
type TextFn = dyn Fn(&str) -> Result<Embedding> + Send + Sync;
type LoadFn = dyn Fn() -> Result<()> + Send + Sync;

/// Backend built from a pair of embedding closures.
///
/// This is how an in-process model is handed to the search core: the caller
/// owns the model and exposes it as `embed_image`/`embed_text` functions.
///
/// The closures are called inline on the task that awaits the embedding, so
/// a slow model blocks that executor thread for the duration of the call.
/// Wrap heavy inference in `tokio::task::spawn_blocking` (or run the session
/// on a dedicated runtime) when other tasks share the executor.
pub struct FnBackend {
    name: String,
    dimension: usize,
    embed_image: Box<ImageFn>,
    embed_text: Box<TextFn>,
    loader: Option<Box<LoadFn>>,
    loaded: OnceCell<()>,
}

impl FnBackend {
    /// Create a backend from two embedding functions.
    pub fn new<I, T>(
        name: impl Into<String>,
        embed_image: I,
        embed_text: T,
        dimension: usize,
    ) -> Self
    where
        I: Fn(&SourceImage) -> Result<Embedding> + Send + Sync + 'static,
        T: Fn(&str) -> Result<Embedding> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dimension,
            embed_image: Box::new(embed_image),
            embed_text: Box::new(embed_text),
            loader: None,
            loaded: OnceCell::new(),
        }
    }

    /// Run `loader` once, before the first embedding or on activation.
    pub fn with_loader<L>(mut self, loader: L) -> Self
    where
        L: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.loader = Some(Box::new(loader));
        self
    }
}

impl std::fmt::Debug for FnBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnBackend")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("loaded", &self.loaded.initialized())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmbeddingBackend for FnBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn activate(&self) -> Result<()> {
        self.loaded
            .get_or_try_init(|| async {
                if let Some(loader) = &self.loader {
                    info!("Loading embedding backend: {}", self.name);
                    loader().map_err(|err| unavailable(&self.name, err))?;
                }
                Ok::<(), EmbeddingError>(())
            })
            .await?;
        Ok(())
    }

    async fn embed_image(&self, image: &SourceImage) -> Result<Embedding> {
        self.activate().await?;
        ensure_supported(image)?;
        (self.embed_image)(image)
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        self.activate().await?;
        (self.embed_text)(text)
    }
}

/// Default square edge length images are resized to before upload.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Backend served by a remote embedding endpoint.
///
/// Speaks the OpenAI-style embeddings format: `POST {base_url}/embeddings`
/// with `input` for text or `image` (base64 PNG) for images.
pub struct HttpBackend {
    /// Registered backend name.
    name: String,

    /// API base URL.
    base_url: String,

    /// Optional bearer token.
    api_key: Option<String>,

    /// Model requested from the endpoint.
    model: String,

    /// Declared vector dimensionality.
    dimension: usize,

    /// Square edge length images are resized to.
    input_size: u32,

    /// HTTP client.
    client: reqwest::Client,

    /// Set once the warm-up request has succeeded.
    warmed_up: OnceCell<()>,
}

impl HttpBackend {
    /// Create a new remote backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            dimension,
            input_size: DEFAULT_INPUT_SIZE,
            client: reqwest::Client::new(),
            warmed_up: OnceCell::new(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the square edge length images are resized to.
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    /// Convert an image into the base64 PNG payload the endpoint expects.
    fn encode_image(&self, image: &SourceImage) -> Result<String> {
        ensure_supported(image)?;

        let rgb = image.to_rgb8();
        let resized =
            image::imageops::resize(&rgb, self.input_size, self.input_size, FilterType::Triangle);

        let mut png = Vec::new();
        resized.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        Ok(BASE64.encode(png))
    }

    async fn request(&self, body: serde_json::Value) -> Result<Embedding> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();

            return Err(EmbeddingError::ApiRequest(format!(
                "rate limited, retry after {retry_after}s"
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let result: RemoteEmbeddingResponse = response.json().await?;

        let embedding = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))?
            .embedding;

        debug!(
            "Received {}-dimensional embedding from model {}",
            embedding.len(),
            result.model
        );

        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn activate(&self) -> Result<()> {
        self.warmed_up
            .get_or_try_init(|| async {
                info!("Warming up remote backend {} at {}", self.name, self.base_url);
                let probe = self
                    .request(serde_json::json!({ "model": self.model, "input": "" }))
                    .await
                    .and_then(|embedding| check_dimension(self.dimension, &embedding));
                probe.map_err(|err| unavailable(&self.name, err))
            })
            .await?;
        Ok(())
    }

    async fn embed_image(&self, image: &SourceImage) -> Result<Embedding> {
        self.activate().await?;
        let payload = self.encode_image(image)?;
        self.request(serde_json::json!({ "model": self.model, "image": payload }))
            .await
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        self.activate().await?;
        self.request(serde_json::json!({ "model": self.model, "input": text }))
            .await
    }
}

/// Remote embeddings response format.
#[derive(Debug, Deserialize)]
struct RemoteEmbeddingResponse {
    data: Vec<RemoteEmbeddingData>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct RemoteEmbeddingData {
    embedding: Vec<f32>,
    #[allow(dead_code)]
    index: usize,
}
