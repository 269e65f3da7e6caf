/// OpenAI embedding provider
///
/// Calls the OpenAI Embeddings API using reqwest.
/// Uses text-embedding-3-small (1536 dimensions) by default.
/// Requires ASSESSREC_EMBEDDING__OPENAI_API_KEY env var or embedding.openai_api_key in config.

use async_trait::async_trait;

use super::{EmbeddingError, EmbeddingProvider};

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Request body for OpenAI Embeddings API
#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

/// Response from OpenAI Embeddings API
#[derive(serde::Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

/// Single embedding result from OpenAI
#[derive(serde::Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

fn model_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// OpenAI-backed embedding provider.
///
/// Requires a valid API key — validated on construction, not at embed time.
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dim: usize,
}

impl OpenAIEmbeddingProvider {
    /// Create a new OpenAIEmbeddingProvider.
    ///
    /// # Errors
    /// Returns `EmbeddingError::NotConfigured` if api_key is empty.
    pub fn new(api_key: String, model: String) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::NotConfigured(
                "OpenAI API key is required when using the openai embedding provider. \
                 Set ASSESSREC_EMBEDDING__OPENAI_API_KEY or embedding.openai_api_key in assessrec.toml"
                    .to_string(),
            ));
        }

        let dim = model_dimension(&model);
        Ok(OpenAIEmbeddingProvider {
            client: reqwest::Client::new(),
            api_key,
            model,
            dim,
        })
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbedRequest {
            input,
            model: &self.model,
        };

        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EmbeddingError::Api {
                status,
                message: body,
            });
        }

        let mut embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("Failed to parse API response: {}", e)))?;

        if embed_response.data.len() != input.len() {
            return Err(EmbeddingError::Generation(format!(
                "API returned {} embeddings for {} inputs",
                embed_response.data.len(),
                input.len()
            )));
        }

        // The API reports an index per item; order by it rather than trusting response order.
        embed_response.data.sort_by_key(|d| d.index);
        Ok(embed_response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.request(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Generation("API returned empty embedding list".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
