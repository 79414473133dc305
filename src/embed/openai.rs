//! OpenAI-compatible `/embeddings` provider.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{EmbeddingProvider, ProviderDescriptor, ProviderError};

/// Blocking embeddings client that talks to OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    timeout: Duration,
    max_retries: usize,
}

impl OpenAiProvider {
    /// Builds a client. A blank key or model is reported as unavailable so the
    /// embedder can fall back instead of aborting.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Unavailable("missing OpenAI API key".into()));
        }
        if model.trim().is_empty() {
            return Err(ProviderError::Unavailable("missing OpenAI model name".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ProviderError::Unavailable("invalid OpenAI API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.trim().to_string(),
            dimension,
            timeout,
            max_retries: max_retries.max(1),
        })
    }

    fn should_retry(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_error(&self, err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
    }

    fn retry_backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(500 * (1 << capped))
    }
}

impl EmbeddingProvider for OpenAiProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            provider: "openai".into(),
            model: self.model.clone(),
            dimension: self.dimension,
        }
    }

    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
                dimensions: Some(self.dimension),
            };
            match self.client.post(&self.endpoint).json(&request).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp.json().map_err(|err| {
                            ProviderError::BadResponse(format!("unparseable body: {err}"))
                        })?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != inputs.len() {
                            return Err(ProviderError::CountMismatch {
                                expected: inputs.len(),
                                found: parsed.data.len(),
                            });
                        }
                        return Ok(parsed
                            .data
                            .into_iter()
                            .map(|entry| entry.embedding)
                            .collect());
                    }

                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if self.should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tracing::debug!(%status, attempt, "retrying embeddings request");
                        thread::sleep(self.retry_backoff(attempt));
                        continue;
                    }
                    return Err(ProviderError::BadResponse(format!("{status}: {body}")));
                }
                Err(err) => {
                    if self.is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tracing::debug!(error = %err, attempt, "retrying embeddings request");
                        thread::sleep(self.retry_backoff(attempt));
                        continue;
                    }
                    if err.is_timeout() {
                        return Err(ProviderError::Timeout(self.timeout));
                    }
                    if err.is_connect() {
                        return Err(ProviderError::Unavailable(err.to_string()));
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    #[serde(borrow)]
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_unavailable() {
        let err = OpenAiProvider::new(
            " ",
            "https://api.openai.com/v1",
            "text-embedding-3-small",
            384,
            Duration::from_secs(1),
            1,
        )
        .err()
        .expect("blank key rejected");
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn request_carries_dimensions() {
        let inputs = ["a", "b"];
        let request = EmbeddingRequest {
            model: "m",
            input: &inputs,
            dimensions: Some(384),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["dimensions"], 384);
        assert_eq!(json["input"][1], "b");
    }

    #[test]
    fn backoff_is_capped() {
        let provider = OpenAiProvider::new(
            "key",
            "http://localhost:9/v1/",
            "m",
            8,
            Duration::from_secs(1),
            3,
        )
        .expect("client");
        assert_eq!(provider.endpoint, "http://localhost:9/v1/embeddings");
        assert_eq!(provider.retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(provider.retry_backoff(9), Duration::from_millis(16000));
    }
}
