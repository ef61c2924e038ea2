// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OpenAI provider (embeddings + generation) over the standard REST APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::ProviderError;
use crate::types::{
    EmbedRequest, EmbeddingProvider, GenerateRequest, GenerateResponse, LlmProvider, ProviderInfo,
};

const EMBED_MODEL: &str = "text-embedding-3-small";
const CHAT_MODEL: &str = "gpt-4o-mini";
const BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI REST provider. The key resolves from the environment at
/// construction; a handle without a key fails at call time with an error
/// naming the alias.
pub struct OpenAiProvider {
    key_alias: String,
    api_key: String,
    client: Client,
}

impl OpenAiProvider {
    /// Build a handle for the given key alias.
    pub fn new(key_alias: &str) -> Self {
        Self {
            key_alias: key_alias.to_string(),
            api_key: resolve_key(key_alias),
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    fn info(&self, model: &str) -> ProviderInfo {
        ProviderInfo {
            name: "openai".to_string(),
            model: model.to_string(),
            key: self.key_alias.clone(),
        }
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingKey {
                provider: "openai",
                alias: self.key_alias.clone(),
            });
        }
        Ok(&self.api_key)
    }
}

fn resolve_key(alias: &str) -> String {
    if !alias.is_empty()
        && let Ok(key) = std::env::var(format!("QUIRE_OPENAI_KEY_{}", alias.to_uppercase()))
        && !key.is_empty()
    {
        return key;
    }
    std::env::var("OPENAI_API_KEY").unwrap_or_default()
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(
        &self,
        req: EmbedRequest,
    ) -> Result<(Vec<Vec<f32>>, ProviderInfo), ProviderError> {
        let key = self.require_key()?;
        let response = self
            .client
            .post(format!("{}/embeddings", BASE_URL))
            .bearer_auth(key)
            .json(&json!({ "model": EMBED_MODEL, "input": req.inputs }))
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: "openai",
                operation: "embedding",
                details: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() >= 400 {
            return Err(ProviderError::Api {
                provider: "openai",
                operation: "embedding",
                status: status.as_u16(),
                body,
            });
        }
        let parsed: EmbeddingResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
                provider: "openai",
                operation: "embedding",
                details: e.to_string(),
            })?;
        let vectors = parsed.data.into_iter().map(|d| d.embedding).collect();
        Ok((vectors, self.info(EMBED_MODEL)))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(
        &self,
        req: GenerateRequest,
    ) -> Result<(GenerateResponse, ProviderInfo), ProviderError> {
        let key = self.require_key()?;
        let mut prompt = req.prompt;
        if !req.context.is_empty() {
            prompt.push_str("\n\nContext:\n");
            prompt.push_str(&req.context.join("\n\n"));
        }
        let response = self
            .client
            .post(format!("{}/chat/completions", BASE_URL))
            .bearer_auth(key)
            .json(&json!({
                "model": CHAT_MODEL,
                "messages": [
                    {"role": "system", "content": "You are a literature survey assistant. Use concise, citation-grounded responses."},
                    {"role": "user", "content": prompt},
                ],
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: "openai",
                operation: "generate",
                details: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() >= 400 {
            return Err(ProviderError::Api {
                provider: "openai",
                operation: "generate",
                status: status.as_u16(),
                body,
            });
        }
        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
            provider: "openai",
            operation: "generate",
            details: e.to_string(),
        })?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(ProviderError::Other(
                "openai returned empty choices".to_string(),
            ));
        };
        Ok((
            GenerateResponse {
                text: choice.message.content,
            },
            self.info(CHAT_MODEL),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_errors_with_alias() {
        let provider = OpenAiProvider {
            key_alias: "key1".to_string(),
            api_key: String::new(),
            client: Client::new(),
        };
        let err = provider
            .embed(EmbedRequest::default())
            .await
            .expect_err("keyless call must fail");
        assert!(err.to_string().contains("key1"));
    }
}
