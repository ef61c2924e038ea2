// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ollama provider: local, free embeddings. Embedding capability only.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::ProviderError;
use crate::types::{EmbedRequest, EmbeddingProvider, ProviderInfo};

const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Ollama embeddings over the local HTTP API.
pub struct OllamaProvider {
    alias: String,
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaProvider {
    /// Build a handle; base url and model resolve from the environment.
    pub fn new(alias: &str) -> Self {
        let base_url = std::env::var("QUIRE_OLLAMA_BASE_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Self {
            alias: alias.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: resolve_model(alias),
            client: Client::builder()
                .timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
        }
    }
}

fn resolve_model(alias: &str) -> String {
    if !alias.is_empty()
        && let Ok(model) = std::env::var(format!("QUIRE_OLLAMA_EMBED_MODEL_{}", alias.to_uppercase()))
        && !model.is_empty()
    {
        return model;
    }
    std::env::var("QUIRE_OLLAMA_EMBED_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string())
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(
        &self,
        req: EmbedRequest,
    ) -> Result<(Vec<Vec<f32>>, ProviderInfo), ProviderError> {
        let info = ProviderInfo {
            name: "ollama".to_string(),
            model: self.model.clone(),
            key: self.alias.clone(),
        };
        if req.inputs.is_empty() {
            return Err(ProviderError::Other("no embedding inputs".to_string()));
        }
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&json!({ "model": self.model, "input": req.inputs }))
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: "ollama",
                operation: "embedding",
                details: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() >= 400 {
            return Err(ProviderError::Api {
                provider: "ollama",
                operation: "embedding",
                status: status.as_u16(),
                body,
            });
        }
        let parsed: OllamaEmbedResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
                provider: "ollama",
                operation: "embedding",
                details: e.to_string(),
            })?;
        Ok((parsed.embeddings, info))
    }
}
