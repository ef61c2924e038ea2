// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provider capability traits and request/response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

/// Identity of the provider that served a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name ("mock", "openai", ...).
    pub name: String,
    /// Model identifier used for the call.
    pub model: String,
    /// Key alias the handle was built with (never the key itself).
    pub key: String,
}

/// Request for a text generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Logical operation label ("survey_ieee_latex", "kg_extract", ...).
    pub operation: String,
    /// The prompt body.
    pub prompt: String,
    /// Structured context window entries appended to the prompt.
    pub context: Vec<String>,
}

/// Response from a text generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Raw model output.
    pub text: String,
}

/// Request for an embedding call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedRequest {
    /// Logical operation label ("embed", "survey_topic_embed", ...).
    pub operation: String,
    /// Texts to embed, one vector per input.
    pub inputs: Vec<String>,
    /// Declared output dimension; vectors are padded or truncated to match.
    pub dimension: usize,
}

/// A provider that can produce embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed each input text into a vector.
    async fn embed(
        &self,
        req: EmbedRequest,
    ) -> Result<(Vec<Vec<f32>>, ProviderInfo), ProviderError>;
}

/// A provider that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate text for a prompt plus optional context window.
    async fn generate(
        &self,
        req: GenerateRequest,
    ) -> Result<(GenerateResponse, ProviderInfo), ProviderError>;
}
