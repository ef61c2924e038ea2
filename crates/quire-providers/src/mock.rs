// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic mock provider.
//!
//! Embeddings are sha256-seeded, dimension-exact, unit-ish normalized
//! vectors; generation returns canned text keyed by the operation label.
//! The mock is the final fallback in preferred ordering, which is what makes
//! the whole system operable without credentials.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::errors::ProviderError;
use crate::types::{
    EmbedRequest, EmbeddingProvider, GenerateRequest, GenerateResponse, LlmProvider, ProviderInfo,
};

const DEFAULT_DIM: usize = 1536;

/// Deterministic provider supporting both capabilities.
#[derive(Debug, Clone)]
pub struct MockProvider {
    dim: usize,
}

impl MockProvider {
    /// Create a mock with the given default dimension (0 falls back to 1536).
    pub fn new(dim: usize) -> Self {
        Self {
            dim: if dim == 0 { DEFAULT_DIM } else { dim },
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed(
        &self,
        req: EmbedRequest,
    ) -> Result<(Vec<Vec<f32>>, ProviderInfo), ProviderError> {
        let dim = if req.dimension == 0 { self.dim } else { req.dimension };
        let vectors = req
            .inputs
            .iter()
            .map(|input| deterministic_vector(input, dim))
            .collect();
        Ok((
            vectors,
            ProviderInfo {
                name: "mock".to_string(),
                model: format!("mock-embed-{}", dim),
                key: "mock".to_string(),
            },
        ))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(
        &self,
        req: GenerateRequest,
    ) -> Result<(GenerateResponse, ProviderInfo), ProviderError> {
        let operation = req.operation.to_lowercase();
        let text = if operation.contains("survey") {
            "\\section{Related Work}\nDeterministic mock synthesis of the retrieved literature with citations [ref1].".to_string()
        } else if operation.contains("kg_extract") {
            "{\"triples\":[]}".to_string()
        } else {
            let mut out = String::from("Mock response.");
            for i in 0..req.context.len() {
                out.push_str(&format!(" [C{}]", i + 1));
            }
            out
        };
        Ok((
            GenerateResponse { text },
            ProviderInfo {
                name: "mock".to_string(),
                model: "mock-llm-v1".to_string(),
                key: "mock".to_string(),
            },
        ))
    }
}

/// Map an input text to a stable pseudo-random vector of the given dimension.
fn deterministic_vector(input: &str, dim: usize) -> Vec<f32> {
    let seed: &[u8] = if input.is_empty() {
        b"empty"
    } else {
        input.as_bytes()
    };
    let mut vec = Vec::with_capacity(dim);
    for i in 0..dim {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update([(i % 251) as u8]);
        let digest = hasher.finalize();
        let word = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        vec.push((word % 2000) as f32 / 1000.0 - 1.0);
    }
    normalize(vec)
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let sum: f32 = v.iter().map(|x| x * x).sum();
    if sum == 0.0 {
        return v;
    }
    let inv = 1.0 / (f64::from(sum) + 1e-9) as f32;
    for x in &mut v {
        *x *= inv;
    }
    v
}
