// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provider registry.
//!
//! Built once at worker startup from environment-derived config; read-only
//! afterwards, so sharing it process-wide is safe. Workflows never touch it
//! directly: activities dispatch by index or by the opaque ref string a
//! workflow carried in its input.

use std::sync::Arc;

use thiserror::Error;

use crate::groq::GroqProvider;
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::refs::{ProviderRef, parse_provider_list};
use crate::types::{EmbeddingProvider, LlmProvider};

/// Registry construction errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Provider name not recognized.
    #[error("unsupported provider: {0}")]
    Unsupported(String),

    /// Entry used for an operation its kind cannot serve.
    #[error("provider {name} does not support {capability}")]
    MissingCapability {
        /// The provider entry.
        name: String,
        /// "embeddings" or "llm".
        capability: &'static str,
    },
}

/// Configuration for building a registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Pipe-separated LLM provider list.
    pub llm_providers: String,
    /// Pipe-separated embedding provider list.
    pub embed_providers: String,
    /// Declared embedding dimension.
    pub embed_dim: usize,
}

struct NamedEmbed {
    reference: ProviderRef,
    provider: Arc<dyn EmbeddingProvider>,
}

struct NamedLlm {
    reference: ProviderRef,
    provider: Arc<dyn LlmProvider>,
}

/// Ordered registry of embedding and LLM provider handles.
pub struct ProviderRegistry {
    embed: Vec<NamedEmbed>,
    llm: Vec<NamedLlm>,
    embed_dim: usize,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("embed", &self.embed.iter().map(|e| &e.reference).collect::<Vec<_>>())
            .field("llm", &self.llm.iter().map(|l| &l.reference).collect::<Vec<_>>())
            .field("embed_dim", &self.embed_dim)
            .finish()
    }
}

impl ProviderRegistry {
    /// Build a registry from config. Each entry must carry the capability the
    /// list it appears in requires; violations fail construction.
    pub fn new(cfg: &RegistryConfig) -> Result<Self, RegistryError> {
        let mut embed = Vec::new();
        for reference in parse_provider_list(&cfg.embed_providers) {
            let provider = build_embed(&reference, cfg.embed_dim)?;
            embed.push(NamedEmbed {
                reference,
                provider,
            });
        }
        let mut llm = Vec::new();
        for reference in parse_provider_list(&cfg.llm_providers) {
            let provider = build_llm(&reference, cfg.embed_dim)?;
            llm.push(NamedLlm {
                reference,
                provider,
            });
        }
        Ok(Self {
            embed,
            llm,
            embed_dim: cfg.embed_dim,
        })
    }

    /// Declared embedding dimension.
    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    /// Number of embedding providers.
    pub fn embed_count(&self) -> usize {
        self.embed.len()
    }

    /// Number of LLM providers.
    pub fn llm_count(&self) -> usize {
        self.llm.len()
    }

    /// Embedding handle by position. Out-of-range indices clamp to 0.
    pub fn embed_by_index(&self, index: usize) -> (Arc<dyn EmbeddingProvider>, ProviderRef) {
        let i = if index < self.embed.len() { index } else { 0 };
        let entry = &self.embed[i];
        (entry.provider.clone(), entry.reference.clone())
    }

    /// LLM handle by position. Out-of-range indices clamp to 0.
    pub fn llm_by_index(&self, index: usize) -> (Arc<dyn LlmProvider>, ProviderRef) {
        let i = if index < self.llm.len() { index } else { 0 };
        let entry = &self.llm[i];
        (entry.provider.clone(), entry.reference.clone())
    }

    /// Embedding provider indices with non-mock entries first.
    pub fn preferred_embed_order(&self) -> Vec<usize> {
        preferred_order(self.embed.len(), |i| self.embed[i].reference.name.as_str())
    }

    /// LLM provider indices with non-mock entries first.
    pub fn preferred_llm_order(&self) -> Vec<usize> {
        preferred_order(self.llm.len(), |i| self.llm[i].reference.name.as_str())
    }

    /// Resolve a caller-supplied embedding provider string (raw entry, bare
    /// name, or name:alias, case-insensitive) to its index.
    pub fn find_embed_index(&self, raw_or_name: &str) -> Option<usize> {
        find_index(raw_or_name, self.embed.iter().map(|e| &e.reference))
    }

    /// Resolve a caller-supplied LLM provider string to its index.
    pub fn find_llm_index(&self, raw_or_name: &str) -> Option<usize> {
        find_index(raw_or_name, self.llm.iter().map(|e| &e.reference))
    }

    /// Opaque ref strings for the embedding list, in order.
    pub fn embed_refs(&self) -> Vec<String> {
        self.embed.iter().map(|e| e.reference.raw.clone()).collect()
    }

    /// Opaque ref strings for the LLM list, in order.
    pub fn llm_refs(&self) -> Vec<String> {
        self.llm.iter().map(|e| e.reference.raw.clone()).collect()
    }
}

fn preferred_order<'a>(n: usize, name_at: impl Fn(usize) -> &'a str) -> Vec<usize> {
    let mut out: Vec<usize> = (0..n).filter(|&i| name_at(i) != "mock").collect();
    out.extend((0..n).filter(|&i| name_at(i) == "mock"));
    out
}

fn find_index<'a>(raw_or_name: &str, refs: impl Iterator<Item = &'a ProviderRef>) -> Option<usize> {
    let target = raw_or_name.trim().to_lowercase();
    if target.is_empty() {
        return None;
    }
    for (i, reference) in refs.enumerate() {
        let mut candidates = vec![
            reference.raw.trim().to_lowercase(),
            reference.name.trim().to_lowercase(),
        ];
        if !reference.key_alias.is_empty() {
            candidates.push(format!(
                "{}:{}",
                reference.name.trim().to_lowercase(),
                reference.key_alias.trim().to_lowercase()
            ));
        }
        if candidates.contains(&target) {
            return Some(i);
        }
    }
    None
}

fn build_embed(
    reference: &ProviderRef,
    dim: usize,
) -> Result<Arc<dyn EmbeddingProvider>, RegistryError> {
    match reference.name.to_lowercase().as_str() {
        "mock" => Ok(Arc::new(MockProvider::new(dim))),
        "openai" => Ok(Arc::new(OpenAiProvider::new(&reference.key_alias))),
        "ollama" => Ok(Arc::new(OllamaProvider::new(&reference.key_alias))),
        "groq" => Err(RegistryError::MissingCapability {
            name: reference.raw.clone(),
            capability: "embeddings",
        }),
        _ => Err(RegistryError::Unsupported(reference.name.clone())),
    }
}

fn build_llm(reference: &ProviderRef, dim: usize) -> Result<Arc<dyn LlmProvider>, RegistryError> {
    match reference.name.to_lowercase().as_str() {
        "mock" => Ok(Arc::new(MockProvider::new(dim))),
        "openai" => Ok(Arc::new(OpenAiProvider::new(&reference.key_alias))),
        "groq" => Ok(Arc::new(GroqProvider::new(&reference.key_alias))),
        "ollama" => Err(RegistryError::MissingCapability {
            name: reference.raw.clone(),
            capability: "llm",
        }),
        _ => Err(RegistryError::Unsupported(reference.name.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(embed: &str, llm: &str) -> ProviderRegistry {
        ProviderRegistry::new(&RegistryConfig {
            llm_providers: llm.to_string(),
            embed_providers: embed.to_string(),
            embed_dim: 64,
        })
        .unwrap()
    }

    #[test]
    fn test_empty_lists_seed_mock() {
        let reg = registry("", "");
        assert_eq!(reg.embed_count(), 1);
        assert_eq!(reg.llm_count(), 1);
        assert_eq!(reg.embed_refs(), vec!["mock".to_string()]);
    }

    #[test]
    fn test_index_clamps_out_of_range() {
        let reg = registry("mock|openai:key1", "mock");
        let (_, reference) = reg.embed_by_index(99);
        assert_eq!(reference.name, "mock");
        let (_, reference) = reg.embed_by_index(1);
        assert_eq!(reference.raw, "openai:key1");
    }

    #[test]
    fn test_preferred_order_puts_mock_last() {
        let reg = registry("mock|openai:key1|ollama", "mock|groq:fast");
        assert_eq!(reg.preferred_embed_order(), vec![1, 2, 0]);
        assert_eq!(reg.preferred_llm_order(), vec![1, 0]);
    }

    #[test]
    fn test_find_index_matches_raw_name_and_alias_forms() {
        let reg = registry("openai:key1|mock", "mock");
        assert_eq!(reg.find_embed_index("openai:key1"), Some(0));
        assert_eq!(reg.find_embed_index("OPENAI"), Some(0));
        assert_eq!(reg.find_embed_index("mock"), Some(1));
        assert_eq!(reg.find_embed_index("ollama"), None);
        assert_eq!(reg.find_embed_index("  "), None);
    }

    #[test]
    fn test_capability_enforced_at_construction() {
        let err = ProviderRegistry::new(&RegistryConfig {
            llm_providers: "ollama".to_string(),
            embed_providers: "mock".to_string(),
            embed_dim: 64,
        })
        .unwrap_err();
        assert!(err.to_string().contains("does not support llm"));

        let err = ProviderRegistry::new(&RegistryConfig {
            llm_providers: "mock".to_string(),
            embed_providers: "groq:fast".to_string(),
            embed_dim: 64,
        })
        .unwrap_err();
        assert!(err.to_string().contains("does not support embeddings"));
    }

    #[test]
    fn test_unsupported_provider_rejected() {
        let err = ProviderRegistry::new(&RegistryConfig {
            llm_providers: "anthropic".to_string(),
            embed_providers: "mock".to_string(),
            embed_dim: 64,
        })
        .unwrap_err();
        assert!(matches!(err, RegistryError::Unsupported(_)));
    }

    #[test]
    fn test_refs_preserve_order_and_raw_form() {
        let reg = registry("openai:key1|openai:key2|mock", "mock");
        assert_eq!(
            reg.embed_refs(),
            vec!["openai:key1", "openai:key2", "mock"]
        );
    }
}
