// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Quire Providers - Embedding/LLM provider registry and error classification.
//!
//! The registry parses a pipe-separated provider list (`"openai:key1|mock"`)
//! into an ordered sequence of capability-typed handles. Each handle is built
//! from the environment once, at worker startup; workflows only ever see
//! provider *counts*, *indices*, and opaque *ref strings*, which is what
//! keeps workflow history stable across environment changes.
//!
//! An empty list seeds a single deterministic mock provider, so the system is
//! operable without any external credentials.
//!
//! The [`classify`] function maps any provider's error text to one of five
//! kinds; the workflow failover engine turns those kinds into cooldowns,
//! in-place backoff, context reduction, or provider switching.

mod errors;
mod groq;
mod mock;
mod ollama;
mod openai;
mod refs;
mod registry;
mod types;

pub use errors::{ErrorKind, ProviderError, classify};
pub use groq::GroqProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use refs::{ProviderRef, parse_provider_list};
pub use registry::{ProviderRegistry, RegistryConfig, RegistryError};
pub use types::{
    EmbedRequest, EmbeddingProvider, GenerateRequest, GenerateResponse, LlmProvider, ProviderInfo,
};
