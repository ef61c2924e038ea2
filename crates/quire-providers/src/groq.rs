// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Groq provider: fast hosted inference. Generation capability only.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::ProviderError;
use crate::types::{GenerateRequest, GenerateResponse, LlmProvider, ProviderInfo};

const CHAT_MODEL: &str = "llama-3.1-8b-instant";
const BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq chat-completions provider.
pub struct GroqProvider {
    key_alias: String,
    api_key: String,
    client: Client,
}

impl GroqProvider {
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
}

fn resolve_key(alias: &str) -> String {
    if !alias.is_empty()
        && let Ok(key) = std::env::var(format!("QUIRE_GROQ_KEY_{}", alias.to_uppercase()))
        && !key.is_empty()
    {
        return key;
    }
    std::env::var("GROQ_API_KEY").unwrap_or_default()
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
impl LlmProvider for GroqProvider {
    async fn generate(
        &self,
        req: GenerateRequest,
    ) -> Result<(GenerateResponse, ProviderInfo), ProviderError> {
        let info = ProviderInfo {
            name: "groq".to_string(),
            model: CHAT_MODEL.to_string(),
            key: self.key_alias.clone(),
        };
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingKey {
                provider: "groq",
                alias: self.key_alias.clone(),
            });
        }
        let mut prompt = req.prompt;
        if !req.context.is_empty() {
            prompt.push_str("\n\nContext:\n");
            prompt.push_str(&req.context.join("\n\n"));
        }
        let response = self
            .client
            .post(format!("{}/chat/completions", BASE_URL))
            .bearer_auth(&self.api_key)
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
                provider: "groq",
                operation: "generate",
                details: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() >= 400 {
            return Err(ProviderError::Api {
                provider: "groq",
                operation: "generate",
                status: status.as_u16(),
                body,
            });
        }
        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
            provider: "groq",
            operation: "generate",
            details: e.to_string(),
        })?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(ProviderError::Other("groq returned empty choices".to_string()));
        };
        Ok((
            GenerateResponse {
                text: choice.message.content,
            },
            info,
        ))
    }
}
