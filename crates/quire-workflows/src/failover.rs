// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provider failover engine.
//!
//! A workflow-local state machine that walks provider indices under
//! classified errors. State lives in workflow memory, but every input that
//! feeds it (activity outcomes, clock reads, sleeps) is a recorded
//! checkpoint, so a replay rebuilds identical state and issues the identical
//! sequence of provider indices and sleep durations.
//!
//! Policy per classified kind:
//!
//! | Kind | Action |
//! |------|--------|
//! | Quota | disable the provider for the cooldown window, switch |
//! | Rate | in-place backoff (2s·n, at most twice), then 2 min disable |
//! | Transient | in-place backoff (1s·n, at most twice), no disable |
//! | Context | returned to the caller (LLM path) for window reduction |
//! | Permanent | 1 min disable, switch |
//!
//! The attempt budget is 4·N (4 under strict mode). In-place retries under
//! non-strict mode do not consume the budget; under strict mode they do,
//! since there is no other provider to rotate to.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use quire_activities::ActivitySurface;
use quire_activities::types::{
    EmbedChunksInput, EmbedChunksOutput, EmbedQueryInput, EmbedQueryOutput, LlmCallLog,
    LlmGenerateInput, LlmGenerateOutput,
};
use quire_engine::{EngineError, RetryConfig, StepError, StepOptions, WorkflowCtx, WorkflowError};
use quire_providers::{ErrorKind, classify};

/// Disable window applied after repeated rate limiting.
const RATE_DISABLE: Duration = Duration::from_secs(120);
/// Disable window applied to permanently-failing providers.
const PERMANENT_DISABLE: Duration = Duration::from_secs(60);

/// Failover failure: either engine infrastructure or an exhausted/classified
/// provider error.
#[derive(Debug, thiserror::Error)]
pub enum FailoverError {
    /// Engine infrastructure fault; propagates as a workflow-level error.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Provider-level failure after classification.
    #[error("{message}")]
    Provider {
        /// The classified kind (the last seen, or Context for early return).
        kind: ErrorKind,
        /// The last provider error text.
        message: String,
    },
}

impl FailoverError {
    /// The classified kind, when this is a provider failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            Self::Engine(_) => None,
        }
    }
}

impl From<FailoverError> for WorkflowError {
    fn from(err: FailoverError) -> Self {
        match err {
            FailoverError::Engine(e) => WorkflowError::Engine(e),
            FailoverError::Provider { message, .. } => WorkflowError::Step(message),
        }
    }
}

/// Per-workflow failover state.
#[derive(Debug, Default)]
pub struct ProviderFailover {
    disabled_until: HashMap<usize, DateTime<Utc>>,
}

impl ProviderFailover {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_disabled(&self, index: usize, now: DateTime<Utc>) -> bool {
        self.disabled_until
            .get(&index)
            .is_some_and(|until| now < *until)
    }

    fn disable(&mut self, index: usize, now: DateTime<Utc>, window: Duration) {
        let until = now + chrono::Duration::seconds(window.as_secs() as i64);
        self.disabled_until.insert(index, until);
    }
}

/// Parameters shared by the failover call sites.
#[derive(Debug, Clone)]
pub struct FailoverParams {
    /// Number of configured providers for the operation.
    pub provider_count: usize,
    /// Quota cooldown window.
    pub cooldown: Duration,
    /// Caller-preferred provider index.
    pub preferred_index: Option<usize>,
    /// Pin every attempt to the preferred index.
    pub strict: bool,
}

impl FailoverParams {
    /// Unpreferred parameters.
    pub fn rotating(provider_count: usize, cooldown: Duration) -> Self {
        Self {
            provider_count,
            cooldown,
            preferred_index: None,
            strict: false,
        }
    }

    fn effective_strict(&self) -> bool {
        self.strict && self.preferred_index.is_some()
    }

    fn max_attempts(&self) -> usize {
        if self.effective_strict() {
            4
        } else {
            (self.provider_count.max(1)) * 4
        }
    }

    fn candidate(&self, attempt: usize) -> usize {
        let n = self.provider_count.max(1);
        match (self.effective_strict(), self.preferred_index) {
            (true, Some(p)) => p,
            (false, Some(p)) => (p + attempt) % n,
            _ => attempt % n,
        }
    }
}

// Provider calls are not retried at the step layer: the failover engine is
// the sole retry authority for provider errors, and a duplicated invocation
// would skew both the audit trail and the classification sequence.
fn provider_step_options() -> StepOptions {
    StepOptions {
        start_to_close: Duration::from_secs(300),
        retry: RetryConfig::none(),
    }
}

async fn audit(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    prefix: &str,
    seq: usize,
    log: LlmCallLog,
) {
    let acts = acts.clone();
    let _ = ctx
        .step(
            &format!("{}-audit-{}", prefix, seq),
            StepOptions::no_retry(),
            move || {
                let acts = acts.clone();
                let log = log.clone();
                async move { acts.log_llm_call(log).await }
            },
        )
        .await;
}

fn exhausted(last_err: Option<String>, fallback: &str) -> FailoverError {
    let message = last_err.unwrap_or_else(|| fallback.to_string());
    FailoverError::Provider {
        kind: classify(&message),
        message,
    }
}

/// Embed a chunk batch with provider failover.
#[allow(clippy::too_many_arguments)]
pub async fn embed_chunks_with_failover(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    state: &mut ProviderFailover,
    params: &FailoverParams,
    prefix: &str,
    input: EmbedChunksInput,
    retry_counts: &mut BTreeMap<String, u32>,
) -> Result<EmbedChunksOutput, FailoverError> {
    let strict = params.effective_strict();
    let max_attempts = params.max_attempts();
    let mut attempt = 0usize;
    let mut seq = 0usize;
    let mut last_err: Option<String> = None;

    while attempt < max_attempts {
        seq += 1;
        let idx = params.candidate(attempt);
        let now = ctx.now(&format!("{}-select-{}", prefix, seq)).await?;
        if state.is_disabled(idx, now) {
            attempt += 1;
            continue;
        }

        let mut call = input.clone();
        call.provider_index = idx;
        let acts_call = acts.clone();
        let result = ctx
            .step(
                &format!("{}-call-{}", prefix, seq),
                provider_step_options(),
                move || {
                    let acts = acts_call.clone();
                    let call = call.clone();
                    async move { acts.embed_chunks(call).await }
                },
            )
            .await;

        match result {
            Ok(out) => {
                audit(
                    ctx,
                    acts,
                    prefix,
                    seq,
                    LlmCallLog {
                        operation: input.operation.clone(),
                        corpus_id: input.corpus_id.clone(),
                        paper_id: input.paper_id.clone(),
                        provider_name: out.provider_name.clone(),
                        model: out.model.clone(),
                        request_id: format!("{}-{}", input.operation, seq),
                        status: "ok".to_string(),
                        error_type: String::new(),
                    },
                )
                .await;
                return Ok(out);
            }
            Err(StepError::Engine(e)) => return Err(FailoverError::Engine(e)),
            Err(StepError::Failed(message)) => {
                let kind = classify(&message);
                debug!(provider_index = idx, kind = %kind, "embed attempt failed");
                audit(
                    ctx,
                    acts,
                    prefix,
                    seq,
                    LlmCallLog {
                        operation: input.operation.clone(),
                        corpus_id: input.corpus_id.clone(),
                        paper_id: input.paper_id.clone(),
                        provider_name: format!("provider-{}", idx),
                        model: String::new(),
                        request_id: format!("{}-{}", input.operation, seq),
                        status: "failed".to_string(),
                        error_type: kind.as_str().to_string(),
                    },
                )
                .await;

                let key = format!("embed-{}", idx);
                let count = {
                    let c = retry_counts.entry(key).or_insert(0);
                    *c += 1;
                    *c
                };
                last_err = Some(message);

                match kind {
                    ErrorKind::Quota => {
                        state.disable(idx, now, params.cooldown);
                        attempt += 1;
                    }
                    ErrorKind::Rate => {
                        if count <= 2 {
                            ctx.sleep(
                                &format!("{}-backoff-{}", prefix, seq),
                                Duration::from_secs(2 * u64::from(count)),
                            )
                            .await?;
                            if strict {
                                attempt += 1;
                            }
                        } else {
                            state.disable(idx, now, RATE_DISABLE);
                            attempt += 1;
                        }
                    }
                    ErrorKind::Transient => {
                        if count <= 2 {
                            ctx.sleep(
                                &format!("{}-backoff-{}", prefix, seq),
                                Duration::from_secs(u64::from(count)),
                            )
                            .await?;
                            if strict {
                                attempt += 1;
                            }
                        } else {
                            attempt += 1;
                        }
                    }
                    ErrorKind::Context | ErrorKind::Permanent => {
                        state.disable(idx, now, PERMANENT_DISABLE);
                        attempt += 1;
                    }
                }
            }
        }
    }

    Err(exhausted(last_err, "all embed providers exhausted"))
}

/// Embed one query text with provider failover (no preference modes).
pub async fn embed_query_with_failover(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    state: &mut ProviderFailover,
    params: &FailoverParams,
    prefix: &str,
    input: EmbedQueryInput,
    retry_counts: &mut BTreeMap<String, u32>,
) -> Result<EmbedQueryOutput, FailoverError> {
    let max_attempts = params.provider_count.max(1) * 4;
    let mut attempt = 0usize;
    let mut seq = 0usize;
    let mut last_err: Option<String> = None;

    while attempt < max_attempts {
        seq += 1;
        let idx = attempt % params.provider_count.max(1);
        let now = ctx.now(&format!("{}-select-{}", prefix, seq)).await?;
        if state.is_disabled(idx, now) {
            attempt += 1;
            continue;
        }

        let mut call = input.clone();
        call.provider_index = idx;
        let acts_call = acts.clone();
        let result = ctx
            .step(
                &format!("{}-call-{}", prefix, seq),
                provider_step_options(),
                move || {
                    let acts = acts_call.clone();
                    let call = call.clone();
                    async move { acts.embed_query(call).await }
                },
            )
            .await;

        match result {
            Ok(out) => {
                audit(
                    ctx,
                    acts,
                    prefix,
                    seq,
                    LlmCallLog {
                        operation: input.operation.clone(),
                        provider_name: out.provider_name.clone(),
                        model: out.model.clone(),
                        request_id: format!("{}-{}", input.operation, seq),
                        status: "ok".to_string(),
                        ..Default::default()
                    },
                )
                .await;
                return Ok(out);
            }
            Err(StepError::Engine(e)) => return Err(FailoverError::Engine(e)),
            Err(StepError::Failed(message)) => {
                let kind = classify(&message);
                audit(
                    ctx,
                    acts,
                    prefix,
                    seq,
                    LlmCallLog {
                        operation: input.operation.clone(),
                        provider_name: format!("provider-{}", idx),
                        request_id: format!("{}-{}", input.operation, seq),
                        status: "failed".to_string(),
                        error_type: kind.as_str().to_string(),
                        ..Default::default()
                    },
                )
                .await;

                let key = format!("eq-{}", idx);
                let count = {
                    let c = retry_counts.entry(key).or_insert(0);
                    *c += 1;
                    *c
                };
                last_err = Some(message);

                match kind {
                    ErrorKind::Quota => {
                        state.disable(idx, now, params.cooldown);
                        attempt += 1;
                    }
                    ErrorKind::Rate | ErrorKind::Transient => {
                        if count <= 2 {
                            ctx.sleep(
                                &format!("{}-backoff-{}", prefix, seq),
                                Duration::from_secs(u64::from(count)),
                            )
                            .await?;
                        } else {
                            state.disable(idx, now, RATE_DISABLE);
                            attempt += 1;
                        }
                    }
                    ErrorKind::Context | ErrorKind::Permanent => {
                        state.disable(idx, now, PERMANENT_DISABLE);
                        attempt += 1;
                    }
                }
            }
        }
    }

    Err(exhausted(last_err, "all embed query providers exhausted"))
}

/// Generate text with provider failover.
///
/// `provider_refs`, when non-empty, both sets the rotation width and selects
/// the ref string passed through to the activity, so a caller-requested
/// provider survives replay without any environment read. A Context
/// classification returns immediately so the caller can shrink its window.
pub async fn generate_with_failover(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    state: &mut ProviderFailover,
    params: &FailoverParams,
    provider_refs: &[String],
    prefix: &str,
    input: LlmGenerateInput,
    retry_counts: &mut BTreeMap<String, u32>,
) -> Result<LlmGenerateOutput, FailoverError> {
    let provider_count = if provider_refs.is_empty() {
        params.provider_count.max(1)
    } else {
        provider_refs.len()
    };
    let max_attempts = provider_count * 4;
    let mut attempt = 0usize;
    let mut seq = 0usize;
    let mut last_err: Option<String> = None;

    while attempt < max_attempts {
        seq += 1;
        let idx = attempt % provider_count;
        let now = ctx.now(&format!("{}-select-{}", prefix, seq)).await?;
        if state.is_disabled(idx, now) {
            attempt += 1;
            continue;
        }

        let selected_ref = provider_refs.get(idx).cloned().unwrap_or_default();
        let mut call = input.clone();
        call.provider_index = idx;
        call.provider_ref = selected_ref.clone();
        let acts_call = acts.clone();
        let result = ctx
            .step(
                &format!("{}-call-{}", prefix, seq),
                provider_step_options(),
                move || {
                    let acts = acts_call.clone();
                    let call = call.clone();
                    async move { acts.llm_generate(call).await }
                },
            )
            .await;

        match result {
            Ok(out) => {
                audit(
                    ctx,
                    acts,
                    prefix,
                    seq,
                    LlmCallLog {
                        operation: input.operation.clone(),
                        corpus_id: input.corpus_id.clone(),
                        paper_id: input.paper_id.clone(),
                        provider_name: out.provider_name.clone(),
                        model: out.model.clone(),
                        request_id: format!("{}-{}", input.operation, seq),
                        status: "ok".to_string(),
                        error_type: String::new(),
                    },
                )
                .await;
                return Ok(out);
            }
            Err(StepError::Engine(e)) => return Err(FailoverError::Engine(e)),
            Err(StepError::Failed(message)) => {
                let kind = classify(&message);
                let provider_name = if selected_ref.is_empty() {
                    format!("provider-{}", idx)
                } else {
                    selected_ref.clone()
                };
                audit(
                    ctx,
                    acts,
                    prefix,
                    seq,
                    LlmCallLog {
                        operation: input.operation.clone(),
                        corpus_id: input.corpus_id.clone(),
                        paper_id: input.paper_id.clone(),
                        provider_name,
                        model: String::new(),
                        request_id: format!("{}-{}", input.operation, seq),
                        status: "failed".to_string(),
                        error_type: kind.as_str().to_string(),
                    },
                )
                .await;

                let key = format!("llm-{}-{}", input.operation, idx);
                let count = {
                    let c = retry_counts.entry(key).or_insert(0);
                    *c += 1;
                    *c
                };

                match kind {
                    ErrorKind::Quota => {
                        last_err = Some(message);
                        state.disable(idx, now, params.cooldown);
                        attempt += 1;
                    }
                    ErrorKind::Rate => {
                        last_err = Some(message);
                        if count <= 2 {
                            ctx.sleep(
                                &format!("{}-backoff-{}", prefix, seq),
                                Duration::from_secs(2 * u64::from(count)),
                            )
                            .await?;
                        } else {
                            state.disable(idx, now, RATE_DISABLE);
                            attempt += 1;
                        }
                    }
                    ErrorKind::Transient => {
                        last_err = Some(message);
                        if count <= 2 {
                            ctx.sleep(
                                &format!("{}-backoff-{}", prefix, seq),
                                Duration::from_secs(u64::from(count)),
                            )
                            .await?;
                        } else {
                            attempt += 1;
                        }
                    }
                    ErrorKind::Context => {
                        return Err(FailoverError::Provider {
                            kind: ErrorKind::Context,
                            message,
                        });
                    }
                    ErrorKind::Permanent => {
                        last_err = Some(message);
                        state.disable(idx, now, PERMANENT_DISABLE);
                        attempt += 1;
                    }
                }
            }
        }
    }

    Err(exhausted(last_err, "all llm providers exhausted"))
}
