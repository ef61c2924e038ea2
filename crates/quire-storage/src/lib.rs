// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Quire Storage - Relational store for the orchestration core.
//!
//! PostgreSQL (with pgvector) behind repository types. Every write path is
//! idempotent: primary-key upserts for papers and chunks, append-only audit
//! rows, and set-valued merges for graph aliases and edge provenance. The
//! vector column on chunks is only replaced when a new embedding is supplied,
//! so text-only reruns never erase existing vectors.

mod audit;
mod chunk;
mod error;
mod graph;
pub mod migrations;
mod models;
mod paper;
mod search;
mod survey;

pub use audit::{AuditRepo, LlmCallRecord};
pub use chunk::{ChunkRecord, ChunkRepo};
pub use error::StorageError;
pub use graph::{GraphRepo, KgRunRecord, KgTripleRow, LineageEdge};
pub use models::{Chunk, ChunkSearchResult, GraphEdge, GraphNode, Paper, SurveyRun};
pub use paper::{PaperRepo, PaperUpsert};
pub use search::{SearchFilters, Searcher, to_literal};
pub use survey::SurveyRepo;
