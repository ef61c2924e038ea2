// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Quire Worker - hosts the durable ingestion and survey workflows.
//!
//! The worker wires the pieces together: environment config, Postgres pool,
//! engine and domain migrations, the provider registry, the production
//! activity surface, and the workflow host. The HTTP façade embeds the same
//! [`quire_engine::WorkflowHost`] and starts workflows by derived id.

mod config;

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use quire_activities::{Activities, ActivityConfig, PdftotextExtractor};
use quire_engine::{PostgresPersistence, WorkflowHost};
use quire_providers::{ProviderRegistry, RegistryConfig};
use quire_workflows::{RuntimeDefaults, WorkflowRuntime};

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quire=info".parse().unwrap()),
        )
        .init();

    info!("Starting Quire Worker");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        llm_providers = %config.llm_providers,
        embed_providers = %config.embed_providers,
        embed_dim = config.embed_dim,
        embed_version = %config.embed_version,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    info!(result = row.0, "Database health check passed");

    info!("Running database migrations...");
    quire_engine::migrations::run_postgres(&pool).await?;
    quire_storage::migrations::run(&pool).await?;
    info!("Migrations completed");

    let registry = Arc::new(ProviderRegistry::new(&RegistryConfig {
        llm_providers: config.llm_providers.clone(),
        embed_providers: config.embed_providers.clone(),
        embed_dim: config.embed_dim,
    })?);
    let embed_count = registry.embed_count();
    let llm_count = registry.llm_count();
    let llm_provider_refs = registry.llm_refs();
    info!(embed_count, llm_count, "Provider registry constructed");

    let activities = Arc::new(Activities::new(
        ActivityConfig {
            data_out_root: config.data_out_root.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            embed_dim: config.embed_dim,
        },
        pool.clone(),
        registry.clone(),
        Arc::new(PdftotextExtractor),
    ));

    let persistence = Arc::new(PostgresPersistence::new(pool.clone()));
    let host = WorkflowHost::builder().persistence(persistence).build()?;

    // The façade embeds this runtime and starts workflows by derived id on
    // upload/build/backfill requests. It stays alive until shutdown.
    let _runtime = WorkflowRuntime::new(
        host,
        activities,
        RuntimeDefaults {
            chunk_version: "v1".to_string(),
            embed_version: config.embed_version.clone(),
            cooldown_seconds: config.provider_cooldown_seconds,
            ingest_max_children: config.ingest_max_children,
            embed_provider_count: embed_count,
            llm_provider_count: llm_count,
            llm_provider_refs,
            data_in_root: config.data_in_root.display().to_string(),
        },
    );
    info!(
        data_in = %config.data_in_root.display(),
        data_out = %config.data_out_root.display(),
        "Quire worker ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
