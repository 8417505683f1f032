//! CLI entry point for Kollektiv.
//!
//! Provides the `kollektiv` command with subcommands for running the HTTP
//! server, the background ingestion worker pool, and one-off database
//! migrations.

mod cli;
mod helpers;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use kollektiv_chat::llm::{AnthropicClient, LlmClientConfig};
use kollektiv_chat::{ChatService, ConversationManager, LlmAssistant};
use kollektiv_core::config::AppConfig;
use kollektiv_crawler::{CrawlerAdapter, JobManager};
use kollektiv_events::EventsClient;
use kollektiv_retrieval::{CohereEmbedder, CohereReranker, Retriever, VectorIndex};
use kollektiv_store::{DurableRepository, KvRepository};
use kollektiv_worker::pipeline::Services as WorkerServices;
use kollektiv_worker::SummaryGenerator;

use crate::cli::{Cli, Commands};

/// Dimensionality of Cohere's `embed-english-v3.0` model, the default
/// `AppConfig::embedding_model`.
const EMBEDDING_VECTOR_SIZE: u64 = 1024;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(kollektiv_core::config::EX_CONFIG as u8);
        }
    };

    helpers::init_tracing(&config.log_level, config.log_format);

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve => cmd_serve(config).await,
        Commands::Worker { concurrency } => cmd_worker(config, concurrency).await,
        Commands::Migrate => cmd_migrate(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn build_embedder_and_index(config: &AppConfig) -> Result<VectorIndex> {
    let embedder = CohereEmbedder::new(config.cohere_api_key.clone(), config.embedding_model.clone());
    VectorIndex::connect(&config.qdrant_url, embedder, EMBEDDING_VECTOR_SIZE)
        .await
        .context("failed to connect to vector store")
}

async fn cmd_serve(config: AppConfig) -> Result<()> {
    info!("starting kollektiv web server");

    let durable = DurableRepository::connect(&config.database_url).await.context("failed to connect to database")?;
    let kv = KvRepository::connect(&config.redis_url).context("failed to connect to redis")?;
    let events = EventsClient::connect(&config.redis_url).context("failed to connect events client")?;
    let crawler = CrawlerAdapter::new(config.firecrawl_api_key.clone());
    let jobs = JobManager::new(durable.clone());

    let llm_client = AnthropicClient::new(LlmClientConfig::anthropic(config.anthropic_api_key.clone(), config.chat_model.clone()))
        .context("failed to create llm client")?;
    let vector_index = build_embedder_and_index(&config).await?;
    let reranker = CohereReranker::new(config.cohere_api_key.clone());
    let retriever = Retriever::new(vector_index, reranker);

    let assistant = LlmAssistant::new(llm_client, retriever, config.chat_model.clone());
    let conversations = ConversationManager::new(kv.clone(), durable.clone()).with_max_tokens(config.max_conversation_tokens);
    let chat = ChatService::new(ConversationManager::new(kv, durable.clone()), assistant);

    let services = kollektiv_web::Services {
        config: config.clone(),
        durable,
        events,
        crawler,
        jobs,
        chat,
        conversations,
    };

    println!();
    println!("  Kollektiv v{}", env!("CARGO_PKG_VERSION"));
    println!("  Environment: {:?}", config.environment);
    println!("  Listening:   http://{}", config.bind_addr);
    println!("  Webhook URL: {}", config.webhook_base_url());
    println!();

    let server = kollektiv_web::WebServer::new(services);
    server.start().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(())
}

async fn cmd_worker(config: AppConfig, concurrency: usize) -> Result<()> {
    info!(concurrency, "starting kollektiv ingestion worker pool");

    let durable = DurableRepository::connect(&config.database_url).await.context("failed to connect to database")?;
    let events = EventsClient::connect(&config.redis_url).context("failed to connect events client")?;
    let chunker = kollektiv_chunker::MarkdownChunker::new();
    let vector_index = build_embedder_and_index(&config).await?;

    let llm_client = AnthropicClient::new(LlmClientConfig::anthropic(config.anthropic_api_key.clone(), config.chat_model.clone()))
        .context("failed to create llm client")?;
    let summary_generator = SummaryGenerator::new(llm_client, config.chat_model.clone());

    let services = Arc::new(WorkerServices { durable, events, chunker, vector_index, summary_generator });

    let handles = kollektiv_worker::run_worker_pool(services, concurrency);
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

async fn cmd_migrate(config: AppConfig) -> Result<()> {
    helpers::init_tracing(&config.log_level, config.log_format);
    info!("applying database migrations");

    let durable = DurableRepository::connect(&config.database_url).await.context("failed to connect to database")?;
    kollektiv_store::migrations::run(durable.pool()).await.context("migration failed")?;

    println!("  Migrations applied.");
    Ok(())
}
