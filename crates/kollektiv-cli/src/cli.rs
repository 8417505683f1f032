//! CLI argument definitions, kept separate from `main.rs` so dispatch stays
//! the only thing `main.rs` does.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kollektiv",
    version,
    about = "Kollektiv -- RAG ingestion and chat service",
    long_about = "Crawls sources, chunks and indexes their content, and answers \
                  questions about it through a tool-using chat assistant."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP/SSE server (sources, chat, webhooks).
    Serve,

    /// Start the background ingestion worker pool.
    Worker {
        /// Number of concurrent pipeline workers.
        #[arg(long, short, default_value_t = 4)]
        concurrency: usize,
    },

    /// Apply pending database migrations and exit.
    Migrate,
}
