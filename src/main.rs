// src/main.rs — ragline entry point

use std::time::Duration;

use clap::Parser;

use ragline::backend::BackendClient;
use ragline::cli::{Cli, Commands};
use ragline::infra::config::Config;
use ragline::infra::logger;

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG)
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let mut config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    // CLI flags override config
    if let Some(ref backend) = cli.backend {
        config.backend.base_url = backend.clone();
    }
    if let Some(device) = cli.device {
        config.chat.device = device;
    }

    let backend = BackendClient::new(
        &config.backend.base_url,
        Duration::from_secs(config.backend.request_timeout_secs),
    )?;

    match cli.command {
        Some(Commands::Chat) => ragline::tui::run_chat(&config, backend),
        Some(Commands::Docs) => ragline::cli::docs::run_docs(&backend).await,
        Some(Commands::Upload { files }) => ragline::cli::docs::run_upload(&backend, &files).await,
        Some(Commands::Ingest {
            chunk_size,
            chunk_overlap,
        }) => {
            let size = chunk_size.unwrap_or(config.ingest.chunk_size);
            let overlap = chunk_overlap.unwrap_or(config.ingest.chunk_overlap);
            ragline::cli::docs::run_ingest(&backend, size, overlap).await
        }
        Some(Commands::Shutdown) => ragline::cli::docs::run_shutdown(&backend).await,
        None => {
            let question = build_question(&cli)?;
            ragline::cli::ask::run_ask(&question, &config).await
        }
    }
}

/// Build the question from CLI args, piped stdin, or an interactive prompt.
fn build_question(cli: &Cli) -> anyhow::Result<String> {
    use std::io::IsTerminal;

    if !cli.question.is_empty() {
        return Ok(cli.question.join(" "));
    }

    if !std::io::stdin().is_terminal() {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        let question = buf.trim().to_string();
        if question.is_empty() {
            anyhow::bail!("No question received on stdin");
        }
        return Ok(question);
    }

    // Interactive terminal with no question — prompt the user
    let question = inquire::Text::new("What do you want to ask?")
        .with_help_message("Ask about your indexed documents, or press Esc to cancel")
        .prompt()
        .map_err(|_| anyhow::anyhow!("Question input cancelled"))?;
    let question = question.trim().to_string();
    if question.is_empty() {
        anyhow::bail!("No question provided");
    }
    Ok(question)
}
