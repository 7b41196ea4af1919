// src/cli/ask.rs — One-shot question, streamed to stdout

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::sse::SseChannel;
use crate::infra::config::Config;
use crate::session::{SessionUpdate, StartOutcome, StreamSession};

/// Ask a single question, printing tokens as they stream. Citations go to
/// stderr afterwards so the answer itself stays pipeable.
pub async fn run_ask(question: &str, config: &Config) -> anyhow::Result<()> {
    let channel = Arc::new(SseChannel::new(&config.backend.base_url)?);
    let idle_timeout = config
        .chat
        .stream_idle_timeout_secs
        .map(Duration::from_secs);
    let mut session = StreamSession::new(channel, config.chat.device, idle_timeout);

    if session.start(question) == StartOutcome::Rejected {
        anyhow::bail!("No question provided");
    }

    let mut stdout = std::io::stdout();
    let mut failure: Option<String> = None;

    while let Some(signal) = session.recv_signal().await {
        match session.apply(signal) {
            SessionUpdate::Token(delta) => {
                print!("{delta}");
                stdout.flush()?;
            }
            SessionUpdate::Sources | SessionUpdate::Stale => {}
            SessionUpdate::Finished { .. } => {
                println!();
                break;
            }
            SessionUpdate::Failed { notice } => {
                println!();
                failure = Some(notice);
                break;
            }
        }
    }

    let citations = session.conversation().citations();
    if !citations.is_empty() {
        eprintln!("\nSources:");
        for c in citations {
            let page = c.page.map(|p| format!(" p.{p}")).unwrap_or_default();
            eprintln!("  - {}{}", c.source, page);
            if let Some(excerpt) = &c.excerpt {
                eprintln!("    {excerpt}");
            }
        }
    }

    match failure {
        Some(notice) => anyhow::bail!(notice),
        None => Ok(()),
    }
}
