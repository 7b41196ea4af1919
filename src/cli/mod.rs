// src/cli/mod.rs — CLI definition (clap derive)

pub mod ask;
pub mod docs;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::backend::Device;

#[derive(Parser)]
#[command(
    name = "ragline",
    about = "Chat with your documents over a local RAG backend",
    version
)]
pub struct Cli {
    /// Question to ask (default command when no subcommand given)
    #[arg(trailing_var_arg = true)]
    pub question: Vec<String>,

    /// Backend base URL (overrides config)
    #[arg(long)]
    pub backend: Option<String>,

    /// Compute placement for the answer
    #[arg(short, long, value_enum)]
    pub device: Option<Device>,

    /// Config file path
    #[arg(long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive chat screen
    Chat,
    /// List documents known to the backend
    Docs,
    /// Upload documents to the backend store
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Re-index uploaded documents
    Ingest {
        /// Characters per chunk
        #[arg(long)]
        chunk_size: Option<u32>,
        /// Overlap between adjacent chunks
        #[arg(long)]
        chunk_overlap: Option<u32>,
    },
    /// Ask the backend to shut down
    Shutdown,
}
