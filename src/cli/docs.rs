// src/cli/docs.rs — Document store commands: docs, upload, ingest, shutdown

use std::path::PathBuf;

use crate::backend::BackendClient;

pub async fn run_docs(backend: &BackendClient) -> anyhow::Result<()> {
    let docs = backend.docs().await?;

    if docs.is_empty() {
        println!("No documents. Upload some with `ragline upload <files>`.");
        return Ok(());
    }

    for doc in &docs {
        let marker = if doc.is_indexed() { " " } else { "!" };
        println!("{marker} {:<40} {}", doc.name, doc.meta_label());
    }
    Ok(())
}

pub async fn run_upload(backend: &BackendClient, files: &[PathBuf]) -> anyhow::Result<()> {
    backend.upload(files).await?;
    println!(
        "Uploaded {} file(s). Run `ragline ingest` to index them.",
        files.len()
    );
    Ok(())
}

pub async fn run_ingest(
    backend: &BackendClient,
    chunk_size: u32,
    chunk_overlap: u32,
) -> anyhow::Result<()> {
    eprintln!("Indexing (chunk size {chunk_size}, overlap {chunk_overlap})...");
    let report = backend.ingest(chunk_size, chunk_overlap).await?;
    println!("Indexed {} chunk(s)", report.chunks);
    Ok(())
}

pub async fn run_shutdown(backend: &BackendClient) -> anyhow::Result<()> {
    backend.shutdown().await;
    println!("Shutdown requested.");
    Ok(())
}
