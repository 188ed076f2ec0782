use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use homedir::my_home;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::error::InquireResult;
use tracing_subscriber::EnvFilter;

use qarag::answer::{OpenAiComposer, QaEngine};
use qarag::config::Config;
use qarag::lock::FileLock;
use qarag::retrieval::RetrievalService;

mod cli;

fn main() -> Result<()> {
    let args = cli::Args::parse();

    let filter = if args.verbose { "qarag=debug" } else { "qarag=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let base_path = get_base_path()?;
    let mut config = Config::load_with(&base_path)?;

    match args.command {
        cli::Command::Ingest {
            paths,
            chunk_size,
            overlap,
        } => {
            if let Some(chunk_size) = chunk_size {
                config.retrieval.chunk_size = chunk_size;
            }
            if let Some(overlap) = overlap {
                config.retrieval.overlap = overlap;
            }
            config.validate()?;

            let _lock = FileLock::try_acquire(&base_path)?;
            let service = RetrievalService::new(config.retrieval, base_path)?;
            handle_ingest(&service, &paths)
        }

        cli::Command::Search { query, top_k, json } => {
            let _lock = FileLock::acquire_shared(&base_path)?;
            let service = RetrievalService::new(config.retrieval, base_path)?;
            let hits = service.retrieve_hits(&query, top_k)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
                return Ok(());
            }

            if hits.is_empty() {
                println!("No matching chunks");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!("[{}] distance {:.4}", rank + 1, hit.distance);
                println!("{}\n", hit.text);
            }
            Ok(())
        }

        cli::Command::Ask { query, top_k } => {
            let composer = OpenAiComposer::from_config(&config.answer)?;
            let _lock = FileLock::acquire_shared(&base_path)?;
            let service = RetrievalService::new(config.retrieval, base_path)?;
            let engine = QaEngine::new(service.retriever()?, composer);

            let answer = match top_k {
                Some(top_k) => engine.answer_top(&query, top_k)?,
                None => engine.answer(&query)?,
            };
            println!("{answer}");
            Ok(())
        }

        cli::Command::Info {} => {
            let _lock = FileLock::acquire_shared(&base_path)?;
            let service = RetrievalService::new(config.retrieval.clone(), base_path)?;
            let stats = service.stats()?;

            println!("model:      {}", config.retrieval.model);
            println!("dimensions: {}", stats.dimensions);
            println!("chunks:     {}", stats.entries);
            println!(
                "snapshot:   {}{}",
                stats.snapshot_path.display(),
                if stats.snapshot_exists { "" } else { " (not saved)" }
            );
            Ok(())
        }

        cli::Command::Reset { yes } => {
            if !yes {
                match inquire::prompt_confirmation("Delete the index and all ingested chunks?") {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            let _lock = FileLock::try_acquire(&base_path)?;
            let service = RetrievalService::new(config.retrieval, base_path)?;
            service.reset()?;
            println!("Index deleted");
            Ok(())
        }
    }
}

/// Ingest every document, then save once.
///
/// A failing document aborts the run before the snapshot is written, leaving
/// the previous snapshot in place.
fn handle_ingest(service: &RetrievalService, paths: &[PathBuf]) -> Result<()> {
    let style = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} chunks")
        .context("invalid progress template")?
        .progress_chars("=> ");

    let mut total_chunks = 0;
    for path in paths {
        let bar = ProgressBar::new(0).with_style(style.clone());
        bar.set_message(display_name(path));

        let report = service
            .ingest_with_progress(path, |done, total| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            })
            .with_context(|| format!("failed to ingest {}", path.display()))?;
        bar.finish();

        println!(
            "{}: {} pages, {} chunks",
            path.display(),
            report.pages,
            report.chunks
        );
        total_chunks += report.chunks;
    }

    service.save()?;
    println!("{} chunks added", total_chunks);
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn get_base_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("QARAG_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;
    Ok(home.join(".local/share/qarag"))
}
