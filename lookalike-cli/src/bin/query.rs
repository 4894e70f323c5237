use std::{process::ExitCode, sync::Arc};

use camino::Utf8PathBuf;
use clap::Parser;
use lookalike_cli::utility::load_embedder;
use lookalike_core::{app_config, IndexState, SearchError, VisualSearch};

#[derive(Parser, Debug)]
#[command(name = "lookalike-query")]
#[command(version)]
#[command(about = "finds the catalog images that look most like a query image", long_about = None)]
struct Args {
    /// Image to search the catalog with
    query: Utf8PathBuf,
    /// The number of results to return, defaults to the configured top_k
    #[arg(short = 'n', long)]
    num_results: Option<usize>,
    /// Configuration file layered over the defaults and the user configuration
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,
}

fn main() -> Result<ExitCode, anyhow::Error> {
    env_logger::init();
    let args = Args::parse();

    let config = app_config::load_config(args.config.as_deref())?;
    let index = IndexState::load(&config.artifact_path);
    if let IndexState::Unavailable { reason } = &index {
        eprintln!("Catalog index not loaded: {}", reason);
        eprintln!("Build it with lookalike-index first.");
        return Ok(ExitCode::FAILURE);
    }

    let embedder = Arc::new(load_embedder(&config)?);
    let search = VisualSearch::new(embedder, index, config.top_k);

    let results = match search.search_path(&args.query, args.num_results) {
        Ok(results) => results,
        Err(e @ SearchError::Embedding(_)) => {
            eprintln!("Could not use {} as a query: {:#}", args.query, anyhow::Error::from(e));
            return Ok(ExitCode::FAILURE);
        },
        Err(e) => return Err(e.into()),
    };

    println!("Results ({}):", results.len());
    for (i, result) in results.iter().enumerate() {
        println!("{}: {} (similarity: {:.4})", i + 1, config.catalog_dir.join(&result.identifier), result.similarity);
    }

    Ok(ExitCode::SUCCESS)
}
