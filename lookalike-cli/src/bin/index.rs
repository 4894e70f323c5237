use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use lookalike_cli::utility::{confirm, load_embedder};
use lookalike_core::{
    app_config,
    catalog::{build_index_with_progress, write_index, BuildEvent},
};

#[derive(Parser, Debug)]
#[command(name = "lookalike-index")]
#[command(version)]
#[command(about = "builds the catalog index used for visual similarity search", long_about = None)]
struct Args {
    /// Verbose mode, lists skipped images and their reasons
    #[arg(short, long)]
    verbose: bool,
    /// Do not confirm before overwriting an existing index
    #[arg(short, long)]
    force: bool,
    /// Catalog directory to index, overrides the configured one
    #[arg(long)]
    catalog_dir: Option<Utf8PathBuf>,
    /// Where to write the index, overrides the configured artifact path
    #[arg(short, long)]
    output: Option<Utf8PathBuf>,
    /// Configuration file layered over the defaults and the user configuration
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,
}

fn main() -> Result<ExitCode, anyhow::Error> {
    env_logger::init();
    let args = Args::parse();

    let config = app_config::load_config(args.config.as_deref())?;
    let catalog_dir = args.catalog_dir.unwrap_or_else(|| config.catalog_dir.clone());
    let output = args.output.unwrap_or_else(|| config.artifact_path.clone());

    if output.exists() && !args.force {
        let prompt = format!("An index already exists at {}. Overwrite it?", output);
        if !confirm(&prompt)? {
            println!("Aborting...");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let embedder = load_embedder(&config)?;
    println!("Indexing catalog {} into {}", catalog_dir, output);

    let bar = ProgressBar::new(0);
    bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);
    let result = build_index_with_progress(&catalog_dir, &embedder, |event| match event {
        BuildEvent::Started { total } => bar.set_length(total as u64),
        BuildEvent::Embedded { identifier, .. } => {
            bar.set_message(identifier.to_owned());
            bar.inc(1);
        },
        BuildEvent::Skipped { identifier, error, .. } => {
            bar.println(format!("Skipping {}: {}", identifier, error));
            bar.inc(1);
        },
    });
    bar.finish_and_clear();

    let build = match result {
        Ok(build) => build,
        Err(e) => {
            eprintln!("Index build failed, nothing was written: {:#}", anyhow::Error::from(e));
            return Ok(ExitCode::FAILURE);
        },
    };

    if let Err(e) = write_index(&build.index, &output) {
        eprintln!("{:#}", anyhow::Error::from(e));
        return Ok(ExitCode::FAILURE);
    }

    let report = &build.report;
    println!("{} of {} catalog images indexed, {} skipped. Index written to {}",
        report.embedded, report.candidates, report.skipped.len(), output);
    if args.verbose {
        for skipped in &report.skipped {
            println!("  skipped {}: {}", skipped.identifier, skipped.reason);
        }
    }

    Ok(ExitCode::SUCCESS)
}
