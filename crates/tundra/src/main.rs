use anyhow::Context;
use clap::Parser;
use tundra_source::SourceSettings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file; falls back to `TUNDRA_SOURCE_CONFIG_PATH` or `config/source.toml`.
    #[arg(short, long)]
    config: Option<String>,

    /// Overrides the configured number of reader subtasks.
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Overrides the configured number of splits.
    #[arg(short, long)]
    split_count: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tundra::init_tracing();

    let mut settings = match &args.config {
        Some(path) => SourceSettings::from_file(path),
        None => SourceSettings::new(),
    }
    .context("failed to load source settings")?;
    if let Some(parallelism) = args.parallelism {
        settings.parallelism = parallelism;
    }
    if let Some(split_count) = args.split_count {
        settings.split_count = Some(split_count);
    }

    let summary = tundra::run(settings).await?;
    println!("table {}: {} rows in {} splits", summary.table, summary.rows, summary.splits);
    for (subtask, splits, rows) in &summary.per_subtask {
        println!("  subtask {subtask}: {splits} splits, {rows} rows");
    }
    Ok(())
}
