use convoy::prelude::*;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Hammer one file with concurrent producers
    Stress {
        #[arg(short, long)]
        output: Option<String>,
        #[arg(short = 'n', long, default_value_t = 16)]
        producers: u32,
        #[arg(short, long, default_value_t = 1000)]
        rows: usize,
        #[arg(short, long)]
        strategy: Option<String>,
        #[arg(short, long)]
        config: Option<String>,
        #[arg(short, long, default_value_t = 1)]
        batch: usize,
        #[arg(short, long, default_value_t = 6)]
        fields: usize,
    },

    /// Read a file back and check every record is intact
    Verify {
        path: String,
        #[arg(short, long)]
        expect: Option<u64>,
        #[arg(short, long)]
        fields: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Stress {
            output,
            producers,
            rows,
            strategy,
            config,
            batch,
            fields,
        } => {
            run_stress(output, producers, rows, strategy, config, batch, fields).await?;
        }

        Commands::Verify { path, expect, fields } => {
            verify(&path, expect, fields)?;
        }
    }

    info!("Total runtime: {:.2}s", program_start.elapsed().as_secs_f64());

    Ok(())
}

async fn run_stress(
    output: Option<String>,
    producers: u32,
    rows: usize,
    strategy: Option<String>,
    config_path: Option<String>,
    batch: usize,
    fields: usize,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => WriterConfig::from_json_file(path)?,
        None => WriterConfig::default(),
    };
    if let Some(name) = strategy {
        config = config.with_strategy(name.parse()?);
    }

    let output = output.unwrap_or_else(|| {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        format!("stress_{}_{}.csv", config.strategy, timestamp)
    });

    info!("convoy: Stress");
    info!("Output: {}", output);
    info!("Strategy: {}", config.strategy);
    info!("Producers: {}, rows each: {}, batch size: {}", producers, rows, batch.max(1));

    let writer: Arc<dyn RowWriter> = Arc::from(convoy::open_with(&output, config)?);

    let total = producers as u64 * rows as u64;
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} rows {msg}")?
            .progress_chars("█▓░"),
    );

    let mut handles = Vec::new();
    for producer in 0..producers {
        let writer = writer.clone();
        let pb = pb.clone();

        handles.push(tokio::task::spawn_blocking(move || -> WriterResult<()> {
            let mut rng = thread_rng();
            let generated: Vec<Row> = (0..rows)
                .map(|seq| random_row(&mut rng, producer, seq, fields))
                .collect();

            for chunk in generated.chunks(batch.max(1)) {
                if chunk.len() == 1 {
                    writer.write(chunk[0].clone())?;
                } else {
                    writer.write_all(chunk)?;
                }
                pb.inc(chunk.len() as u64);
            }
            Ok(())
        }));
    }

    let mut failures = 0;
    for handle in handles {
        if let Err(e) = handle.await? {
            warn!("Producer failed: {}", e);
            failures += 1;
        }
    }

    pb.finish_with_message("done");

    writer.close()?;
    let stats = writer.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if failures > 0 {
        anyhow::bail!("{} of {} producers failed", failures, producers);
    }

    info!("Wrote {} rows to {}", stats.rows_written, output);
    Ok(())
}

// First field tags the producer so the file can be audited afterwards; later
// fields sometimes carry a delimiter or a quote to exercise quoting
fn random_row(rng: &mut impl Rng, producer: u32, seq: usize, fields: usize) -> Row {
    let mut row = Vec::with_capacity(fields.max(1));
    row.push(format!("p{}-{}", producer, seq));

    for _ in 1..fields {
        let len = rng.gen_range(1..12);
        let mut field: String = (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect();
        match rng.gen_range(0..10) {
            0 => field.push_str(", with comma"),
            1 => field.push_str(" \"quoted\""),
            _ => {}
        }
        row.push(field);
    }

    Row::from(row)
}

fn verify(path: &str, expect: Option<u64>, fields: Option<usize>) -> Result<()> {
    info!("Verifying: {}", path);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut records = 0u64;
    let mut malformed = 0u64;
    let mut widths: BTreeMap<usize, u64> = BTreeMap::new();

    for result in reader.records() {
        match result {
            Ok(record) => {
                records += 1;
                *widths.entry(record.len()).or_default() += 1;
            }
            Err(e) => {
                warn!("Malformed record: {}", e);
                malformed += 1;
            }
        }
    }

    println!("\nRecords:   {}", records);
    println!("Malformed: {}", malformed);
    for (width, count) in &widths {
        println!("  {:>3} fields: {}", width, count);
    }
    println!();

    if malformed > 0 {
        anyhow::bail!("{} malformed records in {}", malformed, path);
    }
    if let Some(expected) = expect {
        if expected != records {
            anyhow::bail!("Expected {} records, found {}", expected, records);
        }
    }
    if let Some(width) = fields {
        let off = records - widths.get(&width).copied().unwrap_or(0);
        if off > 0 {
            anyhow::bail!("{} records do not have {} fields", off, width);
        }
    }

    info!("{} looks intact", path);
    Ok(())
}
