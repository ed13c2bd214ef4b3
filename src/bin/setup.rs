//! rknn-setup: Outsourcing CLI for ASPE-encrypted RkNN
//!
//! Reads the object and reference point files, encrypts the object set and
//! writes the owner key, the ciphertext table and run metadata.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use aspe_rknn::dataset::read_points;
use aspe_rknn::math::ScalarSampler;
use aspe_rknn::params::RknnParams;
use aspe_rknn::rknn::{outsource, save_metadata, save_table_binary, RunMetadata};

#[derive(Parser)]
#[command(name = "rknn-setup")]
#[command(about = "Encrypt a point set for outsourced RkNN queries")]
#[command(version)]
struct Args {
    /// Object point file (one point per line)
    #[arg(long)]
    objects: PathBuf,

    /// Reference point file used for neighbor distances
    #[arg(long)]
    reference: PathBuf,

    /// Output directory for key, table and metadata
    #[arg(long, default_value = "rknn_data")]
    output_dir: PathBuf,

    /// Neighbor ranks encrypted per point
    #[arg(long, default_value_t = aspe_rknn::K_MAX)]
    k_max: usize,

    /// Worker threads (defaults to available parallelism)
    #[arg(long)]
    threads: Option<usize>,

    /// Random seed for deterministic key generation (optional)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let params = RknnParams {
        k_max: args.k_max,
        parallelism: args.threads,
        ..RknnParams::default()
    };
    params
        .validate()
        .map_err(|e| eyre::eyre!("Invalid parameters: {}", e))?;

    info!("ASPE RkNN Setup");
    info!("Objects: {}", args.objects.display());
    info!("Reference: {}", args.reference.display());
    info!("Output directory: {}", args.output_dir.display());
    info!("k_max: {}, workers: {}", params.k_max, params.worker_count());

    let total_start = Instant::now();

    let objects = read_points(&args.objects)
        .with_context(|| format!("Failed to read objects from {}", args.objects.display()))?;
    let reference = read_points(&args.reference)
        .with_context(|| format!("Failed to read reference set from {}", args.reference.display()))?;
    info!(
        "Loaded {} objects, {} reference points in {:.2?}",
        objects.len(),
        reference.len(),
        total_start.elapsed()
    );

    let mut sampler = match args.seed {
        Some(seed) => ScalarSampler::with_seed(params.scalar_min, params.scalar_max, seed),
        None => ScalarSampler::new(params.scalar_min, params.scalar_max),
    }
    .with_context(|| "Failed to build scalar sampler")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Precomputing distances and encrypting...");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let (key, table) = outsource(&objects, &reference, &params, &mut sampler)
        .with_context(|| "Failed to outsource dataset")?;

    pb.finish_with_message("Outsourcing complete");

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory: {}", args.output_dir.display())
    })?;

    info!("Saving owner key (keep this secure!)...");
    let key_path = args.output_dir.join("owner_key.json");
    let key_file = File::create(&key_path)
        .with_context(|| format!("Failed to create key file: {}", key_path.display()))?;
    let mut writer = BufWriter::new(key_file);
    serde_json::to_writer(&mut writer, &key).with_context(|| "Failed to serialize owner key")?;
    writer.flush()?;

    info!("Saving ciphertext table...");
    let table_path = args.output_dir.join("table.bin");
    save_table_binary(&table, &table_path)
        .with_context(|| format!("Failed to write table: {}", table_path.display()))?;
    let table_size = fs::metadata(&table_path)?.len();
    info!("Table saved: {:.2} MB", table_size as f64 / (1024.0 * 1024.0));

    let meta_path = args.output_dir.join("metadata.json");
    save_metadata(&RunMetadata::new(&params, key.point_dim, &table), &meta_path)
        .with_context(|| format!("Failed to write metadata: {}", meta_path.display()))?;

    let total_time = total_start.elapsed();
    info!("Total setup time: {:.2?}", total_time);

    println!();
    println!("=== Setup Complete ===");
    println!("Output directory: {}", args.output_dir.display());
    println!("Objects: {}", table.num_objects());
    println!("Point dimension: {}", key.point_dim);
    println!("Ciphertext dimension: {}", table.dim());
    println!("Ranks per object: {}", table.k_max());
    println!("Total time: {:.2?}", total_time);

    Ok(())
}
