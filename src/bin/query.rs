//! rknn-query: Run an RkNN query against an outsourced table
//!
//! Plays both sides locally: encrypts the query with the owner key,
//! evaluates it against the ciphertext table, then decrypts the matches
//! into the result file.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use aspe_rknn::dataset::{read_query, write_points};
use aspe_rknn::math::ScalarSampler;
use aspe_rknn::rknn::{
    extract, load_metadata, load_table_binary, query, respond, respond_mmap, MmapTable, OwnerKey,
};

#[derive(Parser)]
#[command(name = "rknn-query")]
#[command(about = "Run an encrypted RkNN query")]
#[command(version)]
struct Args {
    /// Directory written by rknn-setup
    #[arg(long, default_value = "rknn_data")]
    data_dir: PathBuf,

    /// Query file: rank k on line 1, query point on line 2
    #[arg(long)]
    query: PathBuf,

    /// Output file for decrypted matches
    #[arg(long, default_value = "result.txt")]
    output: PathBuf,

    /// Evaluate against the memory-mapped table instead of loading it
    #[arg(long)]
    mmap: bool,

    /// Random seed for the query blinding (optional)
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
    let start = Instant::now();

    let key_path = args.data_dir.join("owner_key.json");
    let key_file = File::open(&key_path)
        .with_context(|| format!("Failed to open key file: {}", key_path.display()))?;
    let key: OwnerKey = serde_json::from_reader(BufReader::new(key_file))
        .with_context(|| "Failed to deserialize owner key")?;
    info!("Owner key loaded: point_dim={}, k_max={}", key.point_dim, key.k_max);

    let request = read_query(&args.query)
        .with_context(|| format!("Failed to read query from {}", args.query.display()))?;

    let meta_path = args.data_dir.join("metadata.json");
    let params = load_metadata(&meta_path)
        .with_context(|| format!("Failed to load metadata: {}", meta_path.display()))?
        .params;
    info!("Scalar range from setup: [{}, {})", params.scalar_min, params.scalar_max);
    let mut sampler = match args.seed {
        Some(seed) => ScalarSampler::with_seed(params.scalar_min, params.scalar_max, seed),
        None => ScalarSampler::new(params.scalar_min, params.scalar_max),
    }
    .with_context(|| "Failed to build scalar sampler")?;

    let encrypted = query(&key, &request, &mut sampler).with_context(|| "Failed to encrypt query")?;

    let table_path = args.data_dir.join("table.bin");
    let response = if args.mmap {
        let table = MmapTable::open(&table_path)
            .with_context(|| format!("Failed to map table: {}", table_path.display()))?;
        info!("Mapped table: {} objects", table.len());
        respond_mmap(&table, &encrypted)
    } else {
        let table = load_table_binary(&table_path)
            .with_context(|| format!("Failed to load table: {}", table_path.display()))?;
        info!("Loaded table: {} objects", table.len());
        respond(&table, &encrypted)
    }
    .with_context(|| "Query evaluation failed")?;

    let points = extract(&key, &response).with_context(|| "Failed to decrypt matches")?;
    write_points(&args.output, &points)
        .with_context(|| format!("Failed to write results to {}", args.output.display()))?;

    info!("Query time: {:.2?}", start.elapsed());

    println!();
    println!("=== Query Complete ===");
    println!("Rank k: {}", request.k);
    println!("Matches: {}", response.indices.len());
    println!("Indices: {:?}", response.indices);
    println!("Results written to: {}", args.output.display());

    Ok(())
}
