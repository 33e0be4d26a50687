use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

use rtcrack_commons::HashAlgorithm;
use rtcrack_engine::{BuildOpts, Engine, Event, TableCtx, TableType};

/// All the hash algorithms supported.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum HashAlgorithmArg {
    Md5,
    Sha1,
    Sha256,
}

impl From<HashAlgorithmArg> for HashAlgorithm {
    fn from(arg: HashAlgorithmArg) -> Self {
        match arg {
            HashAlgorithmArg::Md5 => HashAlgorithm::Md5,
            HashAlgorithmArg::Sha1 => HashAlgorithm::Sha1,
            HashAlgorithmArg::Sha256 => HashAlgorithm::Sha256,
        }
    }
}

/// All the table layouts supported.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum TableTypeArg {
    Uncompressed,
    Compressed,
}

impl From<TableTypeArg> for TableType {
    fn from(arg: TableTypeArg) -> Self {
        match arg {
            TableTypeArg::Uncompressed => TableType::Uncompressed,
            TableTypeArg::Compressed => TableType::Compressed,
        }
    }
}

/// rtcrack is a SIMD-batched rainbow table builder & cracker.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Build(Build),
    Info(Info),
    Crack(Crack),
    Sort(Sort),
    Compress(Compress),
    Decompress(Decompress),
}

/// Generate a rainbow table, resuming it if it already exists.
///
/// Options marked optional are taken from the table header when resuming.
#[derive(Args)]
struct Build {
    /// The table file to create or resume.
    path: PathBuf,

    /// The number of chains to generate.
    #[arg(short, long)]
    count: u64,

    /// The minimum password length.
    #[arg(long)]
    min: Option<u8>,

    /// The maximum password length.
    #[arg(long)]
    max: Option<u8>,

    /// The chain length. Longer chains shrink the table on disk but slow
    /// down cracking.
    #[arg(short, long)]
    length: Option<u64>,

    /// Chains generated per work block; must be a multiple of the SIMD
    /// width.
    #[arg(short, long, default_value_t = 1024)]
    blocksize: usize,

    /// Worker threads; 0 uses every available core.
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// The hash algorithm of the table.
    #[arg(short, long, value_enum)]
    algorithm: Option<HashAlgorithmArg>,

    /// Shortcut for --algorithm md5.
    #[arg(long, conflicts_with = "algorithm")]
    md5: bool,

    /// Shortcut for --algorithm sha1.
    #[arg(long, conflicts_with_all = ["algorithm", "md5"])]
    sha1: bool,

    /// Shortcut for --algorithm sha256.
    #[arg(long, conflicts_with_all = ["algorithm", "md5", "sha1"])]
    sha256: bool,

    /// The charset of the keyspace; defaults to printable ASCII.
    #[arg(long, value_parser = check_charset)]
    charset: Option<String>,

    /// The on-disk layout of a newly created table.
    #[arg(long, value_enum, default_value = "compressed")]
    table_type: TableTypeArg,
}

/// Print the header and statistics of a rainbow table.
#[derive(Args)]
struct Info {
    /// The table file to inspect.
    path: PathBuf,
}

/// Recover the passwords behind one digest or a file of digests.
#[derive(Args)]
struct Crack {
    /// The rainbow table to crack against.
    path: PathBuf,

    /// A hex digest, or the path of a newline-delimited file of digests.
    #[arg(value_parser = check_target)]
    target: String,

    /// Worker threads for file targets; 0 uses every available core.
    #[arg(short, long, default_value_t = 0)]
    threads: usize,
}

/// Sort an uncompressed table by endpoint for indexed lookups.
#[derive(Args)]
struct Sort {
    /// The table file to sort in place.
    path: PathBuf,
}

/// Convert an uncompressed table into a compressed one.
///
/// Compressed tables drop the stored startpoints: they are half the size
/// but can only be searched linearly.
#[derive(Args)]
struct Compress {
    /// The uncompressed source table.
    path: PathBuf,

    /// Where to write the compressed table.
    destination: PathBuf,
}

/// Convert a compressed table into an uncompressed, endpoint-sorted one.
#[derive(Args)]
struct Decompress {
    /// The compressed source table.
    path: PathBuf,

    /// Where to write the uncompressed table.
    destination: PathBuf,
}

/// Checks that the charset is made of unique ASCII characters.
fn check_charset(charset: &str) -> Result<String> {
    anyhow::ensure!(
        charset.is_ascii(),
        "the charset can only contain ASCII characters"
    );
    Ok(charset.to_owned())
}

/// Checks that the crack target is hexadecimal or an existing file. The
/// digest width is only checked against the table header later.
fn check_target(target: &str) -> Result<String> {
    anyhow::ensure!(
        hex::decode(target).is_ok() || Path::new(target).exists(),
        "the target is neither valid hexadecimal nor an existing file"
    );
    Ok(target.to_owned())
}

fn main() {
    env_logger::init();

    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => build(args),
        Commands::Info(args) => info(args),
        Commands::Crack(args) => crack(args),
        Commands::Sort(args) => sort(args),
        Commands::Compress(args) => compress(args),
        Commands::Decompress(args) => decompress(args),
    }
}

fn build(args: Build) -> Result<()> {
    let mut builder = TableCtx::builder().table_type(args.table_type.into());
    if let Some(algorithm) = resolve_algorithm(&args) {
        builder = builder.algorithm(algorithm);
    }
    if let Some(min) = args.min {
        builder = builder.min(min as usize);
    }
    if let Some(max) = args.max {
        builder = builder.max(max as usize);
    }
    if let Some(length) = args.length {
        builder = builder.chain_length(length);
    }
    if let Some(charset) = &args.charset {
        builder = builder.charset(charset.as_bytes());
    }

    let engine =
        Engine::create(&args.path, builder).context("invalid table configuration")?;
    let opts = BuildOpts {
        blocksize: args.blocksize,
        count: args.count,
        threads: args.threads,
    };

    let bar = ProgressBar::new(args.count).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let handle = engine.build_in_background(opts);
    while let Some(event) = handle.recv() {
        if let Event::Progress {
            chains_written,
            chains_per_sec,
            hashes_per_sec,
            last_endpoint,
            ..
        } = event
        {
            bar.set_position(chains_written);
            bar.set_message(format!(
                "{chains_per_sec:.0} C/s {hashes_per_sec:.0} H/s E:\"{last_endpoint}\""
            ));
        }
    }
    handle.join().context("table generation failed")?;
    bar.finish_with_message("done");

    Ok(())
}

fn resolve_algorithm(args: &Build) -> Option<HashAlgorithm> {
    if args.md5 {
        Some(HashAlgorithm::Md5)
    } else if args.sha1 {
        Some(HashAlgorithm::Sha1)
    } else if args.sha256 {
        Some(HashAlgorithm::Sha256)
    } else {
        args.algorithm.map(HashAlgorithm::from)
    }
}

fn info(args: Info) -> Result<()> {
    let engine = Engine::open(&args.path).context("not a valid rainbow table")?;
    let ctx = engine.ctx();

    println!("Type:      {}", ctx.table_type);
    println!("Algorithm: {}", ctx.algorithm);
    println!("Min:       {}", ctx.min);
    println!("Max:       {}", ctx.max);
    println!("Length:    {}", ctx.chain_length);
    println!("Count:     {}", engine.count()?);
    println!("Coverage:  {:.2}%", engine.coverage()?);
    println!("Charset:   \"{}\"", String::from_utf8_lossy(&ctx.charset));

    Ok(())
}

fn crack(args: Crack) -> Result<()> {
    let engine = Engine::open(&args.path).context("not a valid rainbow table")?;

    let handle = engine.crack_in_background(args.target, args.threads);
    while let Some(event) = handle.recv() {
        if let Event::Found { digest, plaintext } = event {
            println!("{digest} {plaintext}");
        }
    }

    let report = handle.join()?;
    debug!(
        "{} recovered, {} false positives",
        report.found.len(),
        report.false_positives
    );

    Ok(())
}

fn sort(args: Sort) -> Result<()> {
    let mut engine = Engine::open(&args.path).context("not a valid rainbow table")?;
    engine.sort_table().context("sorting failed")
}

fn compress(args: Compress) -> Result<()> {
    let mut engine = Engine::open(&args.path).context("not a valid rainbow table")?;
    engine
        .change_type(&args.destination, TableType::Compressed)
        .context("compression failed")
}

fn decompress(args: Decompress) -> Result<()> {
    let mut engine = Engine::open(&args.path).context("not a valid rainbow table")?;
    engine
        .change_type(&args.destination, TableType::Uncompressed)
        .context("decompression failed")
}
