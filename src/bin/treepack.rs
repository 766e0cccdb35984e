use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use treepack::config::ArchiveConfig;
use treepack::preflight::{check_required_tools, tools_for, REQUIRED_TOOLS};
use treepack::{checksum_path, Algorithm, Archiver};

#[derive(Debug, Parser)]
#[command(name = "treepack", version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Cli {
    /// Configuration file (default: $TREEPACK_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// No progress and no tool output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print members and tool output, enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pack a directory into an archive
    #[command(alias = "c")]
    Compress {
        directory: PathBuf,
        /// Archive path; defaults to the directory name next to it
        archive: Option<PathBuf>,
        #[arg(long)]
        algo: Option<Algorithm>,
        #[arg(long)]
        json: bool,
    },
    /// Unpack an archive holding a single top directory
    #[command(alias = "x")]
    Extract {
        archive: PathBuf,
        #[arg(default_value = ".")]
        destination: PathBuf,
        /// Defaults to a guess from the file name
        #[arg(long)]
        algo: Option<Algorithm>,
        /// Rename the extracted top directory (needs `compat = true`)
        #[arg(long)]
        topdir: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print the algorithm guessed from an archive name
    Guess { archive: PathBuf },
    /// Check host tools needed by streaming formats
    Check {
        /// Only the tools needed for this algorithm
        #[arg(long)]
        algo: Option<Algorithm>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = ArchiveConfig::discover(cli.config.as_deref()).context("loading config")?;
    config.quiet |= cli.quiet;
    config.verbose |= cli.verbose;

    match cli.cmd {
        Command::Compress {
            directory,
            archive,
            algo,
            json,
        } => {
            let algo = algo.unwrap_or_else(|| config.default_algo.clone());
            let archiver = Archiver::new(config);
            compress(&archiver, &directory, archive.as_deref(), &algo, json)
        }
        Command::Extract {
            archive,
            destination,
            algo,
            topdir,
            json,
        } => {
            let archiver = Archiver::new(config);
            let algo = algo.unwrap_or_else(|| archiver.guess_algo(&archive));
            extract(
                &archiver,
                &archive,
                &destination,
                &algo,
                topdir.as_deref(),
                json,
            )
        }
        Command::Guess { archive } => {
            println!("{}", Archiver::new(config).guess_algo(&archive));
            Ok(())
        }
        Command::Check { algo } => check(&config, algo.as_ref()),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn compress(
    archiver: &Archiver,
    directory: &Path,
    archive: Option<&Path>,
    algo: &Algorithm,
    json: bool,
) -> Result<()> {
    let path = archiver
        .compress(directory, archive, algo)
        .with_context(|| format!("compressing '{}' with {}", directory.display(), algo))?;

    if json {
        let out = json!({
            "archive": path,
            "algo": algo,
            "checksum": archiver.config().checksum.then(|| checksum_path(&path)),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !archiver.config().quiet {
        println!("{}", path.display());
    }
    Ok(())
}

fn extract(
    archiver: &Archiver,
    archive: &Path,
    destination: &Path,
    algo: &Algorithm,
    topdir: Option<&str>,
    json: bool,
) -> Result<()> {
    let root = archiver
        .extract_as(archive, destination, algo, topdir)
        .with_context(|| {
            format!(
                "extracting '{}' to '{}'",
                archive.display(),
                destination.display()
            )
        })?;

    if json {
        let out = json!({
            "archive": archive,
            "algo": algo,
            "root": root,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !archiver.config().quiet {
        println!("{}", root.display());
    }
    Ok(())
}

fn check(config: &ArchiveConfig, algo: Option<&Algorithm>) -> Result<()> {
    if !config.streaming_supported() {
        println!("streaming formats disabled, only zip is available");
        return Ok(());
    }
    let tools = match algo {
        Some(algo) => tools_for(algo),
        None => REQUIRED_TOOLS.to_vec(),
    };
    check_required_tools(&tools).context("host tool check failed")?;
    println!("all host tools found");
    Ok(())
}
