use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use proguard_rewrite::{archive, Config, MappingFile, MappingIndex, Pipeline};

/// Rewrites class and member names in the descriptors of a proguard
/// obfuscated archive and merges the result back into the archive.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Be verbose.
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rewrite the descriptors of an archive and merge them back into it.
    Rewrite {
        /// The obfuscated archive.
        #[arg(long)]
        input: PathBuf,
        /// The proguard mapping produced for the archive.
        #[arg(long)]
        mappings: PathBuf,
        /// Where to write the merged archive. May be the same as `--input`.
        #[arg(long)]
        output: PathBuf,
        /// The directory receiving the rewritten descriptors. Defaults to a
        /// directory next to the output archive.
        #[arg(long)]
        overlay: Option<PathBuf>,
        /// A JSON configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// The archive path of the module descriptor, overriding the config.
        #[arg(long)]
        descriptor: Option<String>,
    },
    /// Merge a directory into an archive, the directory winning on conflicts.
    Merge {
        /// The base archive.
        #[arg(long)]
        input: PathBuf,
        /// The directory to merge into the archive.
        #[arg(long)]
        overlay: PathBuf,
        /// Where to write the merged archive.
        #[arg(long)]
        output: PathBuf,
    },
    /// Check a proguard mapping and print a summary of it.
    Summary {
        /// The proguard mapping.
        mappings: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .format_timestamp(None)
        .format_target(false)
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_env(env_logger::Env::default())
        .init();

    match cli.command {
        Command::Rewrite {
            input,
            mappings,
            output,
            overlay,
            config,
            descriptor,
        } => {
            let mut config = match config {
                Some(path) => Config::from_path(&path)
                    .with_context(|| format!("failed to load config {path:?}"))?,
                None => Config::default(),
            };
            if let Some(descriptor) = descriptor {
                config.descriptor = descriptor;
            }
            let overlay = overlay.unwrap_or_else(|| output.with_extension("overlay"));

            let pipeline = Pipeline {
                input,
                mappings,
                overlay,
                output,
                config,
            };
            let report = pipeline
                .run()
                .with_context(|| format!("failed to rewrite {:?}", pipeline.input))?;
            log::info!(
                "rewrote {} documents into {}",
                report.documents.len(),
                pipeline.output.display()
            );
        }
        Command::Merge {
            input,
            overlay,
            output,
        } => {
            archive::merge_files(&input, &overlay, &output)
                .with_context(|| format!("failed to merge {overlay:?} into {input:?}"))?;
        }
        Command::Summary { mappings } => {
            let source = std::fs::read(&mappings)
                .with_context(|| format!("failed to read mapping {mappings:?}"))?;
            let mapping = MappingFile::new(&source);
            let index = MappingIndex::parse(mapping.clone())
                .with_context(|| format!("failed to parse mapping {mappings:?}"))?;
            println!("{}", mapping.summary());
            println!("{} distinct classes", index.len());
        }
    }

    Ok(())
}
