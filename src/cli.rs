use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "mod-indexer")]
#[command(about = "Index the bytecode of game mods: references, hierarchy and tags per mod")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,

    #[arg(long, value_name = "DIR", global = true)]
    pub cache: Option<PathBuf>,

    /// Ceiling on concurrently indexed artifacts
    #[arg(long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    #[arg(long, value_name = "N", global = true)]
    pub download_threads: Option<usize>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Index every jar of a directory laid out as <version>/<project>/<file>.jar
    Index {
        #[arg(value_name = "DIR")]
        root: PathBuf,

        #[arg(long, value_name = "VER")]
        game_version: String,

        #[arg(long, value_name = "NAME", default_value = "local")]
        platform: String,

        #[arg(long, value_name = "N", default_value_t = 50)]
        page_size: usize,

        #[arg(long, value_name = "N")]
        max_pages: Option<usize>,

        /// Purge rows of mods not seen in this pass
        #[arg(long)]
        full_cleanup: bool,
    },
    /// Print metadata and class records of one jar without storing anything
    Inspect {
        #[arg(value_name = "JAR")]
        jar_path: PathBuf,

        /// Skip the sanitizer
        #[arg(long)]
        raw: bool,

        #[arg(long)]
        no_refs: bool,
    },
    Show {
        mod_id: u64,
    },
    Stats,
    Schema,
    Clear,
}
