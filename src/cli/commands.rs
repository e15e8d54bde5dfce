use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "snapseal", version, about = "Signed, content-addressed snapshots of a source tree")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./snapseal.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Where the HMAC key comes from; falls back to the SNAPSEAL_KEY variable
#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Signing key; exactly 64 hex characters are decoded, anything else is used as raw bytes
    #[arg(long, conflicts_with = "key_file")]
    pub key: Option<String>,

    /// File holding the signing key
    #[arg(long)]
    pub key_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Source tree to snapshot
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Output directory (holds store/ and the current pointer)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Chunk size in KiB
    #[arg(long, conflicts_with = "chunk_bytes")]
    pub chunk_size_kb: Option<usize>,

    /// Chunk size in bytes
    #[arg(long)]
    pub chunk_bytes: Option<usize>,

    /// Include glob, relative to the root (repeatable, replaces configured patterns)
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Directory name to skip wherever it appears (repeatable, added to configured names)
    #[arg(long = "exclude", value_name = "DIRNAME")]
    pub exclude: Vec<String>,

    /// Maximum entries in feed.json
    #[arg(long)]
    pub feed_limit: Option<usize>,

    /// Snapshots kept in the store
    #[arg(long)]
    pub keep: Option<usize>,

    #[command(flatten)]
    pub key: KeyArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, sign and publish a snapshot
    Build(BuildArgs),

    /// Rebuild whenever the source tree changes
    Watch {
        #[command(flatten)]
        build: BuildArgs,

        /// Quiet period before a burst of changes triggers a rebuild
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Also serve the published snapshot on this port
        #[arg(long)]
        serve_port: Option<u16>,

        /// Address for the server started by --serve-port
        #[arg(long)]
        bind: Option<String>,
    },

    /// Serve the published snapshot over HTTP (read-only)
    Serve {
        /// Output directory written by build
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        bind: Option<String>,
    },

    /// Check the signature and a random sample of chunks
    Verify {
        /// Snapshot directory, or an output directory with a current pointer
        #[arg(long)]
        site: PathBuf,

        #[command(flatten)]
        key: KeyArgs,

        /// Number of chunks to check
        #[arg(long)]
        samples: Option<usize>,

        /// Seed for a reproducible sample
        #[arg(long)]
        seed: Option<u64>,

        /// Check every chunk
        #[arg(long, conflicts_with = "samples")]
        all: bool,
    },

    /// Show the published status summary
    Status {
        #[arg(long)]
        site: PathBuf,
    },
}
