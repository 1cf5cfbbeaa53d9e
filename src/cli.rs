use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelhunt")]
#[command(
    author,
    version,
    about = "Playable source resolution with quality gating and bandwidth-aware fallback"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MediaTypeArg {
    Movie,
    Episode,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TriggerArg {
    Startup,
    EpisodeEnd,
    BandwidthRetest,
    Manual,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the resolution server
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Resolve a title against a running server and wait for the result
    Resolve {
        /// Server base URL
        #[arg(long, default_value = "http://localhost:8080")]
        server: String,

        /// Stable content identifier (e.g. an IMDb id)
        #[arg(long)]
        content_id: String,

        /// Title to search for
        #[arg(long)]
        title: String,

        #[arg(long)]
        year: Option<u16>,

        #[arg(long, value_enum, default_value = "movie")]
        media_type: MediaTypeArg,

        #[arg(long, requires = "episode")]
        season: Option<u32>,

        #[arg(long, requires = "season")]
        episode: Option<u32>,

        /// Runtime in minutes, enables the size-density check
        #[arg(long)]
        runtime: Option<u32>,

        /// Give up after this many seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Measure bandwidth against a running server and report it
    Measure {
        /// Server base URL
        #[arg(long, default_value = "http://localhost:8080")]
        server: String,

        /// Test duration in seconds (1-10) [default: playback.test_duration_secs]
        #[arg(short, long)]
        duration: Option<u64>,

        #[arg(long, value_enum, default_value = "manual")]
        trigger: TriggerArg,

        /// User id sent with the report
        #[arg(long)]
        user: Option<String>,
    },

    /// Print the title variants probed for a title
    Variants {
        title: String,

        #[arg(long)]
        year: Option<u16>,
    },

    /// Classify a release name: tier, audio score and quality gate
    Inspect {
        name: String,

        /// File size in bytes
        #[arg(long)]
        size: Option<u64>,

        /// Runtime in minutes
        #[arg(long)]
        runtime: Option<u32>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
