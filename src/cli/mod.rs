use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "video-mindmap",
    about = "Video Mindmap - Turn YouTube, Bilibili and Xiaoyuzhou media into Chinese mind maps",
    version,
    long_about = "Downloads the audio of each URL, transcribes it, translates the transcript to Chinese when needed and writes a hierarchical mind map as Markdown, JSON or a self-contained HTML page."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one or more media URLs into mind maps
    Convert {
        /// Media URLs (YouTube, Bilibili or Xiaoyuzhou); each runs as its own job
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,

        /// Directory for the generated files (defaults to the configured output_dir)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Mind map format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Spoken language hint for transcription (auto-detect if not specified)
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,

        /// Attempts per stage before a transient failure becomes final
        #[arg(long, value_name = "N", env = "MINDMAP_MAX_RETRIES")]
        max_retries: Option<u32>,

        /// Per-attempt stage timeout in seconds
        #[arg(long, value_name = "SECONDS", env = "MINDMAP_STAGE_TIMEOUT")]
        stage_timeout: Option<u64>,

        /// Maximum depth of the outline tree
        #[arg(long, value_name = "DEPTH", env = "MINDMAP_MAX_DEPTH")]
        max_depth: Option<usize>,

        /// Also write the untranslated transcript as <title>.txt
        #[arg(long)]
        save_transcript: bool,
    },

    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write a configuration file with default values
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },

    /// List supported platforms
    Platforms,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markmap-compatible Markdown headings
    Markdown,
    /// XMind-style JSON topic tree
    Json,
    /// Self-contained markmap HTML page
    Html,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Html => write!(f, "html"),
        }
    }
}
