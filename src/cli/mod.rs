pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Adaptive comment extraction for social media posts", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/murmur/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape comments from one or more post URLs
    Scrape {
        /// Post URLs
        urls: Vec<String>,

        /// Read additional URLs from a file, one per line
        #[arg(long)]
        urls_file: Option<PathBuf>,

        /// Comments to collect per post
        #[arg(short, long)]
        max_comments: Option<usize>,

        /// Give up on a post after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Posts scraped at once
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Inspect or prune learned patterns
    Patterns {
        #[command(subcommand)]
        action: PatternAction,
    },
    /// Print the site shape of a page
    Shape {
        /// Page URL
        url: String,
    },
}

#[derive(Subcommand)]
pub enum PatternAction {
    /// List learned patterns
    List {
        /// Only patterns for this site shape
        #[arg(long)]
        shape: Option<String>,
    },
    /// Forget every pattern learned for a site shape
    Forget {
        /// Site shape id
        shape: String,
    },
}
