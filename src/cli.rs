// Command-line arguments. Print defaults left unset here come from the
// preferences file.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ClientConfig, Preferences};
use crate::options::{parse_page_range, ColorMode, PageSize, PagesPerSide, PrintOptions, Sides};

/// Upload documents to UT's Library Print System.
#[derive(Parser, Debug)]
#[command(name = "utprint", version)]
#[command(about = "Upload a document to UT's Library Print System.")]
pub struct Cli {
    /// Print with or without color [default: from preferences, else full]
    #[arg(long, value_enum)]
    pub color: Option<ColorMode>,

    /// Print single sided (1) or double sided (2) [default: from preferences, else 1]
    #[arg(long, value_enum)]
    pub sides: Option<Sides>,

    /// Print two pages on each side of paper
    #[arg(long = "two-pps")]
    pub two_pages: bool,

    /// Number of copies
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub copies: u32,

    /// Print a specific set of pages (e.g. '1-5, 8, 11-13')
    #[arg(long, value_parser = parse_page_range)]
    pub range: Option<String>,

    /// Paper size
    #[arg(long, value_enum, default_value = "letter")]
    pub page_size: PageSize,

    /// EID to log on with; the password is always prompted for
    #[arg(long, short)]
    pub user: Option<String>,

    /// Upload and exit without waiting for the cost
    #[arg(long)]
    pub no_wait: bool,

    /// Remember --color and --sides as the new defaults
    #[arg(long)]
    pub save_defaults: bool,

    /// Print service API root (also read from UTPRINT_SERVER)
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Give up on any single request after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Stop waiting for a document after this many seconds; 0 waits forever
    #[arg(long, value_name = "SECS")]
    pub poll_timeout: Option<u64>,

    /// Preferences file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Show debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Files (PDF, image, MS Office...) to print
    #[arg(required = true, value_name = "DOCUMENT")]
    pub documents: Vec<PathBuf>,
}

impl Cli {
    pub fn preferences_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Preferences::default_path)
    }

    /// Settings for every document in this run.
    pub fn print_options(&self, prefs: &Preferences) -> PrintOptions {
        PrintOptions {
            color: self.color.unwrap_or(prefs.color),
            sides: self.sides.unwrap_or(prefs.sides),
            pages_per_side: if self.two_pages {
                PagesPerSide::Two
            } else {
                PagesPerSide::One
            },
            copies: self.copies,
            page_range: self.range.clone().unwrap_or_default(),
            page_size: self.page_size,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(server) = &self.server {
            config = config.with_server(server);
        }
        if let Some(secs) = self.timeout {
            config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = self.poll_timeout {
            config.poll_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config
    }
}
