use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::ValidationKind;
use crate::session::DispatchMode;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

/// Output format for validation reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Grouped, human-readable panels
    #[default]
    Human,
    /// Machine-readable snapshot
    Json,
}

/// Validate JATS XML against the JATS DTD and JATS4R Schematron rules
#[derive(Parser, Debug, Clone)]
#[command(name = "jats-validator")]
#[command(about = "Validate JATS XML documents with a remote DTD and Schematron service")]
#[command(version)]
pub struct Cli {
    /// XML file to validate (.xml)
    #[arg(help = "XML file to validate")]
    pub file: Option<PathBuf>,

    /// Fetch the document from a URL instead of a file
    #[arg(long = "url", conflicts_with_all = ["file", "stdin"])]
    pub url: Option<String>,

    /// Read the document from standard input
    #[arg(long = "stdin", conflicts_with = "file")]
    pub stdin: bool,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Base URL of the validation service
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Schematron ruleset to request
    #[arg(long = "schematron")]
    pub schematron: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Quiet period after an edit before revalidating, in milliseconds
    #[arg(long = "debounce-ms")]
    pub debounce_ms: Option<u64>,

    /// Validation kinds to run (comma-separated: dtd,schematron)
    #[arg(long = "kinds", value_delimiter = ',')]
    pub kinds: Vec<ValidationKind>,

    /// Send kinds concurrently or one after another
    #[arg(long = "dispatch")]
    pub dispatch: Option<DispatchMode>,

    /// Reformat the document through the service before validating
    #[arg(long = "format-xml", conflicts_with = "no_format")]
    pub format_xml: bool,

    /// Never reformat the document
    #[arg(long = "no-format")]
    pub no_format: bool,

    /// Keep running and revalidate whenever the file changes
    #[arg(short = 'w', long = "watch")]
    pub watch: bool,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Show debugging detail in error reports and logs
    #[arg(long = "debug", conflicts_with = "quiet")]
    pub debug: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.file.is_none() && self.url.is_none() && !self.stdin {
            return Err("Provide an XML file, --url or --stdin".to_string());
        }
        if self.watch && self.file.is_none() {
            return Err("--watch requires an XML file".to_string());
        }
        if let Some(file) = &self.file
            && !file.exists()
        {
            return Err(format!("Path does not exist: {}", file.display()));
        }
        Ok(())
    }

    /// `Some(true)`/`Some(false)` when a format flag was given
    pub fn format_on_load(&self) -> Option<bool> {
        if self.format_xml {
            Some(true)
        } else if self.no_format {
            Some(false)
        } else {
            None
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.debug {
            VerbosityLevel::Debug
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}
