//! Command-line interface for docdump
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging with arguments
//! - Translation of arguments into pipeline options
//! - The informational subcommands (version, completion, config)

use clap::{Args, Parser, Subcommand};
use serde_json::value::RawValue;
use std::path::{Path, PathBuf};

use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, Result};
use crate::export::{ExportOptions, validate_prefix};

pub mod completion;

/// docdump - dump and restore document store indexes
#[derive(Parser, Debug)]
#[command(
    name = "docdump",
    version,
    about = "Dump and restore document store indexes",
    long_about = "Exports an Elasticsearch index or MongoDB collection to gzip-compressed JSON line
files, optionally split into numbered files, and imports such files back with upserts."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Disable the progress bar
    #[arg(long = "no-progress", global = true)]
    pub no_progress: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for docdump
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dump an index to compressed files
    Export(ExportArgs),

    /// Restore compressed files into an index
    Import(ImportArgs),

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show version information
    Version,
}

/// Arguments of `docdump export`
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Store endpoints, comma-separated (http://host07:9200,http://host06:9200)
    #[arg(long, value_name = "HOSTS")]
    pub hosts: String,

    /// Index (or collection) to dump
    #[arg(long, value_name = "NAME")]
    pub index: String,

    /// Output path prefix
    #[arg(long, value_name = "PREFIX")]
    pub out: String,

    /// Records per file, 0 for a single file
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub split: u64,

    /// Records per scroll page
    #[arg(long, value_name = "N")]
    pub page: Option<u32>,

    /// Query filter as JSON, e.g. '{"term":{"user":"kimchy"}}'
    #[arg(long, value_name = "JSON")]
    pub query: Option<String>,
}

/// Arguments of `docdump import`
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Store endpoints, comma-separated
    #[arg(long, value_name = "HOSTS")]
    pub hosts: String,

    /// Index (or collection) to write to
    #[arg(long, value_name = "NAME")]
    pub index: String,

    /// Glob pattern of the files to import, e.g. 'dump.*.json.gz'
    #[arg(long, value_name = "GLOB")]
    pub files: String,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and environment and merge with arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    ///
    /// # Arguments
    /// * `config` - Configuration to modify
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_logging_args(config, args);

        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
        if args.no_progress {
            config.transfer.progress_bar = false;
        }
        if let Commands::Export(ref export) = args.command {
            if let Some(page) = export.page {
                config.transfer.page_size = page;
            }
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Whether to draw a progress bar
    pub fn progress_bar_enabled(&self) -> bool {
        self.config.transfer.progress_bar && !self.args.quiet
    }

    /// Build export options from arguments and configuration
    ///
    /// # Arguments
    /// * `args` - Export arguments
    ///
    /// # Returns
    /// * `Result<ExportOptions>` - Options or configuration error
    pub fn export_options(&self, args: &ExportArgs) -> Result<ExportOptions> {
        if args.index.trim().is_empty() {
            return Err(ConfigError::MissingField("index".to_string()).into());
        }
        let query = args.query.as_deref().map(parse_query).transpose()?;
        // The destination must be usable before any store is contacted
        validate_prefix(&args.out)?;

        Ok(ExportOptions {
            index: args.index.clone(),
            query,
            page_size: self.config.transfer.page_size,
            keep_alive: self.config.connection.scroll_keep_alive.clone(),
            out_prefix: args.out.clone(),
            records_per_file: args.split,
            extension: self.config.transfer.extension.clone(),
            compression_level: self.config.transfer.compression_level,
        })
    }

    /// Handle the informational subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if a subcommand was handled, false for transfers
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Commands::Version => {
                self.show_version();
                Ok(true)
            }
            Commands::Completion { shell } => {
                completion::generate_completion(shell)?;
                Ok(true)
            }
            Commands::Config { show } => {
                self.handle_config_command(*show)?;
                Ok(true)
            }
            Commands::Export(_) | Commands::Import(_) => Ok(false),
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("docdump version {}", crate::VERSION);
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    fn handle_config_command(&self, show: bool) -> Result<()> {
        let path = self.config_path();
        println!("Configuration file: {}", path.display());
        if !path.exists() {
            println!("(not present, using defaults)");
        }

        if show {
            println!();
            println!("=== Effective Configuration ===");
            println!();
            println!("{}", self.config.to_toml()?);
        }

        Ok(())
    }

    /// Get configuration file path (from args or default)
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .as_deref()
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::default_path)
    }
}

/// Validate a query fragment
///
/// The fragment must be a JSON object; it is forwarded to the store
/// verbatim.
///
/// # Arguments
/// * `text` - Query JSON from the command line
///
/// # Returns
/// * `Result<Box<RawValue>>` - Raw query or invalid query error
pub fn parse_query(text: &str) -> Result<Box<RawValue>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ConfigError::InvalidQuery(e.to_string()))?;
    if !value.is_object() {
        return Err(ConfigError::InvalidQuery("query must be a JSON object".to_string()).into());
    }
    RawValue::from_string(text.trim().to_string())
        .map_err(|e| ConfigError::InvalidQuery(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DumpError;

    fn interface(argv: &[&str]) -> CliInterface {
        let args = CliArgs::try_parse_from(argv).unwrap();
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &args);
        CliInterface { args, config }
    }

    #[test]
    fn test_export_args_parsing() {
        let args = CliArgs::try_parse_from([
            "docdump",
            "export",
            "--hosts=http://host07:9200,http://host06:9200",
            "--index=tweets",
            "--out=dump",
            "--split=1000000",
        ])
        .unwrap();

        let Commands::Export(export) = args.command else {
            panic!("expected export");
        };
        assert_eq!(export.hosts, "http://host07:9200,http://host06:9200");
        assert_eq!(export.index, "tweets");
        assert_eq!(export.split, 1_000_000);
        assert_eq!(export.page, None);
        assert_eq!(export.query, None);
    }

    #[test]
    fn test_import_args_parsing() {
        let args = CliArgs::try_parse_from([
            "docdump",
            "import",
            "--hosts",
            "mongodb://localhost/shop",
            "--index",
            "orders",
            "--files",
            "dump.*.json.gz",
        ])
        .unwrap();

        let Commands::Import(import) = args.command else {
            panic!("expected import");
        };
        assert_eq!(import.files, "dump.*.json.gz");
    }

    #[test]
    fn test_missing_required_args() {
        assert!(CliArgs::try_parse_from(["docdump", "export", "--index=x"]).is_err());
        assert!(CliArgs::try_parse_from(["docdump"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = interface(&["docdump", "version", "-v", "--no-progress"]);
        assert!(cli.args().verbose);
        assert_eq!(cli.config().logging.level, LogLevel::Debug);
        assert!(!cli.progress_bar_enabled());
    }

    #[test]
    fn test_logging_priority() {
        let cli = interface(&["docdump", "-q", "--vv", "version"]);
        assert_eq!(cli.config().logging.level, LogLevel::Trace);

        let cli = interface(&["docdump", "-q", "version"]);
        assert_eq!(cli.config().logging.level, LogLevel::Error);
        assert!(!cli.progress_bar_enabled());
    }

    #[test]
    fn test_export_options_from_args_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let out = format!("--out={}", dir.path().join("dump").display());
        let cli = interface(&[
            "docdump",
            "--timeout=5",
            "export",
            "--hosts=http://es:9200",
            "--index=tweets",
            out.as_str(),
            "--page=100",
            "--query",
            r#"{"term": {"user": "kimchy"}}"#,
        ]);
        let Commands::Export(ref args) = cli.args().command else {
            panic!("expected export");
        };
        let options = cli.export_options(args).unwrap();

        assert_eq!(cli.config().connection.timeout, 5);
        assert_eq!(options.page_size, 100);
        assert_eq!(options.keep_alive, "1m");
        assert_eq!(options.records_per_file, 0);
        assert_eq!(options.extension, "json.gz");
        assert_eq!(options.compression_level, 9);
        assert_eq!(
            options.query.as_deref().map(RawValue::get),
            Some(r#"{"term": {"user": "kimchy"}}"#)
        );
    }

    #[test]
    fn test_export_options_reject_missing_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = format!("--out={}", dir.path().join("missing").join("dump").display());
        // Nothing listens here; the check must not need a store
        let cli = interface(&[
            "docdump",
            "export",
            "--hosts=http://127.0.0.1:1",
            "--index=tweets",
            out.as_str(),
        ]);
        let Commands::Export(ref args) = cli.args().command else {
            panic!("expected export");
        };

        assert!(matches!(
            cli.export_options(args),
            Err(DumpError::Config(ConfigError::InvalidValue { ref field, .. })) if field == "out"
        ));
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn test_parse_query() {
        assert!(parse_query(r#"{"match_all": {}}"#).is_ok());
        assert!(matches!(
            parse_query("{broken"),
            Err(DumpError::Config(ConfigError::InvalidQuery(_)))
        ));
        assert!(matches!(
            parse_query("[1, 2]"),
            Err(DumpError::Config(ConfigError::InvalidQuery(_)))
        ));
    }
}
