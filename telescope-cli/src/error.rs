//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use telescope::cache::CacheError;
use telescope::config::ConfigFileError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be loaded
    Config(ConfigFileError),
    /// Failed to open the cache
    CacheOpen(CacheError),
    /// A cache operation failed
    Cache(CacheError),
    /// Failed to encode an image for output
    Encode(String),
    /// Failed to write output file
    FileWrite { path: PathBuf, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Cache(CacheError::Refresh { failures }) => {
                eprintln!();
                for failure in failures {
                    eprintln!("  {}: {}", failure.identifier, failure.error);
                }
            }
            CliError::Cache(CacheError::EditNotFound(_)) => {
                eprintln!();
                eprintln!("Tagged variants are only created by edits or resizes.");
                eprintln!("Run without --tag to fetch the original image.");
            }
            CliError::CacheOpen(CacheError::Io(_)) => {
                eprintln!();
                eprintln!("Check that the cache directory exists and is writable,");
                eprintln!("or choose another one with --cache-dir.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::LoggingInit(_) | CliError::Config(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::CacheOpen(e) => write!(f, "Failed to open cache: {}", e),
            CliError::Cache(e) => write!(f, "{}", e),
            CliError::Encode(msg) => write!(f, "Failed to encode output image: {}", msg),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::CacheOpen(e) | CliError::Cache(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}
