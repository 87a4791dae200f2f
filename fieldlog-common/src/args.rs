//! CLI arguments shared by the fieldlog binaries.

use clap::Args;

use crate::config::LoggingConfig;

/// Logging flags, flattened into each binary's argument struct.
#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

impl LogArgs {
    /// Apply the CLI override on top of the configured logging settings.
    ///
    /// The output format always comes from the configuration.
    pub fn resolve(&self, configured: &LoggingConfig) -> LoggingConfig {
        match &self.log_level {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: configured.format,
            },
            None => configured.clone(),
        }
    }
}
