//! Command-line arguments of the console driver.

use crate::config::Config;
use clap::Parser;

/// Real-time camera pipeline
#[derive(Parser, Debug, Default)]
#[command(name = "camera-pipeline", author, version, about, long_about = None)]
pub struct Args {
    /// Camera index or stream URI (overrides the config file)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    pub config: Option<String>,

    /// Cascade model for object detection (overrides the config file)
    #[arg(long)]
    pub cascade: Option<String>,

    /// Enable debug output
    #[arg(short, long)]
    pub debug: bool,
}

impl Args {
    /// Apply the command-line overrides on top of `config`
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.source.device.clone_from(source);
        }
        if let Some(cascade) = &self.cascade {
            config.detector.model.clone_from(cascade);
        }
    }

    /// Default log filter for `env_logger`
    #[must_use]
    pub const fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}
