//! CLI argument definitions for the formflow binary.
//!
//! Config path priority: --config > FORMFLOW_CONFIG > ./formflow.toml.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const ENV_CONFIG_PATH: &str = "FORMFLOW_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "formflow.toml";

/// formflow: run post-submission actions for CMS forms.
#[derive(Parser, Debug)]
#[command(name = "formflow", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process a submission through the configured actions.
    Submit {
        /// Form handle.
        #[arg(long)]
        form: String,

        /// JSON file holding the submitted field values.
        #[arg(long)]
        data: PathBuf,

        /// JSON file holding the form definition (fields, store flag).
        #[arg(long = "form-file")]
        form_file: Option<PathBuf>,

        /// JSON file holding a list of named email configs.
        #[arg(long = "email-configs")]
        email_configs: Option<PathBuf>,

        /// Submitter IP address, used for rate limiting.
        #[arg(long)]
        ip: Option<String>,

        /// Submitter session id, used for rate limiting.
        #[arg(long)]
        session: Option<String>,

        /// Directory asset attachments are resolved against.
        #[arg(long = "assets-dir")]
        assets_dir: Option<PathBuf>,
    },

    /// List the configured actions of a form in execution order.
    Actions {
        #[arg(long)]
        form: String,
    },

    /// Render the email an action would send for a sample submission.
    Preview {
        #[arg(long)]
        form: String,

        #[arg(long)]
        action: String,

        /// JSON file holding the form definition.
        #[arg(long = "form-file")]
        form_file: Option<PathBuf>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_from(std::env::var(ENV_CONFIG_PATH).ok())
    }

    fn resolve_config_path_from(&self, env_value: Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env_value.filter(|p| !p.is_empty()) {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// `--log-level` if given, else the configured level.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}
