//! CLI argument definitions for the Platform console.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Args, Parser, Subcommand};
use platform_core::types::UserContext;
use std::path::PathBuf;

/// Platform: controller and action registry of the admin console.
#[derive(Parser, Debug)]
#[command(name = "platform", version, about)]
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
    /// List registered page controllers and their actions.
    Actions,
    /// Search actions by text and filters.
    Discover {
        /// Free-text query.
        query: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        page: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        user: UserArgs,
    },
    /// Print tool definitions for AI agents.
    Tools,
    /// Print registry statistics.
    Stats,
    /// Execute an action as the given user.
    Exec {
        /// Full action id, e.g. `settings.getSetting`.
        action_id: String,
        /// Parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
        /// Route through the AI bridge, which reports errors as results.
        #[arg(long)]
        ai: bool,
        #[command(flatten)]
        user: UserArgs,
    },
    /// Write a default configuration file.
    InitConfig {
        /// Destination; defaults to the resolved config path.
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Identity of the caller for commands that run actions.
#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    #[arg(long = "user", default_value = "cli")]
    pub user_id: String,
    #[arg(long = "role")]
    pub roles: Vec<String>,
    #[arg(long = "permission")]
    pub permissions: Vec<String>,
    #[arg(long = "org")]
    pub organization: Option<String>,
}

impl UserArgs {
    pub fn to_user(&self) -> UserContext {
        let mut user = UserContext::new(self.user_id.clone(), self.user_id.clone())
            .with_roles(self.roles.iter().cloned())
            .with_permissions(self.permissions.iter().cloned());
        if let Some(org) = &self.organization {
            user = user.with_organization(org.clone());
        }
        user
    }
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PLATFORM_CONFIG env var > ./platform.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PLATFORM_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("platform.toml")
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}
