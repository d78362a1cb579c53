//! Command-line arguments
//!
//! Every option can also come from a `PTK_*` environment variable. Unset
//! options fall through to the config file and then to compiled defaults.

use std::path::PathBuf;

use clap::Parser;
use ptk_common::config::ConfigOverrides;

#[derive(Parser, Debug, Clone)]
#[command(name = "ptk-rt")]
#[command(about = "Real-time performance tracking service")]
#[command(version)]
pub struct Args {
    /// Port to listen on [default: 5780]
    #[arg(short, long, env = "PTK_PORT")]
    pub port: Option<u16>,

    /// Address to bind [default: 127.0.0.1]
    #[arg(short, long, env = "PTK_BIND")]
    pub bind: Option<String>,

    /// SQLite database file
    #[arg(short, long, env = "PTK_DATABASE")]
    pub database: Option<PathBuf>,

    /// TOML config file [default: <config dir>/ptk/config.toml]
    #[arg(short, long, env = "PTK_CONFIG")]
    pub config: Option<PathBuf>,

    /// HS256 secret for connection tokens (at least 32 characters)
    #[arg(long, env = "PTK_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Coaches list performances created after this RFC 3339 instant
    #[arg(long, env = "PTK_COACH_CUTOFF")]
    pub coach_cutoff: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "PTK_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            bind: self.bind.clone(),
            database: self.database.clone(),
            jwt_secret: self.jwt_secret.clone(),
            coach_cutoff: self.coach_cutoff.clone(),
            log_level: self.log_level.clone(),
        }
    }
}
