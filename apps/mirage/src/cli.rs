use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mirage_common::RelayConfigPatch;

#[derive(Parser)]
#[command(name = "mirage", version, about)]
pub(crate) struct Cli {
    /// JSON config file; env vars and flags override it.
    #[arg(long, global = true, env = "MIRAGE_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    #[command(flatten)]
    pub(crate) serve: ServeArgs,
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Args)]
pub(crate) struct ServeArgs {
    #[arg(long, env = "MIRAGE_HOST")]
    pub(crate) host: Option<String>,
    #[arg(long, env = "MIRAGE_PORT")]
    pub(crate) port: Option<u16>,
    #[arg(long, env = "MIRAGE_TARGET_HOST")]
    pub(crate) target_host: Option<String>,
    #[arg(long, env = "MASK_ERRORS", value_parser = parse_bool_flag)]
    pub(crate) mask_errors: Option<bool>,
    #[arg(long, global = true, env = "MIRAGE_DATA_DIR")]
    pub(crate) data_dir: Option<String>,
    #[arg(long, env = "MIRAGE_PROXY")]
    pub(crate) proxy: Option<String>,
    #[arg(long, env = "HEALTH_CHECK_KEY", hide_env_values = true)]
    pub(crate) health_check_key: Option<String>,
    #[arg(long, env = "MIRAGE_HEALTH_CHECK_INTERVAL")]
    pub(crate) health_check_interval_secs: Option<u64>,
}

impl ServeArgs {
    pub(crate) fn into_patch(self) -> RelayConfigPatch {
        RelayConfigPatch {
            host: self.host,
            port: self.port,
            target_host: self.target_host,
            mask_errors: self.mask_errors,
            data_dir: self.data_dir,
            proxy: self.proxy,
            health_check_key: self.health_check_key,
            health_check_interval_secs: self.health_check_interval_secs,
            ..RelayConfigPatch::default()
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Inspect stored exchange and health records.
    Records {
        #[command(subcommand)]
        action: RecordsCommand,
    },
}

#[derive(Subcommand)]
pub(crate) enum RecordsCommand {
    /// List stored keys, newest first (by date, then by record timestamp).
    List {
        #[arg(long, default_value = "logs/")]
        prefix: String,
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },
    /// Pretty-print one stored record.
    Get { key: String },
    /// Print a curl command that replays a stored request.
    Curl {
        key: String,
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        base_url: String,
    },
    /// Send a stored request again and print the reply.
    Replay {
        key: String,
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        base_url: String,
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

/// `true`/`1`/`yes` and `false`/`0`/`no`, case-insensitive.
pub(crate) fn parse_bool_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(format!("expected a boolean, got {other:?}")),
    }
}
