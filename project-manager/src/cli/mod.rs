use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::api;
use crate::config::AppConfig;
use crate::utils;

#[derive(Parser)]
#[clap(name = "project-manager")]
#[clap(version = version_string())]
#[clap(subcommand_required = true, arg_required_else_help = true)]
pub struct App {
    #[clap(subcommand)]
    cmd: Cmd,
}

impl App {
    pub fn run(self) -> Result<()> {
        match self.cmd {
            Cmd::Run(cmd) => cmd.run(),
            Cmd::Config(cmd) => cmd.run(),
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Start the API server.
    Run(CmdRun),

    /// Print the effective configuration as JSON and exit.
    Config(CmdConfig),
}

/// Where the service configuration comes from.
#[derive(Args)]
struct ConfigSource {
    /// Path to the service config. Defaults are used when omitted.
    #[clap(short, long, env = "PROJECT_MANAGER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address (takes precedence over `PORT`).
    #[clap(long)]
    listen_addr: Option<SocketAddr>,
}

impl ConfigSource {
    /// File (or defaults), then environment variables, then CLI flags.
    fn load(&self) -> Result<AppConfig> {
        let mut config: AppConfig = match &self.config {
            Some(path) => {
                utils::serde::load_json_from_file(path).context("failed to load service config")?
            }
            None => AppConfig::default(),
        };

        config
            .apply_env_overrides()
            .context("invalid environment override")?;

        if let Some(addr) = self.listen_addr {
            config.api.listen_addr = addr;
        }

        Ok(config)
    }
}

#[derive(Parser)]
struct CmdRun {
    #[clap(flatten)]
    source: ConfigSource,

    /// Path to a JSON object of per-target log levels.
    #[clap(short, long)]
    logger_config: Option<PathBuf>,
}

impl CmdRun {
    fn run(self) -> Result<()> {
        let config = self.source.load()?;

        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to build runtime")?
            .block_on(async move {
                utils::logger::init_logger(
                    &config.logger,
                    self.logger_config,
                    config.api.environment,
                )?;
                utils::logger::log_panics_with_tracing();

                api::http_service(config).await
            })
    }
}

#[derive(Parser)]
struct CmdConfig {
    #[clap(flatten)]
    source: ConfigSource,
}

impl CmdConfig {
    fn run(self) -> Result<()> {
        let config = self.source.load()?;
        let json = serde_json::to_string_pretty(&config)?;
        println!("{json}");
        Ok(())
    }
}

fn version_string() -> &'static str {
    static STRING: OnceLock<String> = OnceLock::new();
    STRING.get_or_init(|| format!("(release {PKG_VERSION}) (rustc {RUSTC_VERSION})"))
}

static PKG_VERSION: &str = env!("PROJECT_MANAGER_VERSION");
static RUSTC_VERSION: &str = env!("PROJECT_MANAGER_RUSTC_VERSION");
