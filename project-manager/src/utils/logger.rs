use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::api::config::Environment;
use crate::utils;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Per-target log levels, loaded from a JSON object such as
/// `{ "project_manager": "debug", "tower_http": "info" }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>")]
pub struct LoggerTargets {
    directives: Vec<Directive>,
}

impl LoggerTargets {
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        utils::serde::load_json_from_file(path)
    }

    pub fn build_filter(&self) -> EnvFilter {
        self.directives
            .iter()
            .cloned()
            .fold(EnvFilter::default(), EnvFilter::add_directive)
    }
}

impl TryFrom<BTreeMap<String, String>> for LoggerTargets {
    type Error = tracing_subscriber::filter::ParseError;

    fn try_from(targets: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let directives = targets
            .into_iter()
            .map(|(target, level)| format!("{target}={level}").parse())
            .collect::<Result<Vec<Directive>, _>>()?;
        Ok(Self { directives })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub outputs: Vec<LoggerOutput>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            outputs: vec![LoggerOutput::Stderr(LoggerStderrOutput::default())],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Auto,
    Human,
    Json,
}

impl LogFormat {
    /// `Auto` picks JSON for production processes whose stderr is not a
    /// terminal, i.e. whose output goes to a log collector.
    fn is_json(self, is_terminal: bool, environment: Environment) -> bool {
        match self {
            Self::Json => true,
            Self::Human => false,
            Self::Auto => !is_terminal && environment == Environment::Production,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LoggerOutput {
    Stderr(LoggerStderrOutput),
    File(LoggerFileOutput),
}

impl LoggerOutput {
    fn as_layer<S>(&self, environment: Environment) -> Result<BoxedLayer<S>>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        match self {
            Self::Stderr(stderr) => Ok(stderr.as_layer(environment)),
            Self::File(file) => file.as_layer(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct LoggerStderrOutput {
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggerStderrOutput {
    fn as_layer<S>(&self, environment: Environment) -> BoxedLayer<S>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let json = self.format.is_json(std::io::stderr().is_terminal(), environment);

        if json {
            tracing_stackdriver::layer()
                .with_writer(std::io::stderr)
                .boxed()
        } else if std::io::stderr().is_terminal() {
            fmt::layer().with_writer(std::io::stderr).boxed()
        } else {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .boxed()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerFileOutput {
    pub dir: PathBuf,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "log_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "max_log_files")]
    pub max_files: NonZeroUsize,
}

impl LoggerFileOutput {
    fn as_layer<S>(&self) -> Result<BoxedLayer<S>>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let writer = tracing_appender::rolling::Builder::new()
            .rotation(Rotation::DAILY)
            .filename_prefix(&self.file_prefix)
            .max_log_files(self.max_files.get())
            .build(&self.dir)
            .with_context(|| format!("failed to open log dir {}", self.dir.display()))?;

        Ok(match self.format {
            LogFormat::Human => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
            LogFormat::Json | LogFormat::Auto => {
                tracing_stackdriver::layer().with_writer(writer).boxed()
            }
        })
    }
}

fn log_file_prefix() -> String {
    "project-manager.log".to_owned()
}

fn max_log_files() -> NonZeroUsize {
    NonZeroUsize::new(14).expect("shouldn't happen")
}

/// Installs the global subscriber.
///
/// Targets come from `logger_targets` when given, otherwise from `RUST_LOG`
/// with an `info` fallback. Fails if a subscriber is already installed.
pub fn init_logger(
    config: &LoggerConfig,
    logger_targets: Option<PathBuf>,
    environment: Environment,
) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;

    let filter = match logger_targets {
        Some(path) => LoggerTargets::load_from(&path)
            .with_context(|| format!("failed to load logger targets {}", path.display()))?
            .build_filter(),
        None => EnvFilter::builder()
            .with_default_directive(tracing::Level::INFO.into())
            .from_env_lossy(),
    };

    let outputs = config
        .outputs
        .iter()
        .map(|o| o.as_layer(environment))
        .collect::<Result<Vec<_>>>()?;

    let subscriber = tracing_subscriber::registry().with(filter).with(outputs);
    tracing::subscriber::set_global_default(subscriber).context("logger was already initialized")
}

/// Reports panics through tracing, then runs the previously installed hook.
///
/// The process keeps running: a panicking request handler unwinds into the
/// router's panic layer and is answered with a 500.
pub fn log_panics_with_tracing() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!("panic: {info}\n{backtrace}");
        previous(info);
    }));
}
