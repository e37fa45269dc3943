// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
};

#[derive(Debug, Deserialize, Clone)]
struct LoggerConfig {
    logger: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
enum Output {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
enum RotationFreq {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl RotationFreq {
    fn rotation(&self) -> Rotation {
        match self {
            Self::Minutely => Rotation::MINUTELY,
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
            Self::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
struct LogFileConfig {
    path: String,
    #[serde(default)]
    rotation_frequency: Option<RotationFreq>,
}

#[derive(Debug, Deserialize, Clone)]
struct LogConfig {
    level: String,
    output: Output,
    #[serde(default)]
    format: Option<Format>,
    file: Option<LogFileConfig>,
}

/// Initializes the global subscriber from a YAML logger description.
/// The returned guard must be held for as long as logging should flush.
pub fn init_logger(config_path: &str) -> Result<WorkerGuard> {
    let config_content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {config_path}"))?;
    let config: LoggerConfig = serde_yaml::from_str(&config_content)
        .with_context(|| format!("Failed to parse config file: {config_path}"))?;

    let (writer, guard) = make_writer(&config.logger)?;

    let env_filter = EnvFilter::try_new(&config.logger.level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("Failed to parse log level from config or env")?;

    match config.logger.format.unwrap_or(Format::Text) {
        Format::Json => {
            let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
            let subscriber = Registry::default().with(env_filter).with(layer);
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set global default subscriber")?;
        },
        Format::Text => {
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            let subscriber = Registry::default().with(env_filter).with(layer);
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set global default subscriber")?;
        },
    }

    Ok(guard)
}

/// Fallback used when no logger config file is present: `RUST_LOG`
/// filtered plain text on stderr.
pub fn init_default_logger() -> Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer().with_writer(writer).with_ansi(false);
    let subscriber = Registry::default().with(filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;
    Ok(guard)
}

fn make_writer(cfg: &LogConfig) -> Result<(BoxMakeWriter, WorkerGuard)> {
    let (writer, guard) = match cfg.output {
        Output::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        Output::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        Output::File => {
            let file = cfg
                .file
                .as_ref()
                .context("logger.file is required for output=file")?;
            tracing_appender::non_blocking(rolling_appender(file)?)
        },
    };
    Ok((BoxMakeWriter::new(writer), guard))
}

/// A misconfigured log path is a startup error; unlike the stream
/// outputs there is no sane fallback to substitute.
fn rolling_appender(file: &LogFileConfig) -> Result<RollingFileAppender> {
    let target = Path::new(&file.path);
    let name = target
        .file_name()
        .with_context(|| format!("logger.file.path {:?} has no file name", file.path))?;
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let freq = file.rotation_frequency.as_ref().unwrap_or(&RotationFreq::Never);
    Ok(RollingFileAppender::new(freq.rotation(), dir, name))
}
