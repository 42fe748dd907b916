// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Logging setup for the command-line tool.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initialize global tracing output: always to stderr, and additionally to
/// `log_file` if one is given.
///
/// `level` sets the default verbosity for the stderr layer; it is
/// overridden by `RUST_LOG` if that variable is set. The file layer always
/// logs at `trace`, on the theory that a user who asked for a log file
/// wants everything in it regardless of how noisy the terminal should be.
pub fn init(level: tracing::Level, log_file: Option<&Path>) -> LogGuard {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let (file_layer, worker_guard) = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .unwrap_or_else(|err| panic!("failed to create log file {path:?}: {err}"));
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(LevelFilter::TRACE);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to install global tracing subscriber");

    LogGuard {
        _worker_guard: worker_guard,
    }
}

/// Keeps the non-blocking file writer's background thread alive for the
/// life of the program; dropping it flushes any buffered log lines.
pub struct LogGuard {
    _worker_guard: Option<WorkerGuard>,
}
