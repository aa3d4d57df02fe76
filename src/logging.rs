// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Structured logging setup.
//!
//! Configuration *loading* (files, CLI, env layering) is left to the
//! embedder; this module only wires `tracing` to a sane default sink so the
//! rest of the crate can log unconditionally with `tracing::{debug, info,
//! warn, error}`.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global `tracing` subscriber, writing to stderr and
/// honoring `RUST_LOG` (defaulting to `info` when unset).
///
/// Returns a `WorkerGuard` that must be kept alive for the lifetime of the
/// process; dropping it flushes and stops the background writer thread.
pub fn init_tracing() -> Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to build default tracing env filter")?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(writer).with_target(true))
        .try_init()
        .context("failed to install global tracing subscriber")?;

    Ok(guard)
}
