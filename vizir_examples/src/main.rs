// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Example binary for `vizir_dataflow`.
//!
//! Usage: `vizir_examples [VIEW.json [CONFIG.json]]`. Without arguments a built-in faceted bar
//! chart is compiled. Set `RUST_LOG=vizir_dataflow=debug` to follow the optimizer.

use std::process::ExitCode;

use serde_json::json;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vizir_dataflow::{CompileConfig, Compiled, compile_json};

fn builtin_view() -> String {
    json!({
        "data": {"url": "data/barley.json"},
        "transform": [{"filter": "datum.year == 1931"}],
        "facet": {"row": {"field": "site", "type": "nominal"}},
        "spec": {
            "layer": [
                {
                    "mark": "bar",
                    "encoding": {
                        "x": {"field": "yield", "aggregate": "sum", "type": "quantitative"},
                        "y": {"field": "variety", "type": "nominal"}
                    }
                },
                {
                    "mark": "tick",
                    "encoding": {
                        "x": {"field": "yield", "aggregate": "max", "type": "quantitative"},
                        "y": {"field": "variety", "type": "nominal"}
                    }
                }
            ]
        }
    })
    .to_string()
}

fn read(path: &str) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|err| format!("cannot read {path}: {err}"))
}

fn run() -> Result<Compiled, String> {
    let mut args = std::env::args().skip(1);
    let view = match args.next() {
        Some(path) => read(&path)?,
        None => builtin_view(),
    };
    let config = match args.next() {
        Some(path) => CompileConfig::from_json(&read(&path)?).map_err(|err| err.to_string())?,
        None => CompileConfig::default(),
    };
    compile_json(&view, config).map_err(|err| err.to_string())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let compiled = match run() {
        Ok(compiled) => compiled,
        Err(err) => {
            tracing::error!(%err, "compile failed");
            return ExitCode::FAILURE;
        }
    };
    if !compiled.warnings.is_empty() {
        tracing::info!(count = compiled.warnings.len(), "compiled with warnings");
    }
    match serde_json::to_string_pretty(&compiled.data) {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "cannot serialize datasets");
            ExitCode::FAILURE
        }
    }
}
