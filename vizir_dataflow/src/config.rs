// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compile configuration.

extern crate alloc;

use alloc::string::String;

use serde::Deserialize;

use crate::CompileError;

/// How marks treat null and `NaN` values on continuous channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidValues {
    /// Drop rows whose continuous encoded fields are invalid, right before the "main" output.
    #[default]
    Filter,
    /// Keep invalid values and let the runtime decide.
    Include,
}

/// Options shared by every view in one compile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileConfig {
    /// Policy for invalid values on continuous channels.
    pub invalid_values: InvalidValues,
    /// Disables every implicit and explicit parse, as `format.parse: null` does for one source.
    pub parse_disabled: bool,
    /// Upper bound on optimizer fixpoint iterations, per phase.
    pub max_optimizer_runs: usize,
    /// Prefix given to output anchors cloned out of a facet.
    pub facet_scale_prefix: String,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            invalid_values: InvalidValues::Filter,
            parse_disabled: false,
            max_optimizer_runs: 5,
            facet_scale_prefix: String::from("scale_"),
        }
    }
}

impl CompileConfig {
    /// Reads a configuration from JSON. Missing keys take their default.
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = CompileConfig::from_json(r#"{"invalidValues": "include"}"#).unwrap();
        assert_eq!(config.invalid_values, InvalidValues::Include);
        assert_eq!(config.max_optimizer_runs, 5);
        assert_eq!(config.facet_scale_prefix, "scale_");
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(CompileConfig::from_json(r#"{"invalidValues": "drop"}"#).is_err());
    }
}
