// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data source descriptions.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A view's `data` property.
///
/// Exactly one of `values`, `url`, `name`, `sequence`, `graticule` or `sphere` is expected; see
/// [`DataSpec::kind`] for the precedence used when several are present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSpec {
    /// Inline rows.
    pub values: Option<Value>,
    /// Remote location.
    pub url: Option<String>,
    /// Logical name, bound at runtime or through top-level `datasets`.
    pub name: Option<String>,
    /// Parsing options.
    pub format: Option<DataFormat>,
    /// Number sequence generator.
    pub sequence: Option<SequenceParams>,
    /// Graticule generator (`true` or parameters).
    pub graticule: Option<Value>,
    /// Sphere generator.
    pub sphere: Option<Value>,
}

/// Which kind of data a [`DataSpec`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Inline `values`.
    Inline,
    /// `url` data.
    Url,
    /// `name` only.
    Named,
    /// `sequence` generator.
    Sequence,
    /// `graticule` generator.
    Graticule,
    /// `sphere` generator, lowered to inline values.
    Sphere,
}

impl DataSpec {
    /// Classifies this data source.
    pub fn kind(&self) -> DataKind {
        if self.sequence.is_some() {
            DataKind::Sequence
        } else if self.graticule.is_some() {
            DataKind::Graticule
        } else if self.sphere.is_some() {
            DataKind::Sphere
        } else if self.values.is_some() {
            DataKind::Inline
        } else if self.url.is_some() {
            DataKind::Url
        } else {
            DataKind::Named
        }
    }

    /// True for generated data, which is never parsed.
    pub fn is_generator(&self) -> bool {
        matches!(
            self.kind(),
            DataKind::Sequence | DataKind::Graticule | DataKind::Sphere
        )
    }

    /// The `format.parse` setting of this source.
    pub fn parse(&self) -> &ParseSetting {
        static ABSENT: ParseSetting = ParseSetting::Absent;
        self.format.as_ref().map_or(&ABSENT, |f| &f.parse)
    }
}

/// The `format` property of a data source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFormat {
    /// `json`, `csv`, `tsv`, `dsv` or `topojson`.
    #[serde(rename = "type")]
    pub format_type: Option<String>,
    /// Explicit field parsing, or `null` to disable parsing.
    #[serde(default)]
    pub parse: ParseSetting,
    /// JSON property holding the rows.
    pub property: Option<String>,
    /// Topojson feature to extract.
    pub feature: Option<String>,
    /// Topojson mesh to extract.
    pub mesh: Option<String>,
    /// Delimiter for `dsv`.
    pub delimiter: Option<String>,
}

/// Explicit parse instructions of a data source.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ParseSetting {
    /// No `parse` key: infer parsing from encodings.
    #[default]
    Absent,
    /// `parse: null`: parse nothing, not even implicitly.
    Disabled,
    /// Field to parse-type map.
    Fields(BTreeMap<String, String>),
}

impl<'de> Deserialize<'de> for ParseSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<BTreeMap<String, String>>::deserialize(deserializer)? {
            None => Ok(Self::Disabled),
            Some(fields) => Ok(Self::Fields(fields)),
        }
    }
}

/// Parameters of a `sequence` generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceParams {
    /// First value.
    pub start: f64,
    /// Exclusive end.
    pub stop: f64,
    /// Increment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Output field name, `data` by default.
    #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
    pub as_: Option<String>,
}

/// Infers a format type from a URL's extension, defaulting to `json`.
pub fn infer_format_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext {
        "csv" => "csv",
        "tsv" => "tsv",
        "topojson" => "topojson",
        _ => "json",
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn parse_null_disables_parsing() {
        let data: DataSpec =
            serde_json::from_str(r#"{"url": "a.csv", "format": {"parse": null}}"#).unwrap();
        assert_eq!(data.kind(), DataKind::Url);
        assert_eq!(data.parse(), &ParseSetting::Disabled);

        let data: DataSpec = serde_json::from_str(r#"{"url": "a.csv"}"#).unwrap();
        assert_eq!(data.parse(), &ParseSetting::Absent);
    }

    #[test]
    fn format_type_comes_from_extension() {
        assert_eq!(infer_format_type("data/cars.csv"), "csv");
        assert_eq!(infer_format_type("us-10m.topojson?v=2"), "topojson");
        assert_eq!(infer_format_type("https://example.com/api"), "json");
    }
}
