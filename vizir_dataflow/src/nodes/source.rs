// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data sources: the roots of the flow.

extern crate alloc;

use alloc::string::String;
use alloc::vec;

use serde_json::{Value, json};

use super::FlowNode;
use crate::spec::{DataFormat, DataKind, DataSpec, ParseSetting, infer_format_type};
use crate::vega::{Dataset, Format};

/// A logical input dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    /// How the rows are provided.
    pub kind: DataKind,
    /// Dataset name, if the input has one.
    pub name: Option<String>,
    /// Remote location.
    pub url: Option<String>,
    /// Inline rows.
    pub values: Option<Value>,
    /// Load format, without `parse` (which becomes a parse node).
    pub format: Option<DataFormat>,
}

impl SourceNode {
    /// A source for a view's `data`. Generators get an empty source their generator node hangs
    /// under; a sphere becomes inline values.
    pub fn from_data(data: &DataSpec) -> Self {
        let kind = data.kind();
        let values = match kind {
            DataKind::Sphere => Some(json!([{"type": "Sphere"}])),
            DataKind::Inline => data.values.clone(),
            _ => None,
        };
        Self {
            kind: if kind == DataKind::Sphere {
                DataKind::Inline
            } else {
                kind
            },
            name: data.name.clone(),
            url: data.url.clone(),
            values,
            format: data.format.clone().map(|mut f| {
                f.parse = ParseSetting::Absent;
                f
            }),
        }
    }

    /// A source bound to a named dataset.
    pub fn named(name: String) -> Self {
        Self {
            kind: DataKind::Named,
            name: Some(name),
            url: None,
            values: None,
            format: None,
        }
    }

    /// True for sources whose rows come from a generator node.
    pub fn is_generator(&self) -> bool {
        matches!(self.kind, DataKind::Sequence | DataKind::Graticule)
    }

    /// Whether `data` can be served by this source.
    ///
    /// Inline values match by deep equality, URLs by string and named data by name. Topojson
    /// sources must extract the same feature or mesh.
    pub fn matches(&self, data: &DataSpec) -> bool {
        if let (Some(a), Some(b)) = (&data.name, &self.name)
            && a != b
        {
            return false;
        }
        let (feature, mesh) = feature_mesh(data.format.as_ref());
        let (other_feature, other_mesh) = feature_mesh(self.format.as_ref());
        if mesh.is_some() && other_feature.is_some() {
            return false;
        }
        if (feature.is_some() || other_feature.is_some()) && feature != other_feature {
            return false;
        }
        if (mesh.is_some() || other_mesh.is_some()) && mesh != other_mesh {
            return false;
        }
        match (data.kind(), self.kind) {
            (DataKind::Inline, DataKind::Inline) => data.values == self.values,
            (DataKind::Url, DataKind::Url) => data.url == self.url,
            (DataKind::Named, DataKind::Named) => data.name.is_some() && data.name == self.name,
            _ => false,
        }
    }

    /// The root dataset of this source, before any transform.
    pub fn root_dataset(&self, name: String) -> Dataset {
        let mut format = self.format.as_ref().map(|f| Format {
            format_type: f.format_type.clone(),
            parse: None,
            property: f.property.clone(),
            feature: f.feature.clone(),
            mesh: f.mesh.clone(),
            delimiter: f.delimiter.clone(),
        });
        if let Some(url) = &self.url {
            let format = format.get_or_insert_with(Format::default);
            if format.format_type.is_none() {
                format.format_type = Some(infer_format_type(url).into());
            }
        }
        Dataset {
            name,
            source: None,
            url: self.url.clone(),
            values: self.values.clone(),
            format,
            transform: vec![],
        }
    }
}

fn feature_mesh(format: Option<&DataFormat>) -> (Option<&str>, Option<&str>) {
    match format {
        Some(f) => (f.feature.as_deref(), f.mesh.as_deref()),
        None => (None, None),
    }
}

impl FlowNode for SourceNode {}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    fn data(v: Value) -> DataSpec {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn matching_by_identity_kind() {
        let src = SourceNode::from_data(&data(json!({"url": "cars.json"})));
        assert!(src.matches(&data(json!({"url": "cars.json", "format": {"parse": {"a": "number"}}}))));
        assert!(!src.matches(&data(json!({"url": "other.json"}))));

        let inline = SourceNode::from_data(&data(json!({"values": [{"a": 1}]})));
        assert!(inline.matches(&data(json!({"values": [{"a": 1}]}))));
        assert!(!inline.matches(&data(json!({"values": [{"a": 2}]}))));
    }

    #[test]
    fn topojson_features_must_agree() {
        let src = SourceNode::from_data(&data(
            json!({"url": "us.topojson", "format": {"feature": "counties"}}),
        ));
        assert!(!src.matches(&data(
            json!({"url": "us.topojson", "format": {"feature": "states"}})
        )));
        assert!(!src.matches(&data(
            json!({"url": "us.topojson", "format": {"mesh": "states"}})
        )));
    }

    #[test]
    fn url_format_type_is_inferred() {
        let src = SourceNode::from_data(&data(json!({"url": "data/seattle.csv"})));
        let ds = src.root_dataset("source_0".into());
        assert_eq!(ds.format.unwrap().format_type.as_deref(), Some("csv"));
    }

    #[test]
    fn sphere_is_inline() {
        let src = SourceNode::from_data(&data(json!({"sphere": true})));
        assert_eq!(src.kind, DataKind::Inline);
        assert_eq!(src.values, Some(json!([{"type": "Sphere"}])));
    }
}
