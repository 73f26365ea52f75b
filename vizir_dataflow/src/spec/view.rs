// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Views and their composition.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::data::DataSpec;
use super::encoding::{Channel, Encoding, FieldDef, FieldType};

/// A (possibly composed) view.
///
/// A unit view has a `mark`; composite views have `layer`, one of the concat arrays, or
/// `facet` with an inner `spec`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSpec {
    /// View name, prefixed to every dataset and signal name it creates.
    pub name: Option<String>,
    /// Data of this view; children without data inherit their parent's.
    pub data: Option<DataSpec>,
    /// Explicit transforms, decoded one at a time.
    #[serde(default)]
    pub transform: Vec<Value>,
    /// Parameters (variables and selections).
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Mark of a unit view.
    pub mark: Option<MarkSpec>,
    /// Channel encodings of a unit view.
    #[serde(default)]
    pub encoding: Encoding,
    /// Layered children.
    #[serde(default)]
    pub layer: Vec<ViewSpec>,
    /// Wrapped concatenation.
    #[serde(default)]
    pub concat: Vec<ViewSpec>,
    /// Horizontal concatenation.
    #[serde(default)]
    pub hconcat: Vec<ViewSpec>,
    /// Vertical concatenation.
    #[serde(default)]
    pub vconcat: Vec<ViewSpec>,
    /// Facet fields.
    pub facet: Option<FacetSpec>,
    /// Faceted inner view.
    pub spec: Option<Box<ViewSpec>>,
    /// Scale resolution for composed views.
    pub resolve: Option<ResolveSpec>,
    /// Named inline datasets (top level only).
    #[serde(default)]
    pub datasets: BTreeMap<String, Value>,
}

/// How a view composes its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// A single mark.
    Unit,
    /// Children drawn on top of each other.
    Layer,
    /// Children placed side by side.
    Concat,
    /// One child repeated per partition.
    Facet,
}

impl ViewSpec {
    /// Classifies the view.
    pub fn kind(&self) -> ViewKind {
        if self.facet.is_some() && self.spec.is_some() {
            ViewKind::Facet
        } else if !self.layer.is_empty() {
            ViewKind::Layer
        } else if !self.concat.is_empty() || !self.hconcat.is_empty() || !self.vconcat.is_empty() {
            ViewKind::Concat
        } else {
            ViewKind::Unit
        }
    }

    /// Child views, in declaration order.
    pub fn children(&self) -> Vec<&Self> {
        match self.kind() {
            ViewKind::Unit => Vec::new(),
            ViewKind::Layer => self.layer.iter().collect(),
            ViewKind::Concat => self
                .concat
                .iter()
                .chain(&self.hconcat)
                .chain(&self.vconcat)
                .collect(),
            ViewKind::Facet => self.spec.as_deref().into_iter().collect(),
        }
    }

    /// Mark type name of a unit view.
    pub fn mark_type(&self) -> Option<&str> {
        self.mark.as_ref().map(MarkSpec::mark_type)
    }

    /// Measurement type of an encoded channel, if the channel has a field.
    pub fn field_type(&self, channel: Channel) -> Option<FieldType> {
        let def = self.encoding.get(&channel)?;
        def.field.as_ref()?;
        Some(
            def.field_type
                .as_deref()
                .and_then(FieldType::parse)
                .unwrap_or_else(|| def.default_type(channel)),
        )
    }

    /// True when this view or a descendant declares a point selection that needs row identity.
    pub fn requires_selection_id(&self) -> bool {
        self.params.iter().any(ParamSpec::requires_identity)
            || self.children().iter().any(|c| c.requires_selection_id())
    }

    /// Calls `f` for every parameter declared in this view tree.
    pub fn for_each_param(&self, f: &mut impl FnMut(&ParamSpec)) {
        for p in &self.params {
            f(p);
        }
        for child in self.children() {
            child.for_each_param(f);
        }
    }

    /// True when the scale of `channel` is resolved independently for children.
    pub fn is_independent(&self, channel: Channel) -> bool {
        self.resolve
            .as_ref()
            .and_then(|r| r.scale.get(&channel))
            .is_some_and(|mode| mode == "independent")
    }
}

/// The `mark` property.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MarkSpec {
    /// `"bar"`.
    Name(String),
    /// `{"type": "bar", ...}`.
    Def {
        /// Mark type.
        #[serde(rename = "type")]
        mark_type: String,
    },
}

impl MarkSpec {
    /// The mark type name.
    pub fn mark_type(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Def { mark_type } => mark_type,
        }
    }

    /// Marks drawn as one connected path, which handle invalid values themselves.
    pub fn is_path(&self) -> bool {
        matches!(self.mark_type(), "line" | "area" | "trail")
    }
}

/// A parameter declaration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Selection definition; absent for plain variables.
    pub select: Option<SelectSpec>,
    /// Initial value of a variable.
    pub value: Option<Value>,
}

impl ParamSpec {
    /// True for selections (as opposed to plain variables).
    pub fn is_selection(&self) -> bool {
        self.select.is_some()
    }

    /// Point selections that project over no fields identify rows by a generated id.
    pub fn requires_identity(&self) -> bool {
        match &self.select {
            Some(SelectSpec::Type(t)) => t == "point",
            Some(SelectSpec::Def(def)) => {
                def.select_type == "point" && def.fields.is_empty() && def.encodings.is_empty()
            }
            None => false,
        }
    }
}

/// The `select` property of a parameter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SelectSpec {
    /// `"point"` or `"interval"`.
    Type(String),
    /// Full definition.
    Def(SelectDef),
}

/// A full selection definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectDef {
    /// `point` or `interval`.
    #[serde(rename = "type")]
    pub select_type: String,
    /// Projected fields.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Projected channels.
    #[serde(default)]
    pub encodings: Vec<String>,
}

/// Scale resolution.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResolveSpec {
    /// Channel to `shared`/`independent`.
    #[serde(default)]
    pub scale: BTreeMap<Channel, String>,
}

/// The `facet` property.
#[derive(Debug, Clone, PartialEq)]
pub enum FacetSpec {
    /// Row and/or column partitioning.
    Grid {
        /// Row field.
        row: Option<FieldDef>,
        /// Column field.
        column: Option<FieldDef>,
    },
    /// A single wrapped facet field.
    Wrap(FieldDef),
}

impl<'de> Deserialize<'de> for FacetSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let is_grid = value
            .as_object()
            .is_some_and(|o| o.contains_key("row") || o.contains_key("column"));
        if is_grid {
            #[derive(Deserialize)]
            struct Grid {
                row: Option<FieldDef>,
                column: Option<FieldDef>,
            }
            let grid: Grid = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
            Ok(Self::Grid {
                row: grid.row,
                column: grid.column,
            })
        } else {
            serde_json::from_value(value)
                .map(Self::Wrap)
                .map_err(serde::de::Error::custom)
        }
    }
}

impl FacetSpec {
    /// The partitioning channels with their definitions, row before column.
    pub fn channels(&self) -> Vec<(Channel, &FieldDef)> {
        match self {
            Self::Grid { row, column } => row
                .iter()
                .map(|d| (Channel::Row, d))
                .chain(column.iter().map(|d| (Channel::Column, d)))
                .collect(),
            Self::Wrap(def) => alloc::vec![(Channel::Facet, def)],
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use serde_json::json;

    use super::*;

    #[test]
    fn classifies_composition() {
        let unit: ViewSpec = serde_json::from_value(json!({"mark": "bar"})).unwrap();
        assert_eq!(unit.kind(), ViewKind::Unit);

        let layer: ViewSpec =
            serde_json::from_value(json!({"layer": [{"mark": "bar"}, {"mark": "rule"}]})).unwrap();
        assert_eq!(layer.kind(), ViewKind::Layer);
        assert_eq!(layer.children().len(), 2);

        let facet: ViewSpec = serde_json::from_value(json!({
            "facet": {"row": {"field": "r", "type": "nominal"}},
            "spec": {"mark": {"type": "point"}}
        }))
        .unwrap();
        assert_eq!(facet.kind(), ViewKind::Facet);
        assert_eq!(facet.children()[0].mark_type(), Some("point"));
    }

    #[test]
    fn wrapped_facet_is_a_field_def() {
        let facet: FacetSpec = serde_json::from_value(json!({"field": "f"})).unwrap();
        let channels = facet.channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].0, Channel::Facet);
    }

    #[test]
    fn point_selection_without_projection_needs_identity() {
        let view: ViewSpec = serde_json::from_value(json!({
            "layer": [{"mark": "point", "params": [{"name": "p", "select": "point"}]}]
        }))
        .unwrap();
        assert!(view.requires_selection_id());

        let projected: ParamSpec = serde_json::from_value(json!({
            "name": "p", "select": {"type": "point", "fields": ["a"]}
        }))
        .unwrap();
        assert!(!projected.requires_identity());
    }
}
