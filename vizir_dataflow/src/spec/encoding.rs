// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Channel encodings and field definitions.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::var_name;

/// A visual channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    /// Horizontal position.
    X,
    /// Vertical position.
    Y,
    /// Secondary horizontal position.
    X2,
    /// Secondary vertical position.
    Y2,
    /// Angular position.
    Theta,
    /// Radial position.
    Radius,
    /// Longitude.
    Longitude,
    /// Latitude.
    Latitude,
    /// Secondary longitude.
    Longitude2,
    /// Secondary latitude.
    Latitude2,
    /// Fill/stroke color.
    Color,
    /// Opacity.
    Opacity,
    /// Mark size.
    Size,
    /// Point shape or geoshape geometry.
    Shape,
    /// Text content.
    Text,
    /// Tooltip.
    Tooltip,
    /// Grouping without a visual effect.
    Detail,
    /// Drawing order.
    Order,
    /// Facet rows.
    Row,
    /// Facet columns.
    Column,
    /// Wrapped facet.
    Facet,
    /// Any channel with no data flow significance (`href`, `strokeWidth`, ...).
    #[serde(other)]
    Other,
}

impl Channel {
    /// True for channels that are mapped through a scale.
    pub fn has_scale(self) -> bool {
        !matches!(
            self,
            Self::Text
                | Self::Tooltip
                | Self::Detail
                | Self::Order
                | Self::Row
                | Self::Column
                | Self::Facet
                | Self::Longitude
                | Self::Latitude
                | Self::Longitude2
                | Self::Latitude2
                | Self::Other
        )
    }

    /// Default `maxbins` when `bin: true`.
    pub fn auto_max_bins(self) -> u32 {
        match self {
            Self::Row | Self::Column | Self::Facet | Self::Shape | Self::Size => 6,
            _ => 10,
        }
    }

    /// The name used in field and signal names.
    pub fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::X2 => "x2",
            Self::Y2 => "y2",
            Self::Theta => "theta",
            Self::Radius => "radius",
            Self::Longitude => "longitude",
            Self::Latitude => "latitude",
            Self::Longitude2 => "longitude2",
            Self::Latitude2 => "latitude2",
            Self::Color => "color",
            Self::Opacity => "opacity",
            Self::Size => "size",
            Self::Shape => "shape",
            Self::Text => "text",
            Self::Tooltip => "tooltip",
            Self::Detail => "detail",
            Self::Order => "order",
            Self::Row => "row",
            Self::Column => "column",
            Self::Facet => "facet",
            Self::Other => "other",
        }
    }
}

/// Measurement type of an encoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Continuous numbers.
    Quantitative,
    /// Dates and times.
    Temporal,
    /// Ordered categories.
    Ordinal,
    /// Unordered categories.
    Nominal,
    /// Geographic shapes.
    GeoJson,
}

impl FieldType {
    /// Parses a type name as written in specs.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "quantitative" | "q" => Some(Self::Quantitative),
            "temporal" | "t" => Some(Self::Temporal),
            "ordinal" | "o" => Some(Self::Ordinal),
            "nominal" | "n" => Some(Self::Nominal),
            "geojson" => Some(Self::GeoJson),
            _ => None,
        }
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Quantitative => "quantitative",
            Self::Temporal => "temporal",
            Self::Ordinal => "ordinal",
            Self::Nominal => "nominal",
            Self::GeoJson => "geojson",
        }
    }

    /// True for types whose scales have continuous domains.
    pub fn is_continuous(self) -> bool {
        matches!(self, Self::Quantitative | Self::Temporal)
    }
}

/// Bin parameters. `bin: true` normalizes to `maxbins` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinParams {
    /// Fixed extent `[min, max]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<[f64; 2]>,
    /// Maximum number of bins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxbins: Option<u32>,
    /// Exact step size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Allowed step sizes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<f64>>,
    /// Minimum step size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minstep: Option<f64>,
    /// Number base for automatic steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<f64>,
    /// Whether to extend the extent to nice values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nice: Option<bool>,
    /// Value that a bin boundary must align to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<f64>,
}

impl BinParams {
    /// Canonical string used in field and signal names, e.g. `bin_maxbins_10`.
    pub fn key_string(&self) -> String {
        let mut out = String::from("bin");
        if let Some([lo, hi]) = self.extent {
            out.push_str(&var_name(&format!("_extent_{lo}_{hi}")));
        }
        if let Some(v) = self.maxbins {
            out.push_str(&format!("_maxbins_{v}"));
        }
        if let Some(v) = self.step {
            out.push_str(&var_name(&format!("_step_{v}")));
        }
        if let Some(v) = &self.steps {
            let joined: Vec<String> = v.iter().map(|s| format!("{s}")).collect();
            out.push_str(&var_name(&format!("_steps_{}", joined.join("_"))));
        }
        if let Some(v) = self.minstep {
            out.push_str(&var_name(&format!("_minstep_{v}")));
        }
        if let Some(v) = self.base {
            out.push_str(&var_name(&format!("_base_{v}")));
        }
        if let Some(v) = self.nice {
            out.push_str(&format!("_nice_{v}"));
        }
        if let Some(v) = self.anchor {
            out.push_str(&var_name(&format!("_anchor_{v}")));
        }
        out
    }
}

/// The `bin` property of a field definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BinSpec {
    /// `true` for default binning, `false` for none.
    Flag(bool),
    /// Explicit parameters.
    Params(BinParams),
}

impl BinSpec {
    /// Normalized parameters for a channel, or `None` when binning is off.
    pub fn params(&self, channel: Channel) -> Option<BinParams> {
        match self {
            Self::Flag(false) => None,
            Self::Flag(true) => Some(BinParams {
                maxbins: Some(channel.auto_max_bins()),
                ..BinParams::default()
            }),
            Self::Params(params) => Some(params.clone()),
        }
    }
}

/// Sort by an aggregate of another field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortField {
    /// Field to aggregate.
    pub field: Option<String>,
    /// Aggregate op, `sum` by default for facets.
    pub op: Option<String>,
    /// `ascending` or `descending`.
    pub order: Option<String>,
}

/// The `sort` property of a field definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    /// Explicit value order.
    Values(Vec<Value>),
    /// `ascending`, `descending` or an encoding name.
    Order(String),
    /// Sort by another field.
    Field(SortField),
}

/// Per-field impute parameters in an encoding.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImputeParams {
    /// Window-based method (`value`, `mean`, `median`, `max`, `min`).
    pub method: Option<String>,
    /// Replacement when `method` is `value`.
    pub value: Option<Value>,
    /// Window frame for non-value methods.
    pub frame: Option<[Option<i64>; 2]>,
    /// Key values to impute over.
    pub keyvals: Option<Value>,
}

/// A channel definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Data field.
    pub field: Option<String>,
    /// Measurement type name.
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    /// Aggregate op.
    pub aggregate: Option<String>,
    /// Binning.
    pub bin: Option<BinSpec>,
    /// Time unit, e.g. `yearmonth`.
    pub time_unit: Option<String>,
    /// Sort order of a discrete field.
    pub sort: Option<SortSpec>,
    /// Stack offset, `null`/`false` to disable.
    #[serde(default, deserialize_with = "deserialize_stack")]
    pub stack: Option<StackSetting>,
    /// Imputation of missing values.
    pub impute: Option<ImputeParams>,
    /// Constant value.
    pub value: Option<Value>,
}

/// A field definition's `stack` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackSetting {
    /// Stacking disabled (`null` or `false`).
    Disabled,
    /// Stack with this offset.
    Offset(String),
}

fn deserialize_stack<'de, D>(deserializer: D) -> Result<Option<StackSetting>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => StackSetting::Disabled,
        Value::Bool(true) => StackSetting::Offset("zero".into()),
        Value::String(s) => StackSetting::Offset(s),
        _ => return Err(serde::de::Error::custom("invalid stack")),
    }))
}

/// Operations that count rows rather than read a field's values.
pub fn is_counting_op(op: &str) -> bool {
    matches!(op, "count" | "valid" | "missing" | "distinct")
}

impl FieldDef {
    /// Normalized bin parameters for this channel.
    pub fn bin_params(&self, channel: Channel) -> Option<BinParams> {
        self.bin.as_ref().and_then(|b| b.params(channel))
    }

    /// The type inferred when none (or an unknown one) is given.
    pub fn default_type(&self, channel: Channel) -> FieldType {
        if self.aggregate.is_some() || self.bin_params(channel).is_some() {
            FieldType::Quantitative
        } else if self.time_unit.is_some() {
            FieldType::Temporal
        } else {
            FieldType::Nominal
        }
    }

    /// Output field name of this definition after binning, time units or aggregation.
    ///
    /// `suffix` is appended to the name (used for the `_end` of bins and time units).
    pub fn output_field(&self, channel: Channel, suffix: &str) -> Option<String> {
        if let Some(op) = &self.aggregate {
            if op == "count" {
                return Some(String::from("__count"));
            }
            let field = self.field.as_deref()?;
            return Some(format!("{op}_{field}{suffix}"));
        }
        let field = self.field.as_deref()?;
        if let Some(bin) = self.bin_params(channel) {
            return Some(format!("{}_{field}{suffix}", bin.key_string()));
        }
        if let Some(unit) = &self.time_unit {
            return Some(format!("{unit}_{field}{suffix}"));
        }
        Some(format!("{field}{suffix}"))
    }
}

/// Channel to definition map of a view.
pub type Encoding = BTreeMap<Channel, FieldDef>;

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn output_names_follow_derivation() {
        let binned: FieldDef = serde_json::from_str(r#"{"field": "age", "bin": true}"#).unwrap();
        assert_eq!(
            binned.output_field(Channel::X, "").as_deref(),
            Some("bin_maxbins_10_age")
        );
        assert_eq!(
            binned.output_field(Channel::Row, "_end").as_deref(),
            Some("bin_maxbins_6_age_end")
        );

        let summed: FieldDef =
            serde_json::from_str(r#"{"field": "y", "aggregate": "sum"}"#).unwrap();
        assert_eq!(summed.output_field(Channel::Y, "").as_deref(), Some("sum_y"));

        let counted: FieldDef = serde_json::from_str(r#"{"aggregate": "count"}"#).unwrap();
        assert_eq!(counted.output_field(Channel::Y, "").as_deref(), Some("__count"));
    }

    #[test]
    fn stack_accepts_null_and_names() {
        let def: FieldDef = serde_json::from_str(r#"{"field": "y", "stack": null}"#).unwrap();
        assert_eq!(def.stack, Some(StackSetting::Disabled));
        let def: FieldDef =
            serde_json::from_str(r#"{"field": "y", "stack": "normalize"}"#).unwrap();
        assert_eq!(def.stack, Some(StackSetting::Offset("normalize".into())));
        let def: FieldDef = serde_json::from_str(r#"{"field": "y"}"#).unwrap();
        assert_eq!(def.stack, None);
    }
}
