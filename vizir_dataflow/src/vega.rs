// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Assembled output: Vega datasets and transforms.
//!
//! These types serialize to the JSON a Vega runtime expects in its `data` array.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::Value;

use crate::spec::BinParams;

/// One entry of the output `data` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    /// Dataset name.
    pub name: String,
    /// Upstream dataset this one derives from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Remote location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Inline rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
    /// Load format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    /// Transforms applied in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transform: Vec<VgTransform>,
}

/// Load format of a root dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Format {
    /// `json`, `csv`, `tsv`, `dsv` or `topojson`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub format_type: Option<String>,
    /// Field parse types applied while loading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse: Option<BTreeMap<String, String>>,
    /// JSON property holding the rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Topojson feature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    /// Topojson mesh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    /// Delimiter for `dsv`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

/// A reference to a signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRef {
    /// Signal name.
    pub signal: String,
}

/// Bin extent: fixed, or read from a signal computed by an `extent` transform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BinExtent {
    /// `[min, max]`.
    Fixed([f64; 2]),
    /// `{"signal": name}`.
    Signal(SignalRef),
}

/// Sort specification of window and stack transforms.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Compare {
    /// Sort fields.
    pub field: Vec<String>,
    /// `ascending` or `descending`, per field.
    pub order: Vec<String>,
}

/// A Vega transform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VgTransform {
    /// Row filter.
    Filter {
        /// Predicate expression.
        expr: String,
    },
    /// Derived field.
    Formula {
        /// Expression.
        expr: String,
        /// Output field.
        #[serde(rename = "as")]
        as_: String,
    },
    /// Binning.
    Bin {
        /// Input field.
        field: String,
        /// Start and end output fields.
        #[serde(rename = "as")]
        as_: [String; 2],
        /// Signal receiving the bin parameters.
        signal: String,
        /// Domain to bin over.
        extent: BinExtent,
        /// Remaining bin parameters (`maxbins`, `step`, ...).
        #[serde(flatten)]
        params: BinParams,
    },
    /// Field extent into a signal.
    Extent {
        /// Input field.
        field: String,
        /// Signal receiving `[min, max]`.
        signal: String,
    },
    /// Time unit truncation.
    TimeUnit {
        /// Input field.
        field: String,
        /// Start and end output fields.
        #[serde(rename = "as")]
        as_: [String; 2],
        /// Units kept, coarsest first.
        units: Vec<String>,
        /// `utc` for UTC units.
        #[serde(skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
    /// Grouped aggregation.
    Aggregate {
        /// Group-by fields.
        groupby: Vec<String>,
        /// Operations.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        ops: Vec<String>,
        /// Input fields, `null` for `count`.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<Option<String>>,
        /// Output fields.
        #[serde(rename = "as", skip_serializing_if = "Vec::is_empty")]
        as_: Vec<String>,
    },
    /// Window functions.
    Window {
        /// Op parameters.
        params: Vec<Value>,
        /// Output fields.
        #[serde(rename = "as")]
        as_: Vec<String>,
        /// Operations.
        ops: Vec<String>,
        /// Input fields.
        fields: Vec<Option<String>>,
        /// Order within partitions.
        sort: Compare,
        /// Whether peer rows are ignored when framing.
        #[serde(rename = "ignorePeers")]
        ignore_peers: bool,
        /// Frame offsets.
        frame: [Option<i64>; 2],
        /// Partitioning fields.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        groupby: Vec<String>,
    },
    /// Aggregates joined back onto every row.
    JoinAggregate {
        /// Group-by fields.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        groupby: Vec<String>,
        /// Input fields.
        fields: Vec<Option<String>>,
        /// Operations.
        ops: Vec<String>,
        /// Output fields.
        #[serde(rename = "as")]
        as_: Vec<String>,
    },
    /// Stack layout.
    Stack {
        /// Stack groups.
        groupby: Vec<String>,
        /// Field to stack.
        field: String,
        /// Order within a stack.
        sort: Compare,
        /// Start and end output fields.
        #[serde(rename = "as")]
        as_: [String; 2],
        /// Baseline offset.
        offset: String,
    },
    /// Missing value imputation.
    Impute {
        /// Field to impute.
        field: String,
        /// Key field.
        key: String,
        /// Key values to impute over.
        #[serde(skip_serializing_if = "Option::is_none")]
        keyvals: Option<Value>,
        /// Imputation method.
        method: String,
        /// Grouping fields.
        groupby: Vec<String>,
        /// Replacement value for `method: value`.
        value: Value,
    },
    /// Join with a secondary dataset.
    Lookup {
        /// Secondary dataset.
        from: String,
        /// Key field in the secondary data.
        key: String,
        /// Key fields in the primary data.
        fields: Vec<String>,
        /// Fields copied from matches.
        #[serde(skip_serializing_if = "Option::is_none")]
        values: Option<Vec<String>>,
        /// Output names.
        #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
        as_: Option<Vec<String>>,
        /// Value when nothing matches.
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    /// Wide to long.
    Fold {
        /// Folded fields.
        fields: Vec<String>,
        /// Key and value names.
        #[serde(rename = "as")]
        as_: [String; 2],
    },
    /// Array expansion.
    Flatten {
        /// Array fields.
        fields: Vec<String>,
        /// Output names.
        #[serde(rename = "as")]
        as_: Vec<String>,
    },
    /// Long to wide.
    Pivot {
        /// Field whose values become fields.
        field: String,
        /// Value field.
        value: String,
        /// Grouping fields.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        groupby: Vec<String>,
        /// Maximum pivoted fields.
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        /// Aggregate op.
        #[serde(skip_serializing_if = "Option::is_none")]
        op: Option<String>,
    },
    /// Random sample.
    Sample {
        /// Sample size.
        size: u64,
    },
    /// Unique row ids.
    Identifier {
        /// Output field.
        #[serde(rename = "as")]
        as_: String,
    },
    /// GeoJSON feature collection into a signal.
    GeoJson {
        /// Longitude and latitude fields.
        #[serde(skip_serializing_if = "Option::is_none")]
        fields: Option<[String; 2]>,
        /// Field holding GeoJSON geometry.
        #[serde(skip_serializing_if = "Option::is_none")]
        geojson: Option<String>,
        /// Output signal.
        signal: String,
    },
    /// Projected point coordinates.
    GeoPoint {
        /// Projection name.
        projection: String,
        /// Longitude and latitude fields.
        fields: [String; 2],
        /// Output x and y fields.
        #[serde(rename = "as")]
        as_: [String; 2],
    },
    /// Number sequence.
    Sequence {
        /// First value.
        start: f64,
        /// Exclusive end.
        stop: f64,
        /// Increment.
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
        /// Output field.
        #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
        as_: Option<String>,
    },
    /// Graticule lines.
    Graticule {
        /// Generator parameters.
        #[serde(flatten)]
        params: BTreeMap<String, Value>,
    },
    /// Kernel density estimate.
    Kde {
        /// Input field.
        field: String,
        /// Grouping fields.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        groupby: Vec<String>,
        /// Cumulative distribution.
        #[serde(skip_serializing_if = "Option::is_none")]
        cumulative: Option<bool>,
        /// Scale by counts.
        #[serde(skip_serializing_if = "Option::is_none")]
        counts: Option<bool>,
        /// Kernel bandwidth.
        #[serde(skip_serializing_if = "Option::is_none")]
        bandwidth: Option<f64>,
        /// Sample domain.
        #[serde(skip_serializing_if = "Option::is_none")]
        extent: Option<[f64; 2]>,
        /// Exact sample count.
        #[serde(skip_serializing_if = "Option::is_none")]
        steps: Option<u32>,
        /// Minimum sample count.
        #[serde(skip_serializing_if = "Option::is_none")]
        minsteps: Option<u32>,
        /// Maximum sample count.
        #[serde(skip_serializing_if = "Option::is_none")]
        maxsteps: Option<u32>,
        /// Value and density names.
        #[serde(rename = "as")]
        as_: [String; 2],
        /// Domain resolution across groups.
        resolve: String,
    },
    /// Regression fit.
    Regression {
        /// Independent field.
        x: String,
        /// Dependent field.
        y: String,
        /// Grouping fields.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        groupby: Vec<String>,
        /// Model.
        #[serde(skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        /// Polynomial order.
        #[serde(skip_serializing_if = "Option::is_none")]
        order: Option<u32>,
        /// Fit domain.
        #[serde(skip_serializing_if = "Option::is_none")]
        extent: Option<[f64; 2]>,
        /// Emit model parameters.
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<bool>,
        /// Output names.
        #[serde(rename = "as")]
        as_: [String; 2],
    },
    /// Local regression.
    Loess {
        /// Independent field.
        x: String,
        /// Dependent field.
        y: String,
        /// Grouping fields.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        groupby: Vec<String>,
        /// Smoothing bandwidth.
        #[serde(skip_serializing_if = "Option::is_none")]
        bandwidth: Option<f64>,
        /// Output names.
        #[serde(rename = "as")]
        as_: [String; 2],
    },
    /// Quantiles.
    Quantile {
        /// Input field.
        field: String,
        /// Grouping fields.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        groupby: Vec<String>,
        /// Probabilities.
        #[serde(skip_serializing_if = "Option::is_none")]
        probs: Option<Vec<f64>>,
        /// Probability step.
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
        /// Output names.
        #[serde(rename = "as")]
        as_: [String; 2],
    },
}

/// Partitioning of a facet mark: the facet's own datasets are scoped under it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetData {
    /// Name of the partition dataset.
    pub name: String,
    /// Dataset being partitioned.
    pub data: String,
    /// Partitioning fields.
    pub groupby: Vec<String>,
    /// Datasets derived from each partition.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<Dataset>,
}

/// Everything the assembler emits for one compile.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledData {
    /// Top-level datasets, in order.
    pub data: Vec<Dataset>,
    /// Facet partitions with their scoped datasets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<FacetData>,
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::string::ToString;
    use alloc::vec;

    use serde_json::json;

    use super::*;

    #[test]
    fn transforms_are_tagged_by_type() {
        let t = VgTransform::Formula {
            expr: "datum.a".to_string(),
            as_: "b".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&t).unwrap(),
            json!({"type": "formula", "expr": "datum.a", "as": "b"})
        );

        let t = VgTransform::JoinAggregate {
            groupby: vec![],
            fields: vec![Some("x".to_string())],
            ops: vec!["sum".to_string()],
            as_: vec!["sum_x".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&t).unwrap(),
            json!({"type": "joinaggregate", "fields": ["x"], "ops": ["sum"], "as": ["sum_x"]})
        );
    }

    #[test]
    fn bin_params_are_inlined() {
        let t = VgTransform::Bin {
            field: "age".to_string(),
            as_: ["b".to_string(), "b_end".to_string()],
            signal: "bin_maxbins_10_age_bins".to_string(),
            extent: BinExtent::Signal(SignalRef {
                signal: "bin_maxbins_10_age_extent".to_string(),
            }),
            params: BinParams {
                maxbins: Some(10),
                ..BinParams::default()
            },
        };
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["maxbins"], json!(10));
        assert_eq!(v["extent"], json!({"signal": "bin_maxbins_10_age_extent"}));
    }

    #[test]
    fn empty_transform_arrays_are_omitted() {
        let ds = Dataset {
            name: "source_0".to_string(),
            url: Some("data/cars.json".to_string()),
            ..Dataset::default()
        };
        assert_eq!(
            serde_json::to_value(&ds).unwrap(),
            json!({"name": "source_0", "url": "data/cars.json"})
        );
    }
}
