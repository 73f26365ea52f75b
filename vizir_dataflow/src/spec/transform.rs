// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Explicit transform entries of a view.
//!
//! Entries arrive as raw JSON and are decoded one at a time with [`TransformSpec::from_value`],
//! so a single malformed entry can be skipped without rejecting the whole view.

extern crate alloc;

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::data::DataSpec;
use super::encoding::{BinSpec, ImputeParams};

/// A filter predicate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    /// An expression string.
    Expr(String),
    /// All sub-predicates hold.
    And {
        /// Operands.
        and: Vec<Predicate>,
    },
    /// Any sub-predicate holds.
    Or {
        /// Operands.
        or: Vec<Predicate>,
    },
    /// The sub-predicate does not hold.
    Not {
        /// Operand.
        not: Box<Predicate>,
    },
    /// Membership in a selection.
    Param(ParamPredicate),
    /// A test on one field.
    Field(FieldPredicate),
}

/// Tests whether a row is selected by a selection parameter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParamPredicate {
    /// Selection name.
    pub param: String,
    /// Whether an empty selection selects everything.
    pub empty: Option<bool>,
}

/// A test on one field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPredicate {
    /// Field to test.
    pub field: String,
    /// Time unit applied to the field before testing.
    pub time_unit: Option<String>,
    /// Equality.
    pub equal: Option<Value>,
    /// Less than.
    pub lt: Option<Value>,
    /// Less than or equal.
    pub lte: Option<Value>,
    /// Greater than.
    pub gt: Option<Value>,
    /// Greater than or equal.
    pub gte: Option<Value>,
    /// Inclusive range; either end may be `null`.
    pub range: Option<[Value; 2]>,
    /// Membership in a list.
    pub one_of: Option<Vec<Value>>,
    /// Validity (non-null, non-NaN) test.
    pub valid: Option<bool>,
}

impl Predicate {
    /// Calls `f` for each field predicate in this (possibly composed) predicate.
    pub fn for_each_field(&self, f: &mut impl FnMut(&FieldPredicate)) {
        match self {
            Self::Expr(_) | Self::Param(_) => {}
            Self::And { and: ops } | Self::Or { or: ops } => {
                for op in ops {
                    op.for_each_field(f);
                }
            }
            Self::Not { not } => not.for_each_field(f),
            Self::Field(field) => f(field),
        }
    }

    /// Calls `f` for each selection parameter this predicate tests.
    pub fn for_each_param(&self, f: &mut impl FnMut(&ParamPredicate)) {
        match self {
            Self::Expr(_) | Self::Field(_) => {}
            Self::And { and: ops } | Self::Or { or: ops } => {
                for op in ops {
                    op.for_each_param(f);
                }
            }
            Self::Not { not } => not.for_each_param(f),
            Self::Param(param) => f(param),
        }
    }
}

/// `{"filter": predicate}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterTransform {
    /// The predicate.
    pub filter: Predicate,
}

/// `{"calculate": expr, "as": name}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalculateTransform {
    /// Expression.
    pub calculate: String,
    /// Output field.
    #[serde(rename = "as")]
    pub as_: String,
}

/// Either one output name or several.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    /// One name.
    One(String),
    /// Several names.
    Many(Vec<String>),
}

impl OneOrMany {
    /// The names as a list.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => alloc::vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// `{"bin": true | params, "field": f, "as": names}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinTransform {
    /// Bin parameters.
    pub bin: BinSpec,
    /// Input field.
    pub field: String,
    /// Start name, or `[start, end]`.
    #[serde(rename = "as")]
    pub as_: OneOrMany,
}

/// `{"timeUnit": unit, "field": f, "as": name}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeUnitTransform {
    /// Time unit.
    pub time_unit: String,
    /// Input field.
    pub field: String,
    /// Output field.
    #[serde(rename = "as")]
    pub as_: String,
}

/// One aggregate, window or join-aggregate operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOp {
    /// Operation name.
    pub op: String,
    /// Input field; absent for `count` and ranking ops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Window op parameter, e.g. the lag for `lag`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<Value>,
    /// Output field.
    #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
    pub as_: Option<String>,
}

impl FieldOp {
    /// Output name, `op_field` when not given.
    pub fn output_name(&self) -> String {
        match (&self.as_, &self.field) {
            (Some(name), _) => name.clone(),
            (None, Some(field)) => format!("{}_{field}", self.op),
            (None, None) => self.op.clone(),
        }
    }
}

/// `{"aggregate": [...], "groupby": [...]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregateTransform {
    /// Measures.
    pub aggregate: Vec<FieldOp>,
    /// Group-by fields.
    #[serde(default)]
    pub groupby: Vec<String>,
}

/// A sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    /// Field.
    pub field: String,
    /// `ascending` or `descending`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

/// `{"window": [...], ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowTransform {
    /// Window operations.
    pub window: Vec<FieldOp>,
    /// Frame offsets.
    pub frame: Option<[Option<i64>; 2]>,
    /// Whether peers are ignored when framing.
    pub ignore_peers: Option<bool>,
    /// Partitioning fields.
    #[serde(default)]
    pub groupby: Vec<String>,
    /// Ordering within partitions.
    #[serde(default)]
    pub sort: Vec<SortKey>,
}

/// `{"joinaggregate": [...], "groupby": [...]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinAggregateTransform {
    /// Measures.
    pub joinaggregate: Vec<FieldOp>,
    /// Group-by fields.
    #[serde(default)]
    pub groupby: Vec<String>,
}

/// `{"stack": field, "groupby": [...], ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StackTransform {
    /// Field to stack.
    pub stack: String,
    /// Stack groups.
    pub groupby: Vec<String>,
    /// `zero`, `center` or `normalize`.
    pub offset: Option<String>,
    /// Order within a stack.
    #[serde(default)]
    pub sort: Vec<SortKey>,
    /// `[start, end]` or a start name.
    #[serde(rename = "as")]
    pub as_: OneOrMany,
}

/// `{"impute": field, "key": k, ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImputeTransform {
    /// Field to impute.
    pub impute: String,
    /// Key field.
    pub key: String,
    /// Impute parameters.
    #[serde(flatten)]
    pub params: ImputeParams,
    /// Grouping fields.
    #[serde(default)]
    pub groupby: Vec<String>,
}

/// The secondary side of a lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LookupFrom {
    /// Secondary data.
    pub data: Option<DataSpec>,
    /// Selection whose store is the secondary data.
    pub param: Option<String>,
    /// Key field in the secondary data.
    pub key: Option<String>,
    /// Fields to copy.
    pub fields: Option<Vec<String>>,
}

/// `{"lookup": field, "from": {...}, "as": ..., "default": ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LookupTransform {
    /// Key field in the primary data.
    pub lookup: String,
    /// Secondary data.
    pub from: LookupFrom,
    /// Output names.
    #[serde(rename = "as")]
    pub as_: Option<OneOrMany>,
    /// Value when no match is found.
    pub default: Option<Value>,
}

/// `{"fold": [...], "as": [key, value]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FoldTransform {
    /// Fields to fold.
    pub fold: Vec<String>,
    /// Key and value names.
    #[serde(rename = "as")]
    pub as_: Option<[String; 2]>,
}

/// `{"flatten": [...], "as": [...]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlattenTransform {
    /// Array fields to flatten.
    pub flatten: Vec<String>,
    /// Output names.
    #[serde(rename = "as")]
    pub as_: Option<Vec<String>>,
}

/// `{"pivot": field, "value": field, ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PivotTransform {
    /// Field whose values become new fields.
    pub pivot: String,
    /// Field providing the values.
    pub value: String,
    /// Grouping fields.
    #[serde(default)]
    pub groupby: Vec<String>,
    /// Maximum number of pivoted fields.
    pub limit: Option<u32>,
    /// Aggregate op for the values.
    pub op: Option<String>,
}

/// `{"sample": n}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SampleTransform {
    /// Sample size.
    pub sample: u64,
}

/// `{"density": field, ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DensityTransform {
    /// Field to estimate.
    pub density: String,
    /// Grouping fields.
    #[serde(default)]
    pub groupby: Vec<String>,
    /// Cumulative distribution.
    pub cumulative: Option<bool>,
    /// Scale by counts.
    pub counts: Option<bool>,
    /// Kernel bandwidth.
    pub bandwidth: Option<f64>,
    /// Sample domain.
    pub extent: Option<[f64; 2]>,
    /// Exact sample count.
    pub steps: Option<u32>,
    /// Minimum sample count.
    pub minsteps: Option<u32>,
    /// Maximum sample count.
    pub maxsteps: Option<u32>,
    /// Value and density names.
    #[serde(rename = "as")]
    pub as_: Option<[String; 2]>,
}

/// `{"regression": y, "on": x, ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegressionTransform {
    /// Dependent field.
    pub regression: String,
    /// Independent field.
    pub on: String,
    /// Grouping fields.
    #[serde(default)]
    pub groupby: Vec<String>,
    /// Model: `linear`, `log`, `exp`, `pow`, `quad`, `poly`.
    pub method: Option<String>,
    /// Polynomial order.
    pub order: Option<u32>,
    /// Domain of the fitted line.
    pub extent: Option<[f64; 2]>,
    /// Emit model parameters instead of points.
    pub params: Option<bool>,
    /// Output names.
    #[serde(rename = "as")]
    pub as_: Option<[String; 2]>,
}

/// `{"loess": y, "on": x, ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoessTransform {
    /// Dependent field.
    pub loess: String,
    /// Independent field.
    pub on: String,
    /// Grouping fields.
    #[serde(default)]
    pub groupby: Vec<String>,
    /// Smoothing bandwidth.
    pub bandwidth: Option<f64>,
    /// Output names.
    #[serde(rename = "as")]
    pub as_: Option<[String; 2]>,
}

/// `{"quantile": field, ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuantileTransform {
    /// Field.
    pub quantile: String,
    /// Grouping fields.
    #[serde(default)]
    pub groupby: Vec<String>,
    /// Probabilities.
    pub probs: Option<Vec<f64>>,
    /// Probability step.
    pub step: Option<f64>,
    /// Output names.
    #[serde(rename = "as")]
    pub as_: Option<[String; 2]>,
}

/// `{"extent": field, "param": name}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtentTransform {
    /// Field.
    pub extent: String,
    /// Signal receiving `[min, max]`.
    pub param: String,
}

/// One decoded transform entry.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformSpec {
    /// Row filter.
    Filter(FilterTransform),
    /// Derived field.
    Calculate(CalculateTransform),
    /// Binning.
    Bin(BinTransform),
    /// Time unit truncation.
    TimeUnit(TimeUnitTransform),
    /// Grouped aggregation.
    Aggregate(AggregateTransform),
    /// Window functions.
    Window(WindowTransform),
    /// Aggregates joined back onto rows.
    JoinAggregate(JoinAggregateTransform),
    /// Stack layout.
    Stack(StackTransform),
    /// Missing value imputation.
    Impute(ImputeTransform),
    /// Join with secondary data.
    Lookup(LookupTransform),
    /// Wide to long.
    Fold(FoldTransform),
    /// Array expansion.
    Flatten(FlattenTransform),
    /// Long to wide.
    Pivot(PivotTransform),
    /// Random sample.
    Sample(SampleTransform),
    /// Kernel density estimate.
    Density(DensityTransform),
    /// Regression fit.
    Regression(RegressionTransform),
    /// Local regression.
    Loess(LoessTransform),
    /// Quantiles.
    Quantile(QuantileTransform),
    /// Extent into a signal.
    Extent(ExtentTransform),
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, String> {
    serde_json::from_value(value.clone()).map_err(|e| e.to_string())
}

impl TransformSpec {
    /// Decodes one entry. The operation is chosen by the first known key present.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let Some(obj) = value.as_object() else {
            return Err("transform must be an object".into());
        };
        let has = |key: &str| obj.contains_key(key);
        if has("filter") {
            decode(value).map(Self::Filter)
        } else if has("calculate") {
            decode(value).map(Self::Calculate)
        } else if has("bin") {
            decode(value).map(Self::Bin)
        } else if has("timeUnit") {
            decode(value).map(Self::TimeUnit)
        } else if has("aggregate") {
            decode(value).map(Self::Aggregate)
        } else if has("window") {
            decode(value).map(Self::Window)
        } else if has("joinaggregate") {
            decode(value).map(Self::JoinAggregate)
        } else if has("stack") {
            decode(value).map(Self::Stack)
        } else if has("impute") {
            decode(value).map(Self::Impute)
        } else if has("lookup") {
            decode(value).map(Self::Lookup)
        } else if has("fold") {
            decode(value).map(Self::Fold)
        } else if has("flatten") {
            decode(value).map(Self::Flatten)
        } else if has("pivot") {
            decode(value).map(Self::Pivot)
        } else if has("sample") {
            decode(value).map(Self::Sample)
        } else if has("density") {
            decode(value).map(Self::Density)
        } else if has("regression") {
            decode(value).map(Self::Regression)
        } else if has("loess") {
            decode(value).map(Self::Loess)
        } else if has("quantile") {
            decode(value).map(Self::Quantile)
        } else if has("extent") {
            decode(value).map(Self::Extent)
        } else {
            Err("unknown transform".into())
        }
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Filter(_) => "filter",
            Self::Calculate(_) => "calculate",
            Self::Bin(_) => "bin",
            Self::TimeUnit(_) => "timeUnit",
            Self::Aggregate(_) => "aggregate",
            Self::Window(_) => "window",
            Self::JoinAggregate(_) => "joinaggregate",
            Self::Stack(_) => "stack",
            Self::Impute(_) => "impute",
            Self::Lookup(_) => "lookup",
            Self::Fold(_) => "fold",
            Self::Flatten(_) => "flatten",
            Self::Pivot(_) => "pivot",
            Self::Sample(_) => "sample",
            Self::Density(_) => "density",
            Self::Regression(_) => "regression",
            Self::Loess(_) => "loess",
            Self::Quantile(_) => "quantile",
            Self::Extent(_) => "extent",
        }
    }
}
