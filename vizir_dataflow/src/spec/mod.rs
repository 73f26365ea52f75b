// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The declarative input model.
//!
//! These types deserialize the Vega-Lite-style JSON a caller hands to [`compile`](crate::compile).
//! They are already normalized: composite marks and encoding shorthands are expanded upstream.

mod data;
mod encoding;
mod transform;
mod view;

pub use data::{DataFormat, DataKind, DataSpec, ParseSetting, SequenceParams, infer_format_type};
pub use encoding::{
    BinParams, BinSpec, Channel, Encoding, FieldDef, FieldType, ImputeParams, SortField, SortSpec,
    StackSetting, is_counting_op,
};
pub use transform::{
    AggregateTransform, BinTransform, CalculateTransform, DensityTransform, ExtentTransform,
    FieldOp, FieldPredicate, FilterTransform, FlattenTransform, FoldTransform, ImputeTransform,
    JoinAggregateTransform, LoessTransform, LookupFrom, LookupTransform, OneOrMany,
    ParamPredicate, PivotTransform, Predicate, QuantileTransform, RegressionTransform,
    SampleTransform, SortKey, StackTransform, TimeUnitTransform, TransformSpec, WindowTransform,
};
pub use view::{
    FacetSpec, MarkSpec, ParamSpec, ResolveSpec, SelectDef, SelectSpec, ViewKind, ViewSpec,
};
