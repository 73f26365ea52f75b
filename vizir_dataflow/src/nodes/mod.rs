// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node variants of the data flow.
//!
//! Every node carries a [`NodeKind`]. Kinds share behavior through [`FlowNode`]: which fields a
//! node produces and reads (used by the optimizer to decide what may move past what), and how
//! it appends Vega transforms during assembly.

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use crate::context::CompileContext;
use crate::error::CompileError;
use crate::field::FieldSet;
use crate::vega::VgTransform;

mod aggregate;
mod analytic;
mod bin;
mod calculate;
mod facet;
mod filter;
mod generator;
mod geo;
mod impute;
mod lookup;
mod misc;
mod output;
mod parse;
mod reshape;
mod source;
mod stack;
mod timeunit;
mod window;

pub use aggregate::{AggregateNode, COUNT_FIELD};
pub use analytic::{DensityNode, ExtentNode, LoessNode, QuantileNode, RegressionNode};
pub use bin::{BinComponent, BinNode, bin_key};
pub use calculate::{CalculateNode, sort_index_field};
pub use facet::{FacetChannel, FacetNode, FacetSort};
pub use filter::{FilterInvalidNode, FilterNode, implicit_parse, predicate_expr, selection_store};
pub use generator::{GraticuleNode, SequenceNode};
pub use geo::{GeoJsonNode, GeoPointNode};
pub use impute::ImputeNode;
pub use lookup::LookupNode;
pub use misc::{IdentifierNode, SELECTION_ID, SampleNode};
pub use output::OutputNode;
pub use parse::{AncestorParse, DERIVED, ParseNode, parse_expression};
pub use reshape::{FlattenNode, FoldNode, PivotNode};
pub use source::SourceNode;
pub use stack::StackNode;
pub use timeunit::{TimeUnit, TimeUnitComponent, TimeUnitNode, date_time_expr, is_date_time};
pub use window::{JoinAggregateNode, WindowNode};

/// Behavior shared by all node kinds.
pub trait FlowNode {
    /// Fields this node adds to each row. `None` when they cannot be known before the data is
    /// seen; such a node overlaps with everything.
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(FieldSet::new())
    }

    /// Fields this node reads.
    fn dependent_fields(&self) -> FieldSet {
        FieldSet::new()
    }

    /// Appends the Vega transforms of this node.
    fn assemble(&self, ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        let _ = (ctx, out);
    }
}

/// The operation of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Root dataset.
    Source(SourceNode),
    /// Number sequence generator.
    Sequence(SequenceNode),
    /// Graticule generator.
    Graticule(GraticuleNode),
    /// Type coercion.
    Parse(ParseNode),
    /// Row filter.
    Filter(FilterNode),
    /// Removal of rows with invalid values in continuous fields.
    FilterInvalid(FilterInvalidNode),
    /// Derived field.
    Calculate(CalculateNode),
    /// Binning.
    Bin(BinNode),
    /// Time unit truncation.
    TimeUnit(TimeUnitNode),
    /// Grouped aggregation.
    Aggregate(AggregateNode),
    /// Window functions.
    Window(WindowNode),
    /// Aggregates joined onto rows.
    JoinAggregate(JoinAggregateNode),
    /// Stack layout.
    Stack(StackNode),
    /// Imputation of missing values.
    Impute(ImputeNode),
    /// Join with a secondary dataset.
    Lookup(LookupNode),
    /// Wide to long.
    Fold(FoldNode),
    /// Array expansion.
    Flatten(FlattenNode),
    /// Long to wide.
    Pivot(PivotNode),
    /// Random sample.
    Sample(SampleNode),
    /// Row ids for selections.
    Identifier(IdentifierNode),
    /// Feature collection for projection fitting.
    GeoJson(GeoJsonNode),
    /// Projected coordinates.
    GeoPoint(GeoPointNode),
    /// Kernel density estimate.
    Density(DensityNode),
    /// Regression fit.
    Regression(RegressionNode),
    /// Local regression.
    Loess(LoessNode),
    /// Quantiles.
    Quantile(QuantileNode),
    /// Field extent into a signal.
    Extent(ExtentNode),
    /// Facet partition.
    Facet(FacetNode),
    /// Named output anchor.
    Output(OutputNode),
}

fn content<T: Serialize>(tag: &str, payload: &T) -> Option<String> {
    Some(format!(
        "{tag} {}",
        serde_json::to_string(payload).unwrap_or_default()
    ))
}

impl NodeKind {
    /// Short name of the kind, used in labels and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Source(_) => "Source",
            Self::Sequence(_) => "Sequence",
            Self::Graticule(_) => "Graticule",
            Self::Parse(_) => "Parse",
            Self::Filter(_) => "Filter",
            Self::FilterInvalid(_) => "FilterInvalid",
            Self::Calculate(_) => "Calculate",
            Self::Bin(_) => "Bin",
            Self::TimeUnit(_) => "TimeUnit",
            Self::Aggregate(_) => "Aggregate",
            Self::Window(_) => "Window",
            Self::JoinAggregate(_) => "JoinAggregate",
            Self::Stack(_) => "Stack",
            Self::Impute(_) => "Impute",
            Self::Lookup(_) => "Lookup",
            Self::Fold(_) => "Fold",
            Self::Flatten(_) => "Flatten",
            Self::Pivot(_) => "Pivot",
            Self::Sample(_) => "Sample",
            Self::Identifier(_) => "Identifier",
            Self::GeoJson(_) => "GeoJson",
            Self::GeoPoint(_) => "GeoPoint",
            Self::Density(_) => "Density",
            Self::Regression(_) => "Regression",
            Self::Loess(_) => "Loess",
            Self::Quantile(_) => "Quantile",
            Self::Extent(_) => "Extent",
            Self::Facet(_) => "Facet",
            Self::Output(_) => "Output",
        }
    }

    fn as_flow(&self) -> &dyn FlowNode {
        match self {
            Self::Source(n) => n,
            Self::Sequence(n) => n,
            Self::Graticule(n) => n,
            Self::Parse(n) => n,
            Self::Filter(n) => n,
            Self::FilterInvalid(n) => n,
            Self::Calculate(n) => n,
            Self::Bin(n) => n,
            Self::TimeUnit(n) => n,
            Self::Aggregate(n) => n,
            Self::Window(n) => n,
            Self::JoinAggregate(n) => n,
            Self::Stack(n) => n,
            Self::Impute(n) => n,
            Self::Lookup(n) => n,
            Self::Fold(n) => n,
            Self::Flatten(n) => n,
            Self::Pivot(n) => n,
            Self::Sample(n) => n,
            Self::Identifier(n) => n,
            Self::GeoJson(n) => n,
            Self::GeoPoint(n) => n,
            Self::Density(n) => n,
            Self::Regression(n) => n,
            Self::Loess(n) => n,
            Self::Quantile(n) => n,
            Self::Extent(n) => n,
            Self::Facet(n) => n,
            Self::Output(n) => n,
        }
    }

    /// An unlinked copy of this operation.
    ///
    /// Sources and facets are tied to a single position in the flow and cannot be copied.
    pub fn try_clone(&self) -> Result<Self, CompileError> {
        match self {
            Self::Source(_) | Self::Facet(_) => Err(CompileError::Uncloneable { kind: self.name() }),
            other => Ok(other.clone()),
        }
    }

    /// Kind tag plus canonical payload, or `None` for structural kinds that are only equal to
    /// themselves.
    pub fn hash_content(&self) -> Option<String> {
        match self {
            Self::Source(_)
            | Self::Sequence(_)
            | Self::Graticule(_)
            | Self::Facet(_)
            | Self::Output(_) => None,
            Self::Parse(n) => content("Parse", n),
            Self::Filter(n) => content("Filter", n),
            Self::FilterInvalid(n) => content("FilterInvalid", n),
            Self::Calculate(n) => content("Calculate", n),
            Self::Bin(n) => content("Bin", n),
            Self::TimeUnit(n) => content("TimeUnit", n),
            Self::Aggregate(n) => content("Aggregate", n),
            Self::Window(n) => content("Window", n),
            Self::JoinAggregate(n) => content("JoinAggregate", n),
            Self::Stack(n) => content("Stack", n),
            Self::Impute(n) => content("Impute", n),
            Self::Lookup(n) => content("Lookup", n),
            Self::Fold(n) => content("Fold", n),
            Self::Flatten(n) => content("Flatten", n),
            Self::Pivot(n) => content("Pivot", n),
            Self::Sample(n) => content("Sample", n),
            Self::Identifier(n) => content("Identifier", n),
            Self::GeoJson(n) => content("GeoJson", n),
            Self::GeoPoint(n) => content("GeoPoint", n),
            Self::Density(n) => content("Density", n),
            Self::Regression(n) => content("Regression", n),
            Self::Loess(n) => content("Loess", n),
            Self::Quantile(n) => content("Quantile", n),
            Self::Extent(n) => content("Extent", n),
        }
    }

    /// True for roots that provide rows: sources and generators.
    pub fn is_data_source(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Sequence(_) | Self::Graticule(_))
    }

    /// True for operations whose output rows do not correspond one-to-one to their input rows.
    pub fn reshapes_rows(&self) -> bool {
        matches!(
            self,
            Self::Aggregate(_)
                | Self::Impute(_)
                | Self::Fold(_)
                | Self::Flatten(_)
                | Self::Pivot(_)
                | Self::Sample(_)
                | Self::Density(_)
                | Self::Regression(_)
                | Self::Loess(_)
                | Self::Quantile(_)
        )
    }

    /// Adds grouping fields to operations that group rows. Returns whether the kind groups.
    pub fn add_dimensions(&mut self, fields: &FieldSet) -> bool {
        match self {
            Self::Aggregate(n) => n.add_dimensions(fields),
            Self::Stack(n) => n.add_dimensions(fields),
            Self::Window(n) => n.add_dimensions(fields),
            Self::JoinAggregate(n) => n.add_dimensions(fields),
            _ => return false,
        }
        true
    }
}

impl FlowNode for NodeKind {
    fn produced_fields(&self) -> Option<FieldSet> {
        self.as_flow().produced_fields()
    }

    fn dependent_fields(&self) -> FieldSet {
        self.as_flow().dependent_fields()
    }

    fn assemble(&self, ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        self.as_flow().assemble(ctx, out);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::string::ToString;

    use super::*;

    #[test]
    fn structural_kinds_hash_by_identity() {
        let out = NodeKind::Output(OutputNode::new("main".into(), "main"));
        assert_eq!(out.hash_content(), None);
        let source = NodeKind::Source(SourceNode::named("table".into()));
        assert_eq!(source.hash_content(), None);
    }

    #[test]
    fn equal_payloads_hash_equal() {
        let a = NodeKind::Calculate(CalculateNode::new("datum.a * 2".to_string(), "b".to_string()));
        let b = NodeKind::Calculate(CalculateNode::new("datum.a * 2".to_string(), "b".to_string()));
        let c = NodeKind::Calculate(CalculateNode::new("datum.a * 3".to_string(), "b".to_string()));
        assert_eq!(a.hash_content(), b.hash_content());
        assert_ne!(a.hash_content(), c.hash_content());
        assert!(a.hash_content().unwrap().starts_with("Calculate "));
    }

    #[test]
    fn sources_refuse_to_clone() {
        let source = NodeKind::Source(SourceNode::named("table".into()));
        assert!(matches!(
            source.try_clone(),
            Err(CompileError::Uncloneable { kind: "Source" })
        ));
        let calc = NodeKind::Calculate(CalculateNode::new("1".to_string(), "one".to_string()));
        assert_eq!(calc.try_clone().unwrap(), calc);
    }

    #[test]
    fn dispatch_reaches_the_variant() {
        let calc = NodeKind::Calculate(CalculateNode::new(
            "datum.price * datum.qty".to_string(),
            "total".to_string(),
        ));
        assert_eq!(
            calc.produced_fields(),
            Some(FieldSet::from(["total".to_string()]))
        );
        assert_eq!(
            calc.dependent_fields(),
            FieldSet::from(["price".to_string(), "qty".to_string()])
        );
    }
}
