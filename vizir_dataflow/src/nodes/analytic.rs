// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Statistical transforms: density, regression, loess, quantile and extent.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::FieldSet;
use crate::spec::{DensityTransform, LoessTransform, QuantileTransform, RegressionTransform};
use crate::vega::VgTransform;

fn with_groupby(groupby: &[String], more: &[&String]) -> FieldSet {
    let mut out: FieldSet = groupby.iter().cloned().collect();
    out.extend(more.iter().map(|s| (*s).clone()));
    out
}

/// Kernel density estimation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityNode {
    /// Field to estimate.
    pub field: String,
    /// Grouping fields.
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
    pub as_: [String; 2],
}

impl DensityNode {
    /// Reads a `density` transform; outputs default to `value` and `density`.
    pub fn new(t: &DensityTransform) -> Self {
        let [value, density] = t
            .as_
            .clone()
            .unwrap_or_else(|| ["value".into(), "density".into()]);
        Self {
            field: t.density.clone(),
            groupby: t.groupby.clone(),
            cumulative: t.cumulative,
            counts: t.counts,
            bandwidth: t.bandwidth,
            extent: t.extent,
            steps: t.steps,
            minsteps: t.minsteps,
            maxsteps: t.maxsteps,
            as_: [value, density],
        }
    }
}

impl FlowNode for DensityNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(self.as_.iter().cloned().collect())
    }

    fn dependent_fields(&self) -> FieldSet {
        with_groupby(&self.groupby, &[&self.field])
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Kde {
            field: self.field.clone(),
            groupby: self.groupby.clone(),
            cumulative: self.cumulative,
            counts: self.counts,
            bandwidth: self.bandwidth,
            extent: self.extent,
            steps: self.steps,
            minsteps: self.minsteps,
            maxsteps: self.maxsteps,
            as_: self.as_.clone(),
            resolve: "shared".into(),
        });
    }
}

/// Regression fit of `y` on `x`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionNode {
    /// Independent field.
    pub x: String,
    /// Dependent field.
    pub y: String,
    /// Grouping fields.
    pub groupby: Vec<String>,
    /// Model.
    pub method: Option<String>,
    /// Polynomial order.
    pub order: Option<u32>,
    /// Fit domain.
    pub extent: Option<[f64; 2]>,
    /// Emit model parameters.
    pub params: Option<bool>,
    /// Output names, `[x, y]` by default.
    #[serde(rename = "as")]
    pub as_: [String; 2],
}

impl RegressionNode {
    /// Reads a `regression` transform.
    pub fn new(t: &RegressionTransform) -> Self {
        Self {
            x: t.on.clone(),
            y: t.regression.clone(),
            groupby: t.groupby.clone(),
            method: t.method.clone(),
            order: t.order,
            extent: t.extent,
            params: t.params,
            as_: t
                .as_
                .clone()
                .unwrap_or_else(|| [t.on.clone(), t.regression.clone()]),
        }
    }
}

impl FlowNode for RegressionNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(self.as_.iter().cloned().collect())
    }

    fn dependent_fields(&self) -> FieldSet {
        with_groupby(&self.groupby, &[&self.x, &self.y])
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Regression {
            x: self.x.clone(),
            y: self.y.clone(),
            groupby: self.groupby.clone(),
            method: self.method.clone(),
            order: self.order,
            extent: self.extent,
            params: self.params,
            as_: self.as_.clone(),
        });
    }
}

/// Locally weighted regression of `y` on `x`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoessNode {
    /// Independent field.
    pub x: String,
    /// Dependent field.
    pub y: String,
    /// Grouping fields.
    pub groupby: Vec<String>,
    /// Smoothing bandwidth.
    pub bandwidth: Option<f64>,
    /// Output names, `[x, y]` by default.
    #[serde(rename = "as")]
    pub as_: [String; 2],
}

impl LoessNode {
    /// Reads a `loess` transform.
    pub fn new(t: &LoessTransform) -> Self {
        Self {
            x: t.on.clone(),
            y: t.loess.clone(),
            groupby: t.groupby.clone(),
            bandwidth: t.bandwidth,
            as_: t
                .as_
                .clone()
                .unwrap_or_else(|| [t.on.clone(), t.loess.clone()]),
        }
    }
}

impl FlowNode for LoessNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(self.as_.iter().cloned().collect())
    }

    fn dependent_fields(&self) -> FieldSet {
        with_groupby(&self.groupby, &[&self.x, &self.y])
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Loess {
            x: self.x.clone(),
            y: self.y.clone(),
            groupby: self.groupby.clone(),
            bandwidth: self.bandwidth,
            as_: self.as_.clone(),
        });
    }
}

/// Quantiles of a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantileNode {
    /// Input field.
    pub field: String,
    /// Grouping fields.
    pub groupby: Vec<String>,
    /// Probabilities.
    pub probs: Option<Vec<f64>>,
    /// Probability step.
    pub step: Option<f64>,
    /// Output names, `["prob", "value"]` by default.
    #[serde(rename = "as")]
    pub as_: [String; 2],
}

impl QuantileNode {
    /// Reads a `quantile` transform.
    pub fn new(t: &QuantileTransform) -> Self {
        Self {
            field: t.quantile.clone(),
            groupby: t.groupby.clone(),
            probs: t.probs.clone(),
            step: t.step,
            as_: t
                .as_
                .clone()
                .unwrap_or_else(|| ["prob".into(), "value".into()]),
        }
    }
}

impl FlowNode for QuantileNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(self.as_.iter().cloned().collect())
    }

    fn dependent_fields(&self) -> FieldSet {
        with_groupby(&self.groupby, &[&self.field])
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Quantile {
            field: self.field.clone(),
            groupby: self.groupby.clone(),
            probs: self.probs.clone(),
            step: self.step,
            as_: self.as_.clone(),
        });
    }
}

/// Computes a field's extent into a signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtentNode {
    /// Input field.
    pub field: String,
    /// Output signal.
    pub signal: String,
}

impl FlowNode for ExtentNode {
    fn dependent_fields(&self) -> FieldSet {
        FieldSet::from([self.field.clone()])
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Extent {
            field: self.field.clone(),
            signal: self.signal.clone(),
        });
    }
}
