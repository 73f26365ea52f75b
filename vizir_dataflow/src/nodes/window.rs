// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Window functions and join-aggregates.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::Value;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::{FieldSet, replace_path_in_field};
use crate::spec::{FieldOp, SortKey};
use crate::vega::{Compare, VgTransform};

fn add_groupby(groupby: &mut Vec<String>, fields: &FieldSet) {
    for f in fields {
        if !groupby.contains(f) {
            groupby.push(f.clone());
        }
    }
}

fn op_outputs(ops: &[FieldOp]) -> FieldSet {
    ops.iter().map(FieldOp::output_name).collect()
}

/// Computes window functions over sorted partitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowNode {
    /// Operations.
    pub ops: Vec<FieldOp>,
    /// Frame offsets, `[null, 0]` by default.
    pub frame: Option<[Option<i64>; 2]>,
    /// Whether peers are ignored when framing.
    pub ignore_peers: Option<bool>,
    /// Partitioning fields.
    pub groupby: Vec<String>,
    /// Order within partitions.
    pub sort: Vec<SortKey>,
}

impl WindowNode {
    /// Adds partitioning fields.
    pub fn add_dimensions(&mut self, fields: &FieldSet) {
        add_groupby(&mut self.groupby, fields);
    }
}

impl FlowNode for WindowNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(op_outputs(&self.ops))
    }

    fn dependent_fields(&self) -> FieldSet {
        let mut out: FieldSet = self.groupby.iter().cloned().collect();
        out.extend(self.ops.iter().filter_map(|o| o.field.clone()));
        out.extend(self.sort.iter().map(|s| s.field.clone()));
        out
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        let mut sort = Compare::default();
        for key in &self.sort {
            sort.field.push(key.field.clone());
            sort.order
                .push(key.order.clone().unwrap_or_else(|| "ascending".into()));
        }
        out.push(VgTransform::Window {
            params: self
                .ops
                .iter()
                .map(|o| o.param.clone().unwrap_or(Value::Null))
                .collect(),
            as_: self.ops.iter().map(FieldOp::output_name).collect(),
            ops: self.ops.iter().map(|o| o.op.clone()).collect(),
            fields: self
                .ops
                .iter()
                .map(|o| o.field.as_deref().map(replace_path_in_field))
                .collect(),
            sort,
            ignore_peers: self.ignore_peers.unwrap_or(false),
            frame: self.frame.unwrap_or([None, Some(0)]),
            groupby: self.groupby.iter().map(|g| replace_path_in_field(g)).collect(),
        });
    }
}

/// Aggregates per group and joins the results back onto every row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinAggregateNode {
    /// Measures.
    pub ops: Vec<FieldOp>,
    /// Group-by fields.
    pub groupby: Vec<String>,
}

impl JoinAggregateNode {
    /// Adds group-by fields.
    pub fn add_dimensions(&mut self, fields: &FieldSet) {
        add_groupby(&mut self.groupby, fields);
    }
}

impl FlowNode for JoinAggregateNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(op_outputs(&self.ops))
    }

    fn dependent_fields(&self) -> FieldSet {
        let mut out: FieldSet = self.groupby.iter().cloned().collect();
        out.extend(self.ops.iter().filter_map(|o| o.field.clone()));
        out
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::JoinAggregate {
            groupby: self.groupby.iter().map(|g| replace_path_in_field(g)).collect(),
            fields: self
                .ops
                .iter()
                .map(|o| o.field.as_deref().map(replace_path_in_field))
                .collect(),
            ops: self.ops.iter().map(|o| o.op.clone()).collect(),
            as_: self.ops.iter().map(FieldOp::output_name).collect(),
        });
    }
}
