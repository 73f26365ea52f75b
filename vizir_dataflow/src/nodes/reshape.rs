// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transforms that change the shape of rows: fold, flatten and pivot.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::FieldSet;
use crate::vega::VgTransform;

/// Turns columns into key/value rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldNode {
    /// Folded fields.
    pub fields: Vec<String>,
    /// Key and value names, `["key", "value"]` by default.
    #[serde(rename = "as")]
    pub as_: [String; 2],
}

impl FlowNode for FoldNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(self.as_.iter().cloned().collect())
    }

    fn dependent_fields(&self) -> FieldSet {
        self.fields.iter().cloned().collect()
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Fold {
            fields: self.fields.clone(),
            as_: self.as_.clone(),
        });
    }
}

/// Expands array fields into one row per element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlattenNode {
    /// Array fields.
    pub fields: Vec<String>,
    /// Output names; missing ones reuse the input name.
    #[serde(rename = "as")]
    pub as_: Vec<String>,
}

impl FlattenNode {
    /// Pads `as_` with the input names.
    pub fn new(fields: Vec<String>, as_: Vec<String>) -> Self {
        let as_ = fields
            .iter()
            .enumerate()
            .map(|(i, f)| as_.get(i).cloned().unwrap_or_else(|| f.clone()))
            .collect();
        Self { fields, as_ }
    }
}

impl FlowNode for FlattenNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(self.as_.iter().cloned().collect())
    }

    fn dependent_fields(&self) -> FieldSet {
        self.fields.iter().cloned().collect()
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Flatten {
            fields: self.fields.clone(),
            as_: self.as_.clone(),
        });
    }
}

/// Turns the values of one field into columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotNode {
    /// Field whose values become columns.
    pub field: String,
    /// Field providing the cell values.
    pub value: String,
    /// Grouping fields.
    pub groupby: Vec<String>,
    /// Maximum number of columns.
    pub limit: Option<u32>,
    /// Aggregate op for the cells.
    pub op: Option<String>,
}

impl FlowNode for PivotNode {
    /// The produced columns depend on the data.
    fn produced_fields(&self) -> Option<FieldSet> {
        None
    }

    fn dependent_fields(&self) -> FieldSet {
        let mut out: FieldSet = self.groupby.iter().cloned().collect();
        out.insert(self.field.clone());
        out.insert(self.value.clone());
        out
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Pivot {
            field: self.field.clone(),
            value: self.value.clone(),
            groupby: self.groupby.clone(),
            limit: self.limit,
            op: self.op.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::vec;

    use super::*;

    #[test]
    fn flatten_names_default_to_inputs() {
        let node = FlattenNode::new(vec!["a".into(), "b".into()], vec!["x".into()]);
        assert_eq!(node.as_, ["x", "b"]);
    }

    #[test]
    fn pivot_outputs_are_unknown() {
        let node = PivotNode {
            field: "k".into(),
            value: "v".into(),
            groupby: vec![],
            limit: None,
            op: None,
        };
        assert_eq!(node.produced_fields(), None);
    }
}
