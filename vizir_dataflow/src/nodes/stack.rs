// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::{FieldSet, replace_path_in_field};
use crate::spec::SortKey;
use crate::vega::{Compare, VgTransform};

/// Stacks a field within groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackNode {
    /// Field whose values are stacked.
    pub field: String,
    /// Stack groups (the dimension, plus facet fields once pushed into a facet).
    pub groupby: Vec<String>,
    /// Order of layers within a stack.
    pub sort: Vec<SortKey>,
    /// `zero`, `center` or `normalize`.
    pub offset: String,
    /// Start and end output fields.
    #[serde(rename = "as")]
    pub as_: [String; 2],
}

impl StackNode {
    /// Adds group fields.
    pub fn add_dimensions(&mut self, fields: &FieldSet) {
        for f in fields {
            if !self.groupby.contains(f) {
                self.groupby.push(f.clone());
            }
        }
    }
}

impl FlowNode for StackNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(self.as_.iter().cloned().collect())
    }

    fn dependent_fields(&self) -> FieldSet {
        let mut out: FieldSet = self.groupby.iter().cloned().collect();
        out.insert(self.field.clone());
        out.extend(self.sort.iter().map(|s| s.field.clone()));
        out
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        let mut sort = Compare::default();
        for key in &self.sort {
            sort.field.push(replace_path_in_field(&key.field));
            sort.order
                .push(key.order.clone().unwrap_or_else(|| "ascending".into()));
        }
        out.push(VgTransform::Stack {
            groupby: self.groupby.iter().map(|g| replace_path_in_field(g)).collect(),
            field: replace_path_in_field(&self.field),
            sort,
            as_: self.as_.clone(),
            offset: self.offset.clone(),
        });
    }
}
