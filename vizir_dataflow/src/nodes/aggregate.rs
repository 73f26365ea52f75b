// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

extern crate alloc;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::{FieldSet, replace_path_in_field};
use crate::vega::VgTransform;

/// Input field used by `count`, which reads no field.
pub const COUNT_FIELD: &str = "*";

/// Groups rows and summarizes each group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateNode {
    /// Group-by fields.
    pub dimensions: FieldSet,
    /// Input field to op to output names.
    pub measures: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl AggregateNode {
    /// Adds a measure. Use [`COUNT_FIELD`] as the field of `count`.
    pub fn add_measure(&mut self, field: &str, op: &str, as_: String) {
        self.measures
            .entry(field.into())
            .or_default()
            .entry(op.into())
            .or_default()
            .insert(as_);
    }

    /// True when there is nothing to group by and nothing to compute.
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty() && self.measures.is_empty()
    }

    /// Adds group-by fields.
    pub fn add_dimensions(&mut self, fields: &FieldSet) {
        self.dimensions.extend(fields.iter().cloned());
    }

    /// Absorbs the measures of an aggregate with the same dimensions. Returns `false`, changing
    /// nothing, when the dimensions differ.
    pub fn merge(&mut self, other: &Self) -> bool {
        if self.dimensions != other.dimensions {
            return false;
        }
        for (field, ops) in &other.measures {
            for (op, names) in ops {
                for name in names {
                    self.add_measure(field, op, name.clone());
                }
            }
        }
        true
    }
}

impl FlowNode for AggregateNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        let mut out = FieldSet::new();
        for (field, ops) in &self.measures {
            for (op, names) in ops {
                if names.is_empty() {
                    out.insert(format!("{op}_{field}"));
                } else {
                    out.extend(names.iter().cloned());
                }
            }
        }
        Some(out)
    }

    fn dependent_fields(&self) -> FieldSet {
        let mut out = self.dimensions.clone();
        out.extend(
            self.measures
                .keys()
                .filter(|f| f.as_str() != COUNT_FIELD)
                .cloned(),
        );
        out
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        let mut ops = Vec::new();
        let mut fields = Vec::new();
        let mut as_ = Vec::new();
        for (field, field_ops) in &self.measures {
            for (op, names) in field_ops {
                for name in names {
                    ops.push(op.clone());
                    fields.push((field != COUNT_FIELD).then(|| replace_path_in_field(field)));
                    as_.push(name.clone());
                }
            }
        }
        out.push(VgTransform::Aggregate {
            groupby: self
                .dimensions
                .iter()
                .map(|d| replace_path_in_field(d))
                .collect(),
            ops,
            fields,
            as_,
        });
    }
}
