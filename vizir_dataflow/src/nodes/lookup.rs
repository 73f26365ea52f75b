// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

extern crate alloc;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::Value;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::FieldSet;
use crate::vega::VgTransform;

/// Joins rows with a secondary dataset by key.
///
/// `from` holds the name of the secondary output anchor; the assembler replaces it with the
/// dataset that anchor finally resolves to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupNode {
    /// Key field in the primary data.
    pub lookup: String,
    /// Secondary anchor (or selection store) name.
    pub from: String,
    /// Key field in the secondary data.
    pub key: String,
    /// Fields copied from the match; `None` nests the whole record.
    pub fields: Option<Vec<String>>,
    /// Output names.
    #[serde(rename = "as")]
    pub as_: Vec<String>,
    /// Value used when nothing matches.
    pub default: Option<Value>,
}

impl FlowNode for LookupNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(match (&self.fields, self.as_.is_empty()) {
            (Some(fields), true) => fields.iter().cloned().collect(),
            _ => self.as_.iter().cloned().collect(),
        })
    }

    fn dependent_fields(&self) -> FieldSet {
        FieldSet::from([self.lookup.clone()])
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Lookup {
            from: self.from.clone(),
            key: self.key.clone(),
            fields: vec![self.lookup.clone()],
            values: self.fields.clone(),
            as_: (!self.as_.is_empty()).then(|| self.as_.clone()),
            default: self.default.clone(),
        });
    }
}
