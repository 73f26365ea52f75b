// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generated data: number sequences and graticules.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use serde_json::Value;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::FieldSet;
use crate::spec::SequenceParams;
use crate::vega::VgTransform;

/// Generates `start..stop` by `step` into one field.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceNode {
    /// Generator parameters.
    pub params: SequenceParams,
}

impl FlowNode for SequenceNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        let name = self.params.as_.clone().unwrap_or_else(|| String::from("data"));
        Some(FieldSet::from([name]))
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Sequence {
            start: self.params.start,
            stop: self.params.stop,
            step: self.params.step,
            as_: self.params.as_.clone(),
        });
    }
}

/// Generates graticule lines.
#[derive(Debug, Clone, PartialEq)]
pub struct GraticuleNode {
    /// Generator parameters; empty for `graticule: true`.
    pub params: BTreeMap<String, Value>,
}

impl GraticuleNode {
    /// Reads the `graticule` property of a data source.
    pub fn new(spec: &Value) -> Self {
        let params = match spec {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => BTreeMap::new(),
        };
        Self { params }
    }
}

impl FlowNode for GraticuleNode {
    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Graticule {
            params: self.params.clone(),
        });
    }
}
