// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sampling and row identity.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::FieldSet;
use crate::vega::VgTransform;

/// Field holding generated row ids.
pub const SELECTION_ID: &str = "_vgsid_";

/// Keeps a random sample of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleNode {
    /// Sample size.
    pub size: u64,
}

impl FlowNode for SampleNode {
    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Sample { size: self.size });
    }
}

/// Gives every row a unique id for point selections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierNode;

impl FlowNode for IdentifierNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(FieldSet::from([String::from(SELECTION_ID)]))
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Identifier {
            as_: SELECTION_ID.into(),
        });
    }
}
