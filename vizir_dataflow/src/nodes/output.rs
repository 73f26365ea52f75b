// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

extern crate alloc;

use alloc::string::String;

use super::FlowNode;

/// A named materialization point other parts of the compile can refer to.
///
/// Whether an anchor is emitted depends on its reference count in the
/// [`CompileContext`](crate::context::CompileContext), keyed by `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNode {
    /// Requested dataset name, e.g. `main` or `layer_0_raw`.
    pub name: String,
    /// Role of the anchor: `raw`, `main`, `lookup` or `facet`.
    pub kind: &'static str,
}

impl OutputNode {
    /// An anchor named `name`.
    pub fn new(name: String, kind: &'static str) -> Self {
        Self { name, kind }
    }
}

impl FlowNode for OutputNode {}
