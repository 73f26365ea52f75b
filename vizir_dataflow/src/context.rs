// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-compile shared state.

extern crate alloc;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;

use crate::config::CompileConfig;
use crate::error::Warning;

/// State shared by the builder, optimizer and assembler of one compile.
///
/// Holds the reference counts of output anchors, the signal rename table and the warnings.
/// Create a fresh context for every compile; counts and renames must not leak between them.
#[derive(Debug, Clone, Default)]
pub struct CompileContext {
    /// Configuration of this compile.
    pub config: CompileConfig,
    ref_counts: BTreeMap<String, u32>,
    signal_renames: BTreeMap<String, String>,
    selections: BTreeSet<String>,
    variables: BTreeSet<String>,
    warnings: Vec<Warning>,
}

impl CompileContext {
    /// Creates a context for one compile.
    pub fn new(config: CompileConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Returns the name of an output anchor and records one more reference to it.
    ///
    /// Only request names that will actually be used: an anchor with a positive count is
    /// always emitted.
    pub fn request_data_name(&mut self, name: &str) -> String {
        *self.ref_counts.entry(name.into()).or_insert(0) += 1;
        String::from(name)
    }

    /// Registers an anchor without referencing it.
    pub fn register_anchor(&mut self, name: &str) {
        self.ref_counts.entry(name.into()).or_insert(0);
    }

    /// Sets the reference count of an anchor.
    pub fn set_ref_count(&mut self, name: &str, count: u32) {
        self.ref_counts.insert(name.into(), count);
    }

    /// Current reference count of an anchor.
    pub fn ref_count(&self, name: &str) -> u32 {
        self.ref_counts.get(name).copied().unwrap_or(0)
    }

    /// Records that signal `from` is now provided by signal `to`.
    pub fn rename_signal(&mut self, from: &str, to: &str) {
        if from != to {
            self.signal_renames.insert(from.into(), to.into());
        }
    }

    /// Resolves a signal name through the rename table.
    pub fn signal_name(&self, name: &str) -> String {
        let mut current = name;
        // Rename chains are short; the bound guards against accidental cycles.
        for _ in 0..=self.signal_renames.len() {
            match self.signal_renames.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        String::from(current)
    }

    /// Declares a parameter visible to predicates and lookups.
    pub fn declare_param(&mut self, name: &str, is_selection: bool) {
        if is_selection {
            self.selections.insert(name.into());
        } else {
            self.variables.insert(name.into());
        }
    }

    /// True when a selection with this name was declared.
    pub fn is_selection(&self, name: &str) -> bool {
        self.selections.contains(name)
    }

    /// True when a plain variable parameter with this name was declared.
    pub fn is_variable(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    /// Records a warning attributed to a node or transform and logs it.
    pub fn warn(&mut self, subject: &str, warning: Warning) {
        tracing::warn!(node = subject, %warning, "data flow");
        self.warnings.push(warning);
    }

    /// Records warnings that were already logged.
    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        self.warnings.extend(warnings);
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Consumes the context, returning its warnings.
    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn requests_count_references() {
        let mut ctx = CompileContext::default();
        ctx.register_anchor("raw");
        assert_eq!(ctx.ref_count("raw"), 0);
        assert_eq!(ctx.request_data_name("main"), "main");
        ctx.request_data_name("main");
        assert_eq!(ctx.ref_count("main"), 2);
    }

    #[test]
    fn signal_renames_chain() {
        let mut ctx = CompileContext::default();
        ctx.rename_signal("a", "b");
        ctx.rename_signal("b", "c");
        ctx.rename_signal("x", "x");
        assert_eq!(ctx.signal_name("a"), "c");
        assert_eq!(ctx.signal_name("x"), "x");
    }
}
