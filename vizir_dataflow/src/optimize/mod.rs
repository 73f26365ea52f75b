// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rewrites the data flow into a smaller, equivalent one.
//!
//! Passes come in two shapes. Bottom-up passes start at every leaf and walk toward the root
//! until the rule asks to stop. Top-down passes visit every node from the roots and usually
//! compare a node's children with each other. Every pass records whether it changed the graph;
//! the driver repeats the pass list until nothing changes or the run cap is hit.
//!
//! The first fixpoint only removes dead nodes. Facets are then pushed down and their subtrees
//! duplicated for top-level scales, and the full pass list runs to a second fixpoint.

extern crate alloc;

use alloc::vec::Vec;

use crate::builder::DataComponent;
use crate::context::CompileContext;
use crate::error::{CompileError, Warning};
use crate::graph::{Dataflow, NodeId};
use crate::nodes::NodeKind;

mod facet;
mod rules;

/// Whether a bottom-up walk goes on to the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Stop,
}

/// State of one pass over the graph.
struct Pass<'a> {
    flow: &'a mut Dataflow,
    ctx: &'a mut CompileContext,
    name: &'static str,
    mutated: bool,
}

impl Pass<'_> {
    fn set_mutated(&mut self) {
        if !self.mutated {
            tracing::debug!(pass = self.name, "mutated");
        }
        self.mutated = true;
    }

    /// Runs `rule` from every leaf toward its root, stopping at sources.
    fn bottom_up(&mut self, rule: fn(&mut Self, NodeId) -> Step) {
        for leaf in self.flow.leaves() {
            let mut current = Some(leaf);
            while let Some(id) = current {
                if !self.flow.contains(id) || matches!(self.flow.kind(id), NodeKind::Source(_)) {
                    break;
                }
                let next = self.flow.parent(id);
                if rule(self, id) == Step::Stop {
                    break;
                }
                current = next;
            }
        }
    }

    /// Runs `rule` on every node, parents before children.
    fn top_down(&mut self, rule: fn(&mut Self, NodeId)) {
        let mut stack: Vec<NodeId> = self.flow.roots();
        stack.reverse();
        while let Some(id) = stack.pop() {
            if !self.flow.contains(id) {
                continue;
            }
            let before: Vec<NodeId> = self.flow.children(id).to_vec();
            rule(self, id);
            let after: Vec<NodeId> = if self.flow.contains(id) {
                self.flow.children(id).to_vec()
            } else {
                before
            };
            stack.extend(after.into_iter().rev().filter(|&c| self.flow.contains(c)));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Dead node removal only.
    Cleanup,
    /// Every pass.
    Full,
}

fn run_passes(data: &mut DataComponent, ctx: &mut CompileContext, phase: Phase) -> bool {
    let mut mutated = false;
    let mut run = |name: &'static str, f: &dyn Fn(&mut Pass<'_>)| {
        let mut pass = Pass {
            flow: &mut data.flow,
            ctx: &mut *ctx,
            name,
            mutated: false,
        };
        f(&mut pass);
        mutated |= pass.mutated;
    };

    run("remove_unused_outputs", &rules::remove_unused_outputs);
    run("remove_unused_subtrees", &|p| {
        rules::drop_childless_roots(p);
        p.bottom_up(rules::remove_unused_subtree);
        rules::drop_childless_roots(p);
    });
    if phase == Phase::Full {
        run("move_parse_up", &|p| p.bottom_up(rules::move_parse_up));
        run("merge_bins", &|p| p.top_down(rules::merge_bins));
        run("remove_duplicate_time_units", &rules::remove_duplicate_time_units);
        run("merge_time_units", &|p| p.top_down(rules::merge_time_units));
        run("merge_parse", &|p| p.top_down(rules::merge_parse));
        run("merge_aggregates", &|p| p.top_down(rules::merge_aggregates));
        run("merge_identical_nodes", &|p| p.top_down(rules::merge_identical_nodes));
    }
    mutated
}

/// Runs passes until they stop changing the graph. Returns how many runs changed it.
fn fixpoint(data: &mut DataComponent, ctx: &mut CompileContext, phase: Phase) -> usize {
    let cap = ctx.config.max_optimizer_runs;
    let mut runs = 0;
    while runs < cap {
        tracing::debug!(run = runs, ?phase, "optimizer run");
        if !run_passes(data, ctx, phase) {
            break;
        }
        runs += 1;
    }
    runs
}

fn check_links(data: &mut DataComponent, ctx: &mut CompileContext) {
    data.flow.check_links();
    ctx.extend_warnings(data.flow.take_warnings());
}

/// Optimizes the data flow of a compile in place.
///
/// Fails only when facet duplication meets a node that cannot be copied.
pub fn optimize(data: &mut DataComponent, ctx: &mut CompileContext) -> Result<(), CompileError> {
    check_links(data, ctx);

    let first = fixpoint(data, ctx, Phase::Cleanup);
    facet::push_down_facets(data, ctx)?;
    let second = fixpoint(data, ctx, Phase::Full);

    check_links(data, ctx);
    let cap = ctx.config.max_optimizer_runs;
    if cap > 0 && first.max(second) == cap {
        ctx.warn("optimizer", Warning::OptimizerCapReached { runs: cap });
    }
    Ok(())
}
