// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Facet pushdown and subtree duplication.
//!
//! Each outermost facet moves down its single-child chain, so operations shared by all
//! partitions run once before the data is split. Operations that group rows get the facet
//! fields as extra dimensions on the way. The facet view's `main` anchor then follows the facet
//! down, and the facet's subtree is copied under that anchor: the copies compute scale domains
//! across all partitions at the top level.

extern crate alloc;

use alloc::format;
use alloc::vec::Vec;

use crate::builder::DataComponent;
use crate::context::CompileContext;
use crate::error::CompileError;
use crate::field::FieldSet;
use crate::graph::NodeId;
use crate::nodes::NodeKind;

pub(super) fn push_down_facets(
    data: &mut DataComponent,
    ctx: &mut CompileContext,
) -> Result<(), CompileError> {
    let mut stack = data.flow.roots();
    while let Some(id) = stack.pop() {
        if !data.flow.contains(id) {
            continue;
        }
        if matches!(data.flow.kind(id), NodeKind::Facet(_)) {
            push_down(data, ctx, id)?;
        } else {
            stack.extend(data.flow.children(id).iter().copied());
        }
    }
    Ok(())
}

fn facet_fields(data: &DataComponent, facet: NodeId) -> FieldSet {
    match data.flow.kind(facet) {
        NodeKind::Facet(f) => f.fields().into_iter().collect(),
        _ => FieldSet::new(),
    }
}

fn push_down(
    data: &mut DataComponent,
    ctx: &mut CompileContext,
    facet: NodeId,
) -> Result<(), CompileError> {
    let fields = facet_fields(data, facet);
    loop {
        let child = match data.flow.children(facet) {
            [child] => *child,
            _ => break,
        };
        if matches!(
            data.flow.kind(child),
            NodeKind::Output(_) | NodeKind::Facet(_)
        ) {
            break;
        }
        data.flow.kind_mut(child).add_dimensions(&fields);
        data.flow.swap_with_parent(child);
    }
    tracing::debug!(facet = %data.flow.label(facet), "facet pushed down");

    let Some(main) = data.facet_main(facet).filter(|&m| data.flow.contains(m)) else {
        return Ok(());
    };
    move_main_down(data, main);

    let children: Vec<NodeId> = data.flow.children(facet).to_vec();
    for child in children {
        for copy in clone_subtree(data, ctx, child, &fields)? {
            data.flow.set_parent(copy, main);
        }
    }
    Ok(())
}

/// Moves a facet view's `main` anchor down until its child is the facet.
fn move_main_down(data: &mut DataComponent, main: NodeId) {
    loop {
        if !matches!(data.flow.kind(main), NodeKind::Output(o) if o.kind == "main") {
            return;
        }
        let child = match data.flow.children(main) {
            [child] => *child,
            _ => return,
        };
        if matches!(data.flow.kind(child), NodeKind::Facet(_)) {
            return;
        }
        data.flow.swap_with_parent(child);
    }
}

/// Copies the subtree at `id`, skipping nested facets, and returns the unlinked copies.
fn clone_subtree(
    data: &mut DataComponent,
    ctx: &mut CompileContext,
    id: NodeId,
    fields: &FieldSet,
) -> Result<Vec<NodeId>, CompileError> {
    let children: Vec<NodeId> = data.flow.children(id).to_vec();
    if matches!(data.flow.kind(id), NodeKind::Facet(_)) {
        let mut out = Vec::new();
        for child in children {
            out.extend(clone_subtree(data, ctx, child, fields)?);
        }
        return Ok(out);
    }

    let copy = data.flow.clone_node(id)?;
    let renamed = match data.flow.kind_mut(copy) {
        NodeKind::Output(out) => {
            out.name = format!("{}{}", ctx.config.facet_scale_prefix, out.name);
            Some(out.name.clone())
        }
        kind => {
            kind.add_dimensions(fields);
            None
        }
    };
    if let Some(name) = renamed {
        ctx.set_ref_count(&name, 1);
        data.flow.set_debug_name(copy, name.clone());
        data.register_output(name, copy);
    }
    for child in children {
        for grandchild in clone_subtree(data, ctx, child, fields)? {
            data.flow.set_parent(grandchild, copy);
        }
    }
    Ok(alloc::vec![copy])
}
