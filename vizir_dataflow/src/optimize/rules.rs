// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Individual optimizer passes.

extern crate alloc;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use hashbrown::HashMap;

use super::{Pass, Step};
use crate::field::{FieldSet, fields_intersect};
use crate::graph::{NodeHash, NodeId};
use crate::nodes::{FlowNode, NodeKind, ParseNode};

/// Merges the payload of `from` into `into`, moves the children of `from` under `into`, and
/// removes `from`.
fn absorb(pass: &mut Pass<'_>, into: NodeId, from: NodeId) {
    let donor = pass.flow.kind(from).clone();
    match (pass.flow.kind_mut(into), &donor) {
        (NodeKind::Bin(ours), NodeKind::Bin(theirs)) => ours.merge(theirs, pass.ctx),
        (NodeKind::TimeUnit(ours), NodeKind::TimeUnit(theirs)) => ours.merge(theirs),
        (NodeKind::Parse(ours), NodeKind::Parse(theirs)) => ours.merge(theirs),
        (NodeKind::Aggregate(ours), NodeKind::Aggregate(theirs)) => {
            ours.merge(theirs);
        }
        _ => {}
    }
    reparent_into(pass, into, from);
}

/// Moves `from` under `into` and splices it out, so its children end up under `into`.
fn reparent_into(pass: &mut Pass<'_>, into: NodeId, from: NodeId) {
    if let Some(parent) = pass.flow.parent(from) {
        pass.flow.remove_child(parent, from);
    }
    pass.flow.set_parent(from, into);
    pass.flow.remove(from);
}

/// Removes output anchors nothing refers to.
pub(super) fn remove_unused_outputs(pass: &mut Pass<'_>) {
    let unused: Vec<NodeId> = pass
        .flow
        .ids()
        .filter(|&id| match pass.flow.kind(id) {
            NodeKind::Output(out) => pass.ctx.ref_count(&out.name) == 0,
            _ => false,
        })
        .collect();
    for id in unused {
        pass.flow.remove(id);
        pass.set_mutated();
    }
}

/// Drops roots left without children. Not counted as a mutation: nothing downstream changes.
pub(super) fn drop_childless_roots(pass: &mut Pass<'_>) {
    for root in pass.flow.roots() {
        if pass.flow.num_children(root) == 0 {
            pass.flow.remove(root);
        }
    }
}

/// Removes leaves that neither materialize a dataset nor partition one.
pub(super) fn remove_unused_subtree(pass: &mut Pass<'_>, id: NodeId) -> Step {
    let kind = pass.flow.kind(id);
    if matches!(kind, NodeKind::Output(_) | NodeKind::Facet(_)) || pass.flow.num_children(id) > 0
    {
        return Step::Stop;
    }
    pass.flow.remove(id);
    pass.set_mutated();
    Step::Continue
}

/// Moves a parse node up past single-child parents that do not produce what it parses,
/// merging it into a parse parent.
pub(super) fn move_parse_up(pass: &mut Pass<'_>, id: NodeId) -> Step {
    let NodeKind::Parse(parse) = pass.flow.kind(id) else {
        return Step::Continue;
    };
    let Some(parent) = pass.flow.parent(id) else {
        return Step::Continue;
    };
    let parent_kind = pass.flow.kind(parent);
    if parent_kind.is_data_source() || pass.flow.num_children(parent) > 1 {
        return Step::Continue;
    }
    if matches!(parent_kind, NodeKind::Parse(_)) {
        let parse = parse.clone();
        if let NodeKind::Parse(target) = pass.flow.kind_mut(parent) {
            target.merge(&parse);
        }
        pass.flow.remove(id);
    } else {
        let dependent = parse.dependent_fields();
        if fields_intersect(parent_kind.produced_fields().as_ref(), Some(&dependent)) {
            return Step::Continue;
        }
        pass.flow.swap_with_parent(id);
    }
    pass.set_mutated();
    Step::Continue
}

/// Hoists bins above a parent that does not produce their input and merges sibling bins with
/// each other. Duplicated signals are renamed through the context.
///
/// A bin from a `transform` entry never moves above another `transform` entry other than a bin.
pub(super) fn merge_bins(pass: &mut Pass<'_>, parent: NodeId) {
    let parent_kind = pass.flow.kind(parent);
    let move_up = !(parent_kind.is_data_source()
        || parent_kind.reshapes_rows()
        || matches!(
            parent_kind,
            NodeKind::Filter(_) | NodeKind::Parse(_) | NodeKind::Identifier(_)
        ));
    let pinned_by_parent =
        pass.flow.is_explicit(parent) && !matches!(parent_kind, NodeKind::Bin(_));
    let produced = parent_kind.produced_fields();

    let mut promotable = Vec::new();
    let mut remaining = Vec::new();
    for &child in pass.flow.children(parent) {
        let NodeKind::Bin(bin) = pass.flow.kind(child) else {
            continue;
        };
        let pinned = pinned_by_parent && pass.flow.is_explicit(child);
        if move_up
            && !pinned
            && !fields_intersect(produced.as_ref(), Some(&bin.dependent_fields()))
        {
            promotable.push(child);
        } else {
            remaining.push(child);
        }
    }

    if let Some(promoted) = promotable.pop() {
        for other in promotable {
            absorb(pass, promoted, other);
        }
        pass.set_mutated();
        if matches!(pass.flow.kind(parent), NodeKind::Bin(_)) {
            absorb(pass, parent, promoted);
        } else {
            pass.flow.swap_with_parent(promoted);
        }
    }
    if let Some(kept) = remaining.pop()
        && !remaining.is_empty()
    {
        for other in remaining {
            absorb(pass, kept, other);
        }
        pass.set_mutated();
    }
}

/// Removes time-unit nodes whose outputs an ancestor time-unit node already produces.
pub(super) fn remove_duplicate_time_units(pass: &mut Pass<'_>) {
    let mut stack: Vec<(NodeId, FieldSet)> = pass
        .flow
        .roots()
        .into_iter()
        .rev()
        .map(|root| (root, FieldSet::new()))
        .collect();
    while let Some((id, mut seen)) = stack.pop() {
        if !pass.flow.contains(id) {
            continue;
        }
        let children: Vec<NodeId> = pass.flow.children(id).to_vec();
        if let NodeKind::TimeUnit(tu) = pass.flow.kind(id) {
            let produced = tu.produced_fields().unwrap_or_default();
            if !produced.is_empty() && produced.is_subset(&seen) {
                pass.flow.remove(id);
                pass.set_mutated();
            } else {
                seen.extend(produced);
            }
        }
        for child in children.into_iter().rev() {
            stack.push((child, seen.clone()));
        }
    }
}

/// Merges sibling time-unit nodes.
pub(super) fn merge_time_units(pass: &mut Pass<'_>, parent: NodeId) {
    let mut time_units: Vec<NodeId> = pass
        .flow
        .children(parent)
        .iter()
        .copied()
        .filter(|&c| matches!(pass.flow.kind(c), NodeKind::TimeUnit(_)))
        .collect();
    let Some(combined) = time_units.pop() else {
        return;
    };
    for other in time_units {
        absorb(pass, combined, other);
        pass.set_mutated();
    }
}

/// Pulls the coercions sibling parse nodes agree on into one parse node above all siblings.
pub(super) fn merge_parse(pass: &mut Pass<'_>, parent: NodeId) {
    let children: Vec<NodeId> = pass.flow.children(parent).to_vec();
    if children.len() < 2 {
        return;
    }
    let mut common = BTreeMap::new();
    let mut conflicting = BTreeSet::new();
    let mut any_parse = false;
    for &child in &children {
        let NodeKind::Parse(parse) = pass.flow.kind(child) else {
            continue;
        };
        any_parse = true;
        for (field, ty) in &parse.parse {
            match common.get(field) {
                None => {
                    common.insert(field.clone(), ty.clone());
                }
                Some(existing) if existing != ty => {
                    conflicting.insert(field.clone());
                }
                Some(_) => {}
            }
        }
    }
    if !any_parse {
        return;
    }
    common.retain(|field, _| !conflicting.contains(field));
    if common.is_empty() {
        return;
    }

    pass.set_mutated();
    let merged = pass
        .flow
        .add_under(Some(parent), NodeKind::Parse(ParseNode::new(common.clone())));
    for child in children {
        pass.flow.remove_child(parent, child);
        pass.flow.set_parent(child, merged);
        let emptied = match pass.flow.kind_mut(child) {
            NodeKind::Parse(parse) => {
                parse.parse.retain(|field, _| !common.contains_key(field));
                parse.parse.is_empty()
            }
            _ => false,
        };
        if emptied {
            pass.flow.remove(child);
        }
    }
}

/// Merges sibling aggregates that group by the same fields.
pub(super) fn merge_aggregates(pass: &mut Pass<'_>, parent: NodeId) {
    let mut groups: BTreeMap<FieldSet, Vec<NodeId>> = BTreeMap::new();
    for &child in pass.flow.children(parent) {
        if let NodeKind::Aggregate(agg) = pass.flow.kind(child) {
            groups.entry(agg.dimensions.clone()).or_default().push(child);
        }
    }
    for (_, mut group) in groups {
        let Some(merged) = group.pop() else {
            continue;
        };
        for other in group {
            absorb(pass, merged, other);
            pass.set_mutated();
        }
    }
}

/// Collapses siblings with equal content hashes into the first of them.
pub(super) fn merge_identical_nodes(pass: &mut Pass<'_>, parent: NodeId) {
    let children: Vec<NodeId> = pass.flow.children(parent).to_vec();
    let mut index: HashMap<NodeHash, usize> = HashMap::new();
    let mut buckets: Vec<Vec<NodeId>> = Vec::new();
    for child in children {
        let hash = pass.flow.hash(child);
        match index.get(&hash) {
            Some(&i) => buckets[i].push(child),
            None => {
                index.insert(hash, buckets.len());
                buckets.push(alloc::vec![child]);
            }
        }
    }
    for bucket in buckets {
        let Some((&kept, rest)) = bucket.split_first() else {
            continue;
        };
        for &other in rest {
            reparent_into(pass, kept, other);
            pass.set_mutated();
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::string::{String, ToString};
    use alloc::vec;

    use super::*;
    use crate::context::CompileContext;
    use crate::graph::Dataflow;
    use crate::nodes::{
        AggregateNode, BinComponent, BinNode, CalculateNode, FilterNode, OutputNode, SourceNode,
        TimeUnit, TimeUnitComponent, TimeUnitNode,
    };
    use crate::spec::BinParams;

    fn parse(pairs: &[(&str, &str)]) -> NodeKind {
        NodeKind::Parse(ParseNode::new(
            pairs
                .iter()
                .map(|(f, t)| (f.to_string(), t.to_string()))
                .collect(),
        ))
    }

    fn calc(expr: &str, as_: &str) -> NodeKind {
        NodeKind::Calculate(CalculateNode::new(expr.into(), as_.into()))
    }

    fn output(name: &str) -> NodeKind {
        NodeKind::Output(OutputNode::new(name.into(), "main"))
    }

    fn time_unit(unit: &str, field: &str) -> NodeKind {
        NodeKind::TimeUnit(TimeUnitNode::single(TimeUnitComponent {
            field: field.into(),
            as_: alloc::format!("{unit}_{field}"),
            unit: TimeUnit::parse(unit).unwrap(),
        }))
    }

    fn bin(field: &str) -> NodeKind {
        let (key, component) = BinComponent::new(
            BinParams::default(),
            field,
            [alloc::format!("bin_{field}"), alloc::format!("bin_{field}_end")],
            |s: &str| s.to_string(),
        );
        NodeKind::Bin(BinNode::single(key, component))
    }

    fn with_pass<R>(flow: &mut Dataflow, f: impl FnOnce(&mut Pass<'_>) -> R) -> (R, bool) {
        let mut ctx = CompileContext::default();
        let mut pass = Pass {
            flow,
            ctx: &mut ctx,
            name: "test",
            mutated: false,
        };
        let r = f(&mut pass);
        (r, pass.mutated)
    }

    fn source(flow: &mut Dataflow) -> NodeId {
        flow.add(NodeKind::Source(SourceNode::named("table".into())))
    }

    #[test]
    fn parse_moves_above_unrelated_transforms() {
        let mut flow = Dataflow::new();
        let root = source(&mut flow);
        let filter = flow.add_under(Some(root), NodeKind::Filter(FilterNode { expr: "datum.b".into() }));
        let p = flow.add_under(Some(filter), parse(&[("a", "number")]));
        let out = flow.add_under(Some(p), output("main"));

        let (_, mutated) = with_pass(&mut flow, |pass| pass.bottom_up(move_parse_up));
        assert!(mutated, "parse should move");
        assert_eq!(flow.children(root), [p]);
        assert_eq!(flow.children(p), [filter]);
        assert_eq!(flow.children(filter), [out]);
        assert!(flow.check_links());
    }

    #[test]
    fn parse_stays_below_its_producer() {
        let mut flow = Dataflow::new();
        let root = source(&mut flow);
        let c = flow.add_under(Some(root), calc("1", "a"));
        let p = flow.add_under(Some(c), parse(&[("a", "number")]));
        flow.add_under(Some(p), output("main"));

        let (_, mutated) = with_pass(&mut flow, |pass| pass.bottom_up(move_parse_up));
        assert!(!mutated, "a parse of a produced field must not move above its producer");
        assert_eq!(flow.parent(p), Some(c));
    }

    #[test]
    fn sibling_parses_share_common_coercions() {
        let mut flow = Dataflow::new();
        let root = source(&mut flow);
        let a = flow.add_under(Some(root), parse(&[("x", "number"), ("y", "date")]));
        let b = flow.add_under(Some(root), parse(&[("x", "number"), ("y", "string")]));
        flow.add_under(Some(a), output("a"));
        flow.add_under(Some(b), output("b"));

        let (_, mutated) = with_pass(&mut flow, |pass| merge_parse(pass, root));
        assert!(mutated, "common coercions should be merged");
        let [merged] = flow.children(root) else {
            panic!("expected one merged parse");
        };
        let NodeKind::Parse(shared) = flow.kind(*merged) else {
            panic!("expected a parse node");
        };
        assert_eq!(shared.parse.keys().collect::<Vec<_>>(), ["x"]);
        assert_eq!(flow.children(*merged), [a, b]);
        assert!(flow.check_links());
    }

    #[test]
    fn bins_move_above_unrelated_calculations() {
        let mut flow = Dataflow::new();
        let root = source(&mut flow);
        let c = flow.add_under(Some(root), calc("datum.a + 1", "b"));
        let b = flow.add_under(Some(c), bin("x"));
        flow.add_under(Some(b), output("main"));

        let (_, mutated) = with_pass(&mut flow, |pass| merge_bins(pass, c));
        assert!(mutated, "the bin does not read the calculated field");
        assert_eq!(flow.children(root), [b]);
        assert_eq!(flow.children(b), [c]);
        assert!(flow.check_links());
    }

    #[test]
    fn bins_from_transforms_stay_below_earlier_transforms() {
        let mut flow = Dataflow::new();
        let root = source(&mut flow);
        let c = flow.add_under(Some(root), calc("datum.a + 1", "b"));
        let b = flow.add_under(Some(c), bin("x"));
        flow.add_under(Some(b), output("main"));
        flow.set_explicit(c, true);
        flow.set_explicit(b, true);

        let (_, mutated) = with_pass(&mut flow, |pass| merge_bins(pass, c));
        assert!(!mutated, "written order wins");
        assert_eq!(flow.children(root), [c]);
        assert_eq!(flow.children(c), [b]);
    }

    #[test]
    fn duplicate_time_units_are_removed() {
        let mut flow = Dataflow::new();
        let root = source(&mut flow);
        let first = flow.add_under(Some(root), time_unit("year", "date"));
        let second = flow.add_under(Some(first), time_unit("year", "date"));
        let out = flow.add_under(Some(second), output("main"));

        let (_, mutated) = with_pass(&mut flow, remove_duplicate_time_units);
        assert!(mutated, "second time unit repeats the first");
        assert!(!flow.contains(second));
        assert_eq!(flow.children(first), [out]);
    }

    #[test]
    fn aggregates_with_equal_groupby_merge() {
        let mut flow = Dataflow::new();
        let root = source(&mut flow);
        let mut sum = AggregateNode {
            dimensions: ["a".to_string()].into(),
            ..AggregateNode::default()
        };
        sum.add_measure("b", "sum", "sum_b".into());
        let mut mean = sum.clone();
        mean.measures.clear();
        mean.add_measure("b", "mean", "mean_b".into());
        let s = flow.add_under(Some(root), NodeKind::Aggregate(sum));
        let m = flow.add_under(Some(root), NodeKind::Aggregate(mean));
        let out_s = flow.add_under(Some(s), output("sum"));
        let out_m = flow.add_under(Some(m), output("mean"));

        let (_, mutated) = with_pass(&mut flow, |pass| merge_aggregates(pass, root));
        assert!(mutated, "equal groupby should merge");
        assert_eq!(flow.children(root), [m]);
        assert_eq!(flow.children(m), [out_m, out_s]);
        let NodeKind::Aggregate(merged) = flow.kind(m) else {
            panic!("expected an aggregate");
        };
        let fields: Vec<String> = merged.produced_fields().unwrap().into_iter().collect();
        assert_eq!(fields, ["mean_b", "sum_b"]);
    }

    #[test]
    fn identical_siblings_keep_the_first() {
        let mut flow = Dataflow::new();
        let root = source(&mut flow);
        let a = flow.add_under(Some(root), calc("datum.x + 1", "y"));
        let b = flow.add_under(Some(root), calc("datum.x + 1", "y"));
        let c = flow.add_under(Some(root), calc("datum.x + 2", "y"));
        let oa = flow.add_under(Some(a), output("a"));
        let ob = flow.add_under(Some(b), output("b"));
        flow.add_under(Some(c), output("c"));

        let (_, mutated) = with_pass(&mut flow, |pass| merge_identical_nodes(pass, root));
        assert!(mutated, "a and b are identical");
        assert_eq!(flow.children(root), [a, c]);
        assert_eq!(flow.children(a), vec![oa, ob]);
    }

    #[test]
    fn unused_leaves_are_pruned_up_to_an_anchor() {
        let mut flow = Dataflow::new();
        let root = source(&mut flow);
        let out = flow.add_under(Some(root), output("main"));
        let c = flow.add_under(Some(out), calc("1", "a"));
        flow.add_under(Some(c), calc("2", "b"));

        let (_, mutated) = with_pass(&mut flow, |pass| pass.bottom_up(remove_unused_subtree));
        assert!(mutated, "dangling calculations should go");
        assert_eq!(flow.ids().collect::<Vec<_>>(), [root, out]);
    }
}
