// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linearizes the optimized data flow into named datasets.
//!
//! A depth-first walk carries one dataset under construction. Transform nodes append to it.
//! The dataset is flushed, and a new one chained to it, after URL and named sources, at output
//! anchors and at forks. Inline values keep their transforms. A parse that is the only child of
//! a loaded source becomes that source's `format.parse`. Facet nodes end the walk: their helper
//! datasets join the top level and their subtree is assembled into the facet's own scope.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde_json::Value;

use crate::builder::DataComponent;
use crate::context::CompileContext;
use crate::graph::{Dataflow, NodeId};
use crate::nodes::{FlowNode, NodeKind};
use crate::spec::DataKind;
use crate::vega::{AssembledData, Dataset, FacetData, Format, VgTransform};

fn chained(source: String) -> Dataset {
    Dataset {
        source: Some(source),
        ..Dataset::default()
    }
}

/// True when a dataset only forwards its source.
fn is_alias(ds: &Dataset) -> bool {
    ds.source.is_some() && ds.transform.is_empty()
}

struct Walker<'a> {
    flow: &'a Dataflow,
    ctx: &'a mut CompileContext,
    resolved: &'a mut BTreeMap<String, String>,
    facets: &'a mut Vec<FacetData>,
    out: Vec<Dataset>,
    index: usize,
}

impl Walker<'_> {
    fn ensure_name(&mut self, ds: &mut Dataset) -> String {
        if ds.name.is_empty() {
            ds.name = format!("data_{}", self.index);
            self.index += 1;
        }
        ds.name.clone()
    }

    /// The dataset that loads the rows `ds` continues from: `ds` itself, or the source dataset
    /// flushed right before it.
    fn loading_dataset<'d>(&'d mut self, ds: &'d mut Dataset) -> Option<&'d mut Dataset> {
        if ds.source.is_none() {
            return Some(ds);
        }
        if !ds.transform.is_empty() {
            return None;
        }
        let source = ds.source.as_deref()?;
        self.out.iter_mut().rev().find(|d| d.name == source)
    }

    fn walk(&mut self, id: NodeId, mut ds: Dataset) {
        let flow = self.flow;
        let kind = flow.kind(id);
        match kind {
            NodeKind::Source(src) => {
                // Referenced data gets its own dataset so the runtime never rewrites it.
                if matches!(src.kind, DataKind::Url | DataKind::Named) {
                    let name = self.ensure_name(&mut ds);
                    self.out.push(ds);
                    ds = chained(name);
                }
            }
            NodeKind::Parse(parse) => {
                let fields = parse.format_parse();
                // Only a sole child may write the source's format; siblings would overwrite it.
                let loaded_here = flow.parent(id).is_some_and(|p| {
                    flow.num_children(p) == 1
                        && matches!(
                            flow.kind(p),
                            NodeKind::Source(src) if !src.is_generator() && src.kind != DataKind::Named
                        )
                });
                let root = if loaded_here && !fields.is_empty() {
                    self.loading_dataset(&mut ds)
                } else {
                    None
                };
                match root {
                    Some(root) => {
                        let format = root.format.get_or_insert_with(Format::default);
                        format.parse.get_or_insert_with(BTreeMap::new).extend(fields);
                        parse.assemble_formulas(self.ctx, true, &mut ds.transform);
                    }
                    None => parse.assemble(self.ctx, &mut ds.transform),
                }
            }
            NodeKind::Facet(facet) => {
                let name = self.ensure_name(&mut ds);
                let data = if is_alias(&ds) {
                    ds.source.clone().unwrap_or(name)
                } else {
                    self.out.push(ds);
                    name
                };
                for helper in facet.assemble_helpers(&data) {
                    self.resolved.insert(helper.name.clone(), helper.name.clone());
                    self.out.push(helper);
                }
                self.resolved.insert(facet.name.clone(), facet.name.clone());

                let mut scope = Walker {
                    flow,
                    ctx: &mut *self.ctx,
                    resolved: &mut *self.resolved,
                    facets: &mut *self.facets,
                    out: Vec::new(),
                    index: self.index,
                };
                for &child in flow.children(id) {
                    scope.walk(child, chained(facet.name.clone()));
                }
                let datasets = scope.out;
                self.index = scope.index;
                self.facets.push(FacetData {
                    name: facet.name.clone(),
                    data,
                    groupby: facet.fields(),
                    datasets,
                });
                return;
            }
            NodeKind::Output(output) => {
                if is_alias(&ds) {
                    let source = ds.source.clone().unwrap_or_default();
                    self.resolved.insert(output.name.clone(), source);
                } else {
                    let name = self.ensure_name(&mut ds);
                    self.resolved.insert(output.name.clone(), name.clone());
                    if flow.num_children(id) == 1 {
                        self.out.push(ds);
                        ds = chained(name);
                    }
                }
            }
            other => other.assemble(self.ctx, &mut ds.transform),
        }

        match flow.children(id) {
            [] => {
                if matches!(kind, NodeKind::Output(_)) && !is_alias(&ds) {
                    self.out.push(ds);
                }
            }
            [child] => self.walk(*child, ds),
            children => {
                let name = self.ensure_name(&mut ds);
                let source = if is_alias(&ds) {
                    ds.source.clone().unwrap_or(name)
                } else {
                    self.out.push(ds);
                    name
                };
                for &child in children {
                    self.walk(child, chained(source.clone()));
                }
            }
        }
    }
}

fn resolve_lookups(datasets: &mut [Dataset], resolved: &BTreeMap<String, String>) {
    for ds in datasets {
        for t in &mut ds.transform {
            if let VgTransform::Lookup { from, .. } = t
                && let Some(name) = resolved.get(from.as_str())
            {
                from.clone_from(name);
            }
        }
    }
}

/// Assembles the optimized data flow.
///
/// `datasets` holds named inline datasets; a root dataset with a matching name receives their
/// values. Records the dataset every anchor resolved to in `data`.
pub fn assemble(
    data: &mut DataComponent,
    ctx: &mut CompileContext,
    datasets: &BTreeMap<String, Value>,
) -> AssembledData {
    let mut resolved = BTreeMap::new();
    let mut facets = Vec::new();
    let mut walker = Walker {
        flow: &data.flow,
        ctx,
        resolved: &mut resolved,
        facets: &mut facets,
        out: Vec::new(),
        index: 0,
    };
    let mut source_index = 0;
    for root in data.flow.roots() {
        let root_data = match data.flow.kind(root) {
            NodeKind::Source(src) => {
                let name = src.name.clone().unwrap_or_else(|| {
                    let name = format!("source_{source_index}");
                    source_index += 1;
                    name
                });
                src.root_dataset(name)
            }
            _ => Dataset::default(),
        };
        walker.walk(root, root_data);
    }
    // Sources without transforms go first so lookups can refer to them.
    let (mut out, rest): (Vec<Dataset>, Vec<Dataset>) = walker
        .out
        .into_iter()
        .partition(|d| d.transform.is_empty() && d.source.is_none());
    out.extend(rest);

    resolve_lookups(&mut out, &resolved);
    for facet in &mut facets {
        resolve_lookups(&mut facet.datasets, &resolved);
    }
    for ds in &mut out {
        if let Some(values) = datasets.get(&ds.name) {
            ds.values = Some(values.clone());
        }
    }

    for (anchor, dataset) in resolved {
        data.set_resolved(anchor, dataset);
    }
    AssembledData { data: out, facets }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::string::ToString;

    use serde_json::json;

    use super::*;
    use crate::nodes::{CalculateNode, OutputNode, ParseNode, SourceNode};
    use crate::spec::DataSpec;

    fn url_source(flow: &mut Dataflow) -> NodeId {
        let spec: DataSpec = serde_json::from_value(json!({"url": "data/cars.json"})).unwrap();
        flow.add(NodeKind::Source(SourceNode::from_data(&spec)))
    }

    fn output(name: &str) -> NodeKind {
        NodeKind::Output(OutputNode::new(name.to_string(), "main"))
    }

    #[test]
    fn parse_under_url_source_becomes_format_parse() {
        let mut data = DataComponent::default();
        let mut ctx = CompileContext::default();
        ctx.request_data_name("main");
        let root = url_source(&mut data.flow);
        let parse = data.flow.add_under(
            Some(root),
            NodeKind::Parse(ParseNode::new(BTreeMap::from([
                ("Year".to_string(), "date".to_string()),
                ("a.b".to_string(), "number".to_string()),
            ]))),
        );
        data.flow.add_under(Some(parse), output("main"));

        let assembled = assemble(&mut data, &mut ctx, &BTreeMap::new());
        assert_eq!(
            serde_json::to_value(&assembled.data).unwrap(),
            json!([
                {
                    "name": "source_0",
                    "url": "data/cars.json",
                    "format": {"type": "json", "parse": {"Year": "date"}}
                },
                {
                    "name": "data_0",
                    "source": "source_0",
                    "transform": [{"type": "formula", "expr": "toNumber(datum[\"a\"] && datum[\"a\"][\"b\"])", "as": "a.b"}]
                }
            ])
        );
        assert_eq!(data.lookup_data_source("main"), Some("data_0"));
    }

    #[test]
    fn parses_under_a_forked_source_stay_in_their_branch() {
        let mut data = DataComponent::default();
        let mut ctx = CompileContext::default();
        ctx.request_data_name("dates");
        ctx.request_data_name("numbers");
        let root = url_source(&mut data.flow);
        for (ty, name) in [("date", "dates"), ("number", "numbers")] {
            let parse = data.flow.add_under(
                Some(root),
                NodeKind::Parse(ParseNode::new(BTreeMap::from([(
                    "Year".to_string(),
                    ty.to_string(),
                )]))),
            );
            data.flow.add_under(Some(parse), output(name));
        }

        let assembled = assemble(&mut data, &mut ctx, &BTreeMap::new());
        assert!(assembled.data[0].format.as_ref().is_some_and(|f| f.parse.is_none()));
        let dates = data.lookup_data_source("dates").unwrap();
        let numbers = data.lookup_data_source("numbers").unwrap();
        assert_ne!(dates, numbers);
        let transforms = |name: &str| {
            let ds = assembled.data.iter().find(|d| d.name == name).unwrap();
            serde_json::to_value(&ds.transform).unwrap()
        };
        assert_eq!(
            transforms(dates),
            json!([{"type": "formula", "expr": "toDate(datum[\"Year\"])", "as": "Year"}])
        );
        assert_eq!(
            transforms(numbers),
            json!([{"type": "formula", "expr": "toNumber(datum[\"Year\"])", "as": "Year"}])
        );
    }

    #[test]
    fn inline_values_keep_their_transforms() {
        let mut data = DataComponent::default();
        let mut ctx = CompileContext::default();
        ctx.request_data_name("main");
        let spec: DataSpec = serde_json::from_value(json!({"values": [{"a": "1"}]})).unwrap();
        let root = data.flow.add(NodeKind::Source(SourceNode::from_data(&spec)));
        let parse = data.flow.add_under(
            Some(root),
            NodeKind::Parse(ParseNode::new(BTreeMap::from([(
                "a".to_string(),
                "number".to_string(),
            )]))),
        );
        data.flow.add_under(Some(parse), output("main"));

        let assembled = assemble(&mut data, &mut ctx, &BTreeMap::new());
        let [ds] = &assembled.data[..] else {
            panic!("expected one dataset, found {:?}", assembled.data);
        };
        assert_eq!(ds.name, "source_0");
        assert!(ds.transform.is_empty(), "the parse moved into the format");
        assert_eq!(
            ds.format.as_ref().and_then(|f| f.parse.as_ref()),
            Some(&BTreeMap::from([("a".to_string(), "number".to_string())]))
        );
        assert_eq!(data.lookup_data_source("main"), Some("source_0"));
    }

    #[test]
    fn named_source_is_flushed_before_transforms() {
        let mut data = DataComponent::default();
        let mut ctx = CompileContext::default();
        let root = data
            .flow
            .add(NodeKind::Source(SourceNode::named("table".into())));
        let calc = data.flow.add_under(
            Some(root),
            NodeKind::Calculate(CalculateNode::new("1".into(), "one".into())),
        );
        data.flow.add_under(Some(calc), output("main"));

        let inline = BTreeMap::from([("table".to_string(), json!([{"a": 1}]))]);
        let assembled = assemble(&mut data, &mut ctx, &inline);
        assert_eq!(
            serde_json::to_value(&assembled.data).unwrap(),
            json!([
                {"name": "table", "values": [{"a": 1}]},
                {
                    "name": "data_0",
                    "source": "table",
                    "transform": [{"type": "formula", "expr": "1", "as": "one"}]
                }
            ])
        );
    }

    #[test]
    fn forks_chain_from_a_shared_dataset() {
        let mut data = DataComponent::default();
        let mut ctx = CompileContext::default();
        let root = url_source(&mut data.flow);
        let calc = data.flow.add_under(
            Some(root),
            NodeKind::Calculate(CalculateNode::new("1".into(), "one".into())),
        );
        data.flow.add_under(Some(calc), output("left"));
        data.flow.add_under(Some(calc), output("right"));

        let assembled = assemble(&mut data, &mut ctx, &BTreeMap::new());
        let names: Vec<(&str, Option<&str>)> = assembled
            .data
            .iter()
            .map(|d| (d.name.as_str(), d.source.as_deref()))
            .collect();
        assert_eq!(names, [("source_0", None), ("data_0", Some("source_0"))]);
        // Both anchors alias the fork point.
        assert_eq!(data.lookup_data_source("left"), Some("data_0"));
        assert_eq!(data.lookup_data_source("right"), Some("data_0"));
    }
}
