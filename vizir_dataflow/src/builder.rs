// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Builds the data flow of a view tree.
//!
//! Each view threads a `head` pointer through a fixed sequence of insertion points: source,
//! generator, explicit parse, identifier, transforms, implicit parse, geometry, encoding bins
//! and time units, the `raw` anchor, aggregation, imputation and stacking, the invalid-value
//! filter, the `main` anchor, and for facets the facet node. Child views continue from their
//! parent's facet node or `main` anchor.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::config::InvalidValues;
use crate::context::CompileContext;
use crate::error::{CompileError, Warning};
use crate::field::access_path_depth;
use crate::graph::{Dataflow, NodeId};
use crate::nodes::{
    AggregateNode, AncestorParse, BinComponent, BinNode, COUNT_FIELD, CalculateNode,
    DensityNode, ExtentNode, FacetChannel, FacetNode, FacetSort, FilterInvalidNode, FilterNode,
    FlattenNode, FlowNode, FoldNode, GeoJsonNode, GeoPointNode, GraticuleNode, IdentifierNode,
    ImputeNode, JoinAggregateNode, LoessNode, LookupNode, NodeKind, OutputNode, ParseNode,
    PivotNode, QuantileNode, RegressionNode, SampleNode, SequenceNode, SourceNode, StackNode,
    TimeUnit, TimeUnitComponent, TimeUnitNode, WindowNode, implicit_parse, predicate_expr,
    selection_store, sort_index_field,
};
use crate::spec::{
    Channel, DataKind, DataSpec, FacetSpec, FieldDef, FieldOp, FieldType, LookupTransform,
    OneOrMany, ParseSetting, SortKey, SortSpec, StackSetting, TransformSpec, ViewKind, ViewSpec,
};

/// Prefixes `s` with a view name, unless the view is unnamed.
pub fn get_name(view: &str, s: &str) -> String {
    if view.is_empty() {
        String::from(s)
    } else {
        format!("{view}_{s}")
    }
}

/// Anchors of one view, and of its children.
#[derive(Debug, Clone, Default)]
pub struct ViewData {
    /// Name prefix of the view; empty for an unnamed top-level view.
    pub name: String,
    /// The `raw` anchor (before aggregation).
    pub raw: Option<NodeId>,
    /// The `main` anchor.
    pub main: Option<NodeId>,
    /// Facet node of a facet view.
    pub facet: Option<NodeId>,
    /// Child views in declaration order.
    pub children: Vec<ViewData>,
}

impl ViewData {
    /// A name scoped to this view.
    pub fn get_name(&self, s: &str) -> String {
        get_name(&self.name, s)
    }

    /// Name of the `raw`, `main` or `facet` dataset of this view.
    pub fn data_name(&self, kind: &str) -> String {
        self.get_name(kind)
    }
}

/// The data flow of a compile and the anchors that name its datasets.
#[derive(Debug, Clone, Default)]
pub struct DataComponent {
    /// The graph.
    pub flow: Dataflow,
    /// Anchors of the top-level view.
    pub view: ViewData,
    outputs: BTreeMap<String, NodeId>,
    facet_mains: BTreeMap<NodeId, NodeId>,
    resolved: BTreeMap<String, String>,
}

impl DataComponent {
    /// The output anchor registered under `name`.
    pub fn output_node(&self, name: &str) -> Option<NodeId> {
        self.outputs
            .get(name)
            .copied()
            .filter(|&id| self.flow.contains(id))
    }

    /// Registers an output anchor.
    pub fn register_output(&mut self, name: String, id: NodeId) {
        self.outputs.insert(name, id);
    }

    /// The `main` anchor of the facet view a facet node belongs to.
    pub fn facet_main(&self, facet: NodeId) -> Option<NodeId> {
        self.facet_mains.get(&facet).copied()
    }

    /// Records the dataset an anchor ended up as.
    pub fn set_resolved(&mut self, anchor: String, dataset: String) {
        self.resolved.insert(anchor, dataset);
    }

    /// The final dataset name behind an anchor name such as `main` or `lookup_0`, once
    /// assembled. Aliased anchors resolve to the dataset they alias.
    pub fn lookup_data_source(&self, name: &str) -> Option<&str> {
        self.resolved.get(name).map(String::as_str)
    }
}

/// Builds the data flow for `spec` and its children.
pub fn build(ctx: &mut CompileContext, spec: &ViewSpec) -> Result<DataComponent, CompileError> {
    spec.for_each_param(&mut |p| ctx.declare_param(&p.name, p.is_selection()));
    let mut parse = AncestorParse::default();
    if ctx.config.parse_disabled {
        parse.parse_nothing = true;
    }
    let mut builder = Builder {
        ctx,
        out: DataComponent::default(),
        sources: Vec::new(),
        lookups: 0,
    };
    let scope = Scope {
        name: spec.name.clone().unwrap_or_default(),
        head: None,
        parse,
        in_layer: false,
        has_identifier: false,
    };
    let view = builder.view(spec, scope)?;
    builder.out.view = view;
    Ok(builder.out)
}

/// What a view inherits from its parent.
struct Scope {
    name: String,
    head: Option<NodeId>,
    parse: AncestorParse,
    in_layer: bool,
    has_identifier: bool,
}

struct Builder<'c> {
    ctx: &'c mut CompileContext,
    out: DataComponent,
    sources: Vec<NodeId>,
    lookups: usize,
}

fn resolved_type(ctx: &mut CompileContext, channel: Channel, def: &FieldDef) -> FieldType {
    let fallback = def.default_type(channel);
    match def.field_type.as_deref() {
        None => fallback,
        Some(found) => FieldType::parse(found).unwrap_or_else(|| {
            ctx.warn(
                "encoding",
                Warning::UnknownFieldType {
                    field: def.field.clone().unwrap_or_default(),
                    found: found.into(),
                    fallback: fallback.name(),
                },
            );
            fallback
        }),
    }
}

impl Builder<'_> {
    fn add(&mut self, head: NodeId, kind: NodeKind) -> NodeId {
        self.out.flow.add_under(Some(head), kind)
    }

    fn add_parse(
        &mut self,
        head: NodeId,
        parse: &mut AncestorParse,
        explicit: BTreeMap<String, String>,
        implicit: BTreeMap<String, String>,
    ) -> NodeId {
        match parse.resolve(self.ctx, explicit, implicit) {
            Some(fields) => self.add(head, NodeKind::Parse(ParseNode::new(fields))),
            None => head,
        }
    }

    fn add_output(&mut self, head: NodeId, name: String, kind: &'static str) -> NodeId {
        self.ctx.register_anchor(&name);
        let id = self.add(head, NodeKind::Output(OutputNode::new(name.clone(), kind)));
        self.out.flow.set_debug_name(id, name.clone());
        self.out.register_output(name, id);
        id
    }

    /// Finds a source serving `data`, or creates one as a new root.
    fn source(&mut self, data: &DataSpec) -> NodeId {
        let existing = self.sources.iter().copied().find(|&id| {
            matches!(self.out.flow.kind(id), NodeKind::Source(s) if s.matches(data))
        });
        if let Some(id) = existing {
            return id;
        }
        let id = self.out.flow.add(NodeKind::Source(SourceNode::from_data(data)));
        if let Some(name) = &data.name {
            self.out.flow.set_debug_name(id, name.clone());
        }
        self.sources.push(id);
        id
    }

    fn view(&mut self, spec: &ViewSpec, scope: Scope) -> Result<ViewData, CompileError> {
        let Scope {
            name,
            head: parent_head,
            parse: inherited,
            in_layer,
            mut has_identifier,
        } = scope;
        let mut data = ViewData {
            name,
            ..ViewData::default()
        };
        let get = |s: &str| get_name(&data.name, s);

        // Source and generator.
        let new_data = spec.data.as_ref().is_some_and(|d| d.kind() != DataKind::Named);
        let mut parse = if new_data {
            let mut fresh = AncestorParse::default();
            fresh.parse_nothing = self.ctx.config.parse_disabled;
            fresh
        } else {
            inherited
        };
        let mut head = match (&spec.data, parent_head) {
            (Some(d), _) => self.source(d),
            (None, Some(h)) => h,
            (None, None) => self.source(&DataSpec {
                name: Some(String::from("source")),
                ..DataSpec::default()
            }),
        };
        if let Some(d) = &spec.data {
            if let Some(params) = &d.sequence {
                head = self.add(head, NodeKind::Sequence(SequenceNode { params: params.clone() }));
                parse.parse_nothing = true;
            } else if let Some(graticule) = &d.graticule {
                head = self.add(head, NodeKind::Graticule(GraticuleNode::new(graticule)));
                parse.parse_nothing = true;
            } else if d.is_generator() {
                parse.parse_nothing = true;
            }
            match d.parse() {
                ParseSetting::Disabled => parse.parse_nothing = true,
                ParseSetting::Fields(fields) => {
                    head = self.add_parse(head, &mut parse, fields.clone(), BTreeMap::new());
                }
                ParseSetting::Absent => {}
            }
        }

        if !has_identifier && spec.requires_selection_id() {
            head = self.add(head, NodeKind::Identifier(IdentifierNode));
            has_identifier = true;
        }

        let kind = spec.kind();
        let has_encoding = matches!(kind, ViewKind::Unit | ViewKind::Facet);
        if has_encoding && in_layer {
            head = self.encoding_bins(head, spec, &data.name);
        }

        for (index, value) in spec.transform.iter().enumerate() {
            match TransformSpec::from_value(value) {
                Ok(t) => head = self.transform(head, &t, &mut parse, &data.name)?,
                Err(reason) => {
                    self.ctx
                        .warn("transform", Warning::MalformedTransform { index, reason });
                }
            }
        }

        let implicit = self.implicit_encoding_parse(spec);
        head = self.add_parse(head, &mut parse, BTreeMap::new(), implicit);

        if kind == ViewKind::Unit {
            head = self.geometry(head, spec, &data.name);
        }
        if has_encoding {
            if !in_layer {
                head = self.encoding_bins(head, spec, &data.name);
            }
            head = self.encoding_time_units(head, spec);
            head = self.sort_index(head, &spec.encoding);
        }

        let raw = self.add_output(head, get("raw"), "raw");
        data.raw = Some(raw);
        head = raw;

        if kind == ViewKind::Unit {
            if let Some(aggregate) = self.encoding_aggregate(spec, &data.name) {
                head = self.add(head, NodeKind::Aggregate(aggregate));
                if spec.requires_selection_id() {
                    head = self.add(head, NodeKind::Identifier(IdentifierNode));
                }
            }
            if let Some(impute) = self.encoding_impute(spec) {
                head = self.add(head, NodeKind::Impute(impute));
            }
            if let Some(stack) = self.encoding_stack(spec) {
                head = self.add(head, NodeKind::Stack(stack));
            }
            if let Some(filter) = self.invalid_filter(spec) {
                head = self.add(head, NodeKind::FilterInvalid(filter));
            }
        }

        let main_name = get("main");
        let main = self.add_output(head, main_name.clone(), "main");
        data.main = Some(main);
        head = main;
        if kind == ViewKind::Unit {
            // Marks of a unit view read its main dataset.
            self.ctx.request_data_name(&main_name);
        }

        if kind == ViewKind::Facet
            && let Some(facet) = &spec.facet
        {
            let id = self.facet(head, spec, facet, &data.name, &main_name);
            data.facet = Some(id);
        }

        let child_head = data.facet.or(data.main);
        let children = spec.children();
        for (i, child) in children.iter().enumerate() {
            let suffix = match kind {
                ViewKind::Layer => format!("layer_{i}"),
                ViewKind::Concat => format!("concat_{i}"),
                _ => String::from("child"),
            };
            let name = child
                .name
                .clone()
                .unwrap_or_else(|| get_name(&data.name, &suffix));
            let scope = Scope {
                name,
                head: child_head,
                parse: parse.clone(),
                in_layer: kind == ViewKind::Layer,
                has_identifier,
            };
            let child_data = self.view(child, scope)?;
            data.children.push(child_data);
        }
        Ok(data)
    }

    fn transform(
        &mut self,
        head: NodeId,
        t: &TransformSpec,
        parse: &mut AncestorParse,
        view: &str,
    ) -> Result<NodeId, CompileError> {
        let mut head = head;
        let kind = match t {
            TransformSpec::Filter(f) => {
                head = self.add_parse(head, parse, BTreeMap::new(), implicit_parse(&f.filter));
                match predicate_expr(self.ctx, &f.filter) {
                    Ok(expr) => NodeKind::Filter(FilterNode { expr }),
                    Err(warning) => {
                        self.ctx.warn("filter", warning);
                        return Ok(head);
                    }
                }
            }
            TransformSpec::Calculate(c) => {
                NodeKind::Calculate(CalculateNode::new(c.calculate.clone(), c.as_.clone()))
            }
            TransformSpec::Bin(b) => {
                let Some(params) = b.bin.params(Channel::Other) else {
                    return Ok(head);
                };
                let as_ = match &b.as_ {
                    OneOrMany::One(start) => [start.clone(), format!("{start}_end")],
                    OneOrMany::Many(names) => match names.as_slice() {
                        [start, end, ..] => [start.clone(), end.clone()],
                        [start] => [start.clone(), format!("{start}_end")],
                        [] => {
                            let key = crate::nodes::bin_key(&params, &b.field);
                            [key.clone(), format!("{key}_end")]
                        }
                    },
                };
                let (key, component) =
                    BinComponent::new(params, &b.field, as_, |s| get_name(view, s));
                NodeKind::Bin(BinNode::single(key, component))
            }
            TransformSpec::TimeUnit(tu) => {
                let Some(unit) = TimeUnit::parse(&tu.time_unit) else {
                    self.ctx.warn(
                        "timeUnit",
                        Warning::UnknownTimeUnit {
                            unit: tu.time_unit.clone(),
                        },
                    );
                    return Ok(head);
                };
                let date = BTreeMap::from([(tu.field.clone(), String::from("date"))]);
                head = self.add_parse(head, parse, BTreeMap::new(), date);
                NodeKind::TimeUnit(TimeUnitNode::single(TimeUnitComponent {
                    field: tu.field.clone(),
                    as_: tu.as_.clone(),
                    unit,
                }))
            }
            TransformSpec::Aggregate(a) => {
                let mut node = AggregateNode {
                    dimensions: a.groupby.iter().cloned().collect(),
                    ..AggregateNode::default()
                };
                for op in &a.aggregate {
                    let field = op.field.as_deref().unwrap_or(COUNT_FIELD);
                    node.add_measure(field, &op.op, op.output_name());
                }
                NodeKind::Aggregate(node)
            }
            TransformSpec::Window(w) => NodeKind::Window(WindowNode {
                ops: w.window.clone(),
                frame: w.frame,
                ignore_peers: w.ignore_peers,
                groupby: w.groupby.clone(),
                sort: w.sort.clone(),
            }),
            TransformSpec::JoinAggregate(j) => NodeKind::JoinAggregate(JoinAggregateNode {
                ops: j.joinaggregate.clone(),
                groupby: j.groupby.clone(),
            }),
            TransformSpec::Stack(s) => {
                let as_ = match s.as_.to_vec().as_slice() {
                    [start, end, ..] => [start.clone(), end.clone()],
                    [start] => [start.clone(), format!("{start}_end")],
                    [] => [format!("{}_start", s.stack), format!("{}_end", s.stack)],
                };
                NodeKind::Stack(StackNode {
                    field: s.stack.clone(),
                    groupby: s.groupby.clone(),
                    sort: s.sort.clone(),
                    offset: s.offset.clone().unwrap_or_else(|| "zero".into()),
                    as_,
                })
            }
            TransformSpec::Impute(i) => NodeKind::Impute(ImputeNode {
                field: i.impute.clone(),
                key: i.key.clone(),
                keyvals: i.params.keyvals.clone(),
                method: i.params.method.clone().unwrap_or_else(|| "value".into()),
                value: i.params.value.clone(),
                frame: i.params.frame.unwrap_or([None, None]),
                groupby: i.groupby.clone(),
            }),
            TransformSpec::Lookup(l) => NodeKind::Lookup(self.lookup(l, view)?),
            TransformSpec::Fold(f) => NodeKind::Fold(FoldNode {
                fields: f.fold.clone(),
                as_: f
                    .as_
                    .clone()
                    .unwrap_or_else(|| ["key".into(), "value".into()]),
            }),
            TransformSpec::Flatten(f) => NodeKind::Flatten(FlattenNode::new(
                f.flatten.clone(),
                f.as_.clone().unwrap_or_default(),
            )),
            TransformSpec::Pivot(p) => NodeKind::Pivot(PivotNode {
                field: p.pivot.clone(),
                value: p.value.clone(),
                groupby: p.groupby.clone(),
                limit: p.limit,
                op: p.op.clone(),
            }),
            TransformSpec::Sample(s) => NodeKind::Sample(SampleNode { size: s.sample }),
            TransformSpec::Density(d) => NodeKind::Density(DensityNode::new(d)),
            TransformSpec::Regression(r) => NodeKind::Regression(RegressionNode::new(r)),
            TransformSpec::Loess(l) => NodeKind::Loess(LoessNode::new(l)),
            TransformSpec::Quantile(q) => NodeKind::Quantile(QuantileNode::new(q)),
            TransformSpec::Extent(e) => NodeKind::Extent(ExtentNode {
                field: e.extent.clone(),
                signal: e.param.clone(),
            }),
        };
        if let Some(produced) = kind.produced_fields() {
            parse.mark_derived(&produced);
        }
        let id = self.add(head, kind);
        self.out.flow.set_explicit(id, true);
        self.out.flow.set_debug_name(id, t.name());
        Ok(id)
    }

    fn lookup(&mut self, l: &LookupTransform, view: &str) -> Result<LookupNode, CompileError> {
        let Some(key) = l.from.key.clone() else {
            return Err(CompileError::MissingField {
                transform: "lookup",
                field: "key",
            });
        };
        let mut as_ = l.as_.as_ref().map(OneOrMany::to_vec).unwrap_or_default();
        let from = if let Some(data) = &l.from.data {
            let mut head = self.source(data);
            if let ParseSetting::Fields(fields) = data.parse() {
                let mut parse = AncestorParse::default();
                head = self.add_parse(head, &mut parse, fields.clone(), BTreeMap::new());
            }
            let name = get_name(view, &format!("lookup_{}", self.lookups));
            self.lookups += 1;
            self.add_output(head, name.clone(), "lookup");
            self.ctx.request_data_name(&name)
        } else if let Some(param) = &l.from.param {
            if !self.ctx.is_selection(param) {
                self.ctx.warn(
                    "lookup",
                    Warning::UnresolvedSelection {
                        param: param.clone(),
                    },
                );
            }
            if as_.is_empty() {
                as_.push(param.clone());
            }
            selection_store(param)
        } else {
            return Err(CompileError::MissingField {
                transform: "lookup",
                field: "from",
            });
        };
        if l.from.fields.is_none() && as_.is_empty() {
            self.ctx.warn(
                "lookup",
                Warning::LookupNeedsAs {
                    lookup: l.lookup.clone(),
                },
            );
            as_.push(String::from("_lookup"));
        }
        Ok(LookupNode {
            lookup: l.lookup.clone(),
            from,
            key,
            fields: l.from.fields.clone(),
            as_,
            default: l.default.clone(),
        })
    }

    fn implicit_encoding_parse(&mut self, spec: &ViewSpec) -> BTreeMap<String, String> {
        let mut implicit = BTreeMap::new();
        let channels = spec
            .encoding
            .iter()
            .map(|(c, d)| (*c, d))
            .chain(spec.facet.iter().flat_map(FacetSpec::channels));
        for (channel, def) in channels {
            let Some(field) = &def.field else {
                continue;
            };
            let ty = resolved_type(self.ctx, channel, def);
            if ty == FieldType::Temporal || def.time_unit.is_some() {
                implicit.insert(field.clone(), String::from("date"));
            } else if ty == FieldType::Quantitative
                && matches!(def.aggregate.as_deref(), Some("min" | "max"))
            {
                implicit.insert(field.clone(), String::from("number"));
            } else if access_path_depth(field) > 1 {
                implicit
                    .entry(field.clone())
                    .or_insert_with(|| String::from("flatten"));
            }
        }
        implicit
    }

    fn geometry(&mut self, mut head: NodeId, spec: &ViewSpec, view: &str) -> NodeId {
        let field = |c: Channel| spec.encoding.get(&c).and_then(|d| d.field.clone());
        let pairs = [
            (Channel::Longitude, Channel::Latitude, "x", "y"),
            (Channel::Longitude2, Channel::Latitude2, "x2", "y2"),
        ];
        if spec.mark_type() == Some("geoshape") {
            let mut counter = 0;
            for (lon, lat, _, _) in pairs {
                if let (Some(lon), Some(lat)) = (field(lon), field(lat)) {
                    let signal = get_name(view, &format!("geojson_{counter}"));
                    counter += 1;
                    head = self.add(
                        head,
                        NodeKind::GeoJson(GeoJsonNode {
                            fields: Some([lon, lat]),
                            geojson: None,
                            signal,
                        }),
                    );
                }
            }
            if let Some(def) = spec.encoding.get(&Channel::Shape)
                && let Some(shape) = &def.field
                && def.field_type.as_deref() == Some("geojson")
            {
                let signal = get_name(view, &format!("geojson_{counter}"));
                head = self.add(
                    head,
                    NodeKind::GeoJson(GeoJsonNode {
                        fields: None,
                        geojson: Some(shape.clone()),
                        signal,
                    }),
                );
            }
            return head;
        }
        for (lon, lat, x, y) in pairs {
            if let (Some(lon), Some(lat)) = (field(lon), field(lat)) {
                head = self.add(
                    head,
                    NodeKind::GeoPoint(GeoPointNode {
                        projection: get_name(view, "projection"),
                        fields: [lon, lat],
                        as_: [get_name(view, x), get_name(view, y)],
                    }),
                );
            }
        }
        head
    }

    fn encoding_bins(&mut self, head: NodeId, spec: &ViewSpec, view: &str) -> NodeId {
        let mut node: Option<BinNode> = None;
        for (&channel, def) in &spec.encoding {
            let (Some(field), Some(params), None) =
                (&def.field, def.bin_params(channel), &def.aggregate)
            else {
                continue;
            };
            let (Some(start), Some(end)) =
                (def.output_field(channel, ""), def.output_field(channel, "_end"))
            else {
                continue;
            };
            let (key, component) =
                BinComponent::new(params, field, [start, end], |s| get_name(view, s));
            let single = BinNode::single(key, component);
            match &mut node {
                Some(n) => n.merge(&single, self.ctx),
                None => node = Some(single),
            }
        }
        match node {
            Some(n) => self.add(head, NodeKind::Bin(n)),
            None => head,
        }
    }

    fn encoding_time_units(&mut self, head: NodeId, spec: &ViewSpec) -> NodeId {
        let mut formula = BTreeMap::new();
        let channels = spec
            .encoding
            .iter()
            .map(|(c, d)| (*c, d))
            .chain(spec.facet.iter().flat_map(FacetSpec::channels));
        for (channel, def) in channels {
            let (Some(field), Some(unit)) = (&def.field, &def.time_unit) else {
                continue;
            };
            if def.bin_params(channel).is_some() {
                continue;
            }
            let Some(parsed) = TimeUnit::parse(unit) else {
                self.ctx
                    .warn("encoding", Warning::UnknownTimeUnit { unit: unit.clone() });
                continue;
            };
            let as_ = format!("{unit}_{field}");
            formula.entry(as_.clone()).or_insert(TimeUnitComponent {
                field: field.clone(),
                as_,
                unit: parsed,
            });
        }
        if formula.is_empty() {
            return head;
        }
        self.add(head, NodeKind::TimeUnit(TimeUnitNode { formula }))
    }

    fn sort_index(&mut self, mut head: NodeId, encoding: &BTreeMap<Channel, FieldDef>) -> NodeId {
        for (&channel, def) in encoding {
            if let (Some(field), Some(SortSpec::Values(order))) = (&def.field, &def.sort) {
                let calc =
                    CalculateNode::sort_index(channel, field, def.time_unit.as_deref(), order);
                head = self.add(head, NodeKind::Calculate(calc));
            }
        }
        head
    }

    fn encoding_aggregate(&mut self, spec: &ViewSpec, view: &str) -> Option<AggregateNode> {
        if !spec.encoding.values().any(|d| d.aggregate.is_some()) {
            return None;
        }
        let mut node = AggregateNode::default();
        for (&channel, def) in &spec.encoding {
            if let Some(op) = &def.aggregate {
                let Some(name) = def.output_field(channel, "") else {
                    continue;
                };
                if op == "count" {
                    node.add_measure(COUNT_FIELD, "count", name);
                } else if let Some(field) = &def.field {
                    node.add_measure(field, op, name);
                }
                continue;
            }
            if def.field.is_none() {
                continue;
            }
            match channel {
                Channel::Longitude | Channel::Latitude => {
                    let pos = if channel == Channel::Longitude { "x" } else { "y" };
                    node.dimensions.insert(get_name(view, pos));
                }
                Channel::Longitude2 | Channel::Latitude2 => {
                    let pos = if channel == Channel::Longitude2 { "x2" } else { "y2" };
                    node.dimensions.insert(get_name(view, pos));
                }
                _ => {
                    node.dimensions.extend(def.output_field(channel, ""));
                    if def.bin_params(channel).is_some() {
                        node.dimensions.extend(def.output_field(channel, "_end"));
                    }
                }
            }
        }
        (!node.is_empty()).then_some(node)
    }

    fn encoding_impute(&mut self, spec: &ViewSpec) -> Option<ImputeNode> {
        let x = spec.encoding.get(&Channel::X)?;
        let y = spec.encoding.get(&Channel::Y)?;
        let (imputed, imputed_channel, key, key_channel) = if x.impute.is_some() {
            (x, Channel::X, y, Channel::Y)
        } else if y.impute.is_some() {
            (y, Channel::Y, x, Channel::X)
        } else {
            return None;
        };
        let params = imputed.impute.as_ref()?;
        Some(ImputeNode {
            field: imputed.output_field(imputed_channel, "")?,
            key: key.output_field(key_channel, "")?,
            keyvals: params.keyvals.clone(),
            method: params.method.clone().unwrap_or_else(|| "value".into()),
            value: params.value.clone(),
            frame: params.frame.unwrap_or([None, None]),
            groupby: self.group_fields(spec),
        })
    }

    /// Output fields of the channels that split marks into series.
    fn group_fields(&self, spec: &ViewSpec) -> Vec<String> {
        let mut out = Vec::new();
        for channel in [Channel::Color, Channel::Detail, Channel::Opacity] {
            if let Some(def) = spec.encoding.get(&channel)
                && def.aggregate.is_none()
                && let Some(name) = def.output_field(channel, "")
                && !out.contains(&name)
            {
                out.push(name);
            }
        }
        out
    }

    fn encoding_stack(&mut self, spec: &ViewSpec) -> Option<StackNode> {
        let mark = spec.mark_type()?;
        let quantitative = |c: Channel| {
            spec.encoding.get(&c).filter(|d| {
                d.field.is_some() || d.aggregate.as_deref() == Some("count")
            })?;
            (spec.field_type(c) == Some(FieldType::Quantitative)
                || spec.encoding.get(&c).is_some_and(|d| d.aggregate.is_some()))
            .then_some(c)
        };
        let (stacked, dimension) = match (quantitative(Channel::X), quantitative(Channel::Y)) {
            (Some(x), None) => (x, Channel::Y),
            (None, Some(y)) => (y, Channel::X),
            (Some(_), Some(_)) => {
                let agg = |c: Channel| spec.encoding.get(&c).is_some_and(|d| d.aggregate.is_some());
                match (agg(Channel::X), agg(Channel::Y)) {
                    (true, false) => (Channel::X, Channel::Y),
                    (false, true) => (Channel::Y, Channel::X),
                    _ => return None,
                }
            }
            (None, None) if mark == "arc" && quantitative(Channel::Theta).is_some() => {
                (Channel::Theta, Channel::Other)
            }
            (None, None) => return None,
        };
        let def = spec.encoding.get(&stacked)?;
        let offset = match &def.stack {
            Some(StackSetting::Disabled) => return None,
            Some(StackSetting::Offset(offset)) => offset.clone(),
            None if matches!(mark, "bar" | "area" | "arc") => String::from("zero"),
            None => return None,
        };
        let stack_by = self.group_fields(spec);
        let aggregated = spec.encoding.values().any(|d| d.aggregate.is_some());
        if aggregated && stack_by.is_empty() {
            return None;
        }
        let field = def.output_field(stacked, "")?;
        let groupby = spec
            .encoding
            .get(&dimension)
            .and_then(|d| d.output_field(dimension, ""))
            .into_iter()
            .collect();
        Some(StackNode {
            as_: [format!("{field}_start"), format!("{field}_end")],
            field,
            groupby,
            sort: stack_by
                .into_iter()
                .map(|field| SortKey {
                    field,
                    order: Some("descending".into()),
                })
                .collect(),
            offset,
        })
    }

    fn invalid_filter(&mut self, spec: &ViewSpec) -> Option<FilterInvalidNode> {
        if self.ctx.config.invalid_values != InvalidValues::Filter {
            return None;
        }
        if spec.mark.as_ref().is_none_or(|m| m.is_path()) {
            return None;
        }
        let mut fields = BTreeMap::new();
        for (&channel, def) in &spec.encoding {
            if !channel.has_scale() || def.aggregate.as_deref() == Some("count") {
                continue;
            }
            let Some(ty) = spec.field_type(channel) else {
                continue;
            };
            if !ty.is_continuous() {
                continue;
            }
            if let Some(name) = def.output_field(channel, "") {
                fields.insert(name, ty);
            }
        }
        FilterInvalidNode::new(fields)
    }

    fn facet(
        &mut self,
        mut head: NodeId,
        spec: &ViewSpec,
        facet: &FacetSpec,
        view: &str,
        main_name: &str,
    ) -> NodeId {
        let main = head;
        let channels = facet.channels();
        let mut encoding = BTreeMap::new();
        for (channel, def) in &channels {
            encoding.insert(*channel, (*def).clone());
        }
        head = self.sort_index(head, &encoding);

        let crossed = matches!(facet, FacetSpec::Grid { row: Some(_), column: Some(_) });
        let mut built = BTreeMap::new();
        for (channel, def) in channels {
            let Some(field) = def.output_field(channel, "") else {
                continue;
            };
            let mut fields = vec![field.clone()];
            if def.bin_params(channel).is_some() {
                fields.extend(def.output_field(channel, "_end"));
            }
            let mut sort = None;
            let mut sort_index = None;
            match &def.sort {
                Some(SortSpec::Field(s)) if s.field.is_some() => {
                    let op = s.op.clone().unwrap_or_else(|| "min".into());
                    let sorted = s.field.clone().unwrap_or_default();
                    if crossed {
                        let joined = format!("{op}_{sorted}_by_{field}");
                        let join = JoinAggregateNode {
                            ops: vec![FieldOp {
                                op: op.clone(),
                                field: Some(sorted),
                                param: None,
                                as_: Some(joined.clone()),
                            }],
                            groupby: vec![field.clone()],
                        };
                        head = self.add(head, NodeKind::JoinAggregate(join));
                        sort = Some(FacetSort {
                            op: "max".into(),
                            field: joined.clone(),
                            as_: joined,
                        });
                    } else {
                        sort = Some(FacetSort {
                            as_: format!("{op}_{sorted}"),
                            op,
                            field: sorted,
                        });
                    }
                }
                Some(SortSpec::Values(_)) => {
                    sort_index = Some(sort_index_field(channel, def.field.as_deref().unwrap_or("")));
                }
                _ => {}
            }
            built.insert(
                channel,
                FacetChannel {
                    name: get_name(view, &format!("{}_domain", channel.name())),
                    fields,
                    sort,
                    sort_index_field: sort_index,
                },
            );
        }

        let child = spec.spec.as_deref();
        let child_field = |c: Channel| {
            if !spec.is_independent(c) {
                return None;
            }
            let child = child?;
            let ty = child.field_type(c)?;
            if ty.is_continuous() {
                return None;
            }
            child.encoding.get(&c)?.output_field(c, "")
        };
        let node = FacetNode {
            name: get_name(view, "facet"),
            data: self.ctx.request_data_name(main_name),
            row: built.remove(&Channel::Row),
            column: built.remove(&Channel::Column),
            facet: built.remove(&Channel::Facet),
            child_x: child_field(Channel::X),
            child_y: child_field(Channel::Y),
        };
        let name = node.name.clone();
        let id = self.add(head, NodeKind::Facet(node));
        self.out.flow.set_debug_name(id, name);
        self.out.facet_mains.insert(id, main);
        id
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use serde_json::json;

    use super::*;
    use crate::config::CompileConfig;

    fn build_json(value: serde_json::Value) -> (DataComponent, CompileContext) {
        let spec: ViewSpec = serde_json::from_value(value).unwrap();
        let mut ctx = CompileContext::new(CompileConfig::default());
        let data = build(&mut ctx, &spec).unwrap();
        (data, ctx)
    }

    fn chain_names(flow: &Dataflow, from: NodeId) -> Vec<&'static str> {
        let mut out = vec![flow.kind(from).name()];
        let mut id = from;
        while let [child] = flow.children(id) {
            id = *child;
            out.push(flow.kind(id).name());
        }
        out
    }

    #[test]
    fn unit_view_follows_insertion_order() {
        let (data, ctx) = build_json(json!({
            "data": {"url": "data/cars.json"},
            "transform": [{"filter": "datum.Year > 1970"}],
            "mark": "bar",
            "encoding": {
                "x": {"field": "Origin", "type": "nominal"},
                "y": {"field": "Horsepower", "aggregate": "mean", "type": "quantitative"}
            }
        }));
        let roots = data.flow.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(
            chain_names(&data.flow, roots[0]),
            ["Source", "Filter", "Output", "Aggregate", "FilterInvalid", "Output"]
        );
        assert_eq!(ctx.ref_count("main"), 1);
        assert_eq!(ctx.ref_count("raw"), 0);
    }

    #[test]
    fn names_are_scoped_to_views() {
        assert_eq!(get_name("", "main"), "main");
        assert_eq!(get_name("layer_0", "main"), "layer_0_main");
        let view = ViewData {
            name: "concat_1".into(),
            ..ViewData::default()
        };
        assert_eq!(view.data_name("raw"), "concat_1_raw");
    }

    #[test]
    fn sources_are_shared_between_views() {
        let (data, _) = build_json(json!({
            "vconcat": [
                {"data": {"url": "a.csv"}, "mark": "point"},
                {"data": {"url": "a.csv"}, "mark": "point"},
                {"data": {"url": "b.csv"}, "mark": "point"}
            ]
        }));
        let sources: Vec<_> = data
            .flow
            .roots()
            .into_iter()
            .filter(|&id| data.flow.kind(id).is_data_source())
            .collect();
        // The top-level view gets its own named source; the children share two url sources.
        assert_eq!(sources.len(), 3);
        assert_eq!(data.view.children.len(), 3);
        assert_eq!(data.view.children[2].name, "concat_2");
    }

    #[test]
    fn malformed_transforms_are_skipped_with_a_warning() {
        let (_, ctx) = build_json(json!({
            "data": {"values": [{"a": 1}]},
            "transform": [{"calculate": 3}, {"calculate": "datum.a", "as": "b"}],
            "mark": "point"
        }));
        assert!(matches!(
            ctx.warnings(),
            [Warning::MalformedTransform { index: 0, .. }]
        ));
    }

    #[test]
    fn lookup_without_key_is_fatal() {
        let spec: ViewSpec = serde_json::from_value(json!({
            "data": {"values": []},
            "transform": [{"lookup": "id", "from": {"data": {"url": "b.json"}}}],
            "mark": "point"
        }))
        .unwrap();
        let mut ctx = CompileContext::default();
        assert!(matches!(
            build(&mut ctx, &spec),
            Err(CompileError::MissingField { transform: "lookup", field: "key" })
        ));
    }

    #[test]
    fn lookup_needs_a_name_for_whole_records() {
        let (data, ctx) = build_json(json!({
            "data": {"values": []},
            "transform": [{"lookup": "id", "from": {"data": {"url": "b.json"}, "key": "id"}}],
            "mark": "point"
        }));
        assert!(ctx.warnings().contains(&Warning::LookupNeedsAs { lookup: "id".into() }));
        assert_eq!(ctx.ref_count("lookup_0"), 1);
        assert!(data.output_node("lookup_0").is_some());
    }

    #[test]
    fn explicit_parse_wins_over_implicit_request() {
        let (data, ctx) = build_json(json!({
            "data": {"url": "a.csv", "format": {"parse": {"when": "date:'%Y'"}}},
            "mark": "point",
            "encoding": {"x": {"field": "when", "type": "temporal"}}
        }));
        assert!(ctx.warnings().is_empty());
        let parses = data
            .flow
            .ids()
            .filter(|&id| matches!(data.flow.kind(id), NodeKind::Parse(_)))
            .count();
        assert_eq!(parses, 1);
    }

    #[test]
    fn stacked_bars_group_by_the_dimension() {
        let (data, _) = build_json(json!({
            "data": {"values": []},
            "mark": "bar",
            "encoding": {
                "x": {"field": "a", "type": "nominal"},
                "y": {"field": "b", "type": "quantitative"},
                "color": {"field": "c", "type": "nominal"}
            }
        }));
        let stack = data
            .flow
            .ids()
            .find_map(|id| match data.flow.kind(id) {
                NodeKind::Stack(s) => Some(s.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(stack.groupby, ["a"]);
        assert_eq!(stack.as_, ["b_start", "b_end"]);
        assert_eq!(stack.sort[0].field, "c");
    }

    #[test]
    fn facet_node_sits_under_main() {
        let (data, ctx) = build_json(json!({
            "data": {"url": "barley.json"},
            "facet": {"row": {"field": "site", "type": "nominal"}},
            "spec": {
                "mark": "point",
                "encoding": {"x": {"field": "yield", "type": "quantitative"}}
            }
        }));
        let facet = data.view.facet.unwrap();
        assert_eq!(data.flow.parent(facet), data.view.main);
        assert_eq!(ctx.ref_count("main"), 1);
        assert_eq!(data.view.children[0].name, "child");
        let child_main = data.view.children[0].main.unwrap();
        assert_eq!(ctx.ref_count("child_main"), 1);
        assert!(data.flow.parent(child_main).is_some());
    }
}
