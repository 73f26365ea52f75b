// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vega-Lite-style data flow compiler.
//!
//! A view specification becomes a list of runtime datasets in three steps:
//! - [`build`] turns each view's data source, transforms and encoding-derived operations into a
//!   tree of typed nodes, with named output anchors (`raw`, `main`, lookup secondaries, facets),
//! - [`optimize`] removes unreferenced branches, merges equivalent work and pushes facets down so
//!   that shared work runs once, and
//! - [`assemble`] walks the optimized tree and emits named datasets, each chained to its source.
//!
//! [`compile`] runs all three with one [`CompileContext`], which holds the naming, reference
//! count and signal rename state for that compile. Nothing is global, so compiles are
//! independent and compiling the same input twice yields the same output.
//!
//! Recoverable defects are collected as [`Warning`]s and logged through `tracing`; only
//! [`CompileError`]s abort.
//!
//! ```
//! use serde_json::json;
//! use vizir_dataflow::{CompileConfig, compile_json};
//!
//! let spec = json!({
//!     "data": {"url": "data/cars.json"},
//!     "transform": [{"filter": "datum.Horsepower > 100"}],
//!     "mark": "point",
//!     "encoding": {"x": {"field": "Horsepower", "type": "quantitative"}}
//! });
//! let compiled = compile_json(&spec.to_string(), CompileConfig::default()).unwrap();
//! // The loaded file, then the filtered rows chained from it.
//! assert_eq!(compiled.data.data.len(), 2);
//! ```
//!
//! ## Features
//!
//! - `std` (disabled by default): enables `std` support in the dependencies.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

use alloc::vec::Vec;

mod assemble;
mod builder;
mod config;
mod context;
mod error;
pub mod expr;
pub mod field;
pub mod graph;
pub mod nodes;
mod optimize;
pub mod spec;
pub mod vega;

pub use assemble::assemble;
pub use builder::{DataComponent, ViewData, build, get_name};
pub use config::{CompileConfig, InvalidValues};
pub use context::CompileContext;
pub use error::{CompileError, Warning};
pub use graph::{Dataflow, NodeHash, NodeId};
pub use optimize::optimize;
pub use spec::ViewSpec;
pub use vega::{AssembledData, Dataset, FacetData, VgTransform};

/// Result of a full compile.
#[derive(Debug)]
pub struct Compiled {
    /// Assembled datasets.
    pub data: AssembledData,
    /// The optimized data flow, with the dataset every anchor resolved to.
    pub component: DataComponent,
    /// Everything recovered from on the way.
    pub warnings: Vec<Warning>,
}

/// Builds, optimizes and assembles the data flow of `spec`.
pub fn compile(spec: &ViewSpec, config: CompileConfig) -> Result<Compiled, CompileError> {
    let mut ctx = CompileContext::new(config);
    let mut component = build(&mut ctx, spec)?;
    optimize(&mut component, &mut ctx)?;
    let data = assemble(&mut component, &mut ctx, &spec.datasets);
    tracing::debug!(
        datasets = data.data.len(),
        facets = data.facets.len(),
        "compiled data flow"
    );
    Ok(Compiled {
        data,
        component,
        warnings: ctx.into_warnings(),
    })
}

/// Parses `json` as a view and compiles it.
pub fn compile_json(json: &str, config: CompileConfig) -> Result<Compiled, CompileError> {
    let spec: ViewSpec = serde_json::from_str(json)?;
    compile(&spec, config)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::string::String;

    use serde_json::{Value, json};

    use super::*;

    fn compiled(value: Value, config: CompileConfig) -> Compiled {
        let spec: ViewSpec = serde_json::from_value(value).unwrap();
        compile(&spec, config).unwrap()
    }

    fn include_invalid() -> CompileConfig {
        CompileConfig {
            invalid_values: InvalidValues::Include,
            ..CompileConfig::default()
        }
    }

    fn dataset<'a>(data: &'a AssembledData, name: &str) -> &'a Dataset {
        data.data
            .iter()
            .find(|d| d.name == name)
            .unwrap_or_else(|| panic!("no dataset named {name}"))
    }

    fn all_transforms(data: &AssembledData) -> impl Iterator<Item = &VgTransform> {
        data.data
            .iter()
            .chain(data.facets.iter().flat_map(|f| f.datasets.iter()))
            .flat_map(|d| d.transform.iter())
    }

    /// Transforms applied from the root dataset down to `name`, in run order.
    fn lineage<'a>(data: &'a AssembledData, name: &str) -> Vec<&'a VgTransform> {
        let mut datasets = Vec::new();
        let mut next: Option<&str> = Some(name);
        while let Some(current) = next {
            let ds = dataset(data, current);
            datasets.push(ds);
            next = ds.source.as_deref();
        }
        datasets
            .into_iter()
            .rev()
            .flat_map(|d| &d.transform)
            .collect()
    }

    fn formula_exprs<'a>(transforms: &[&'a VgTransform]) -> Vec<&'a str> {
        transforms
            .iter()
            .copied()
            .filter_map(|t| match t {
                VgTransform::Formula { expr, .. } => Some(expr.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn filter_then_aggregate_stay_on_one_dataset() {
        let out = compiled(
            json!({
                "data": {"url": "data/points.csv"},
                "transform": [{"filter": "datum.x>0"}],
                "mark": "point",
                "encoding": {
                    "x": {"field": "x", "type": "quantitative"},
                    "y": {"field": "y", "aggregate": "sum", "type": "quantitative"}
                }
            }),
            include_invalid(),
        );
        assert_eq!(out.data.data.len(), 2, "{:?}", out.data.data);
        let source = &out.data.data[0];
        assert_eq!(source.url.as_deref(), Some("data/points.csv"));
        assert!(source.transform.is_empty(), "the source only loads rows");

        let main = out.component.lookup_data_source("main").unwrap();
        let ds = dataset(&out.data, main);
        assert_eq!(ds.source.as_deref(), Some(source.name.as_str()));
        assert_eq!(
            serde_json::to_value(&ds.transform).unwrap(),
            json!([
                {"type": "filter", "expr": "datum.x>0"},
                {
                    "type": "aggregate",
                    "groupby": ["x"],
                    "ops": ["sum"],
                    "fields": ["y"],
                    "as": ["sum_y"]
                }
            ])
        );
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
    }

    #[test]
    fn identical_bins_in_sibling_views_run_once() {
        let age = json!({"field": "age", "bin": true, "type": "quantitative"});
        let out = compiled(
            json!({
                "data": {"url": "data/people.csv"},
                "vconcat": [
                    {"mark": "bar", "encoding": {"x": age.clone(), "y": {"aggregate": "count", "type": "quantitative"}}},
                    {"mark": "tick", "encoding": {"x": age}}
                ]
            }),
            include_invalid(),
        );
        let bins = all_transforms(&out.data)
            .filter(|t| matches!(t, VgTransform::Bin { field, .. } if field == "age"))
            .count();
        assert_eq!(bins, 1, "{:?}", out.data.data);
        assert!(out.component.lookup_data_source("concat_0_main").is_some());
        assert!(out.component.lookup_data_source("concat_1_main").is_some());
    }

    #[test]
    fn invalid_values_are_filtered_right_before_main() {
        let out = compiled(
            json!({
                "data": {"url": "data/points.csv"},
                "transform": [{"calculate": "datum.a * 2", "as": "x"}],
                "mark": "point",
                "encoding": {"x": {"field": "x", "type": "quantitative"}}
            }),
            CompileConfig::default(),
        );
        let main = out.component.lookup_data_source("main").unwrap();
        let last = dataset(&out.data, main).transform.last();
        assert_eq!(
            last,
            Some(&VgTransform::Filter {
                expr: String::from(r#"isValid(datum["x"]) && isFinite(+datum["x"])"#),
            })
        );
    }

    #[test]
    fn lookup_secondary_resolves_to_its_dataset() {
        let out = compiled(
            json!({
                "data": {"url": "data/lookup_people.csv"},
                "transform": [{
                    "lookup": "person",
                    "from": {"data": {"url": "data/lookup_groups.csv"}, "key": "name", "fields": ["group"]}
                }],
                "mark": "point",
                "encoding": {"x": {"field": "age", "type": "quantitative"}}
            }),
            include_invalid(),
        );
        let froms: Vec<&str> = all_transforms(&out.data)
            .filter_map(|t| match t {
                VgTransform::Lookup { from, .. } => Some(from.as_str()),
                _ => None,
            })
            .collect();
        let [from] = froms[..] else {
            panic!("expected one lookup, found {froms:?}");
        };
        let secondary: Vec<&Dataset> = out
            .data
            .data
            .iter()
            .filter(|d| d.url.as_deref() == Some("data/lookup_groups.csv"))
            .collect();
        assert_eq!(secondary.len(), 1, "secondary source appears once");
        assert_eq!(secondary[0].name, from, "lookup reads the final dataset name");
    }

    #[test]
    fn unreferenced_raw_is_omitted() {
        let out = compiled(
            json!({
                "data": {"url": "data/cars.json"},
                "mark": "bar",
                "encoding": {
                    "x": {"field": "Origin", "type": "nominal"},
                    "y": {"aggregate": "count", "type": "quantitative"}
                }
            }),
            include_invalid(),
        );
        assert_eq!(out.component.lookup_data_source("raw"), None);
        assert_eq!(out.data.data.len(), 2, "source and main only: {:?}", out.data.data);
        let aggregates = all_transforms(&out.data)
            .filter(|t| matches!(t, VgTransform::Aggregate { .. }))
            .count();
        assert_eq!(aggregates, 1, "the aggregate still feeds main");
    }

    #[test]
    fn explicit_transforms_keep_their_order() {
        let out = compiled(
            json!({
                "data": {"url": "data/cars.json"},
                "transform": [
                    {"calculate": "datum.a + 1", "as": "b"},
                    {"filter": "datum.b > 2"},
                    {"calculate": "datum.b * 2", "as": "c"}
                ],
                "mark": "point"
            }),
            include_invalid(),
        );
        let exprs: Vec<&str> = all_transforms(&out.data)
            .filter_map(|t| match t {
                VgTransform::Formula { expr, .. } | VgTransform::Filter { expr } => {
                    Some(expr.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(exprs, ["datum.a + 1", "datum.b > 2", "datum.b * 2"]);
    }

    #[test]
    fn explicit_bins_stay_between_their_neighbours() {
        let out = compiled(
            json!({
                "data": {"url": "data/cars.json"},
                "transform": [
                    {"calculate": "datum.a + 1", "as": "b"},
                    {"bin": true, "field": "x", "as": "bin_x"},
                    {"window": [{"op": "rank", "as": "rank"}]},
                    {"bin": true, "field": "y", "as": "bin_y"}
                ],
                "mark": "point"
            }),
            include_invalid(),
        );
        let main = out.component.lookup_data_source("main").unwrap();
        let order: Vec<String> = lineage(&out.data, main)
            .into_iter()
            .filter_map(|t| match t {
                VgTransform::Formula { as_, .. } => Some(as_.clone()),
                VgTransform::Bin { field, .. } => Some(alloc::format!("bin {field}")),
                VgTransform::Window { .. } => Some(String::from("window")),
                _ => None,
            })
            .collect();
        assert_eq!(order, ["b", "bin x", "window", "bin y"]);
    }

    #[test]
    fn sibling_views_keep_their_own_coercions() {
        let out = compiled(
            json!({
                "data": {"url": "data/cars.json"},
                "vconcat": [
                    {"mark": "point", "encoding": {
                        "x": {"field": "Year", "type": "temporal"}
                    }},
                    {"mark": "bar", "encoding": {
                        "y": {"field": "Year", "aggregate": "max", "type": "quantitative"}
                    }}
                ]
            }),
            include_invalid(),
        );
        let source = out
            .data
            .data
            .iter()
            .find(|d| d.url.is_some())
            .unwrap();
        let shared = source
            .format
            .as_ref()
            .and_then(|f| f.parse.as_ref())
            .is_some_and(|parse| parse.contains_key("Year"));
        assert!(!shared, "one coercion must not be shared by both views: {source:?}");

        let dates = lineage(
            &out.data,
            out.component.lookup_data_source("concat_0_main").unwrap(),
        );
        let numbers = lineage(
            &out.data,
            out.component.lookup_data_source("concat_1_main").unwrap(),
        );
        assert!(
            formula_exprs(&dates).iter().any(|e| e.starts_with("toDate(") && e.contains("Year")),
            "{dates:?}"
        );
        assert!(
            formula_exprs(&numbers).iter().any(|e| e.starts_with("toNumber(") && e.contains("Year")),
            "{numbers:?}"
        );
        assert!(
            !formula_exprs(&dates).iter().any(|e| e.starts_with("toNumber(")),
            "the temporal view never sees the numeric coercion"
        );
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
    }

    #[test]
    fn compiling_twice_gives_the_same_datasets() {
        let spec = json!({
            "data": {"url": "data/barley.json"},
            "facet": {"row": {"field": "site", "type": "nominal"}},
            "spec": {
                "layer": [
                    {"mark": "bar", "encoding": {
                        "x": {"field": "yield", "aggregate": "sum", "type": "quantitative"},
                        "y": {"field": "variety", "type": "nominal"}
                    }},
                    {"mark": "point", "encoding": {
                        "x": {"field": "yield", "bin": true, "type": "quantitative"}
                    }}
                ]
            }
        });
        let first = compiled(spec.clone(), CompileConfig::default());
        let second = compiled(spec, CompileConfig::default());
        assert_eq!(
            serde_json::to_value(&first.data).unwrap(),
            serde_json::to_value(&second.data).unwrap()
        );
    }

    #[test]
    fn facet_domain_anchor_shares_the_pre_facet_pipeline() {
        let out = compiled(
            json!({
                "data": {"url": "data/barley.json"},
                "facet": {"row": {"field": "site", "type": "nominal"}},
                "spec": {
                    "mark": "bar",
                    "encoding": {
                        "x": {"field": "yield", "aggregate": "sum", "type": "quantitative"},
                        "y": {"field": "variety", "type": "nominal"}
                    }
                }
            }),
            CompileConfig::default(),
        );
        let [facet] = &out.data.facets[..] else {
            panic!("expected one facet, found {:?}", out.data.facets);
        };
        assert_eq!(facet.groupby, ["site"]);

        let main = out.component.lookup_data_source("main").unwrap();
        assert_eq!(facet.data, main, "facet partitions the shared pipeline");
        assert_eq!(
            out.component.lookup_data_source("scale_child_main"),
            Some(main),
            "domain anchor reads the same pipeline"
        );
        let sums = all_transforms(&out.data)
            .filter(|t| matches!(t, VgTransform::Aggregate { ops, .. } if ops == &["sum"]))
            .count();
        assert_eq!(sums, 1, "aggregation runs once above the facet");
        assert_eq!(
            dataset(&out.data, "row_domain").source.as_deref(),
            Some(main),
            "header domain reads the shared pipeline"
        );
    }

    #[test]
    fn dataset_names_are_unique_across_facet_scopes() {
        let out = compiled(
            json!({
                "data": {"url": "data/barley.json"},
                "facet": {"row": {"field": "site", "type": "nominal"}},
                "spec": {
                    "layer": [
                        {"mark": "bar", "encoding": {
                            "x": {"field": "yield", "aggregate": "sum", "type": "quantitative"},
                            "y": {"field": "variety", "type": "nominal"}
                        }},
                        {"mark": "point", "encoding": {
                            "x": {"field": "yield", "bin": true, "type": "quantitative"}
                        }}
                    ]
                }
            }),
            CompileConfig::default(),
        );
        let [facet] = &out.data.facets[..] else {
            panic!("expected one facet, found {:?}", out.data.facets);
        };
        let mut names: Vec<&str> = out
            .data
            .data
            .iter()
            .chain(&facet.datasets)
            .map(|d| d.name.as_str())
            .collect();
        names.push(facet.name.as_str());
        let count = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), count, "{names:?}");

        let inner = out
            .component
            .lookup_data_source("child_layer_0_main")
            .unwrap();
        assert!(
            facet.datasets.iter().any(|d| d.name == inner),
            "the layer anchor lives in the facet scope: {inner}"
        );
        assert!(out.data.data.iter().all(|d| d.name != inner));
    }

    #[test]
    fn independent_facet_layers_get_their_own_domain_chains() {
        let out = compiled(
            json!({
                "data": {"url": "data/barley.json"},
                "facet": {"row": {"field": "site", "type": "nominal"}},
                "resolve": {"scale": {"x": "independent"}},
                "spec": {
                    "layer": [
                        {"mark": "bar", "encoding": {
                            "x": {"field": "yield", "aggregate": "sum", "type": "quantitative"},
                            "y": {"field": "variety", "type": "nominal"}
                        }},
                        {"mark": "point", "encoding": {
                            "x": {"field": "yield", "aggregate": "mean", "type": "quantitative"},
                            "y": {"field": "year", "type": "ordinal"}
                        }}
                    ]
                }
            }),
            include_invalid(),
        );
        let [facet] = &out.data.facets[..] else {
            panic!("expected one facet, found {:?}", out.data.facets);
        };
        let main = out.component.lookup_data_source("main").unwrap();
        assert_eq!(facet.data, main);

        let sum_domain = out
            .component
            .lookup_data_source("scale_child_layer_0_main")
            .unwrap();
        let mean_domain = out
            .component
            .lookup_data_source("scale_child_layer_1_main")
            .unwrap();
        assert_ne!(sum_domain, mean_domain, "each layer gets its own chain");
        for domain in [sum_domain, mean_domain] {
            assert_ne!(domain, main);
            assert_eq!(
                dataset(&out.data, domain).source.as_deref(),
                Some(main),
                "domain chains branch off the shared pipeline"
            );
        }
        let loads = out
            .data
            .data
            .iter()
            .filter(|d| d.url.as_deref() == Some("data/barley.json"))
            .count();
        assert_eq!(loads, 1, "the upstream pipeline is not duplicated");
        let per_cell = dataset(&out.data, sum_domain).transform.iter().any(|t| {
            matches!(t, VgTransform::Aggregate { groupby, .. } if groupby.iter().any(|g| g == "site"))
        });
        assert!(per_cell, "domain aggregates group by the facet field too");
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = compile_json("{\"mark\": ", CompileConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidSpec(_)), "{err}");
    }
}
