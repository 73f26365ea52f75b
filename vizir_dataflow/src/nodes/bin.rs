// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binning.
//!
//! Bins are keyed by their parameters and input field, so two requests for the same binning
//! share one `bin` transform (and one pair of signals) once merged.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::{FieldSet, flat_access_with_datum, replace_path_in_field, var_name};
use crate::spec::BinParams;
use crate::vega::{BinExtent, SignalRef, VgTransform};

/// One binned field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinComponent {
    /// Input field.
    pub field: String,
    /// Start/end output pairs; the first pair is computed, the others copied.
    #[serde(rename = "as")]
    pub as_: Vec<[String; 2]>,
    /// Normalized parameters.
    pub params: BinParams,
    /// Signal holding the bin specification.
    pub signal: String,
    /// Signal holding the data extent, when no fixed extent is given.
    pub extent_signal: Option<String>,
}

impl BinComponent {
    /// A component named within a view; `get_name` prefixes the view name.
    pub fn new(
        params: BinParams,
        field: &str,
        as_: [String; 2],
        get_name: impl Fn(&str) -> String,
    ) -> (String, Self) {
        let key = bin_key(&params, field);
        let normalized = var_name(&key);
        let extent_signal = params
            .extent
            .is_none()
            .then(|| get_name(&format!("{normalized}_extent")));
        let component = Self {
            field: field.into(),
            as_: alloc::vec![as_],
            params,
            signal: get_name(&format!("{normalized}_bins")),
            extent_signal,
        };
        (key, component)
    }
}

/// Key identifying a binning of a field, e.g. `bin_maxbins_10_age`.
pub fn bin_key(params: &BinParams, field: &str) -> String {
    format!("{}_{field}", params.key_string())
}

/// Bins one or more fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinNode {
    /// Components by bin key.
    pub bins: BTreeMap<String, BinComponent>,
}

impl BinNode {
    /// A node with one component.
    pub fn single(key: String, component: BinComponent) -> Self {
        Self {
            bins: BTreeMap::from([(key, component)]),
        }
    }

    /// Absorbs the bins of `other`.
    ///
    /// Shared keys keep this node's signals; the other node's signal names are renamed to
    /// them through the context so references to either resolve.
    pub fn merge(&mut self, other: &Self, ctx: &mut CompileContext) {
        for (key, theirs) in &other.bins {
            match self.bins.get_mut(key) {
                Some(ours) => {
                    ctx.rename_signal(&theirs.signal, &ours.signal);
                    if let (Some(from), Some(to)) = (&theirs.extent_signal, &ours.extent_signal) {
                        ctx.rename_signal(from, to);
                    }
                    for pair in &theirs.as_ {
                        if !ours.as_.contains(pair) {
                            ours.as_.push(pair.clone());
                        }
                    }
                }
                None => {
                    self.bins.insert(key.clone(), theirs.clone());
                }
            }
        }
    }
}

impl FlowNode for BinNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(
            self.bins
                .values()
                .flat_map(|b| b.as_.iter().flatten().cloned())
                .collect(),
        )
    }

    fn dependent_fields(&self) -> FieldSet {
        self.bins.values().map(|b| b.field.clone()).collect()
    }

    fn assemble(&self, ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        for bin in self.bins.values() {
            let Some((first, rest)) = bin.as_.split_first() else {
                continue;
            };
            let field = replace_path_in_field(&bin.field);
            let extent = match (bin.params.extent, &bin.extent_signal) {
                (Some(fixed), _) => BinExtent::Fixed(fixed),
                (None, Some(signal)) => {
                    let signal = ctx.signal_name(signal);
                    out.push(VgTransform::Extent {
                        field: field.clone(),
                        signal: signal.clone(),
                    });
                    BinExtent::Signal(SignalRef { signal })
                }
                (None, None) => BinExtent::Signal(SignalRef {
                    signal: "null".into(),
                }),
            };
            out.push(VgTransform::Bin {
                field,
                as_: first.clone(),
                signal: ctx.signal_name(&bin.signal),
                extent,
                params: BinParams {
                    extent: None,
                    ..bin.params.clone()
                },
            });
            for [start, end] in rest {
                out.push(VgTransform::Formula {
                    expr: flat_access_with_datum(&first[0]),
                    as_: start.clone(),
                });
                out.push(VgTransform::Formula {
                    expr: flat_access_with_datum(&first[1]),
                    as_: end.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::string::ToString;

    use super::*;

    fn age_bin(view: &str, as_: &str) -> BinNode {
        let params = BinParams {
            maxbins: Some(10),
            ..BinParams::default()
        };
        let name = |s: &str| {
            if view.is_empty() {
                s.to_string()
            } else {
                format!("{view}_{s}")
            }
        };
        let (key, c) = BinComponent::new(
            params,
            "age",
            [as_.to_string(), format!("{as_}_end")],
            name,
        );
        BinNode::single(key, c)
    }

    #[test]
    fn names_come_from_the_key() {
        let node = age_bin("", "bin_age");
        let c = &node.bins["bin_maxbins_10_age"];
        assert_eq!(c.signal, "bin_maxbins_10_age_bins");
        assert_eq!(c.extent_signal.as_deref(), Some("bin_maxbins_10_age_extent"));
    }

    #[test]
    fn merging_renames_signals_and_copies_outputs() {
        let mut ctx = CompileContext::default();
        let mut a = age_bin("layer_0", "b");
        let b = age_bin("layer_1", "c");
        a.merge(&b, &mut ctx);
        assert_eq!(a.bins.len(), 1);
        assert_eq!(
            ctx.signal_name("layer_1_bin_maxbins_10_age_bins"),
            "layer_0_bin_maxbins_10_age_bins"
        );

        let mut out = Vec::new();
        a.assemble(&mut ctx, &mut out);
        // extent, bin, then two formulas copying into the second output pair
        assert_eq!(out.len(), 4);
        assert!(matches!(&out[0], VgTransform::Extent { signal, .. } if signal == "layer_0_bin_maxbins_10_age_extent"));
        assert!(matches!(&out[3], VgTransform::Formula { as_, .. } if as_ == "c_end"));
    }
}
