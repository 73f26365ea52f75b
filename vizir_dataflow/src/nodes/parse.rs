// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type coercion of input fields.
//!
//! A [`ParseNode`] maps field names to parse types: `number`, `boolean`, `string`, `date`,
//! `date:'<format>'`, `utc:'<format>'`, or `flatten` for nested fields that only need to be
//! copied to a flat name. Each branch of the flow carries an [`AncestorParse`] record so that a
//! field is parsed at most once, and never to two different types, on any root-to-leaf path.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use super::FlowNode;
use crate::context::CompileContext;
use crate::error::Warning;
use crate::field::{FieldSet, access_path_depth, access_path_with_datum, remove_path_from_field};
use crate::vega::VgTransform;

/// Parse type recorded for fields produced by transforms. Never emitted.
pub const DERIVED: &str = "derived";

/// Parses a set of fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseNode {
    /// Field to parse type.
    pub parse: BTreeMap<String, String>,
}

impl ParseNode {
    /// Creates a node for the given coercions.
    pub fn new(parse: BTreeMap<String, String>) -> Self {
        Self { parse }
    }

    /// Absorbs the coercions of another parse node.
    pub fn merge(&mut self, other: &Self) {
        for (field, ty) in &other.parse {
            self.parse.insert(field.clone(), ty.clone());
        }
    }

    /// Top-level fields, which a loader can parse through `format.parse`.
    pub fn format_parse(&self) -> BTreeMap<String, String> {
        self.parse
            .iter()
            .filter(|(field, _)| access_path_depth(field) == 1)
            .map(|(f, t)| (f.clone(), t.clone()))
            .collect()
    }

    /// Formula transforms for the coercions, optionally only the nested ones.
    pub fn assemble_formulas(
        &self,
        ctx: &mut CompileContext,
        only_nested: bool,
        out: &mut Vec<VgTransform>,
    ) {
        for (field, ty) in &self.parse {
            if only_nested && access_path_depth(field) == 1 {
                continue;
            }
            match parse_expression(field, ty) {
                Some(expr) => out.push(VgTransform::Formula {
                    expr,
                    as_: remove_path_from_field(field),
                }),
                None => ctx.warn(
                    "parse",
                    Warning::UnrecognizedParse {
                        field: field.clone(),
                        parse: ty.clone(),
                    },
                ),
            }
        }
    }
}

impl FlowNode for ParseNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(self.parse.keys().cloned().collect())
    }

    fn dependent_fields(&self) -> FieldSet {
        self.parse.keys().cloned().collect()
    }

    fn assemble(&self, ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        self.assemble_formulas(ctx, false, out);
    }
}

/// Expression coercing `field` to `ty`, or `None` for an unknown type.
pub fn parse_expression(field: &str, ty: &str) -> Option<String> {
    let f = access_path_with_datum(field);
    match ty {
        "number" => Some(format!("toNumber({f})")),
        "boolean" => Some(format!("toBoolean({f})")),
        "string" => Some(format!("toString({f})")),
        "date" => Some(format!("toDate({f})")),
        "flatten" => Some(f),
        _ => {
            if let Some(spec) = ty.strip_prefix("date:") {
                Some(format!("timeParse({f},'{}')", unquote(spec)))
            } else {
                ty.strip_prefix("utc:")
                    .map(|spec| format!("utcParse({f},'{}')", unquote(spec)))
            }
        }
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

/// Coercions already applied above a point of the flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AncestorParse {
    explicit: BTreeMap<String, String>,
    implicit: BTreeMap<String, String>,
    /// Set for generated data and `format.parse: null`: nothing below is parsed.
    pub parse_nothing: bool,
}

/// Why a requested coercion was not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    Keep,
    Skip,
    Conflict(String),
}

impl AncestorParse {
    /// The parse applied to a field, explicit ones first.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.explicit
            .get(field)
            .or_else(|| self.implicit.get(field))
            .map(String::as_str)
    }

    fn get_with_explicit(&self, field: &str) -> Option<(&str, bool)> {
        if let Some(ty) = self.explicit.get(field) {
            Some((ty, true))
        } else {
            self.implicit.get(field).map(|ty| (ty.as_str(), false))
        }
    }

    /// Records a coercion.
    pub fn set(&mut self, field: &str, ty: &str, explicit: bool) {
        let map = if explicit {
            &mut self.explicit
        } else {
            &mut self.implicit
        };
        map.insert(field.into(), ty.into());
    }

    /// Marks fields produced by a transform, which are never parsed afterwards.
    pub fn mark_derived(&mut self, fields: &FieldSet) {
        for field in fields {
            self.set(field, DERIVED, false);
        }
    }

    /// Resolves requested coercions against this record and returns the parse node payload.
    ///
    /// Requests that repeat an existing coercion, touch derived fields, or only flatten an
    /// already handled field are dropped. Requests that contradict an existing coercion are
    /// dropped with [`Warning::ConflictingParse`], so a path never parses a field two ways.
    /// Kept coercions are recorded, and `None` is returned when nothing is left to parse.
    pub fn resolve(
        &mut self,
        ctx: &mut CompileContext,
        explicit: BTreeMap<String, String>,
        implicit: BTreeMap<String, String>,
    ) -> Option<BTreeMap<String, String>> {
        let mut kept = BTreeMap::new();
        for (field, ty) in implicit {
            match self.resolve_one(&field, &ty, false) {
                Resolution::Keep => {
                    kept.insert(field, (ty, false));
                }
                Resolution::Skip => {}
                Resolution::Conflict(existing) => ctx.warn(
                    "parse",
                    Warning::ConflictingParse {
                        field,
                        requested: ty,
                        existing,
                    },
                ),
            }
        }
        for (field, ty) in explicit {
            match self.resolve_one(&field, &ty, true) {
                Resolution::Keep => {
                    kept.insert(field, (ty, true));
                }
                Resolution::Skip => {}
                Resolution::Conflict(existing) => ctx.warn(
                    "parse",
                    Warning::ConflictingParse {
                        field,
                        requested: ty,
                        existing,
                    },
                ),
            }
        }
        for (field, (ty, explicit)) in &kept {
            self.set(field, ty, *explicit);
        }
        if kept.is_empty() || self.parse_nothing {
            return None;
        }
        Some(kept.into_iter().map(|(f, (t, _))| (f, t)).collect())
    }

    fn resolve_one(&self, field: &str, ty: &str, explicit: bool) -> Resolution {
        let Some((existing, existing_explicit)) = self.get_with_explicit(field) else {
            return Resolution::Keep;
        };
        if existing == ty || existing == DERIVED || (!explicit && ty == "flatten") {
            return Resolution::Skip;
        }
        if !explicit && existing_explicit {
            // An explicit parse upstream wins over an implicit request.
            return Resolution::Skip;
        }
        Resolution::Conflict(existing.into())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::string::ToString;

    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn expressions_per_type() {
        assert_eq!(
            parse_expression("a", "number").as_deref(),
            Some(r#"toNumber(datum["a"])"#)
        );
        assert_eq!(
            parse_expression("a.b", "flatten").as_deref(),
            Some(r#"datum["a"] && datum["a"]["b"]"#)
        );
        assert_eq!(
            parse_expression("d", "date:'%Y'").as_deref(),
            Some(r#"timeParse(datum["d"],'%Y')"#)
        );
        assert_eq!(parse_expression("d", "rational"), None);
    }

    #[test]
    fn format_parse_keeps_top_level_fields() {
        let node = ParseNode::new(map(&[("a", "number"), ("b.c", "flatten")]));
        assert_eq!(node.format_parse(), map(&[("a", "number")]));

        let mut ctx = CompileContext::default();
        let mut out = Vec::new();
        node.assemble_formulas(&mut ctx, true, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn repeated_and_derived_fields_are_skipped() {
        let mut ctx = CompileContext::default();
        let mut ancestors = AncestorParse::default();
        ancestors.set("a", "number", false);
        ancestors.mark_derived(&FieldSet::from(["b".to_string()]));
        let kept = ancestors.resolve(
            &mut ctx,
            BTreeMap::new(),
            map(&[("a", "number"), ("b", "date"), ("c", "date")]),
        );
        assert_eq!(kept, Some(map(&[("c", "date")])));
        assert!(ctx.warnings().is_empty());
        assert_eq!(ancestors.get("c"), Some("date"));
    }

    #[test]
    fn conflicts_warn_and_skip() {
        let mut ctx = CompileContext::default();
        let mut ancestors = AncestorParse::default();
        ancestors.set("a", "number", false);
        let kept = ancestors.resolve(&mut ctx, map(&[("a", "date")]), BTreeMap::new());
        assert_eq!(kept, None);
        assert!(matches!(
            ctx.warnings(),
            [Warning::ConflictingParse { .. }]
        ));
        assert_eq!(ancestors.get("a"), Some("number"));
    }

    #[test]
    fn explicit_upstream_silences_implicit_requests() {
        let mut ctx = CompileContext::default();
        let mut ancestors = AncestorParse::default();
        ancestors.set("a", "string", true);
        let kept = ancestors.resolve(&mut ctx, BTreeMap::new(), map(&[("a", "number")]));
        assert_eq!(kept, None);
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn parse_nothing_records_but_emits_nothing() {
        let mut ctx = CompileContext::default();
        let mut ancestors = AncestorParse {
            parse_nothing: true,
            ..AncestorParse::default()
        };
        assert_eq!(
            ancestors.resolve(&mut ctx, BTreeMap::new(), map(&[("a", "number")])),
            None
        );
        assert_eq!(ancestors.get("a"), Some("number"));
    }
}
