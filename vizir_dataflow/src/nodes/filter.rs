// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Row filters: predicates and the invalid-value filter.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::Value;

use super::FlowNode;
use super::timeunit::{TimeUnit, date_time_expr, is_date_time};
use crate::context::CompileContext;
use crate::error::Warning;
use crate::expr::dependent_fields;
use crate::field::{FieldSet, flat_access_with_datum, string_value, var_name};
use crate::spec::{FieldPredicate, FieldType, ParamPredicate, Predicate};
use crate::vega::VgTransform;

/// Keeps rows matching an expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterNode {
    /// Predicate expression.
    pub expr: String,
}

impl FlowNode for FilterNode {
    fn dependent_fields(&self) -> FieldSet {
        dependent_fields(&self.expr)
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Filter {
            expr: self.expr.clone(),
        });
    }
}

/// Drops rows with null or `NaN` values in continuous encoded fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterInvalidNode {
    /// Output field to its measurement type.
    pub fields: BTreeMap<String, &'static str>,
}

impl FilterInvalidNode {
    /// Builds the filter, or `None` when no field needs one.
    pub fn new(fields: BTreeMap<String, FieldType>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        Some(Self {
            fields: fields.into_iter().map(|(f, t)| (f, t.name())).collect(),
        })
    }

    fn expr(&self) -> String {
        let tests: Vec<String> = self
            .fields
            .iter()
            .map(|(field, ty)| {
                let r = flat_access_with_datum(field);
                if *ty == "temporal" {
                    format!("(isDate({r}) || (isValid({r}) && isFinite(+{r})))")
                } else {
                    format!("isValid({r}) && isFinite(+{r})")
                }
            })
            .collect();
        tests.join(" && ")
    }
}

impl FlowNode for FilterInvalidNode {
    fn dependent_fields(&self) -> FieldSet {
        self.fields.keys().cloned().collect()
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Filter { expr: self.expr() });
    }
}

/// Name of the data store holding a selection's tuples.
pub fn selection_store(param: &str) -> String {
    format!("{}_store", var_name(param))
}

/// Compiles a predicate into an expression.
///
/// Selection predicates need the parameter to be declared somewhere in the compile; otherwise
/// the whole predicate is rejected with [`Warning::UnresolvedSelection`].
pub fn predicate_expr(ctx: &CompileContext, predicate: &Predicate) -> Result<String, Warning> {
    Ok(match predicate {
        Predicate::Expr(expr) => expr.clone(),
        Predicate::And { and } => join(ctx, and, " && ")?,
        Predicate::Or { or } => join(ctx, or, " || ")?,
        Predicate::Not { not } => format!("!({})", predicate_expr(ctx, not)?),
        Predicate::Param(param) => param_expr(ctx, param)?,
        Predicate::Field(field) => field_predicate_expr(field),
    })
}

fn join(ctx: &CompileContext, ops: &[Predicate], sep: &str) -> Result<String, Warning> {
    let parts = ops
        .iter()
        .map(|p| predicate_expr(ctx, p).map(|e| format!("({e})")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(sep))
}

fn param_expr(ctx: &CompileContext, param: &ParamPredicate) -> Result<String, Warning> {
    let name = var_name(&param.param);
    if ctx.is_selection(&param.param) {
        let store = string_value(&selection_store(&param.param));
        let test = format!("vlSelectionTest({store}, datum)");
        let length = format!("length(data({store}))");
        Ok(if param.empty == Some(false) {
            format!("{length} && {test}")
        } else {
            format!("!{length} || {test}")
        })
    } else if ctx.is_variable(&param.param) {
        Ok(format!("!!{name}"))
    } else {
        Err(Warning::UnresolvedSelection {
            param: param.param.clone(),
        })
    }
}

fn value_expr(value: &Value, time_unit: Option<&TimeUnit>) -> String {
    if is_date_time(value) {
        return format!("time({})", date_time_expr(value));
    }
    match (value, time_unit) {
        (Value::String(_) | Value::Number(_), Some(_)) => {
            format!("time(datetime({value}))")
        }
        _ => value.to_string(),
    }
}

/// Expression testing one field predicate.
pub(crate) fn field_predicate_expr(predicate: &FieldPredicate) -> String {
    let unit = predicate.time_unit.as_deref().and_then(TimeUnit::parse);
    let field = match &unit {
        Some(unit) => format!("time({})", unit.field_expr(&predicate.field)),
        None => flat_access_with_datum(&predicate.field),
    };
    let val = |v: &Value| value_expr(v, unit.as_ref());
    let mut tests = Vec::new();
    if let Some(v) = &predicate.equal {
        tests.push(format!("{field}==={}", val(v)));
    }
    if let Some(v) = &predicate.lt {
        tests.push(format!("{field}<{}", val(v)));
    }
    if let Some(v) = &predicate.lte {
        tests.push(format!("{field}<={}", val(v)));
    }
    if let Some(v) = &predicate.gt {
        tests.push(format!("{field}>{}", val(v)));
    }
    if let Some(v) = &predicate.gte {
        tests.push(format!("{field}>={}", val(v)));
    }
    if let Some([lo, hi]) = &predicate.range {
        match (lo.is_null(), hi.is_null()) {
            (false, false) => tests.push(format!("inrange({field}, [{}, {}])", val(lo), val(hi))),
            (false, true) => tests.push(format!("{field} >= {}", val(lo))),
            (true, false) => tests.push(format!("{field} <= {}", val(hi))),
            (true, true) => tests.push("true".to_string()),
        }
    }
    if let Some(values) = &predicate.one_of {
        let list: Vec<String> = values.iter().map(val).collect();
        tests.push(format!("indexof([{}], {field}) !== -1", list.join(", ")));
    }
    if let Some(valid) = predicate.valid {
        tests.push(if valid {
            format!("isValid({field}) && isFinite(+{field})")
        } else {
            format!("!isValid({field}) || !isFinite(+{field})")
        });
    }
    if tests.is_empty() {
        "true".into()
    } else {
        tests.join(" && ")
    }
}

/// Parses implied by the literal values a predicate compares fields against.
///
/// Date-time objects and time units imply `date`, numbers `number` and strings `string`.
pub fn implicit_parse(predicate: &Predicate) -> BTreeMap<String, String> {
    let mut parse = BTreeMap::new();
    predicate.for_each_field(&mut |fp| {
        let value = fp
            .equal
            .as_ref()
            .or(fp.range.as_ref().map(|[lo, _]| lo))
            .or(fp.one_of.as_ref().and_then(|v| v.first()))
            .or(fp.lt.as_ref())
            .or(fp.lte.as_ref())
            .or(fp.gt.as_ref())
            .or(fp.gte.as_ref());
        let ty = match value {
            Some(v) if is_date_time(v) => Some("date"),
            Some(Value::Number(_)) => Some("number"),
            Some(Value::String(_)) => Some("string"),
            _ => None,
        };
        if let Some(ty) = ty {
            parse.insert(fp.field.clone(), ty.to_string());
        }
        if fp.time_unit.is_some() {
            parse.insert(fp.field.clone(), "date".to_string());
        }
    });
    parse
}
