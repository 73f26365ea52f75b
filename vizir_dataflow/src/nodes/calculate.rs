// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::Value;

use super::FlowNode;
use super::filter::field_predicate_expr;
use crate::context::CompileContext;
use crate::expr::dependent_fields;
use crate::field::FieldSet;
use crate::spec::{Channel, FieldPredicate};
use crate::vega::VgTransform;

/// Computes a field from an expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculateNode {
    /// Expression.
    pub expr: String,
    /// Output field.
    #[serde(rename = "as")]
    pub as_: String,
}

impl CalculateNode {
    /// Creates a formula node.
    pub fn new(expr: String, as_: String) -> Self {
        Self { expr, as_ }
    }

    /// Maps each value of an explicit sort order to its position; unlisted values sort last.
    pub fn sort_index(
        channel: Channel,
        field: &str,
        time_unit: Option<&str>,
        order: &[Value],
    ) -> Self {
        let mut expr = String::new();
        for (i, value) in order.iter().enumerate() {
            let test = field_predicate_expr(&FieldPredicate {
                field: field.into(),
                time_unit: time_unit.map(String::from),
                equal: Some(value.clone()),
                lt: None,
                lte: None,
                gt: None,
                gte: None,
                range: None,
                one_of: None,
                valid: None,
            });
            expr.push_str(&format!("{test} ? {i} : "));
        }
        expr.push_str(&format!("{}", order.len()));
        Self::new(expr, sort_index_field(channel, field))
    }
}

/// Name of the sort index field of a channel.
pub fn sort_index_field(channel: Channel, field: &str) -> String {
    format!("{}_{field}_sort_index", channel.name())
}

impl FlowNode for CalculateNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(FieldSet::from([self.as_.clone()]))
    }

    fn dependent_fields(&self) -> FieldSet {
        dependent_fields(&self.expr)
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::Formula {
            expr: self.expr.clone(),
            as_: self.as_.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use serde_json::json;

    use super::*;

    #[test]
    fn sort_index_chains_conditionals() {
        let node = CalculateNode::sort_index(Channel::X, "a", None, &[json!("B"), json!("A")]);
        assert_eq!(
            node.expr,
            r#"datum["a"]==="B" ? 0 : datum["a"]==="A" ? 1 : 2"#
        );
        assert_eq!(node.as_, "x_a_sort_index");
    }

    #[test]
    fn reads_fields_of_the_expression() {
        let node = CalculateNode::new("datum.a + datum['b']".into(), "c".into());
        let deps: Vec<_> = node.dependent_fields().into_iter().collect();
        assert_eq!(deps, ["a", "b"]);
    }
}
