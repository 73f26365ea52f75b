// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::Value;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::FieldSet;
use crate::vega::{Compare, VgTransform};

/// Fills in missing key/value combinations.
///
/// `value` imputation is a single Vega `impute`. Window methods (`mean`, `median`, ...) first
/// impute `null`, then compute the statistic over a frame and substitute it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImputeNode {
    /// Field to impute.
    pub field: String,
    /// Key field.
    pub key: String,
    /// Key values to impute over.
    pub keyvals: Option<Value>,
    /// `value`, `mean`, `median`, `max` or `min`.
    pub method: String,
    /// Replacement when `method` is `value`.
    pub value: Option<Value>,
    /// Frame of window methods.
    pub frame: [Option<i64>; 2],
    /// Grouping fields.
    pub groupby: Vec<String>,
}

impl ImputeNode {
    fn imputed_name(&self) -> String {
        format!("imputed_{}_value", self.field)
    }
}

impl FlowNode for ImputeNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        let mut out = FieldSet::from([self.field.clone()]);
        if self.method != "value" {
            out.insert(self.imputed_name());
        }
        Some(out)
    }

    fn dependent_fields(&self) -> FieldSet {
        let mut out: FieldSet = self.groupby.iter().cloned().collect();
        out.insert(self.field.clone());
        out.insert(self.key.clone());
        out
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        let is_value = self.method == "value";
        out.push(VgTransform::Impute {
            field: self.field.clone(),
            key: self.key.clone(),
            keyvals: self.keyvals.clone(),
            method: "value".into(),
            groupby: self.groupby.clone(),
            value: if is_value {
                self.value.clone().unwrap_or(Value::Null)
            } else {
                Value::Null
            },
        });
        if is_value {
            return;
        }
        let imputed = self.imputed_name();
        out.push(VgTransform::Window {
            params: vec![Value::Null],
            as_: vec![imputed.clone()],
            ops: vec![self.method.clone()],
            fields: vec![Some(self.field.clone())],
            sort: Compare::default(),
            ignore_peers: false,
            frame: self.frame,
            groupby: self.groupby.clone(),
        });
        out.push(VgTransform::Formula {
            expr: format!(
                "datum.{f} === null ? datum.{imputed} : datum.{f}",
                f = self.field
            ),
            as_: self.field.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn window_methods_expand_to_three_transforms() {
        let node = ImputeNode {
            field: "y".into(),
            key: "x".into(),
            keyvals: None,
            method: "mean".into(),
            value: None,
            frame: [None, None],
            groupby: vec!["c".into()],
        };
        let mut out = Vec::new();
        node.assemble(&mut CompileContext::default(), &mut out);
        assert_eq!(out.len(), 3);
        assert!(matches!(
            &out[2],
            VgTransform::Formula { expr, .. } if expr == "datum.y === null ? datum.imputed_y_value : datum.y"
        ));
    }
}
