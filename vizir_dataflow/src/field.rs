// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Field names and `datum` access paths.
//!
//! Field names may address nested properties with dots (`"a.b"`); a literal dot is written as
//! `\.`. These helpers turn such names into expression accessors and flat output names.

extern crate alloc;

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// A set of field names, ordered so hashing and output stay deterministic.
pub type FieldSet = BTreeSet<String>;

/// Splits a field name into its access path segments.
pub fn split_access_path(field: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '.' => out.push(core::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

/// Number of nested levels a field name addresses.
pub fn access_path_depth(field: &str) -> usize {
    split_access_path(field).len()
}

/// Quotes a string as an expression string literal.
pub fn string_value(s: &str) -> String {
    serde_json::Value::String(s.into()).to_string()
}

/// Accessor with a guard for every level, e.g. `datum["a"] && datum["a"]["b"]`.
pub fn access_path_with_datum(field: &str) -> String {
    let pieces = split_access_path(field);
    let mut prefixes = Vec::with_capacity(pieces.len());
    for i in 1..=pieces.len() {
        let path: Vec<String> = pieces[..i].iter().map(|p| string_value(p)).collect();
        prefixes.push(format!("datum[{}]", path.join("][")));
    }
    prefixes.join(" && ")
}

/// Unguarded accessor, e.g. `datum["a"]["b"]`.
pub fn flat_access_with_datum(field: &str) -> String {
    let path: Vec<String> = split_access_path(field)
        .iter()
        .map(|p| string_value(p))
        .collect();
    format!("datum[{}]", path.join("]["))
}

/// Escapes dots so the runtime reads the name as one flat field.
pub fn replace_path_in_field(field: &str) -> String {
    split_access_path(field)
        .iter()
        .map(|p| p.replace('.', "\\."))
        .collect::<Vec<_>>()
        .join("\\.")
}

/// Joins the access path with plain dots, dropping escapes.
pub fn remove_path_from_field(field: &str) -> String {
    split_access_path(field).join(".")
}

/// Replaces characters that are not valid in signal names.
pub fn var_name(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// True when the two sets share a field. `None` means "unknown", which overlaps everything.
pub fn fields_intersect(a: Option<&FieldSet>, b: Option<&FieldSet>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.iter().any(|f| b.contains(f)),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn nested_paths_are_guarded() {
        assert_eq!(access_path_depth("a.b"), 2);
        assert_eq!(access_path_depth("a\\.b"), 1);
        assert_eq!(
            access_path_with_datum("a.b"),
            r#"datum["a"] && datum["a"]["b"]"#
        );
        assert_eq!(flat_access_with_datum("x"), r#"datum["x"]"#);
    }

    #[test]
    fn escaped_and_flattened_names() {
        assert_eq!(replace_path_in_field("a.b"), "a\\.b");
        assert_eq!(remove_path_from_field("a\\.b"), "a.b");
        assert_eq!(var_name("bin_maxbins_10-x"), "bin_maxbins_10_x");
    }

    #[test]
    fn unknown_fields_always_intersect() {
        let a: FieldSet = ["x".into()].into_iter().collect();
        let b: FieldSet = ["y".into()].into_iter().collect();
        assert!(!fields_intersect(Some(&a), Some(&b)));
        assert!(fields_intersect(None, Some(&b)));
    }
}
