// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Time unit truncation and date-time expressions.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::Serialize;
use serde_json::Value;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::{FieldSet, access_path_with_datum, replace_path_in_field};
use crate::vega::VgTransform;

/// Single time units, coarsest first.
pub const TIME_UNIT_PARTS: [&str; 11] = [
    "year",
    "quarter",
    "month",
    "week",
    "day",
    "dayofyear",
    "date",
    "hours",
    "minutes",
    "seconds",
    "milliseconds",
];

/// A parsed (possibly composite) time unit such as `utcyearmonth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeUnit {
    /// UTC rather than local time.
    pub utc: bool,
    /// Single units, coarsest first.
    pub parts: Vec<&'static str>,
}

fn contains_time_unit(full: &str, part: &str) -> bool {
    let Some(index) = full.find(part) else {
        return false;
    };
    let bytes = full.as_bytes();
    if part == "seconds" && index > 0 && bytes[index - 1] == b'i' {
        // milliseconds
        return false;
    }
    if part == "day" && bytes.get(index + 3) == Some(&b'o') {
        // dayofyear
        return false;
    }
    if part == "year" && index > 0 && bytes[index - 1] == b'f' {
        // dayofyear
        return false;
    }
    true
}

impl TimeUnit {
    /// Parses a unit name, or returns `None` if it names no known unit.
    pub fn parse(unit: &str) -> Option<Self> {
        let (utc, rest) = match unit.strip_prefix("utc") {
            Some(rest) => (true, rest),
            None => (false, unit),
        };
        let parts: Vec<&'static str> = TIME_UNIT_PARTS
            .iter()
            .copied()
            .filter(|part| contains_time_unit(rest, part))
            .collect();
        // Every character must be accounted for, so `yearz` is rejected.
        let covered: usize = parts.iter().map(|p| p.len()).sum();
        if parts.is_empty() || covered != rest.len() {
            return None;
        }
        Some(Self { utc, parts })
    }

    /// Expression truncating `field` to this unit, as a `datetime(...)` call.
    pub fn field_expr(&self, field: &str) -> String {
        let f = access_path_with_datum(field);
        let utc = if self.utc { "utc" } else { "" };
        let mut parts = DateTimeParts::default();
        for &part in &self.parts {
            let call = format!("{utc}{part}({f})");
            match part {
                "year" => parts.year = Some(call),
                "quarter" => parts.month = Some(format!("({utc}quarter({f})-1)*3")),
                "month" => parts.month = Some(call),
                "date" => parts.date = Some(call),
                "day" => parts.day = Some(call),
                "hours" => parts.hours = Some(call),
                "minutes" => parts.minutes = Some(call),
                "seconds" => parts.seconds = Some(call),
                "milliseconds" => parts.milliseconds = Some(call),
                _ => {}
            }
        }
        parts.to_expr(self.utc)
    }
}

/// Arguments of a `datetime(...)` expression.
#[derive(Debug, Clone, Default)]
struct DateTimeParts {
    year: Option<String>,
    month: Option<String>,
    date: Option<String>,
    day: Option<String>,
    hours: Option<String>,
    minutes: Option<String>,
    seconds: Option<String>,
    milliseconds: Option<String>,
}

impl DateTimeParts {
    fn to_expr(&self, utc: bool) -> String {
        // 2006-01-01 is a Sunday, which lets `day` offsets land on the right weekday.
        let default_year = if self.day.is_some() { "2006" } else { "2012" };
        let date = match (&self.date, &self.day) {
            (Some(date), _) => date.clone(),
            (None, Some(day)) => format!("{day}+1"),
            (None, None) => "1".into(),
        };
        let args = [
            self.year.clone().unwrap_or_else(|| default_year.into()),
            self.month.clone().unwrap_or_else(|| "0".into()),
            date,
            self.hours.clone().unwrap_or_else(|| "0".into()),
            self.minutes.clone().unwrap_or_else(|| "0".into()),
            self.seconds.clone().unwrap_or_else(|| "0".into()),
            self.milliseconds.clone().unwrap_or_else(|| "0".into()),
        ];
        let func = if utc { "utc" } else { "datetime" };
        format!("{func}({})", args.join(", "))
    }
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

fn name_index(value: &Value, names: &[&str]) -> Option<usize> {
    let s = value.as_str()?.to_ascii_lowercase();
    names.iter().position(|n| s.starts_with(n))
}

fn number_part(value: Option<&Value>) -> Option<String> {
    value.map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// True for objects written as date-time literals, e.g. `{"year": 2000, "month": 3}`.
pub fn is_date_time(value: &Value) -> bool {
    const KEYS: [&str; 10] = [
        "year",
        "quarter",
        "month",
        "date",
        "day",
        "hours",
        "minutes",
        "seconds",
        "milliseconds",
        "utc",
    ];
    value
        .as_object()
        .is_some_and(|o| !o.is_empty() && o.keys().all(|k| KEYS.contains(&k.as_str())))
}

/// Expression for a date-time literal object. Months and quarters are 1-based in the input.
pub fn date_time_expr(value: &Value) -> String {
    let get = |k: &str| value.get(k);
    let month = match get("month") {
        Some(v) if v.is_string() => name_index(v, &MONTHS).map(|i| i.to_string()),
        Some(v) => v.as_i64().map(|m| (m - 1).to_string()),
        None => get("quarter")
            .and_then(Value::as_i64)
            .map(|q| format!("{}*3", q - 1)),
    };
    let day = match get("day") {
        Some(v) if v.is_string() => name_index(v, &DAYS).map(|i| i.to_string()),
        other => number_part(other),
    };
    let parts = DateTimeParts {
        year: number_part(get("year")),
        month,
        date: number_part(get("date")),
        day,
        hours: number_part(get("hours")),
        minutes: number_part(get("minutes")),
        seconds: number_part(get("seconds")),
        milliseconds: number_part(get("milliseconds")),
    };
    let utc = get("utc").and_then(Value::as_bool).unwrap_or(false);
    parts.to_expr(utc)
}

/// One truncated output field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeUnitComponent {
    /// Input field.
    pub field: String,
    /// Output start field; the end field adds `_end`.
    #[serde(rename = "as")]
    pub as_: String,
    /// The unit.
    pub unit: TimeUnit,
}

/// Truncates fields to time units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeUnitNode {
    /// Components keyed by output field.
    pub formula: BTreeMap<String, TimeUnitComponent>,
}

impl TimeUnitNode {
    /// A node with one component.
    pub fn single(component: TimeUnitComponent) -> Self {
        Self {
            formula: BTreeMap::from([(component.as_.clone(), component)]),
        }
    }

    /// Adds the components of `other` that this node lacks.
    pub fn merge(&mut self, other: &Self) {
        for (key, component) in &other.formula {
            self.formula
                .entry(key.clone())
                .or_insert_with(|| component.clone());
        }
    }
}

impl FlowNode for TimeUnitNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(
            self.formula
                .values()
                .flat_map(|c| [c.as_.clone(), format!("{}_end", c.as_)])
                .collect(),
        )
    }

    fn dependent_fields(&self) -> FieldSet {
        self.formula.values().map(|c| c.field.clone()).collect()
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        for c in self.formula.values() {
            out.push(VgTransform::TimeUnit {
                field: replace_path_in_field(&c.field),
                as_: [c.as_.clone(), format!("{}_end", c.as_)],
                units: c.unit.parts.iter().map(|p| String::from(*p)).collect(),
                timezone: c.unit.utc.then(|| String::from("utc")),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use serde_json::json;

    use super::*;

    #[test]
    fn composite_units_split_into_parts() {
        let unit = TimeUnit::parse("yearmonthdate").unwrap();
        assert_eq!(unit.parts, ["year", "month", "date"]);
        assert!(!unit.utc);

        let unit = TimeUnit::parse("utcdayofyear").unwrap();
        assert_eq!(unit.parts, ["dayofyear"]);
        assert!(unit.utc);

        let unit = TimeUnit::parse("secondsmilliseconds").unwrap();
        assert_eq!(unit.parts, ["seconds", "milliseconds"]);

        assert_eq!(TimeUnit::parse("fortnight"), None);
        assert_eq!(TimeUnit::parse("yearz"), None);
    }

    #[test]
    fn field_expressions_fill_missing_parts() {
        let unit = TimeUnit::parse("month").unwrap();
        assert_eq!(
            unit.field_expr("date"),
            r#"datetime(2012, month(datum["date"]), 1, 0, 0, 0, 0)"#
        );
    }

    #[test]
    fn date_time_literals() {
        let v = json!({"year": 2000, "month": "Feb", "date": 3});
        assert!(is_date_time(&v));
        assert_eq!(date_time_expr(&v), "datetime(2000, 1, 3, 0, 0, 0, 0)");
        assert!(!is_date_time(&json!({"field": "a"})));
    }

    #[test]
    fn assembles_start_and_end() {
        let node = TimeUnitNode::single(TimeUnitComponent {
            field: "date".into(),
            as_: "month_date".into(),
            unit: TimeUnit::parse("utcmonth").unwrap(),
        });
        let mut out = Vec::new();
        node.assemble(&mut CompileContext::default(), &mut out);
        assert_eq!(
            serde_json::to_value(&out[0]).unwrap(),
            json!({
                "type": "timeunit", "field": "date", "as": ["month_date", "month_date_end"],
                "units": ["month"], "timezone": "utc"
            })
        );
    }
}
