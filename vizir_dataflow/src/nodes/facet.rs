// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Facet partitioning.
//!
//! A [`FacetNode`] splits its input into one group per combination of facet field values.
//! It contributes no transforms to the chain it sits in; instead it produces helper datasets
//! for header domains, and the nodes below it are assembled into the facet's own scope.

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::FlowNode;
use crate::field::FieldSet;
use crate::vega::{Dataset, VgTransform};

/// How the groups of one facet channel are ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetSort {
    /// Aggregate op applied to `field` per group.
    pub op: String,
    /// Field to aggregate.
    pub field: String,
    /// Name of the aggregated value.
    pub as_: String,
}

/// One partitioning channel (`row`, `column` or `facet`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetChannel {
    /// Name of the header domain dataset.
    pub name: String,
    /// Grouping fields (two for binned fields).
    pub fields: Vec<String>,
    /// Sort by an aggregated field.
    pub sort: Option<FacetSort>,
    /// Sort by a computed literal-order index.
    pub sort_index_field: Option<String>,
}

/// Fan-out of a facet view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetNode {
    /// Name of the partition.
    pub name: String,
    /// Requested name of the data being partitioned; replaced by the final dataset name at
    /// assembly.
    pub data: String,
    /// Row channel.
    pub row: Option<FacetChannel>,
    /// Column channel.
    pub column: Option<FacetChannel>,
    /// Wrapped facet channel.
    pub facet: Option<FacetChannel>,
    /// Fields of child x scales resolved independently with discrete domains.
    pub child_x: Option<String>,
    /// Fields of child y scales resolved independently with discrete domains.
    pub child_y: Option<String>,
}

impl FacetNode {
    fn channels(&self) -> impl Iterator<Item = &FacetChannel> {
        self.row.iter().chain(&self.column).chain(&self.facet)
    }

    /// Partitioning fields, row first.
    pub fn fields(&self) -> Vec<String> {
        self.channels()
            .flat_map(|c| c.fields.iter().cloned())
            .collect()
    }

    /// Header and cross-product datasets derived from `data`, the final name of the
    /// partitioned dataset.
    pub fn assemble_helpers(&self, data: &str) -> Vec<Dataset> {
        let mut out = Vec::new();
        let mut crossed = None;

        if let (Some(row), Some(column)) = (&self.row, &self.column)
            && (self.child_x.is_some() || self.child_y.is_some())
        {
            let name = format!("cross_{}_{}", column.name, row.name);
            let mut fields: Vec<Option<String>> = Vec::new();
            let mut ops = Vec::new();
            let mut as_ = Vec::new();
            for f in self.child_x.iter().chain(&self.child_y) {
                fields.push(Some(f.clone()));
                ops.push(String::from("distinct"));
                as_.push(format!("distinct_{f}"));
            }
            for sort in [&row.sort, &column.sort].into_iter().flatten() {
                fields.push(Some(sort.field.clone()));
                ops.push(sort.op.clone());
                as_.push(sort.as_.clone());
            }
            out.push(Dataset {
                name: name.clone(),
                source: Some(data.into()),
                transform: vec![VgTransform::Aggregate {
                    groupby: self.fields(),
                    ops,
                    fields,
                    as_,
                }],
                ..Dataset::default()
            });
            crossed = Some(name);
        }

        let headers = [
            (&self.column, self.child_x.as_ref()),
            (&self.row, self.child_y.as_ref()),
            (&self.facet, None),
        ];
        for (channel, child) in headers {
            let Some(channel) = channel else {
                continue;
            };
            out.push(self.header_data(channel, child, crossed.as_deref(), data));
        }
        out
    }

    fn header_data(
        &self,
        channel: &FacetChannel,
        child: Option<&String>,
        crossed: Option<&str>,
        data: &str,
    ) -> Dataset {
        let mut fields = Vec::new();
        let mut ops = Vec::new();
        let mut as_ = Vec::new();
        if let Some(child) = child {
            let distinct = format!("distinct_{child}");
            if crossed.is_some() {
                fields.push(Some(distinct.clone()));
                ops.push(String::from("max"));
            } else {
                fields.push(Some(child.clone()));
                ops.push(String::from("distinct"));
            }
            as_.push(distinct);
        }
        if let Some(sort) = &channel.sort {
            // The cross-product dataset already aggregated the sort field.
            if crossed.is_some() {
                fields.push(Some(sort.as_.clone()));
                ops.push(String::from("max"));
            } else {
                fields.push(Some(sort.field.clone()));
                ops.push(sort.op.clone());
            }
            as_.push(sort.as_.clone());
        } else if let Some(index) = &channel.sort_index_field {
            fields.push(Some(index.clone()));
            ops.push(String::from("max"));
            as_.push(index.clone());
        }
        Dataset {
            name: channel.name.clone(),
            source: Some(crossed.unwrap_or(data).into()),
            transform: vec![VgTransform::Aggregate {
                groupby: channel.fields.clone(),
                ops,
                fields,
                as_,
            }],
            ..Dataset::default()
        }
    }
}

impl FlowNode for FacetNode {
    fn dependent_fields(&self) -> FieldSet {
        let mut out: FieldSet = self.fields().into_iter().collect();
        for channel in self.channels() {
            if let Some(sort) = &channel.sort {
                out.insert(sort.field.clone());
            }
            if let Some(index) = &channel.sort_index_field {
                out.insert(index.clone());
            }
        }
        out
    }
}
