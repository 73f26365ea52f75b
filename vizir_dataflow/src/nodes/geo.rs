// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geographic nodes.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use super::FlowNode;
use crate::context::CompileContext;
use crate::field::FieldSet;
use crate::vega::VgTransform;

/// Collects features into a signal, for fitting a projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoJsonNode {
    /// Longitude and latitude fields.
    pub fields: Option<[String; 2]>,
    /// Field holding a geometry.
    pub geojson: Option<String>,
    /// Output signal.
    pub signal: String,
}

impl FlowNode for GeoJsonNode {
    fn dependent_fields(&self) -> FieldSet {
        let mut out: FieldSet = self.fields.iter().flatten().cloned().collect();
        out.extend(self.geojson.iter().cloned());
        out
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::GeoJson {
            fields: self.fields.clone(),
            geojson: self.geojson.clone(),
            signal: self.signal.clone(),
        });
    }
}

/// Projects longitude/latitude into x/y.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPointNode {
    /// Projection name.
    pub projection: String,
    /// Longitude and latitude fields.
    pub fields: [String; 2],
    /// Output x and y fields.
    #[serde(rename = "as")]
    pub as_: [String; 2],
}

impl FlowNode for GeoPointNode {
    fn produced_fields(&self) -> Option<FieldSet> {
        Some(self.as_.iter().cloned().collect())
    }

    fn dependent_fields(&self) -> FieldSet {
        self.fields.iter().cloned().collect()
    }

    fn assemble(&self, _ctx: &mut CompileContext, out: &mut Vec<VgTransform>) {
        out.push(VgTransform::GeoPoint {
            projection: self.projection.clone(),
            fields: self.fields.clone(),
            as_: self.as_.clone(),
        });
    }
}
