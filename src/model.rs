//! Data models for carton packing.
//!
//! This module defines the reference data the engine reads:
//! - `Carton`: a shipping box from the catalog
//! - `ItemProfile`: the packing profile of one SKU
//! - `OrderLineEntry`: an item profile plus the quantity to pack
//! - `PackingProfile`: an item profile with every optional field resolved
//!
//! Everything is validated at the boundary; the packing pipeline only ever
//! sees finite, positive dimensions and non-negative margins.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{BoundingBox, MM3_PER_M3, Vec3};

/// Identifier of a catalog box.
pub type BoxId = String;

/// Contract violations found while validating packing input.
///
/// Packing infeasibility is never reported through this type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid margin: {0}")]
    InvalidMargin(String),
    #[error("Empty identifier: {0}")]
    EmptyIdentifier(String),
    #[error("Duplicate box id '{0}'")]
    DuplicateBoxId(String),
    #[error("Unknown box id '{0}'")]
    UnknownBox(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidDimension(_) => "invalid_dimension",
            ValidationError::InvalidQuantity(_) => "invalid_quantity",
            ValidationError::InvalidWeight(_) => "invalid_weight",
            ValidationError::InvalidMargin(_) => "invalid_margin",
            ValidationError::EmptyIdentifier(_) => "empty_identifier",
            ValidationError::DuplicateBoxId(_) => "duplicate_box_id",
            ValidationError::UnknownBox(_) => "unknown_box",
            ValidationError::InvalidConfiguration(_) => "invalid_configuration",
        }
    }
}

fn validate_dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be positive and finite, got: {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_margin(value: Option<f64>, name: &str) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ValidationError::InvalidMargin(format!(
            "{} must be non-negative and finite, got: {}",
            name, v
        ))),
        _ => Ok(()),
    }
}

fn validate_weight(value: Option<f64>, name: &str) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ValidationError::InvalidWeight(format!(
            "{} must be non-negative and finite, got: {}",
            name, v
        ))),
        _ => Ok(()),
    }
}

fn validate_identifier(value: &str, what: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyIdentifier(format!(
            "{} id must not be empty",
            what
        )));
    }
    Ok(())
}

/// Inner (or outer) dimensions of a box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoxDims {
    #[serde(rename = "W", alias = "width")]
    pub width: f64,
    #[serde(rename = "D", alias = "depth")]
    pub depth: f64,
    #[serde(rename = "H", alias = "height")]
    pub height: f64,
}

impl BoxDims {
    pub const fn new(width: f64, depth: f64, height: f64) -> Self {
        Self {
            width,
            depth,
            height,
        }
    }

    pub fn volume_mm3(&self) -> f64 {
        self.width * self.depth * self.height
    }

    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.width, self.depth, self.height)
    }

    fn validate(&self, prefix: &str) -> Result<(), ValidationError> {
        validate_dimension(self.width, &format!("{prefix} width"))?;
        validate_dimension(self.depth, &format!("{prefix} depth"))?;
        validate_dimension(self.height, &format!("{prefix} height"))?;
        Ok(())
    }
}

/// A shipping box from the catalog. Read-only reference data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "M-60",
    "inner": { "W": 600.0, "D": 400.0, "H": 400.0 },
    "maxWeightKg": 25.0,
    "boxWeightKg": 1.2
}))]
pub struct Carton {
    pub id: BoxId,
    pub inner: BoxDims,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer: Option<BoxDims>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_weight_kg: Option<f64>,
}

impl Carton {
    /// Creates a validated carton without weight data.
    ///
    /// # Examples
    /// ```
    /// use carton_packer::model::{BoxDims, Carton};
    ///
    /// assert!(Carton::new("S", BoxDims::new(300.0, 200.0, 150.0)).is_ok());
    /// assert!(Carton::new("S", BoxDims::new(-1.0, 200.0, 150.0)).is_err());
    /// ```
    pub fn new(id: impl Into<BoxId>, inner: BoxDims) -> Result<Self, ValidationError> {
        let carton = Self {
            id: id.into(),
            inner,
            outer: None,
            max_weight_kg: None,
            box_weight_kg: None,
        };
        carton.validate()?;
        Ok(carton)
    }

    pub fn with_max_weight(mut self, max_weight_kg: f64) -> Self {
        self.max_weight_kg = Some(max_weight_kg);
        self
    }

    pub fn with_box_weight(mut self, box_weight_kg: f64) -> Self {
        self.box_weight_kg = Some(box_weight_kg);
        self
    }

    pub fn with_outer(mut self, outer: BoxDims) -> Self {
        self.outer = Some(outer);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier(&self.id, "Box")?;
        self.inner.validate(&format!("Box '{}' inner", self.id))?;
        if let Some(outer) = &self.outer {
            outer.validate(&format!("Box '{}' outer", self.id))?;
        }
        validate_weight(self.max_weight_kg, "maxWeightKg")?;
        validate_weight(self.box_weight_kg, "boxWeightKg")?;
        Ok(())
    }

    pub fn inner_volume_mm3(&self) -> f64 {
        self.inner.volume_mm3()
    }

    pub fn inner_volume_m3(&self) -> f64 {
        self.inner_volume_mm3() / MM3_PER_M3
    }

    /// The whole inner space as a bounding box anchored at the origin.
    pub fn inner_bounds(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(Vec3::zero(), self.inner.as_vec3())
    }
}

/// Validates a catalog: every box valid, ids unique.
pub fn validate_catalog(boxes: &[Carton]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for carton in boxes {
        carton.validate()?;
        if !seen.insert(carton.id.as_str()) {
            return Err(ValidationError::DuplicateBoxId(carton.id.clone()));
        }
    }
    Ok(())
}

/// Rejects orders whose summed quantity does not fit a `u32` counter.
pub fn validate_order_total(entries: &[OrderLineEntry]) -> Result<u32, ValidationError> {
    let total: u64 = entries.iter().map(|e| u64::from(e.quantity)).sum();
    u32::try_from(total).map_err(|_| {
        ValidationError::InvalidQuantity(format!(
            "order total must not exceed {}, got: {total}",
            u32::MAX
        ))
    })
}

/// Physical item dimensions as catalogued (before any rotation).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemDims {
    pub w: f64,
    pub d: f64,
    pub h: f64,
}

impl ItemDims {
    pub const fn new(w: f64, d: f64, h: f64) -> Self {
        Self { w, d, h }
    }

    pub const fn as_array(&self) -> [f64; 3] {
        [self.w, self.d, self.h]
    }

    pub fn volume(&self) -> f64 {
        self.w * self.d * self.h
    }
}

/// Packing profile of one SKU. Unset fields fall back to `PackingDefaults`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub dims: ItemDims,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_weight_kg: Option<f64>,
    #[serde(default)]
    pub keep_upright: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_margin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_margin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_margin: Option<f64>,
    #[serde(default, rename = "gapXY", skip_serializing_if = "Option::is_none")]
    pub gap_xy: Option<f64>,
    #[serde(default, rename = "gapZ", skip_serializing_if = "Option::is_none")]
    pub gap_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stack_layers: Option<u32>,
}

impl ItemProfile {
    /// Creates a bare profile: no weight, no margins, free rotation.
    pub fn new(id: impl Into<String>, dims: ItemDims) -> Self {
        Self {
            id: id.into(),
            name: None,
            dims,
            unit_weight_kg: None,
            keep_upright: false,
            side_margin: None,
            front_margin: None,
            top_margin: None,
            gap_xy: None,
            gap_z: None,
            max_stack_layers: None,
        }
    }

    pub fn with_unit_weight(mut self, kg: f64) -> Self {
        self.unit_weight_kg = Some(kg);
        self
    }

    pub fn upright(mut self) -> Self {
        self.keep_upright = true;
        self
    }

    pub fn with_margins(mut self, side: f64, front: f64, top: f64) -> Self {
        self.side_margin = Some(side);
        self.front_margin = Some(front);
        self.top_margin = Some(top);
        self
    }

    pub fn with_gaps(mut self, gap_xy: f64, gap_z: f64) -> Self {
        self.gap_xy = Some(gap_xy);
        self.gap_z = Some(gap_z);
        self
    }

    pub fn with_max_stack_layers(mut self, layers: u32) -> Self {
        self.max_stack_layers = Some(layers);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier(&self.id, "Item")?;
        validate_dimension(self.dims.w, &format!("Item '{}' w", self.id))?;
        validate_dimension(self.dims.d, &format!("Item '{}' d", self.id))?;
        validate_dimension(self.dims.h, &format!("Item '{}' h", self.id))?;
        validate_weight(self.unit_weight_kg, "unitWeightKg")?;
        validate_margin(self.side_margin, "sideMargin")?;
        validate_margin(self.front_margin, "frontMargin")?;
        validate_margin(self.top_margin, "topMargin")?;
        validate_margin(self.gap_xy, "gapXY")?;
        validate_margin(self.gap_z, "gapZ")?;
        if self.max_stack_layers == Some(0) {
            return Err(ValidationError::InvalidQuantity(format!(
                "Item '{}' maxStackLayers must be at least 1",
                self.id
            )));
        }
        Ok(())
    }

    /// Fills every unset field from `defaults`.
    pub fn resolve(&self, defaults: &PackingDefaults) -> PackingProfile {
        PackingProfile {
            id: self.id.clone(),
            dims: self.dims,
            unit_weight_kg: self
                .unit_weight_kg
                .or(defaults.unit_weight_kg)
                .unwrap_or(0.0),
            keep_upright: self.keep_upright,
            side_margin: self.side_margin.unwrap_or(defaults.side_margin),
            front_margin: self.front_margin.unwrap_or(defaults.front_margin),
            top_margin: self.top_margin.unwrap_or(defaults.top_margin),
            gap_xy: self.gap_xy.unwrap_or(defaults.gap_xy),
            gap_z: self.gap_z.unwrap_or(defaults.gap_z),
            max_stack_layers: self.max_stack_layers.or(defaults.max_stack_layers),
        }
    }
}

/// One order line: an item profile plus the quantity to pack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "SKU-1",
    "dims": { "w": 100.0, "d": 80.0, "h": 50.0 },
    "unitWeightKg": 0.4,
    "quantity": 24
}))]
pub struct OrderLineEntry {
    #[serde(flatten)]
    pub item: ItemProfile,
    pub quantity: u32,
}

impl OrderLineEntry {
    pub fn new(item: ItemProfile, quantity: u32) -> Self {
        Self { item, quantity }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.item.validate()?;
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity(format!(
                "Item '{}' quantity must be positive",
                self.item.id
            )));
        }
        Ok(())
    }
}

/// Shop-wide fallbacks for item fields left unset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackingDefaults {
    pub side_margin: f64,
    pub front_margin: f64,
    pub top_margin: f64,
    #[serde(rename = "gapXY")]
    pub gap_xy: f64,
    #[serde(rename = "gapZ")]
    pub gap_z: f64,
    #[serde(default)]
    pub max_stack_layers: Option<u32>,
    #[serde(default)]
    pub unit_weight_kg: Option<f64>,
}

impl PackingDefaults {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_margin(Some(self.side_margin), "default sideMargin")?;
        validate_margin(Some(self.front_margin), "default frontMargin")?;
        validate_margin(Some(self.top_margin), "default topMargin")?;
        validate_margin(Some(self.gap_xy), "default gapXY")?;
        validate_margin(Some(self.gap_z), "default gapZ")?;
        validate_weight(self.unit_weight_kg, "default unitWeightKg")?;
        if self.max_stack_layers == Some(0) {
            return Err(ValidationError::InvalidConfiguration(
                "default maxStackLayers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// An item profile with every field resolved. Only the engine builds these.
#[derive(Clone, Debug, PartialEq)]
pub struct PackingProfile {
    pub id: String,
    pub dims: ItemDims,
    pub unit_weight_kg: f64,
    pub keep_upright: bool,
    pub side_margin: f64,
    pub front_margin: f64,
    pub top_margin: f64,
    pub gap_xy: f64,
    pub gap_z: f64,
    pub max_stack_layers: Option<u32>,
}

impl PackingProfile {
    pub fn unit_volume(&self) -> f64 {
        self.dims.volume()
    }

    /// Whether a layer built around `primary` also suits this profile.
    ///
    /// Every clearance of `self` must be covered by the primary's clearances.
    pub fn nests_within(&self, primary: &PackingProfile) -> bool {
        self.side_margin <= primary.side_margin
            && self.front_margin <= primary.front_margin
            && self.top_margin <= primary.top_margin
            && self.gap_z <= primary.gap_z
    }
}

/// Merges order lines with identical packing profiles, keeping first-seen order.
///
/// Two lines merge when their items are equal field by field, so the same SKU
/// with a different margin override stays a separate entry.
pub fn aggregate_lines(lines: &[OrderLineEntry]) -> Vec<OrderLineEntry> {
    let mut merged: Vec<OrderLineEntry> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.item == line.item) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(line.clone()),
        }
    }
    merged
}

/// One packed unit with its absolute position inside a carton.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacedItem {
    pub entry_index: usize,
    pub item_id: String,
    pub layer_index: usize,
    #[schema(value_type = [f64; 3])]
    pub position: [f64; 3],
    #[schema(value_type = [f64; 3])]
    pub dims: [f64; 3],
}

impl PlacedItem {
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(
            Vec3::from_array(self.position),
            Vec3::from_array(self.dims),
        )
    }

    pub fn top_z(&self) -> f64 {
        self.position[2] + self.dims[2]
    }
}
