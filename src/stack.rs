//! Stack planner: how often a layer design repeats vertically.

use crate::types::EPSILON_GENERAL;

/// Vertical repetition of one layer design.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StackPlan {
    pub layers: u32,
    pub layer_height: f64,
    pub gap_z: f64,
    pub capacity: u32,
}

impl StackPlan {
    /// Height occupied by the stack, gaps between layers included.
    pub fn height(&self) -> f64 {
        stacked_height(self.layers, self.layer_height, self.gap_z)
    }
}

/// `floor((available + gap_z) / (layer_height + gap_z))`, capped by `max_layers`.
///
/// Returns 0 when not even one layer fits.
pub fn repetitions(
    available_height: f64,
    layer_height: f64,
    gap_z: f64,
    max_layers: Option<u32>,
) -> u32 {
    if layer_height <= 0.0 || available_height + EPSILON_GENERAL < layer_height {
        return 0;
    }
    let pitch = layer_height + gap_z;
    let raw = ((available_height + gap_z) / pitch + EPSILON_GENERAL).floor();
    let by_height = if raw >= u32::MAX as f64 {
        u32::MAX
    } else {
        raw as u32
    };
    match max_layers {
        Some(cap) => by_height.min(cap),
        None => by_height,
    }
}

/// Height of `layers` stacked layers with `gap_z` between neighbours.
pub fn stacked_height(layers: u32, layer_height: f64, gap_z: f64) -> f64 {
    if layers == 0 {
        return 0.0;
    }
    layers as f64 * layer_height + (layers - 1) as f64 * gap_z
}

/// Plans the stack for a layer design. `None` when the design is infeasible.
pub fn plan(
    layer_capacity: u32,
    layer_height: f64,
    gap_z: f64,
    max_layers: Option<u32>,
    available_height: f64,
) -> Option<StackPlan> {
    if layer_capacity == 0 {
        return None;
    }
    let layers = repetitions(available_height, layer_height, gap_z, max_layers);
    if layers == 0 {
        return None;
    }
    Some(StackPlan {
        layers,
        layer_height,
        gap_z,
        capacity: layers.saturating_mul(layer_capacity),
    })
}
