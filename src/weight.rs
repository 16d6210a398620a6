//! Weight validator.
//!
//! Shipment weight is the packed product weight plus the empty box plus an
//! estimate of dunnage, proportional to the inner volume of the box.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::Carton;
use crate::types::EPSILON_GENERAL;

/// Weight of one selection, broken down by source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeightBreakdown {
    pub product_weight_kg: f64,
    pub box_weight_kg: f64,
    pub packaging_weight_kg: f64,
    pub total_weight_kg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight_kg: Option<f64>,
    pub within_limit: bool,
}

impl WeightBreakdown {
    /// Computes the breakdown for `packed` pairs of (unit weight, quantity).
    pub fn compute(
        packed: impl IntoIterator<Item = (f64, u32)>,
        carton: &Carton,
        packaging_multiplier: f64,
    ) -> Self {
        let product_weight_kg: f64 = packed
            .into_iter()
            .map(|(unit, qty)| unit * qty as f64)
            .sum();
        let box_weight_kg = carton.box_weight_kg.unwrap_or(0.0);
        let packaging_weight_kg = carton.inner_volume_m3() * packaging_multiplier;
        let total_weight_kg = product_weight_kg + box_weight_kg + packaging_weight_kg;
        let within_limit = carton
            .max_weight_kg
            .is_none_or(|max| total_weight_kg <= max + EPSILON_GENERAL);

        Self {
            product_weight_kg,
            box_weight_kg,
            packaging_weight_kg,
            total_weight_kg,
            max_weight_kg: carton.max_weight_kg,
            within_limit,
        }
    }

    /// Kilograms over the ceiling, 0 when within it or unlimited.
    pub fn excess_kg(&self) -> f64 {
        match self.max_weight_kg {
            Some(max) => (self.total_weight_kg - max).max(0.0),
            None => 0.0,
        }
    }
}
