//! Quantity plan: which single box a SKU ships in, for every order size.
//!
//! Each quantity `1..=max` is packed on its own with AUTO selection. Runs of
//! consecutive quantities that end up with the same arrangement collapse into
//! one range. Quantities that no single box takes form ranges without a plan.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::{BoxId, Carton, ItemProfile, OrderLineEntry, ValidationError, validate_catalog};
use crate::optimizer::PackingConfig;
use crate::orientation::Permutation;
use crate::selector::BoxSelector;
use crate::summary::PackingSelection;

/// Largest quantity a plan walks up to; larger requests are clamped.
pub const MAX_PLAN_QUANTITY: u32 = 500;

/// Single-box arrangement shared by a range of quantities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuantityPlan {
    pub box_id: BoxId,
    /// Oriented unit dims of the bottom layer.
    #[schema(value_type = [f64; 3])]
    pub orientation: [f64; 3],
    pub permutation: Permutation,
    pub count: u32,
    pub rows: u32,
    pub layers: u32,
    /// Units the arrangement holds with every layer full.
    pub capacity: u32,
    /// Void ratio at the first quantity of the range.
    pub void_ratio: f64,
}

impl QuantityPlan {
    fn from_selection(selection: &PackingSelection) -> Option<Self> {
        let column = selection.layers.first()?.layer.columns.first()?;
        let layers = u32::try_from(selection.layers.len()).unwrap_or(u32::MAX);
        Some(Self {
            box_id: selection.box_id.clone(),
            orientation: column.orientation,
            permutation: column.permutation,
            count: column.count,
            rows: column.rows,
            layers,
            capacity: column.capacity().saturating_mul(layers),
            void_ratio: selection.void_ratio,
        })
    }

    /// Same box, orientation, grid and layer count.
    fn same_arrangement(&self, other: &Self) -> bool {
        self.box_id == other.box_id
            && self.permutation == other.permutation
            && self.count == other.count
            && self.rows == other.rows
            && self.layers == other.layers
    }
}

/// Consecutive quantities `start..=end` sharing one plan, or none.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuantityRange {
    pub start: u32,
    pub end: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<QuantityPlan>,
}

impl QuantityRange {
    pub fn label(&self) -> String {
        if self.start == self.end {
            self.start.to_string()
        } else {
            format!("{}–{}", self.start, self.end)
        }
    }
}

/// Plans `item` for every quantity from 1 to `max_quantity`.
///
/// `max_quantity` is clamped to [`MAX_PLAN_QUANTITY`]. Zero is rejected.
pub fn plan_quantities(
    item: &ItemProfile,
    boxes: &[Carton],
    max_quantity: u32,
    config: &PackingConfig,
) -> Result<Vec<QuantityRange>, ValidationError> {
    if max_quantity == 0 {
        return Err(ValidationError::InvalidQuantity(
            "maxQuantity must be at least 1".to_string(),
        ));
    }
    config.validate()?;
    OrderLineEntry::new(item.clone(), 1).validate()?;
    validate_catalog(boxes)?;

    let limit = max_quantity.min(MAX_PLAN_QUANTITY);
    let profiles = [item.resolve(&config.defaults)];
    let policy = config.layer_policy();
    let selector = BoxSelector::new(
        &profiles,
        config.box_padding,
        config.packaging_multiplier,
        &policy,
    );

    let plans: Vec<Option<QuantityPlan>> = (1..=limit)
        .into_par_iter()
        .map(|quantity| {
            let outcome = selector.select_auto(boxes, &[quantity], |_| {});
            outcome
                .selection
                .filter(|s| s.packed_quantity == quantity && s.weight.within_limit)
                .and_then(|s| QuantityPlan::from_selection(&s))
        })
        .collect();

    let ranges = group_ranges(plans);
    tracing::debug!(
        item_id = %item.id,
        quantities = limit,
        ranges = ranges.len(),
        "quantity plan built"
    );
    Ok(ranges)
}

/// Folds per-quantity plans (index 0 is quantity 1) into ranges.
fn group_ranges(plans: Vec<Option<QuantityPlan>>) -> Vec<QuantityRange> {
    let mut ranges: Vec<QuantityRange> = Vec::new();
    for (quantity, plan) in (1u32..).zip(plans) {
        match ranges.last_mut() {
            Some(current) if continues(current.plan.as_ref(), plan.as_ref()) => {
                current.end = quantity;
            }
            _ => ranges.push(QuantityRange {
                start: quantity,
                end: quantity,
                plan,
            }),
        }
    }
    ranges
}

fn continues(current: Option<&QuantityPlan>, next: Option<&QuantityPlan>) -> bool {
    match (current, next) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_arrangement(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoxDims, ItemDims};

    fn item() -> ItemProfile {
        ItemProfile::new("A", ItemDims::new(100.0, 80.0, 50.0)).upright()
    }

    fn small() -> Carton {
        Carton::new("S", BoxDims::new(200.0, 160.0, 100.0)).unwrap()
    }

    #[test]
    fn quantities_group_by_layer_count() {
        // 2 × 2 per layer, two layers fit.
        let ranges = plan_quantities(&item(), &[small()], 8, &PackingConfig::default()).unwrap();
        assert_eq!(ranges.len(), 2);

        assert_eq!((ranges[0].start, ranges[0].end), (1, 4));
        let plan = ranges[0].plan.as_ref().unwrap();
        assert_eq!(plan.box_id, "S");
        assert_eq!((plan.count, plan.rows, plan.layers), (2, 2, 1));
        assert_eq!(plan.capacity, 4);

        assert_eq!((ranges[1].start, ranges[1].end), (5, 8));
        assert_eq!(ranges[1].plan.as_ref().unwrap().layers, 2);
    }

    #[test]
    fn quantities_beyond_every_box_form_a_none_range() {
        let ranges = plan_quantities(&item(), &[small()], 12, &PackingConfig::default()).unwrap();
        let last = ranges.last().unwrap();
        assert_eq!((last.start, last.end), (9, 12));
        assert_eq!(last.plan, None);
        assert_eq!(last.label(), "9–12");
    }

    #[test]
    fn larger_quantities_move_to_the_next_box() {
        let large = Carton::new("L", BoxDims::new(400.0, 160.0, 100.0)).unwrap();
        let ranges =
            plan_quantities(&item(), &[large, small()], 16, &PackingConfig::default()).unwrap();
        let boxes: Vec<&str> = ranges
            .iter()
            .filter_map(|r| r.plan.as_ref().map(|p| p.box_id.as_str()))
            .collect();
        assert_eq!(boxes.first(), Some(&"S"));
        assert_eq!(boxes.last(), Some(&"L"));
        assert_eq!(ranges.last().map(|r| r.end), Some(16));
    }

    #[test]
    fn max_quantity_is_clamped() {
        let ranges = plan_quantities(&item(), &[small()], 10_000, &PackingConfig::default()).unwrap();
        assert_eq!(ranges.last().map(|r| r.end), Some(MAX_PLAN_QUANTITY));
    }

    #[test]
    fn zero_max_quantity_is_rejected() {
        assert!(matches!(
            plan_quantities(&item(), &[small()], 0, &PackingConfig::default()),
            Err(ValidationError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn grouping_splits_on_none_between_equal_plans() {
        let plan = QuantityPlan {
            box_id: "S".to_string(),
            orientation: [1.0, 1.0, 1.0],
            permutation: Permutation::Wdh,
            count: 1,
            rows: 1,
            layers: 1,
            capacity: 1,
            void_ratio: 0.0,
        };
        let ranges = group_ranges(vec![Some(plan.clone()), None, None, Some(plan)]);
        let spans: Vec<(u32, u32, bool)> = ranges
            .iter()
            .map(|r| (r.start, r.end, r.plan.is_some()))
            .collect();
        assert_eq!(spans, vec![(1, 1, true), (2, 3, false), (4, 4, true)]);
        assert_eq!(ranges[0].label(), "1");
    }
}
