//! Packing summary aggregator and the order-level status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::layer::{Layer, LayerKind};
use crate::model::{BoxId, Carton, PackingProfile};
use crate::weight::WeightBreakdown;

/// Units of one entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntryQuantity {
    pub entry_index: usize,
    pub item_id: String,
    pub quantity: u32,
}

/// One physical layer inside a selection and what was actually placed in it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackedLayer {
    pub layer: Layer,
    /// Height of the layer bottom above the usable floor.
    pub elevation: f64,
    /// Usable footprint corner, measured from the inner box corner.
    #[schema(value_type = [f64; 2])]
    pub origin: [f64; 2],
    /// Usable footprint (width, depth).
    #[schema(value_type = [f64; 2])]
    pub footprint: [f64; 2],
    pub placed: Vec<EntryQuantity>,
}

impl PackedLayer {
    pub fn placed_total(&self) -> u32 {
        self.placed.iter().map(|p| p.quantity).sum()
    }

    pub fn placed_for(&self, entry_index: usize) -> u32 {
        self.placed
            .iter()
            .filter(|p| p.entry_index == entry_index)
            .map(|p| p.quantity)
            .sum()
    }
}

/// One box instance chosen for (part of) the order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackingSelection {
    pub box_id: BoxId,
    pub layers: Vec<PackedLayer>,
    pub packed: Vec<EntryQuantity>,
    pub packed_quantity: u32,
    /// Share of inner volume not occupied by packed units, `0 ≤ r < 1`.
    pub void_ratio: f64,
    pub weight: WeightBreakdown,
}

impl PackingSelection {
    /// Folds packed layers into a selection. `None` when nothing was packed.
    pub fn from_layers(
        carton: &Carton,
        layers: Vec<PackedLayer>,
        profiles: &[PackingProfile],
        packaging_multiplier: f64,
    ) -> Option<Self> {
        let mut totals = vec![0u32; profiles.len()];
        for layer in &layers {
            for placed in &layer.placed {
                totals[placed.entry_index] += placed.quantity;
            }
        }
        let packed_quantity: u32 = totals.iter().sum();
        if packed_quantity == 0 {
            return None;
        }

        let occupied: f64 = totals
            .iter()
            .zip(profiles)
            .map(|(qty, p)| *qty as f64 * p.unit_volume())
            .sum();
        let weight = WeightBreakdown::compute(
            totals
                .iter()
                .zip(profiles)
                .map(|(qty, p)| (p.unit_weight_kg, *qty)),
            carton,
            packaging_multiplier,
        );
        let packed = totals
            .iter()
            .enumerate()
            .filter(|(_, qty)| **qty > 0)
            .map(|(i, qty)| EntryQuantity {
                entry_index: i,
                item_id: profiles[i].id.clone(),
                quantity: *qty,
            })
            .collect();

        Some(Self {
            box_id: carton.id.clone(),
            layers,
            packed,
            packed_quantity,
            void_ratio: void_ratio(occupied, carton.inner_volume_mm3()),
            weight,
        })
    }

    pub fn packed_for(&self, entry_index: usize) -> u32 {
        self.packed
            .iter()
            .filter(|p| p.entry_index == entry_index)
            .map(|p| p.quantity)
            .sum()
    }
}

/// `1 − occupied / volume`, never negative.
pub fn void_ratio(occupied_volume: f64, box_volume: f64) -> f64 {
    if box_volume <= 0.0 {
        return 0.0;
    }
    (1.0 - occupied_volume / box_volume).max(0.0)
}

/// Why a candidate box was not chosen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    NoFittingOrientation {
        item_ids: Vec<String>,
    },
    InsufficientCapacity {
        leftover: u32,
    },
    #[serde(rename_all = "camelCase")]
    WeightExceeded {
        total_weight_kg: f64,
        max_weight_kg: f64,
    },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::NoFittingOrientation { item_ids } => write!(
                f,
                "No permitted orientation fits the box for: {}",
                item_ids.join(", ")
            ),
            RejectionReason::InsufficientCapacity { leftover } => {
                write!(f, "{} units do not fit into the box", leftover)
            }
            RejectionReason::WeightExceeded {
                total_weight_kg,
                max_weight_kg,
            } => write!(
                f,
                "Total weight {:.3} kg exceeds the box limit of {:.3} kg",
                total_weight_kg, max_weight_kg
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoxRejection {
    pub box_id: BoxId,
    pub reasons: Vec<RejectionReason>,
}

/// Order-level reason for a non-successful outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PackingFailure {
    NothingToPack,
    NoCandidateBoxes,
    InsufficientCapacity {
        leftover: u32,
    },
    #[serde(rename_all = "camelCase")]
    WeightExceeded {
        box_id: BoxId,
        total_weight_kg: f64,
        max_weight_kg: f64,
    },
}

impl std::fmt::Display for PackingFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackingFailure::NothingToPack => write!(f, "The order has no items to pack"),
            PackingFailure::NoCandidateBoxes => {
                write!(f, "No box in the catalog can hold any of the items")
            }
            PackingFailure::InsufficientCapacity { leftover } => {
                write!(f, "{} units could not be placed", leftover)
            }
            PackingFailure::WeightExceeded {
                box_id,
                total_weight_kg,
                max_weight_kg,
            } => write!(
                f,
                "Box '{}' would weigh {:.3} kg, above its limit of {:.3} kg",
                box_id, total_weight_kg, max_weight_kg
            ),
        }
    }
}

/// Order-level packing status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PackingStatus {
    /// Never computed.
    #[default]
    None,
    Pending,
    Success,
    Failed,
}

/// Events driving the status state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusTrigger {
    Requested,
    InputsChanged,
    Completed(PackingStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusTransitionError {
    #[error("cannot complete a packing computation from status {0:?}")]
    NotPending(PackingStatus),
    #[error("a computation cannot complete with status {0:?}")]
    InvalidOutcome(PackingStatus),
}

impl PackingStatus {
    /// `none → pending → success | failed → pending` on any input change.
    pub fn apply(self, trigger: StatusTrigger) -> Result<PackingStatus, StatusTransitionError> {
        match trigger {
            StatusTrigger::Requested | StatusTrigger::InputsChanged => Ok(PackingStatus::Pending),
            StatusTrigger::Completed(outcome) => {
                if self != PackingStatus::Pending {
                    return Err(StatusTransitionError::NotPending(self));
                }
                match outcome {
                    PackingStatus::None => Err(StatusTransitionError::InvalidOutcome(outcome)),
                    other => Ok(other),
                }
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PackingStatus::Success | PackingStatus::Failed)
    }
}

/// The order-level packing result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackingSummary {
    pub selections: Vec<PackingSelection>,
    pub leftover: u32,
    pub leftover_by_entry: Vec<EntryQuantity>,
    pub status: PackingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_box_id: Option<BoxId>,
    #[serde(default)]
    pub rejections: Vec<BoxRejection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PackingFailure>,
}

impl PackingSummary {
    pub fn packed_total(&self) -> u32 {
        self.selections.iter().map(|s| s.packed_quantity).sum()
    }

    pub fn is_success(&self) -> bool {
        self.status == PackingStatus::Success
    }
}

/// Combines selections into the order-level summary.
///
/// `requested` holds one entry per order line with its full quantity.
/// A failed outcome turns into `pending` when the caller marked the
/// computation as provisional.
pub fn aggregate(
    selections: Vec<PackingSelection>,
    requested: &[EntryQuantity],
    rejections: Vec<BoxRejection>,
    provisional: bool,
) -> PackingSummary {
    let leftover_by_entry: Vec<EntryQuantity> = requested
        .iter()
        .map(|r| {
            let packed: u32 = selections.iter().map(|s| s.packed_for(r.entry_index)).sum();
            EntryQuantity {
                entry_index: r.entry_index,
                item_id: r.item_id.clone(),
                quantity: r.quantity.saturating_sub(packed),
            }
        })
        .filter(|l| l.quantity > 0)
        .collect();
    let leftover: u32 = leftover_by_entry.iter().map(|l| l.quantity).sum();

    let failure = if requested.is_empty() {
        Some(PackingFailure::NothingToPack)
    } else if let Some(heavy) = selections.iter().find(|s| !s.weight.within_limit) {
        Some(PackingFailure::WeightExceeded {
            box_id: heavy.box_id.clone(),
            total_weight_kg: heavy.weight.total_weight_kg,
            max_weight_kg: heavy.weight.max_weight_kg.unwrap_or(f64::INFINITY),
        })
    } else if selections.is_empty() {
        Some(first_weight_rejection(&rejections).unwrap_or(PackingFailure::NoCandidateBoxes))
    } else if leftover > 0 {
        Some(PackingFailure::InsufficientCapacity { leftover })
    } else {
        None
    };

    let status = match &failure {
        None => PackingStatus::Success,
        Some(PackingFailure::NothingToPack) => PackingStatus::Pending,
        Some(_) if provisional => PackingStatus::Pending,
        Some(_) => PackingStatus::Failed,
    };

    PackingSummary {
        primary_box_id: selections.first().map(|s| s.box_id.clone()),
        selections,
        leftover,
        leftover_by_entry,
        status,
        rejections,
        failure,
    }
}

fn first_weight_rejection(rejections: &[BoxRejection]) -> Option<PackingFailure> {
    rejections.iter().find_map(|r| {
        r.reasons.iter().find_map(|reason| match reason {
            RejectionReason::WeightExceeded {
                total_weight_kg,
                max_weight_kg,
            } => Some(PackingFailure::WeightExceeded {
                box_id: r.box_id.clone(),
                total_weight_kg: *total_weight_kg,
                max_weight_kg: *max_weight_kg,
            }),
            _ => None,
        })
    })
}

/// `0.237 → "23.7%"`.
pub fn format_void_ratio(ratio: f64) -> String {
    format!("{:.1}%", (ratio * 1000.0).round() / 10.0)
}

pub fn format_orientation(orientation: [f64; 3]) -> String {
    format!(
        "{} × {} × {} mm",
        orientation[0], orientation[1], orientation[2]
    )
}

/// `"100 × 80 × 50 mm: 6 across × 5 deep"`, blocks joined by `" / "`.
pub fn describe_layer(layer: &Layer) -> String {
    layer
        .columns
        .iter()
        .map(|c| {
            format!(
                "{}: {} across × {} deep",
                format_orientation(c.orientation),
                c.count,
                c.rows
            )
        })
        .collect::<Vec<_>>()
        .join(" / ")
}

pub fn describe_layer_type(layer: &Layer) -> &'static str {
    match layer.kind {
        LayerKind::Uniform => "uniform",
        LayerKind::Mixed => "mixed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerColumn;
    use crate::model::{BoxDims, ItemDims, ItemProfile, PackingDefaults};
    use crate::orientation::Permutation;

    fn carton() -> Carton {
        Carton::new("M", BoxDims::new(600.0, 400.0, 400.0)).unwrap()
    }

    fn profiles() -> Vec<PackingProfile> {
        vec![
            ItemProfile::new("A", ItemDims::new(100.0, 80.0, 50.0))
                .with_unit_weight(0.5)
                .resolve(&PackingDefaults::default()),
        ]
    }

    fn layer(count: u32, rows: u32) -> Layer {
        Layer {
            kind: LayerKind::Uniform,
            columns: vec![LayerColumn {
                entry_index: 0,
                item_id: "A".to_string(),
                orientation: [100.0, 80.0, 50.0],
                permutation: Permutation::Wdh,
                count,
                rows,
                origin: [0.0, 0.0],
                gap_xy: 0.0,
            }],
            height: 50.0,
        }
    }

    fn packed_layer(placed: u32, elevation: f64) -> PackedLayer {
        PackedLayer {
            layer: layer(6, 5),
            elevation,
            origin: [0.0, 0.0],
            footprint: [600.0, 400.0],
            placed: vec![EntryQuantity {
                entry_index: 0,
                item_id: "A".to_string(),
                quantity: placed,
            }],
        }
    }

    fn requested(qty: u32) -> Vec<EntryQuantity> {
        vec![EntryQuantity {
            entry_index: 0,
            item_id: "A".to_string(),
            quantity: qty,
        }]
    }

    #[test]
    fn full_box_has_zero_void_ratio() {
        let layers = (0..8).map(|i| packed_layer(30, i as f64 * 50.0)).collect();
        let selection = PackingSelection::from_layers(&carton(), layers, &profiles(), 0.0).unwrap();
        assert_eq!(selection.packed_quantity, 240);
        assert!(selection.void_ratio.abs() < 1e-12);
        assert!((selection.weight.product_weight_kg - 120.0).abs() < 1e-9);
    }

    #[test]
    fn partial_box_void_ratio_uses_unit_volume() {
        let selection =
            PackingSelection::from_layers(&carton(), vec![packed_layer(12, 0.0)], &profiles(), 0.0)
                .unwrap();
        // 12 × 400 000 mm³ of 96 000 000 mm³
        assert!((selection.void_ratio - 0.95).abs() < 1e-12);
    }

    #[test]
    fn empty_selection_is_never_built() {
        assert!(
            PackingSelection::from_layers(&carton(), vec![packed_layer(0, 0.0)], &profiles(), 0.0)
                .is_none()
        );
    }

    #[test]
    fn aggregate_success_requires_zero_leftover() {
        let selection =
            PackingSelection::from_layers(&carton(), vec![packed_layer(10, 0.0)], &profiles(), 0.0)
                .unwrap();
        let ok = aggregate(vec![selection.clone()], &requested(10), Vec::new(), false);
        assert_eq!(ok.status, PackingStatus::Success);
        assert_eq!(ok.leftover, 0);
        assert_eq!(ok.primary_box_id.as_deref(), Some("M"));
        assert!(ok.failure.is_none());

        let short = aggregate(vec![selection], &requested(15), Vec::new(), false);
        assert_eq!(short.status, PackingStatus::Failed);
        assert_eq!(short.leftover, 5);
        assert_eq!(
            short.failure,
            Some(PackingFailure::InsufficientCapacity { leftover: 5 })
        );
        assert_eq!(short.packed_total() + short.leftover, 15);
    }

    #[test]
    fn provisional_failure_is_pending() {
        let summary = aggregate(Vec::new(), &requested(3), Vec::new(), true);
        assert_eq!(summary.status, PackingStatus::Pending);
        assert_eq!(summary.leftover, 3);
        assert_eq!(summary.failure, Some(PackingFailure::NoCandidateBoxes));
    }

    #[test]
    fn weight_rejection_surfaces_when_nothing_selected() {
        let rejections = vec![BoxRejection {
            box_id: "M".to_string(),
            reasons: vec![RejectionReason::WeightExceeded {
                total_weight_kg: 151.0,
                max_weight_kg: 100.0,
            }],
        }];
        let summary = aggregate(Vec::new(), &requested(30), rejections, false);
        assert_eq!(summary.status, PackingStatus::Failed);
        assert!(matches!(
            summary.failure,
            Some(PackingFailure::WeightExceeded { total_weight_kg, .. }) if total_weight_kg == 151.0
        ));
    }

    #[test]
    fn empty_order_is_pending() {
        let summary = aggregate(Vec::new(), &[], Vec::new(), false);
        assert_eq!(summary.status, PackingStatus::Pending);
        assert_eq!(summary.failure, Some(PackingFailure::NothingToPack));
    }

    #[test]
    fn status_state_machine() {
        let s = PackingStatus::None;
        let s = s.apply(StatusTrigger::Requested).unwrap();
        assert_eq!(s, PackingStatus::Pending);
        let s = s
            .apply(StatusTrigger::Completed(PackingStatus::Success))
            .unwrap();
        assert!(s.is_terminal());
        assert_eq!(
            s.apply(StatusTrigger::Completed(PackingStatus::Failed)),
            Err(StatusTransitionError::NotPending(PackingStatus::Success))
        );
        let s = s.apply(StatusTrigger::InputsChanged).unwrap();
        assert_eq!(s, PackingStatus::Pending);
        assert_eq!(
            s.apply(StatusTrigger::Completed(PackingStatus::None)),
            Err(StatusTransitionError::InvalidOutcome(PackingStatus::None))
        );
    }

    #[test]
    fn formats_void_ratio_to_one_decimal() {
        assert_eq!(format_void_ratio(0.237), "23.7%");
        assert_eq!(format_void_ratio(0.0), "0.0%");
        assert_eq!(format_void_ratio(0.99951), "100.0%");
    }

    #[test]
    fn describes_layers() {
        let l = layer(6, 5);
        assert_eq!(describe_layer(&l), "100 × 80 × 50 mm: 6 across × 5 deep");
        assert_eq!(describe_layer_type(&l), "uniform");
    }
}
