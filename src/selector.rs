//! Box selector: simulates packing of an order into catalog boxes.
//!
//! Each candidate is filled independently, layer design after layer design,
//! until no open entry fits the remaining height. AUTO mode walks the
//! catalog from the smallest inner volume upwards and stops at the first box
//! that takes everything within its weight limit.

use crate::layer::{EntryState, LayerBuilder, LayerContext, LayerDesign, MixedLayerPolicy};
use crate::model::{Carton, PackingProfile, ValidationError};
use crate::orientation::{self, Envelope};
use crate::stack::stacked_height;
use crate::summary::{BoxRejection, EntryQuantity, PackedLayer, PackingSelection, RejectionReason};
use crate::types::EPSILON_GENERAL;

/// Outcome of simulating one order against one box.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxEvaluation {
    /// Position of the box in the caller's catalog.
    pub catalog_index: usize,
    pub box_id: String,
    pub selection: Option<PackingSelection>,
    pub leftover: u32,
    pub reasons: Vec<RejectionReason>,
}

impl BoxEvaluation {
    pub fn packed_quantity(&self) -> u32 {
        self.selection.as_ref().map_or(0, |s| s.packed_quantity)
    }

    pub fn within_weight_limit(&self) -> bool {
        self.selection
            .as_ref()
            .is_none_or(|s| s.weight.within_limit)
    }

    /// Everything packed and the weight ceiling respected.
    pub fn is_success(&self) -> bool {
        self.leftover == 0 && self.selection.is_some() && self.within_weight_limit()
    }

    fn rejection(&self) -> Option<BoxRejection> {
        if self.reasons.is_empty() {
            return None;
        }
        Some(BoxRejection {
            box_id: self.box_id.clone(),
            reasons: self.reasons.clone(),
        })
    }
}

/// What a selector run hands to the aggregator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionOutcome {
    pub selection: Option<PackingSelection>,
    pub rejections: Vec<BoxRejection>,
}

/// Packing state of one box while designs are applied bottom up.
#[derive(Debug)]
struct Simulation<'a> {
    entries: Vec<EntryState<'a>>,
    layers: Vec<PackedLayer>,
    cursor: f64,
    stacked: bool,
    record: bool,
}

impl<'a> Simulation<'a> {
    fn new(entries: Vec<EntryState<'a>>, record: bool) -> Self {
        Self {
            entries,
            layers: Vec::new(),
            cursor: 0.0,
            stacked: false,
            record,
        }
    }

    /// Copy that tracks quantities and height only.
    fn trial(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            layers: Vec::new(),
            cursor: self.cursor,
            stacked: self.stacked,
            record: false,
        }
    }

    fn context<'c>(&self, carton: &'c Carton, box_padding: f64) -> LayerContext<'c> {
        LayerContext {
            carton,
            box_padding,
            cursor: self.cursor,
            has_layers_below: self.stacked,
        }
    }

    /// Places up to `design.repetitions` layers. False when nothing was placed.
    fn apply(&mut self, design: &LayerDesign, ctx: &LayerContext<'_>) -> bool {
        let start = design.start_elevation(ctx);
        let pitch = design.layer.height + design.gap_z;

        let mut applied = 0u32;
        for rep in 0..design.repetitions {
            let mut placed: Vec<EntryQuantity> = Vec::new();
            for entry in self.entries.iter_mut() {
                let quantity = design.layer.capacity_for(entry.index).min(entry.remaining);
                if quantity == 0 {
                    continue;
                }
                entry.remaining -= quantity;
                entry.layers_used += 1;
                placed.push(EntryQuantity {
                    entry_index: entry.index,
                    item_id: entry.profile.id.clone(),
                    quantity,
                });
            }
            if placed.is_empty() {
                break;
            }
            if self.record {
                self.layers.push(PackedLayer {
                    layer: design.layer.clone(),
                    elevation: start + rep as f64 * pitch,
                    origin: design.origin,
                    footprint: design.footprint,
                    placed,
                });
            }
            applied += 1;
        }
        if applied == 0 {
            return false;
        }
        self.cursor = start + stacked_height(applied, design.layer.height, design.gap_z);
        self.stacked = true;
        true
    }

    fn complete_greedily(&mut self, builder: &LayerBuilder<'_>, carton: &Carton, box_padding: f64) {
        loop {
            let ctx = self.context(carton, box_padding);
            let Some(design) = builder.build(&ctx, &self.entries) else {
                break;
            };
            if !self.apply(&design, &ctx) {
                break;
            }
        }
    }
}

fn total_remaining(entries: &[EntryState<'_>]) -> u64 {
    entries.iter().map(|e| u64::from(e.remaining)).sum()
}

/// Drives layer building, stacking and weighing across catalog boxes.
pub struct BoxSelector<'a> {
    pub profiles: &'a [PackingProfile],
    pub box_padding: f64,
    pub packaging_multiplier: f64,
    pub policy: &'a dyn MixedLayerPolicy,
}

impl<'a> BoxSelector<'a> {
    pub fn new(
        profiles: &'a [PackingProfile],
        box_padding: f64,
        packaging_multiplier: f64,
        policy: &'a dyn MixedLayerPolicy,
    ) -> Self {
        Self {
            profiles,
            box_padding,
            packaging_multiplier,
            policy,
        }
    }

    /// Packs `quantities` (one per profile) into a single instance of `carton`.
    pub fn evaluate(&self, catalog_index: usize, carton: &Carton, quantities: &[u32]) -> BoxEvaluation {
        let entries: Vec<EntryState<'_>> = self
            .profiles
            .iter()
            .zip(quantities)
            .enumerate()
            .map(|(index, (profile, &remaining))| EntryState {
                index,
                profile,
                remaining,
                layers_used: 0,
            })
            .collect();

        let unfit: Vec<String> = entries
            .iter()
            .filter(|e| e.remaining > 0)
            .filter(|e| {
                let envelope = Envelope::for_profile(carton, e.profile, self.box_padding);
                orientation::resolve(e.profile, &envelope, EPSILON_GENERAL).is_empty()
            })
            .map(|e| e.profile.id.clone())
            .collect();

        let builder = LayerBuilder::new(self.policy);
        let mut sim = Simulation::new(entries, true);
        loop {
            let ctx = sim.context(carton, self.box_padding);
            let candidates = builder.candidates(&ctx, &sim.entries);
            let Some(design) = self.choose(&builder, &sim, &ctx, candidates) else {
                break;
            };
            if !sim.apply(&design, &ctx) {
                break;
            }
        }
        let Simulation { entries, layers, .. } = sim;

        let leftover = u32::try_from(total_remaining(&entries)).unwrap_or(u32::MAX);
        let selection =
            PackingSelection::from_layers(carton, layers, self.profiles, self.packaging_multiplier);

        let mut reasons = Vec::new();
        if !unfit.is_empty() {
            reasons.push(RejectionReason::NoFittingOrientation { item_ids: unfit });
        }
        if leftover > 0 {
            reasons.push(RejectionReason::InsufficientCapacity { leftover });
        }
        if let Some(s) = selection.as_ref().filter(|s| !s.weight.within_limit) {
            reasons.push(RejectionReason::WeightExceeded {
                total_weight_kg: s.weight.total_weight_kg,
                max_weight_kg: s.weight.max_weight_kg.unwrap_or(f64::INFINITY),
            });
        }

        tracing::debug!(
            box_id = %carton.id,
            packed = selection.as_ref().map_or(0, |s| s.packed_quantity),
            leftover,
            layers = selection.as_ref().map_or(0, |s| s.layers.len()),
            "box evaluated"
        );

        BoxEvaluation {
            catalog_index,
            box_id: carton.id.clone(),
            selection,
            leftover,
            reasons,
        }
    }

    /// Picks the candidate design whose greedy completion leaves the least
    /// behind. Ties keep the better ranked design.
    fn choose(
        &self,
        builder: &LayerBuilder<'_>,
        sim: &Simulation<'_>,
        ctx: &LayerContext<'_>,
        candidates: Vec<LayerDesign>,
    ) -> Option<LayerDesign> {
        if candidates.len() <= 1 {
            return candidates.into_iter().next();
        }
        let mut best: Option<(u64, LayerDesign)> = None;
        for design in candidates {
            let mut trial = sim.trial();
            if trial.apply(&design, ctx) {
                trial.complete_greedily(builder, ctx.carton, self.box_padding);
            }
            let left = total_remaining(&trial.entries);
            if best.as_ref().is_none_or(|(best_left, _)| left < *best_left) {
                best = Some((left, design));
            }
        }
        best.map(|(_, design)| design)
    }

    /// Smallest adequate box, or the best partial fit when none suffices.
    ///
    /// Overweight candidates are never selected here. `observer` sees every
    /// evaluation in the order the boxes were tried.
    pub fn select_auto(
        &self,
        catalog: &[Carton],
        quantities: &[u32],
        mut observer: impl FnMut(&BoxEvaluation),
    ) -> SelectionOutcome {
        let mut order: Vec<usize> = (0..catalog.len()).collect();
        order.sort_by(|&a, &b| {
            catalog[a]
                .inner_volume_mm3()
                .total_cmp(&catalog[b].inner_volume_mm3())
        });

        let mut failed: Vec<BoxEvaluation> = Vec::new();
        for index in order {
            let evaluation = self.evaluate(index, &catalog[index], quantities);
            observer(&evaluation);
            if evaluation.is_success() {
                tracing::debug!(box_id = %evaluation.box_id, "smallest adequate box found");
                return SelectionOutcome {
                    selection: evaluation.selection,
                    rejections: failed.iter().filter_map(BoxEvaluation::rejection).collect(),
                };
            }
            failed.push(evaluation);
        }

        // Strict comparison keeps the earlier (smaller) box on ties.
        let mut fallback: Option<usize> = None;
        for (pos, evaluation) in failed.iter().enumerate() {
            if evaluation.selection.is_none() || !evaluation.within_weight_limit() {
                continue;
            }
            let better = match fallback {
                None => true,
                Some(best) => evaluation.leftover < failed[best].leftover,
            };
            if better {
                fallback = Some(pos);
            }
        }

        let rejections = failed
            .iter()
            .enumerate()
            .filter(|(pos, _)| Some(*pos) != fallback)
            .filter_map(|(_, e)| e.rejection())
            .collect();
        let selection = fallback.and_then(|pos| failed[pos].selection.clone());
        if let Some(s) = &selection {
            tracing::debug!(box_id = %s.box_id, "no single box suffices, using best partial fit");
        }

        SelectionOutcome {
            selection,
            rejections,
        }
    }

    /// Evaluates the operator's box. The selection is reported even when it
    /// exceeds the weight ceiling.
    pub fn select_manual(
        &self,
        catalog: &[Carton],
        box_id: &str,
        quantities: &[u32],
        mut observer: impl FnMut(&BoxEvaluation),
    ) -> Result<SelectionOutcome, ValidationError> {
        let index = catalog
            .iter()
            .position(|c| c.id == box_id)
            .ok_or_else(|| ValidationError::UnknownBox(box_id.to_string()))?;
        let evaluation = self.evaluate(index, &catalog[index], quantities);
        observer(&evaluation);

        let rejections = evaluation.rejection().into_iter().collect();
        Ok(SelectionOutcome {
            selection: evaluation.selection,
            rejections,
        })
    }
}
