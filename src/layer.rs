//! Layer builder: 2D shelf packing of one horizontal slice of a carton.
//!
//! A layer design always starts from a *primary* entry laid out as a uniform
//! grid in the corner of its usable footprint. When other entries still need
//! room, the primary block may be narrowed to the columns it actually needs
//! and the free guillotine strips (right of the block, then in front of it)
//! are filled by the next entries in priority order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::{Carton, PackingProfile};
use crate::orientation::{self, Envelope, Orientation, Permutation};
use crate::stack::{self, StackPlan};
use crate::types::{EPSILON_GENERAL, compare_with_epsilon};

/// Whether one orientation of one entry fills the layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Uniform,
    Mixed,
}

/// A uniform block inside a layer: `count` units across the width, `rows`
/// deep, anchored at `origin` relative to the usable footprint corner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LayerColumn {
    pub entry_index: usize,
    pub item_id: String,
    #[schema(value_type = [f64; 3])]
    pub orientation: [f64; 3],
    pub permutation: Permutation,
    pub count: u32,
    pub rows: u32,
    #[schema(value_type = [f64; 2])]
    pub origin: [f64; 2],
    #[serde(rename = "gapXY")]
    pub gap_xy: f64,
}

impl LayerColumn {
    pub fn capacity(&self) -> u32 {
        self.count.saturating_mul(self.rows)
    }

    pub fn used_width(&self) -> f64 {
        span(self.count, self.orientation[0], self.gap_xy)
    }

    pub fn used_depth(&self) -> f64 {
        span(self.rows, self.orientation[1], self.gap_xy)
    }

    pub fn unit_volume(&self) -> f64 {
        self.orientation[0] * self.orientation[1] * self.orientation[2]
    }
}

/// Arrangement of one horizontal slice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub columns: Vec<LayerColumn>,
    /// Vertical pitch: the tallest orientation in the layer.
    pub height: f64,
}

impl Layer {
    pub fn capacity(&self) -> u32 {
        self.columns.iter().map(LayerColumn::capacity).sum()
    }

    pub fn capacity_for(&self, entry_index: usize) -> u32 {
        self.columns
            .iter()
            .filter(|c| c.entry_index == entry_index)
            .map(LayerColumn::capacity)
            .sum()
    }

    /// Extent (width, depth) covered by the blocks.
    pub fn used_extent(&self) -> (f64, f64) {
        self.columns.iter().fold((0.0_f64, 0.0_f64), |(w, d), c| {
            (
                w.max(c.origin[0] + c.used_width()),
                d.max(c.origin[1] + c.used_depth()),
            )
        })
    }
}

/// Length covered by `n` units of `length` with `gap` between neighbours.
pub fn span(n: u32, length: f64, gap: f64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    n as f64 * length + (n - 1) as f64 * gap
}

/// `floor((available + gap) / (length + gap))`, 0 when one unit does not fit.
pub fn grid_count(available: f64, length: f64, gap: f64) -> u32 {
    if length <= 0.0 || available + EPSILON_GENERAL < length {
        return 0;
    }
    let raw = ((available + gap) / (length + gap) + EPSILON_GENERAL).floor();
    if raw >= u32::MAX as f64 {
        u32::MAX
    } else {
        raw as u32
    }
}

/// Rectangle inside the usable footprint, relative to its corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub depth: f64,
}

impl Region {
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.depth.max(0.0)
    }

    fn is_empty(&self) -> bool {
        self.width <= EPSILON_GENERAL || self.depth <= EPSILON_GENERAL
    }
}

/// Grid yield of a single orientation in a region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformFit {
    pub orientation: Orientation,
    pub count: u32,
    pub rows: u32,
}

impl UniformFit {
    pub fn capacity(&self) -> u32 {
        self.count.saturating_mul(self.rows)
    }

    pub fn unused_area(&self, region: &Region) -> f64 {
        region.area() - self.capacity() as f64 * self.orientation.footprint_area()
    }
}

pub fn uniform_fit(region: &Region, orientation: Orientation, gap_xy: f64) -> UniformFit {
    UniformFit {
        orientation,
        count: grid_count(region.width, orientation.width(), gap_xy),
        rows: grid_count(region.depth, orientation.depth(), gap_xy),
    }
}

/// Higher yield first, then less unused footprint, then orientation order.
fn rank(
    yield_a: u32,
    unused_a: f64,
    perm_a: Permutation,
    yield_b: u32,
    unused_b: f64,
    perm_b: Permutation,
) -> Ordering {
    yield_b
        .cmp(&yield_a)
        .then_with(|| compare_with_epsilon(unused_a, unused_b, EPSILON_GENERAL))
        .then_with(|| perm_a.cmp(&perm_b))
}

/// Best single-layer grid among `orientations`, ranked by layer capacity.
pub fn best_uniform(region: &Region, orientations: &[Orientation], gap_xy: f64) -> Option<UniformFit> {
    orientations
        .iter()
        .map(|o| uniform_fit(region, *o, gap_xy))
        .filter(|fit| fit.capacity() > 0)
        .min_by(|a, b| {
            rank(
                a.capacity(),
                a.unused_area(region),
                a.orientation.permutation,
                b.capacity(),
                b.unused_area(region),
                b.orientation.permutation,
            )
        })
}

/// Packing progress of one order entry inside the box being simulated.
#[derive(Clone, Debug)]
pub struct EntryState<'a> {
    pub index: usize,
    pub profile: &'a PackingProfile,
    pub remaining: u32,
    pub layers_used: u32,
}

impl EntryState<'_> {
    /// Layers this entry may still occupy; `None` means unlimited.
    pub fn stack_allowance(&self) -> Option<u32> {
        self.profile
            .max_stack_layers
            .map(|cap| cap.saturating_sub(self.layers_used))
    }

    fn allows_layers(&self, layers: u32) -> bool {
        self.stack_allowance().is_none_or(|left| left >= layers)
    }

    fn is_open(&self) -> bool {
        self.remaining > 0 && self.allows_layers(1)
    }
}

/// Decides which entries get footprint first when a layer is shared.
///
/// The default is plain input order; deployments with a different business
/// rule plug in their own implementation.
pub trait MixedLayerPolicy: Send + Sync {
    /// Positions into `entries`, highest priority first. Entries left out are
    /// not packed in this design.
    fn priority(&self, entries: &[EntryState<'_>]) -> Vec<usize> {
        (0..entries.len()).collect()
    }

    /// Whether an entry already in the layer may fill a leftover strip again
    /// in a different orientation.
    fn allow_orientation_reuse(&self) -> bool {
        false
    }
}

/// Priority by order of the input entries.
#[derive(Clone, Copy, Debug, Default)]
pub struct InputOrderPolicy {
    pub allow_orientation_reuse: bool,
}

impl MixedLayerPolicy for InputOrderPolicy {
    fn allow_orientation_reuse(&self) -> bool {
        self.allow_orientation_reuse
    }
}

/// Where in the carton the next design will sit.
#[derive(Clone, Copy, Debug)]
pub struct LayerContext<'a> {
    pub carton: &'a Carton,
    pub box_padding: f64,
    /// Height already used by earlier layers, gaps included.
    pub cursor: f64,
    pub has_layers_below: bool,
}

/// One layer design together with its planned vertical repetition.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerDesign {
    pub layer: Layer,
    pub gap_z: f64,
    pub repetitions: u32,
    /// Usable footprint corner, measured from the inner box corner.
    pub origin: [f64; 2],
    /// Usable footprint (width, depth) the blocks were laid into.
    pub footprint: [f64; 2],
}

impl LayerDesign {
    /// Elevation of the first repetition above the usable floor.
    pub fn start_elevation(&self, ctx: &LayerContext<'_>) -> f64 {
        if ctx.has_layers_below {
            ctx.cursor + self.gap_z
        } else {
            ctx.cursor
        }
    }
}

pub struct LayerBuilder<'p> {
    policy: &'p dyn MixedLayerPolicy,
}

impl<'p> LayerBuilder<'p> {
    pub fn new(policy: &'p dyn MixedLayerPolicy) -> Self {
        Self { policy }
    }

    /// Builds the next design; `None` when no open entry fits any more.
    pub fn build(&self, ctx: &LayerContext<'_>, entries: &[EntryState<'_>]) -> Option<LayerDesign> {
        self.candidates(ctx, entries).into_iter().next()
    }

    /// Every feasible design around the first primary entry that fits,
    /// one per primary orientation, best ranked first.
    pub fn candidates(&self, ctx: &LayerContext<'_>, entries: &[EntryState<'_>]) -> Vec<LayerDesign> {
        let order: Vec<usize> = self
            .policy
            .priority(entries)
            .into_iter()
            .filter(|&i| i < entries.len() && entries[i].is_open())
            .collect();

        for &primary in &order {
            let designs = self.designs_around(ctx, entries, &order, primary);
            if !designs.is_empty() {
                return designs;
            }
        }
        Vec::new()
    }

    fn designs_around(
        &self,
        ctx: &LayerContext<'_>,
        entries: &[EntryState<'_>],
        order: &[usize],
        primary: usize,
    ) -> Vec<LayerDesign> {
        let state = &entries[primary];
        let profile = state.profile;
        let envelope = Envelope::for_profile(ctx.carton, profile, ctx.box_padding);
        let gap_below = if ctx.has_layers_below { profile.gap_z } else { 0.0 };
        let available_height = envelope.height - ctx.cursor - gap_below;
        let footprint = Region {
            x: 0.0,
            y: 0.0,
            width: envelope.width,
            depth: envelope.depth,
        };

        let mut fits: Vec<(UniformFit, StackPlan)> =
            orientation::resolve(profile, &envelope, EPSILON_GENERAL)
                .into_iter()
                .filter_map(|o| {
                    let fit = uniform_fit(&footprint, o, profile.gap_xy);
                    stack::plan(
                        fit.capacity(),
                        o.height(),
                        profile.gap_z,
                        state.stack_allowance(),
                        available_height,
                    )
                    .map(|plan| (fit, plan))
                })
                .collect();
        fits.sort_by(|(fit_a, plan_a), (fit_b, plan_b)| {
            rank(
                plan_a.capacity,
                fit_a.unused_area(&footprint),
                fit_a.orientation.permutation,
                plan_b.capacity,
                fit_b.unused_area(&footprint),
                fit_b.orientation.permutation,
            )
        });

        fits.into_iter()
            .map(|candidate| self.design_with(ctx, entries, order, primary, &footprint, candidate))
            .collect()
    }

    fn design_with(
        &self,
        ctx: &LayerContext<'_>,
        entries: &[EntryState<'_>],
        order: &[usize],
        primary: usize,
        footprint: &Region,
        (fit, plan): (UniformFit, StackPlan),
    ) -> LayerDesign {
        let state = &entries[primary];
        let profile = state.profile;

        let per_layer = fit.capacity();
        let needed_layers = state.remaining.div_ceil(per_layer);
        let repetitions = plan.layers.min(needed_layers);
        let layer_height = fit.orientation.height();

        let reuse = self.policy.allow_orientation_reuse();
        let partners: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| i != primary || reuse)
            .filter(|&i| {
                let other = &entries[i];
                other.remaining > 0
                    && other.allows_layers(repetitions)
                    && other.profile.nests_within(profile)
            })
            .collect();

        let mut needs: Vec<u32> = vec![0; entries.len()];
        for &i in &partners {
            let per_rep = entries[i].remaining.div_ceil(repetitions);
            needs[i] = if i == primary {
                per_rep.saturating_sub(per_layer)
            } else {
                per_rep
            };
        }
        let sharing = partners.iter().any(|&i| needs[i] > 0);

        let mut count = fit.count;
        if sharing && state.remaining < per_layer {
            count = state.remaining.div_ceil(fit.rows).clamp(1, fit.count);
        }
        let primary_column = column_for(state, fit.orientation, count, fit.rows, [0.0, 0.0]);
        let mut columns = vec![primary_column.clone()];

        if sharing {
            let separator = partners
                .iter()
                .map(|&i| entries[i].profile.gap_xy)
                .fold(profile.gap_xy, f64::max);
            let block_w = primary_column.used_width();
            let block_d = primary_column.used_depth();
            let strips = [
                Region {
                    x: block_w + separator,
                    y: 0.0,
                    width: footprint.width - block_w - separator,
                    depth: footprint.depth,
                },
                Region {
                    x: 0.0,
                    y: block_d + separator,
                    width: block_w,
                    depth: footprint.depth - block_d - separator,
                },
            ];
            let filler = StripFiller {
                entries,
                partners: &partners,
                layer_height,
                separator,
            };
            for strip in strips {
                filler.fill(strip, &mut needs, &mut columns);
            }
        }

        let kind = if columns.len() > 1 {
            LayerKind::Mixed
        } else {
            columns[0].count = fit.count;
            LayerKind::Uniform
        };
        let height = columns
            .iter()
            .map(|c| c.orientation[2])
            .fold(layer_height, f64::max);

        tracing::trace!(
            box_id = %ctx.carton.id,
            primary = %profile.id,
            ?kind,
            blocks = columns.len(),
            repetitions,
            "layer design built"
        );

        LayerDesign {
            layer: Layer {
                kind,
                columns,
                height,
            },
            gap_z: profile.gap_z,
            repetitions,
            origin: [
                profile.side_margin + ctx.box_padding,
                profile.front_margin + ctx.box_padding,
            ],
            footprint: [footprint.width, footprint.depth],
        }
    }
}

fn column_for(
    state: &EntryState<'_>,
    orientation: Orientation,
    count: u32,
    rows: u32,
    origin: [f64; 2],
) -> LayerColumn {
    LayerColumn {
        entry_index: state.index,
        item_id: state.profile.id.clone(),
        orientation: orientation.dims,
        permutation: orientation.permutation,
        count,
        rows,
        origin,
        gap_xy: state.profile.gap_xy,
    }
}

/// Recursive guillotine fill of the strips left next to the primary block.
struct StripFiller<'e, 'a> {
    entries: &'e [EntryState<'a>],
    partners: &'e [usize],
    layer_height: f64,
    separator: f64,
}

impl StripFiller<'_, '_> {
    fn fill(&self, region: Region, needs: &mut [u32], columns: &mut Vec<LayerColumn>) {
        if region.is_empty() {
            return;
        }
        for &i in self.partners {
            if needs[i] == 0 {
                continue;
            }
            let state = &self.entries[i];
            let candidates: Vec<Orientation> =
                orientation::permitted(state.profile.dims.as_array(), state.profile.keep_upright)
                    .into_iter()
                    .filter(|o| o.height() <= self.layer_height + EPSILON_GENERAL)
                    .collect();
            let Some(fit) = best_uniform(&region, &candidates, state.profile.gap_xy) else {
                continue;
            };

            let count = needs[i].div_ceil(fit.rows).clamp(1, fit.count);
            let column = column_for(state, fit.orientation, count, fit.rows, [region.x, region.y]);
            needs[i] = needs[i].saturating_sub(column.capacity());
            let block_w = column.used_width();
            let block_d = column.used_depth();
            columns.push(column);

            self.fill(
                Region {
                    x: region.x + block_w + self.separator,
                    y: region.y,
                    width: region.width - block_w - self.separator,
                    depth: region.depth,
                },
                needs,
                columns,
            );
            self.fill(
                Region {
                    x: region.x,
                    y: region.y + block_d + self.separator,
                    width: block_w,
                    depth: region.depth - block_d - self.separator,
                },
                needs,
                columns,
            );
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoxDims, ItemDims, ItemProfile, PackingDefaults};

    fn carton(w: f64, d: f64, h: f64) -> Carton {
        Carton::new("B", BoxDims::new(w, d, h)).unwrap()
    }

    fn profile(id: &str, w: f64, d: f64, h: f64) -> PackingProfile {
        ItemProfile::new(id, ItemDims::new(w, d, h)).resolve(&PackingDefaults::default())
    }

    fn ctx(carton: &Carton) -> LayerContext<'_> {
        LayerContext {
            carton,
            box_padding: 0.0,
            cursor: 0.0,
            has_layers_below: false,
        }
    }

    fn state(index: usize, profile: &PackingProfile, remaining: u32) -> EntryState<'_> {
        EntryState {
            index,
            profile,
            remaining,
            layers_used: 0,
        }
    }

    #[test]
    fn grid_count_with_gaps() {
        assert_eq!(grid_count(600.0, 100.0, 0.0), 6);
        // 5 × 100 + 4 × 20 = 580 <= 600, 6 × 100 + 5 × 20 = 700 > 600
        assert_eq!(grid_count(600.0, 100.0, 20.0), 5);
        assert_eq!(grid_count(99.0, 100.0, 0.0), 0);
    }

    #[test]
    fn scenario_a_layer_is_six_by_five() {
        let carton = carton(600.0, 400.0, 400.0);
        let p = profile("A", 100.0, 80.0, 50.0);
        let entries = [state(0, &p, 480)];
        let policy = InputOrderPolicy::default();
        let design = LayerBuilder::new(&policy)
            .build(&ctx(&carton), &entries)
            .expect("design");

        assert_eq!(design.layer.kind, LayerKind::Uniform);
        let column = &design.layer.columns[0];
        assert_eq!(column.count, 6);
        assert_eq!(column.rows, 5);
        assert_eq!(column.permutation, Permutation::Wdh);
        assert_eq!(design.layer.capacity(), 30);
        assert_eq!(design.repetitions, 8);
    }

    #[test]
    fn repetitions_limited_to_needed_layers() {
        let carton = carton(600.0, 400.0, 400.0);
        let p = profile("A", 100.0, 80.0, 50.0);
        let entries = [state(0, &p, 31)];
        let policy = InputOrderPolicy::default();
        let design = LayerBuilder::new(&policy)
            .build(&ctx(&carton), &entries)
            .unwrap();
        assert_eq!(design.repetitions, 2);
    }

    #[test]
    fn best_uniform_prefers_capacity_then_less_waste() {
        let region = Region {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            depth: 50.0,
        };
        let orientations = orientation::permitted([50.0, 20.0, 10.0], true);
        let fit = best_uniform(&region, &orientations, 0.0).unwrap();
        // 50×20: 2 × 2 = 4, 20×50: 5 × 1 = 5
        assert_eq!(fit.capacity(), 5);
        assert_eq!(fit.orientation.permutation, Permutation::Dwh);
    }

    #[test]
    fn mixed_layer_fills_strip_with_next_entry() {
        let carton = carton(300.0, 100.0, 100.0);
        let a = profile("A", 100.0, 100.0, 100.0);
        let b = profile("B", 50.0, 50.0, 50.0);
        let entries = [state(0, &a, 1), state(1, &b, 8)];
        let policy = InputOrderPolicy::default();
        let design = LayerBuilder::new(&policy)
            .build(&ctx(&carton), &entries)
            .expect("design");

        assert_eq!(design.layer.kind, LayerKind::Mixed);
        assert_eq!(design.layer.capacity_for(0), 1);
        assert_eq!(design.layer.capacity_for(1), 8);
        assert_eq!(design.layer.height, 100.0);
        let (w, d) = design.layer.used_extent();
        assert!(w <= 300.0 + EPSILON_GENERAL && d <= 100.0 + EPSILON_GENERAL);
    }

    #[test]
    fn single_entry_never_mixes_by_default() {
        let carton = carton(250.0, 100.0, 100.0);
        let a = profile("A", 100.0, 100.0, 100.0);
        let entries = [state(0, &a, 10)];
        let policy = InputOrderPolicy::default();
        let design = LayerBuilder::new(&policy)
            .build(&ctx(&carton), &entries)
            .unwrap();
        assert_eq!(design.layer.kind, LayerKind::Uniform);
        assert_eq!(design.layer.capacity(), 2);
    }

    #[test]
    fn orientation_reuse_fills_strip_with_same_entry() {
        // 60×40 blocks leave a 40 mm strip that only the rotated unit fits.
        let carton = carton(100.0, 100.0, 10.0);
        let a = profile("A", 60.0, 40.0, 10.0);
        let entries = [state(0, &a, 100)];
        let policy = InputOrderPolicy {
            allow_orientation_reuse: true,
        };
        let design = LayerBuilder::new(&policy)
            .build(&ctx(&carton), &entries)
            .unwrap();
        let plain = LayerBuilder::new(&InputOrderPolicy::default())
            .build(&ctx(&carton), &entries)
            .unwrap();

        assert_eq!(plain.layer.kind, LayerKind::Uniform);
        assert_eq!(plain.layer.capacity(), 2);
        assert_eq!(design.layer.kind, LayerKind::Mixed);
        assert_eq!(design.layer.capacity(), 3);
        assert!(design.layer.columns.iter().all(|c| c.entry_index == 0));
    }

    #[test]
    fn secondary_taller_than_layer_is_not_mixed_in() {
        let carton = carton(300.0, 100.0, 300.0);
        let a = profile("A", 100.0, 100.0, 50.0);
        let b = profile("B", 120.0, 120.0, 120.0);
        let entries = [state(0, &a, 1), state(1, &b, 1)];
        let policy = InputOrderPolicy::default();
        let design = LayerBuilder::new(&policy)
            .build(&ctx(&carton), &entries)
            .unwrap();
        assert!(design.layer.columns.iter().all(|c| c.entry_index == 0));
        assert_eq!(design.layer.kind, LayerKind::Uniform);
    }

    #[test]
    fn custom_policy_changes_primary() {
        struct Reversed;
        impl MixedLayerPolicy for Reversed {
            fn priority(&self, entries: &[EntryState<'_>]) -> Vec<usize> {
                (0..entries.len()).rev().collect()
            }
        }

        let carton = carton(300.0, 100.0, 100.0);
        let a = profile("A", 100.0, 100.0, 100.0);
        let b = profile("B", 50.0, 50.0, 50.0);
        let entries = [state(0, &a, 1), state(1, &b, 2)];
        let design = LayerBuilder::new(&Reversed)
            .build(&ctx(&carton), &entries)
            .unwrap();
        assert_eq!(design.layer.columns[0].entry_index, 1);
    }

    #[test]
    fn exhausted_stack_allowance_skips_entry() {
        let carton = carton(100.0, 100.0, 100.0);
        let a = ItemProfile::new("A", ItemDims::new(100.0, 100.0, 10.0))
            .upright()
            .with_max_stack_layers(2)
            .resolve(&PackingDefaults::default());
        let mut entry = state(0, &a, 5);
        entry.layers_used = 2;
        let policy = InputOrderPolicy::default();
        assert!(LayerBuilder::new(&policy)
            .build(&ctx(&carton), &[entry])
            .is_none());
    }
}
