//! Absolute positions of packed units.
//!
//! Each layer's used block is centred inside its usable footprint and sits at
//! the layer's elevation above the padded floor. Within a block units are
//! enumerated column by column: all rows of the first column along the depth,
//! then the next column along the width.

use crate::layer::{LayerColumn, span};
use crate::model::PlacedItem;
use crate::summary::{PackedLayer, PackingSelection};

/// Every packed unit of `selection`, ordered by layer, block and position.
///
/// `box_padding` must be the padding the selection was computed with.
pub fn placed_items(selection: &PackingSelection, box_padding: f64) -> Vec<PlacedItem> {
    let mut items = Vec::with_capacity(selection.packed_quantity as usize);
    for (layer_index, layer) in selection.layers.iter().enumerate() {
        place_layer(layer_index, layer, box_padding, &mut items);
    }
    items
}

fn place_layer(layer_index: usize, packed: &PackedLayer, box_padding: f64, out: &mut Vec<PlacedItem>) {
    // Units per block, in block order.
    let mut takes: Vec<u32> = vec![0; packed.layer.columns.len()];
    for placed in &packed.placed {
        let mut left = placed.quantity;
        for (pos, column) in packed.layer.columns.iter().enumerate() {
            if column.entry_index != placed.entry_index || left == 0 {
                continue;
            }
            takes[pos] = left.min(column.capacity());
            left -= takes[pos];
        }
    }

    let (used_w, used_d) = packed
        .layer
        .columns
        .iter()
        .zip(&takes)
        .filter(|(_, take)| **take > 0)
        .fold((0.0_f64, 0.0_f64), |(w, d), (column, take)| {
            let across = take.div_ceil(column.rows);
            let deep = (*take).min(column.rows);
            (
                w.max(column.origin[0] + span(across, column.orientation[0], column.gap_xy)),
                d.max(column.origin[1] + span(deep, column.orientation[1], column.gap_xy)),
            )
        });
    let offset = [
        packed.origin[0] + ((packed.footprint[0] - used_w) / 2.0).max(0.0),
        packed.origin[1] + ((packed.footprint[1] - used_d) / 2.0).max(0.0),
        box_padding + packed.elevation,
    ];

    for (column, take) in packed.layer.columns.iter().zip(takes) {
        for k in 0..take {
            out.push(PlacedItem {
                entry_index: column.entry_index,
                item_id: column.item_id.clone(),
                layer_index,
                position: unit_position(column, k, offset),
                dims: column.orientation,
            });
        }
    }
}

fn unit_position(column: &LayerColumn, k: u32, offset: [f64; 3]) -> [f64; 3] {
    let across = k / column.rows;
    let deep = k % column.rows;
    [
        offset[0] + column.origin[0] + across as f64 * (column.orientation[0] + column.gap_xy),
        offset[1] + column.origin[1] + deep as f64 * (column.orientation[1] + column.gap_xy),
        offset[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{find_collision, inside_carton};
    use crate::layer::InputOrderPolicy;
    use crate::model::{BoxDims, Carton, ItemDims, ItemProfile, PackingDefaults, PackingProfile};
    use crate::selector::BoxSelector;

    fn pack(carton: &Carton, items: &[ItemProfile], quantities: &[u32], padding: f64) -> PackingSelection {
        let profiles: Vec<PackingProfile> = items
            .iter()
            .map(|i| i.resolve(&PackingDefaults::default()))
            .collect();
        let policy = InputOrderPolicy::default();
        BoxSelector::new(&profiles, padding, 0.0, &policy)
            .evaluate(0, carton, quantities)
            .selection
            .expect("something packed")
    }

    #[test]
    fn full_box_units_are_disjoint_and_inside() {
        let carton = Carton::new("M", BoxDims::new(600.0, 400.0, 400.0)).unwrap();
        let selection = pack(
            &carton,
            &[ItemProfile::new("A", ItemDims::new(100.0, 80.0, 50.0))],
            &[240],
            0.0,
        );
        let items = placed_items(&selection, 0.0);
        assert_eq!(items.len(), 240);
        assert!(items.iter().all(|i| inside_carton(i, &carton, 1e-6)));
        assert_eq!(find_collision(&items, 1e-6), None);
        let top = items.iter().map(PlacedItem::top_z).fold(0.0, f64::max);
        assert!((top - 400.0).abs() < 1e-9);
    }

    #[test]
    fn partial_layer_is_centred() {
        let carton = Carton::new("B", BoxDims::new(300.0, 100.0, 100.0)).unwrap();
        let selection = pack(
            &carton,
            &[ItemProfile::new("A", ItemDims::new(100.0, 100.0, 100.0))],
            &[1],
            0.0,
        );
        let items = placed_items(&selection, 0.0);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].position, [100.0, 0.0, 0.0]);
    }

    #[test]
    fn mixed_layer_with_margins_and_padding() {
        let carton = Carton::new("B", BoxDims::new(320.0, 120.0, 140.0)).unwrap();
        let a = ItemProfile::new("A", ItemDims::new(100.0, 100.0, 100.0))
            .with_margins(5.0, 5.0, 10.0)
            .with_gaps(2.0, 0.0);
        let b = ItemProfile::new("B", ItemDims::new(45.0, 45.0, 45.0))
            .with_margins(0.0, 0.0, 0.0)
            .with_gaps(1.0, 0.0);
        let selection = pack(&carton, &[a, b], &[1, 6], 5.0);
        let items = placed_items(&selection, 5.0);

        assert_eq!(items.len() as u32, selection.packed_quantity);
        assert!(items.iter().filter(|i| i.entry_index == 1).count() > 0);
        assert!(items.iter().all(|i| inside_carton(i, &carton, 1e-6)));
        assert_eq!(find_collision(&items, 1e-6), None);
        assert!(items.iter().all(|i| i.position[2] >= 5.0));
    }
}
