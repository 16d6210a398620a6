//! Geometrische Hilfsfunktionen für die Kontrolle gepackter Einheiten.
//!
//! Dieses Modul prüft, ob platzierte Einheiten sich überschneiden oder den
//! Innenraum eines Kartons verlassen.

use crate::model::{Carton, PlacedItem};

/// Prüft, ob zwei platzierte Einheiten sich räumlich überschneiden.
///
/// Zwei Quader überschneiden sich nur, wenn sie sich in allen drei Achsen um
/// mehr als `tolerance` überlappen. Berührende Flächen zählen nicht.
///
/// # Beispiel
/// ```
/// use carton_packer::geometry::intersects;
/// use carton_packer::model::PlacedItem;
///
/// let item = |x: f64| PlacedItem {
///     entry_index: 0,
///     item_id: "A".into(),
///     layer_index: 0,
///     position: [x, 0.0, 0.0],
///     dims: [10.0, 10.0, 10.0],
/// };
/// assert!(!intersects(&item(0.0), &item(10.0), 1e-6));
/// assert!(intersects(&item(0.0), &item(5.0), 1e-6));
/// ```
pub fn intersects(a: &PlacedItem, b: &PlacedItem, tolerance: f64) -> bool {
    (0..3).all(|axis| {
        overlap_1d(
            a.position[axis],
            a.position[axis] + a.dims[axis],
            b.position[axis],
            b.position[axis] + b.dims[axis],
        ) > tolerance
    })
}

/// Berechnet die Überlappung zweier Intervalle in einer Dimension.
///
/// # Rückgabewert
/// Länge der Überlappung, mindestens 0.0
pub fn overlap_1d(a1: f64, a2: f64, b1: f64, b2: f64) -> f64 {
    (a2.min(b2) - a1.max(b1)).max(0.0)
}

/// Prüft, ob eine Einheit vollständig im Innenraum des Kartons liegt.
pub fn inside_carton(item: &PlacedItem, carton: &Carton, tolerance: f64) -> bool {
    carton.inner_bounds().contains(&item.bounding_box(), tolerance)
}

/// Sucht das erste Paar sich überschneidender Einheiten.
///
/// # Rückgabewert
/// Indizes beider Einheiten, `None` wenn keine Kollision existiert
pub fn find_collision(items: &[PlacedItem], tolerance: f64) -> Option<(usize, usize)> {
    for (i, a) in items.iter().enumerate() {
        for (offset, b) in items[i + 1..].iter().enumerate() {
            if intersects(a, b, tolerance) {
                return Some((i, i + 1 + offset));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoxDims;

    fn item(position: [f64; 3], dims: [f64; 3]) -> PlacedItem {
        PlacedItem {
            entry_index: 0,
            item_id: "A".to_string(),
            layer_index: 0,
            position,
            dims,
        }
    }

    #[test]
    fn touching_faces_do_not_intersect() {
        let a = item([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        let b = item([10.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        let c = item([0.0, 0.0, 10.0], [10.0, 10.0, 10.0]);
        assert!(!intersects(&a, &b, 1e-6));
        assert!(!intersects(&a, &c, 1e-6));
        assert_eq!(find_collision(&[a, b, c], 1e-6), None);
    }

    #[test]
    fn overlapping_items_are_reported() {
        let a = item([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        let b = item([20.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        let c = item([5.0, 5.0, 5.0], [10.0, 10.0, 10.0]);
        assert_eq!(find_collision(&[a, b, c], 1e-6), Some((0, 2)));
    }

    #[test]
    fn float_noise_is_not_a_collision() {
        let a = item([0.0, 0.0, 0.0], [0.1 + 0.2, 1.0, 1.0]);
        let b = item([0.3, 0.0, 0.0], [1.0, 1.0, 1.0]);
        assert!(!intersects(&a, &b, 1e-6));
    }

    #[test]
    fn units_in_separate_layers_do_not_collide() {
        let a = item([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        let b = item([5.0, 5.0, 50.0], [10.0, 10.0, 10.0]);
        assert!(!intersects(&a, &b, 1e-6));
    }

    #[test]
    fn containment_in_carton() {
        let carton = Carton::new("B", BoxDims::new(100.0, 100.0, 100.0)).unwrap();
        assert!(inside_carton(&item([90.0, 0.0, 0.0], [10.0, 10.0, 10.0]), &carton, 1e-6));
        assert!(!inside_carton(&item([95.0, 0.0, 0.0], [10.0, 10.0, 10.0]), &carton, 1e-6));
    }
}
