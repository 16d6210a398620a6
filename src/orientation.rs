//! Orientation resolver.
//!
//! An orientation assigns each physical item dimension to one box axis. Only
//! axis-aligned placements exist, so every item has exactly six candidate
//! permutations; `keepUpright` keeps the original height vertical.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::{Carton, PackingProfile};

/// Permutation of `(w, d, h)` onto the box's (width, depth, height) axes.
///
/// The declaration order is the deterministic tie-break order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permutation {
    Wdh,
    Dwh,
    Whd,
    Hwd,
    Dhw,
    Hdw,
}

impl Permutation {
    pub const ALL: [Permutation; 6] = [
        Permutation::Wdh,
        Permutation::Dwh,
        Permutation::Whd,
        Permutation::Hwd,
        Permutation::Dhw,
        Permutation::Hdw,
    ];

    /// Source index (0 = w, 1 = d, 2 = h) for each box axis.
    pub const fn axes(self) -> [usize; 3] {
        match self {
            Permutation::Wdh => [0, 1, 2],
            Permutation::Dwh => [1, 0, 2],
            Permutation::Whd => [0, 2, 1],
            Permutation::Hwd => [2, 0, 1],
            Permutation::Dhw => [1, 2, 0],
            Permutation::Hdw => [2, 1, 0],
        }
    }

    /// True when the original height stays on the vertical axis.
    pub const fn is_upright(self) -> bool {
        self.axes()[2] == 2
    }

    pub fn apply(self, dims: [f64; 3]) -> [f64; 3] {
        let [a, b, c] = self.axes();
        [dims[a], dims[b], dims[c]]
    }
}

/// An item's dimensions laid onto the box axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Orientation {
    pub permutation: Permutation,
    /// Extent along (box width, box depth, box height).
    pub dims: [f64; 3],
}

impl Orientation {
    pub fn new(permutation: Permutation, source: [f64; 3]) -> Self {
        Self {
            permutation,
            dims: permutation.apply(source),
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.dims[0]
    }

    #[inline]
    pub fn depth(&self) -> f64 {
        self.dims[1]
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.dims[2]
    }

    pub fn footprint_area(&self) -> f64 {
        self.dims[0] * self.dims[1]
    }
}

/// Usable space for one item profile inside one carton.
///
/// Margins and box padding are already subtracted; a component may be
/// zero or negative when the clearances alone exceed the box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl Envelope {
    /// `W − 2·(side + pad)`, `D − 2·(front + pad)`, `H − top − 2·pad`.
    pub fn for_profile(carton: &Carton, profile: &PackingProfile, box_padding: f64) -> Self {
        Self {
            width: carton.inner.width - 2.0 * (profile.side_margin + box_padding),
            depth: carton.inner.depth - 2.0 * (profile.front_margin + box_padding),
            height: carton.inner.height - profile.top_margin - 2.0 * box_padding,
        }
    }

    pub fn admits(&self, orientation: &Orientation, tolerance: f64) -> bool {
        orientation.width() <= self.width + tolerance
            && orientation.depth() <= self.depth + tolerance
            && orientation.height() <= self.height + tolerance
    }
}

/// All orientations the item may take, in tie-break order.
///
/// Permutations yielding an identical dimension triple collapse onto the
/// earliest one.
pub fn permitted(dims: [f64; 3], keep_upright: bool) -> Vec<Orientation> {
    let mut out: Vec<Orientation> = Vec::with_capacity(6);
    for permutation in Permutation::ALL {
        if keep_upright && !permutation.is_upright() {
            continue;
        }
        let candidate = Orientation::new(permutation, dims);
        if out.iter().all(|o| o.dims != candidate.dims) {
            out.push(candidate);
        }
    }
    out
}

/// Orientations of `profile` that fit at least one unit into `envelope`.
///
/// An empty result is not an error: the item simply cannot go into this box.
pub fn resolve(profile: &PackingProfile, envelope: &Envelope, tolerance: f64) -> Vec<Orientation> {
    permitted(profile.dims.as_array(), profile.keep_upright)
        .into_iter()
        .filter(|o| envelope.admits(o, tolerance))
        .collect()
}
