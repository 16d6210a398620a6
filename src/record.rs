//! Persisted packing result with staleness tracking.
//!
//! A record remembers a SHA-256 digest of the inputs its summary was computed
//! from. Any change to quantities, item profiles, the catalog or the packing
//! configuration changes the digest and sends the record back to `pending`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{BoxDims, Carton, ItemProfile, OrderLineEntry};
use crate::optimizer::PackingConfig;
use crate::summary::{PackingStatus, PackingSummary, StatusTransitionError, StatusTrigger};

/// Everything a packing summary depends on.
#[derive(Clone, Copy, Debug)]
pub struct PackingInputs<'a> {
    pub entries: &'a [OrderLineEntry],
    pub boxes: &'a [Carton],
    pub manual_box_id: Option<&'a str>,
    pub config: &'a PackingConfig,
}

impl PackingInputs<'_> {
    /// Hex-encoded SHA-256 over a canonical encoding of the inputs.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.entries.len() as u64).to_le_bytes());
        for entry in self.entries {
            feed_item(&mut hasher, &entry.item);
            hasher.update(entry.quantity.to_le_bytes());
        }
        hasher.update((self.boxes.len() as u64).to_le_bytes());
        for carton in self.boxes {
            feed_carton(&mut hasher, carton);
        }
        feed_str(&mut hasher, self.manual_box_id);

        let c = self.config;
        hasher.update(c.packaging_multiplier.to_le_bytes());
        hasher.update(c.box_padding.to_le_bytes());
        hasher.update([u8::from(c.allow_orientation_reuse)]);
        let d = &c.defaults;
        for v in [d.side_margin, d.front_margin, d.top_margin, d.gap_xy, d.gap_z] {
            hasher.update(v.to_le_bytes());
        }
        feed_u32(&mut hasher, d.max_stack_layers);
        feed_f64(&mut hasher, d.unit_weight_kg);

        format!("{:x}", hasher.finalize())
    }
}

fn feed_str(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(s) => {
            hasher.update([1u8]);
            hasher.update((s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn feed_f64(hasher: &mut Sha256, value: Option<f64>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update(v.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn feed_u32(hasher: &mut Sha256, value: Option<u32>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update(v.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn feed_dims(hasher: &mut Sha256, dims: &BoxDims) {
    for v in [dims.width, dims.depth, dims.height] {
        hasher.update(v.to_le_bytes());
    }
}

fn feed_item(hasher: &mut Sha256, item: &ItemProfile) {
    feed_str(hasher, Some(item.id.as_str()));
    feed_str(hasher, item.name.as_deref());
    for v in item.dims.as_array() {
        hasher.update(v.to_le_bytes());
    }
    feed_f64(hasher, item.unit_weight_kg);
    hasher.update([u8::from(item.keep_upright)]);
    feed_f64(hasher, item.side_margin);
    feed_f64(hasher, item.front_margin);
    feed_f64(hasher, item.top_margin);
    feed_f64(hasher, item.gap_xy);
    feed_f64(hasher, item.gap_z);
    feed_u32(hasher, item.max_stack_layers);
}

fn feed_carton(hasher: &mut Sha256, carton: &Carton) {
    feed_str(hasher, Some(carton.id.as_str()));
    feed_dims(hasher, &carton.inner);
    match &carton.outer {
        Some(outer) => {
            hasher.update([1u8]);
            feed_dims(hasher, outer);
        }
        None => hasher.update([0u8]),
    }
    feed_f64(hasher, carton.max_weight_kg);
    feed_f64(hasher, carton.box_weight_kg);
}

/// Packing state stored alongside an order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackingRecord {
    pub status: PackingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<PackingSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_digest: Option<String>,
}

impl PackingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a computation as requested.
    pub fn request(&mut self) -> Result<(), StatusTransitionError> {
        self.status = self.status.apply(StatusTrigger::Requested)?;
        Ok(())
    }

    /// Stores a finished summary together with the digest of its inputs.
    pub fn complete(
        &mut self,
        summary: PackingSummary,
        inputs: &PackingInputs<'_>,
    ) -> Result<(), StatusTransitionError> {
        self.status = self
            .status
            .apply(StatusTrigger::Completed(summary.status))?;
        self.input_digest = Some(inputs.digest());
        self.summary = Some(summary);
        Ok(())
    }

    /// True when `inputs` differ from the ones the summary was computed from.
    pub fn is_stale(&self, inputs: &PackingInputs<'_>) -> bool {
        match &self.input_digest {
            Some(digest) => *digest != inputs.digest(),
            None => true,
        }
    }

    /// Sends the record back to `pending`; the stored summary is kept for display.
    pub fn invalidate(&mut self) -> Result<(), StatusTransitionError> {
        self.status = self.status.apply(StatusTrigger::InputsChanged)?;
        Ok(())
    }

    /// Invalidates the record if `inputs` changed. Returns whether it did.
    pub fn invalidate_if_stale(
        &mut self,
        inputs: &PackingInputs<'_>,
    ) -> Result<bool, StatusTransitionError> {
        if self.status == PackingStatus::Pending || !self.is_stale(inputs) {
            return Ok(false);
        }
        tracing::debug!(status = ?self.status, "packing inputs changed, record invalidated");
        self.invalidate()?;
        Ok(true)
    }
}
