//! Einstiegspunkte der Packberechnung.
//!
//! Dieses Modul verbindet Validierung, Boxauswahl und Zusammenfassung:
//! - `pack_order` für genau eine Berechnung (AUTO oder manuell gewählte Box)
//! - `pack_order_split` für die explizite Aufteilung auf mehrere Boxen
//! - `pack_orders_parallel` für die Neuberechnung vieler Aufträge
//!
//! Die Berechnung ist rein: keine globalen Zustände, keine Umgebungsvariablen.
//! Alle Parameter kommen über `PackingConfig`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::layer::{InputOrderPolicy, MixedLayerPolicy};
use crate::model::{
    BoxId, Carton, OrderLineEntry, PackingDefaults, PackingProfile, ValidationError,
    validate_catalog, validate_order_total,
};
use crate::selector::{BoxEvaluation, BoxSelector, SelectionOutcome};
use crate::summary::{
    EntryQuantity, PackingSelection, PackingStatus, PackingSummary, RejectionReason, aggregate,
};

/// Konfiguration für die Packberechnung.
///
/// Wird explizit an jede Berechnung übergeben, damit verschiedene
/// Verpackungsrichtlinien im selben Prozess parallel ausgewertet werden können.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    /// Füllmaterial in kg pro m³ Innenvolumen der Box
    pub packaging_multiplier: f64,
    /// Freiraum in mm an jeder Innenwand
    pub box_padding: f64,
    /// Ob ein Eintrag Reststreifen derselben Lage in anderer Ausrichtung füllen darf
    pub allow_orientation_reuse: bool,
    /// Rückfallwerte für nicht gesetzte Artikelfelder
    pub defaults: PackingDefaults,
}

impl PackingConfig {
    pub const DEFAULT_PACKAGING_MULTIPLIER: f64 = 0.01;
    pub const DEFAULT_BOX_PADDING: f64 = 0.0;
    pub const DEFAULT_ALLOW_ORIENTATION_REUSE: bool = false;

    /// Erstellt einen Builder für benutzerdefinierte Konfiguration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }

    /// Prüft alle Werte auf Endlichkeit und Vorzeichen.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.packaging_multiplier.is_finite() || self.packaging_multiplier < 0.0 {
            return Err(ValidationError::InvalidConfiguration(format!(
                "packaging multiplier must be non-negative and finite, got: {}",
                self.packaging_multiplier
            )));
        }
        if !self.box_padding.is_finite() || self.box_padding < 0.0 {
            return Err(ValidationError::InvalidConfiguration(format!(
                "box padding must be non-negative and finite, got: {}",
                self.box_padding
            )));
        }
        self.defaults.validate()
    }

    /// Standard-Richtlinie für gemischte Lagen.
    pub fn layer_policy(&self) -> InputOrderPolicy {
        InputOrderPolicy {
            allow_orientation_reuse: self.allow_orientation_reuse,
        }
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            packaging_multiplier: Self::DEFAULT_PACKAGING_MULTIPLIER,
            box_padding: Self::DEFAULT_BOX_PADDING,
            allow_orientation_reuse: Self::DEFAULT_ALLOW_ORIENTATION_REUSE,
            defaults: PackingDefaults::default(),
        }
    }
}

/// Builder-Pattern für PackingConfig.
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    /// Setzt den Füllmaterial-Multiplikator (kg/m³).
    pub fn packaging_multiplier(mut self, kg_per_m3: f64) -> Self {
        self.config.packaging_multiplier = kg_per_m3;
        self
    }

    /// Setzt den Wandabstand in mm.
    pub fn box_padding(mut self, padding: f64) -> Self {
        self.config.box_padding = padding;
        self
    }

    pub fn allow_orientation_reuse(mut self, allow: bool) -> Self {
        self.config.allow_orientation_reuse = allow;
        self
    }

    /// Setzt die Rückfallwerte für Artikelprofile.
    pub fn defaults(mut self, defaults: PackingDefaults) -> Self {
        self.config.defaults = defaults;
        self
    }

    /// Erstellt die finale Konfiguration.
    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Eine Packanfrage für einen Auftrag.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub entries: Vec<OrderLineEntry>,
    pub boxes: Vec<Carton>,
    /// Vom Bediener gewählte Box; ohne Angabe wird AUTO verwendet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_box_id: Option<BoxId>,
    /// Ergebnis einer laufenden Bearbeitung: Fehlschläge werden als `pending` gemeldet.
    #[serde(default)]
    pub provisional: bool,
}

impl OrderRequest {
    pub fn new(entries: Vec<OrderLineEntry>, boxes: Vec<Carton>) -> Self {
        Self {
            entries,
            boxes,
            manual_box_id: None,
            provisional: false,
        }
    }

    pub fn with_manual_box(mut self, box_id: impl Into<BoxId>) -> Self {
        self.manual_box_id = Some(box_id.into());
        self
    }

    pub fn provisional(mut self) -> Self {
        self.provisional = true;
        self
    }

    /// Prüft Einträge, Katalog und die manuelle Boxwahl.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for entry in &self.entries {
            entry.validate()?;
        }
        validate_order_total(&self.entries)?;
        validate_catalog(&self.boxes)?;
        if let Some(id) = &self.manual_box_id {
            if !self.boxes.iter().any(|b| &b.id == id) {
                return Err(ValidationError::UnknownBox(id.clone()));
            }
        }
        Ok(())
    }

    fn requested(&self) -> Vec<EntryQuantity> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| EntryQuantity {
                entry_index: i,
                item_id: e.item.id.clone(),
                quantity: e.quantity,
            })
            .collect()
    }

    fn quantities(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.quantity).collect()
    }

    fn profiles(&self, defaults: &PackingDefaults) -> Vec<PackingProfile> {
        self.entries.iter().map(|e| e.item.resolve(defaults)).collect()
    }
}

/// Ereignisse während der Berechnung, geeignet für SSE.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum PackEvent {
    /// Eine Box wurde vollständig simuliert.
    BoxEvaluated {
        box_id: BoxId,
        packed: u32,
        leftover: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        void_ratio: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_weight_kg: Option<f64>,
    },
    /// Eine Box reicht nicht oder ist zu schwer.
    BoxRejected {
        box_id: BoxId,
        reasons: Vec<RejectionReason>,
    },
    /// Eine Box wurde in die Zusammenfassung übernommen.
    BoxSelected {
        box_id: BoxId,
        packed: u32,
        void_ratio: f64,
        total_weight_kg: f64,
    },
    /// Berechnung abgeschlossen.
    Finished {
        status: PackingStatus,
        selections: usize,
        leftover: u32,
    },
}

fn emit_evaluation(evaluation: &BoxEvaluation, on_event: &mut impl FnMut(&PackEvent)) {
    let selection = evaluation.selection.as_ref();
    on_event(&PackEvent::BoxEvaluated {
        box_id: evaluation.box_id.clone(),
        packed: evaluation.packed_quantity(),
        leftover: evaluation.leftover,
        void_ratio: selection.map(|s| s.void_ratio),
        total_weight_kg: selection.map(|s| s.weight.total_weight_kg),
    });
    if !evaluation.is_success() {
        on_event(&PackEvent::BoxRejected {
            box_id: evaluation.box_id.clone(),
            reasons: evaluation.reasons.clone(),
        });
    }
}

fn emit_selected(selection: &PackingSelection, on_event: &mut impl FnMut(&PackEvent)) {
    on_event(&PackEvent::BoxSelected {
        box_id: selection.box_id.clone(),
        packed: selection.packed_quantity,
        void_ratio: selection.void_ratio,
        total_weight_kg: selection.weight.total_weight_kg,
    });
}

fn emit_finished(summary: &PackingSummary, on_event: &mut impl FnMut(&PackEvent)) {
    on_event(&PackEvent::Finished {
        status: summary.status,
        selections: summary.selections.len(),
        leftover: summary.leftover,
    });
}

/// Hauptfunktion: packt einen Auftrag in genau eine Box.
///
/// Ohne `manual_box_id` wird die kleinste ausreichende Box gesucht (AUTO).
/// Nicht packbare Aufträge sind kein Fehler, sondern ein Ergebnis mit
/// `leftover > 0`; `Err` bedeutet ungültige Eingaben.
///
/// # Beispiel
/// ```
/// use carton_packer::model::{BoxDims, Carton, ItemDims, ItemProfile, OrderLineEntry};
/// use carton_packer::optimizer::{PackingConfig, pack_order};
/// use carton_packer::summary::PackingStatus;
///
/// let entries = vec![OrderLineEntry::new(
///     ItemProfile::new("SKU-1", ItemDims::new(100.0, 80.0, 50.0)),
///     240,
/// )];
/// let boxes = vec![Carton::new("M", BoxDims::new(600.0, 400.0, 400.0)).unwrap()];
/// let summary = pack_order(&entries, &boxes, None, &PackingConfig::default()).unwrap();
/// assert_eq!(summary.status, PackingStatus::Success);
/// assert_eq!(summary.primary_box_id.as_deref(), Some("M"));
/// ```
pub fn pack_order(
    entries: &[OrderLineEntry],
    boxes: &[Carton],
    manual_box_id: Option<&str>,
    config: &PackingConfig,
) -> Result<PackingSummary, ValidationError> {
    let request = OrderRequest {
        entries: entries.to_vec(),
        boxes: boxes.to_vec(),
        manual_box_id: manual_box_id.map(str::to_string),
        provisional: false,
    };
    pack_request(&request, config)
}

/// Wie `pack_order`, aber mit einer vollständigen Anfrage.
pub fn pack_request(
    request: &OrderRequest,
    config: &PackingConfig,
) -> Result<PackingSummary, ValidationError> {
    pack_order_with_progress(request, config, |_| {})
}

/// Verpackung mit Live-Progress Callback.
pub fn pack_order_with_progress(
    request: &OrderRequest,
    config: &PackingConfig,
    on_event: impl FnMut(&PackEvent),
) -> Result<PackingSummary, ValidationError> {
    let policy = config.layer_policy();
    pack_with_policy(request, config, &policy, on_event)
}

/// Verpackung mit eigener Prioritätsregel für gemischte Lagen.
pub fn pack_with_policy(
    request: &OrderRequest,
    config: &PackingConfig,
    policy: &dyn MixedLayerPolicy,
    mut on_event: impl FnMut(&PackEvent),
) -> Result<PackingSummary, ValidationError> {
    config.validate()?;
    request.validate()?;

    let profiles = request.profiles(&config.defaults);
    let quantities = request.quantities();
    let selector = BoxSelector::new(
        &profiles,
        config.box_padding,
        config.packaging_multiplier,
        policy,
    );

    let outcome = if request.entries.is_empty() {
        SelectionOutcome::default()
    } else {
        match &request.manual_box_id {
            Some(id) => selector.select_manual(&request.boxes, id, &quantities, |e| {
                emit_evaluation(e, &mut on_event)
            })?,
            None => selector.select_auto(&request.boxes, &quantities, |e| {
                emit_evaluation(e, &mut on_event)
            }),
        }
    };

    if let Some(selection) = &outcome.selection {
        emit_selected(selection, &mut on_event);
    }
    let summary = aggregate(
        outcome.selection.into_iter().collect(),
        &request.requested(),
        outcome.rejections,
        request.provisional,
    );

    tracing::debug!(
        status = ?summary.status,
        primary_box = summary.primary_box_id.as_deref().unwrap_or("-"),
        leftover = summary.leftover,
        "order packed"
    );
    emit_finished(&summary, &mut on_event);
    Ok(summary)
}

/// Explizite Aufteilung auf mehrere Boxen.
///
/// Wiederholt die AUTO-Auswahl auf den Restmengen, bis nichts übrig ist,
/// kein Fortschritt mehr möglich ist oder `max_boxes` Boxen belegt sind.
/// Mit `manual_box_id` werden ausschließlich Exemplare dieser Box verwendet.
/// Die Ablehnungsgründe beschreiben die letzte Runde.
pub fn pack_order_split(
    request: &OrderRequest,
    config: &PackingConfig,
    max_boxes: usize,
) -> Result<PackingSummary, ValidationError> {
    pack_order_split_with_progress(request, config, max_boxes, |_| {})
}

/// Wie `pack_order_split`, mit Progress Callback.
pub fn pack_order_split_with_progress(
    request: &OrderRequest,
    config: &PackingConfig,
    max_boxes: usize,
    mut on_event: impl FnMut(&PackEvent),
) -> Result<PackingSummary, ValidationError> {
    config.validate()?;
    request.validate()?;
    if max_boxes == 0 {
        return Err(ValidationError::InvalidConfiguration(
            "max_boxes must be at least 1".to_string(),
        ));
    }

    let catalog: Vec<Carton> = match &request.manual_box_id {
        Some(id) => request.boxes.iter().filter(|b| &b.id == id).cloned().collect(),
        None => request.boxes.clone(),
    };
    let profiles = request.profiles(&config.defaults);
    let policy = config.layer_policy();
    let selector = BoxSelector::new(
        &profiles,
        config.box_padding,
        config.packaging_multiplier,
        &policy,
    );

    let mut remaining = request.quantities();
    let mut selections: Vec<PackingSelection> = Vec::new();
    let mut rejections = Vec::new();

    while selections.len() < max_boxes && remaining.iter().any(|&q| q > 0) {
        let outcome = selector.select_auto(&catalog, &remaining, |e| {
            emit_evaluation(e, &mut on_event)
        });
        rejections = outcome.rejections;
        let Some(selection) = outcome.selection else {
            break;
        };
        for (i, qty) in remaining.iter_mut().enumerate() {
            *qty -= selection.packed_for(i);
        }
        emit_selected(&selection, &mut on_event);
        tracing::debug!(
            round = selections.len() + 1,
            box_id = %selection.box_id,
            packed = selection.packed_quantity,
            "split round packed"
        );
        selections.push(selection);
    }

    let summary = aggregate(
        selections,
        &request.requested(),
        rejections,
        request.provisional,
    );
    emit_finished(&summary, &mut on_event);
    Ok(summary)
}

/// Berechnet viele unabhängige Aufträge parallel.
///
/// Die Ergebnisse stehen in Eingabereihenfolge und sind identisch zur
/// sequentiellen Berechnung.
pub fn pack_orders_parallel(
    requests: &[OrderRequest],
    config: &PackingConfig,
) -> Vec<Result<PackingSummary, ValidationError>> {
    requests
        .par_iter()
        .map(|request| pack_request(request, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::EntryState;
    use crate::model::{BoxDims, ItemDims, ItemProfile};
    use crate::summary::PackingFailure;

    fn scenario_box() -> Carton {
        Carton::new("M", BoxDims::new(600.0, 400.0, 400.0)).unwrap()
    }

    fn sku(id: &str, w: f64, d: f64, h: f64) -> ItemProfile {
        ItemProfile::new(id, ItemDims::new(w, d, h))
    }

    #[test]
    fn order_total_beyond_u32_is_rejected() {
        let entries = vec![
            OrderLineEntry::new(sku("A", 10.0, 10.0, 10.0), 3_000_000_000),
            OrderLineEntry::new(sku("B", 10.0, 10.0, 10.0), 3_000_000_000),
        ];
        let result = pack_order(&entries, &[scenario_box()], None, &PackingConfig::default());
        assert!(matches!(result, Err(ValidationError::InvalidQuantity(_))));
    }

    #[test]
    fn builder_sets_all_fields() {
        let config = PackingConfig::builder()
            .packaging_multiplier(2.5)
            .box_padding(3.0)
            .allow_orientation_reuse(true)
            .defaults(PackingDefaults {
                gap_xy: 1.0,
                ..PackingDefaults::default()
            })
            .build();
        assert_eq!(config.packaging_multiplier, 2.5);
        assert_eq!(config.box_padding, 3.0);
        assert!(config.allow_orientation_reuse);
        assert_eq!(config.defaults.gap_xy, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_multiplier_is_rejected() {
        let config = PackingConfig::builder().packaging_multiplier(-1.0).build();
        let result = pack_order(&[], &[scenario_box()], None, &config);
        assert!(matches!(result, Err(ValidationError::InvalidConfiguration(_))));
    }

    #[test]
    fn scenario_a_single_invocation_leaves_240() {
        let entries = vec![OrderLineEntry::new(sku("A", 100.0, 80.0, 50.0), 480)];
        let summary = pack_order(&entries, &[scenario_box()], None, &PackingConfig::default()).unwrap();
        assert_eq!(summary.selections.len(), 1);
        assert_eq!(summary.packed_total(), 240);
        assert_eq!(summary.leftover, 240);
        assert_eq!(summary.status, PackingStatus::Failed);
        assert_eq!(summary.primary_box_id.as_deref(), Some("M"));
    }

    #[test]
    fn scenario_a_split_uses_two_boxes() {
        let request = OrderRequest::new(
            vec![OrderLineEntry::new(sku("A", 100.0, 80.0, 50.0), 480)],
            vec![scenario_box()],
        );
        let summary = pack_order_split(&request, &PackingConfig::default(), 4).unwrap();
        assert_eq!(summary.selections.len(), 2);
        assert!(summary.selections.iter().all(|s| s.box_id == "M"));
        assert_eq!(summary.leftover, 0);
        assert_eq!(summary.status, PackingStatus::Success);
    }

    #[test]
    fn split_respects_max_boxes() {
        let request = OrderRequest::new(
            vec![OrderLineEntry::new(sku("A", 100.0, 80.0, 50.0), 600)],
            vec![scenario_box()],
        );
        let summary = pack_order_split(&request, &PackingConfig::default(), 2).unwrap();
        assert_eq!(summary.selections.len(), 2);
        assert_eq!(summary.leftover, 120);
        assert_eq!(summary.status, PackingStatus::Failed);
        assert!(pack_order_split(&request, &PackingConfig::default(), 0).is_err());
    }

    #[test]
    fn provisional_request_stays_pending() {
        let request = OrderRequest::new(
            vec![OrderLineEntry::new(sku("LONG", 700.0, 100.0, 100.0), 2)],
            vec![scenario_box()],
        )
        .provisional();
        let summary = pack_request(&request, &PackingConfig::default()).unwrap();
        assert_eq!(summary.status, PackingStatus::Pending);
        assert_eq!(summary.leftover, 2);
        assert!(summary.selections.is_empty());
    }

    #[test]
    fn manual_unknown_box_is_rejected_before_packing() {
        let entries = vec![OrderLineEntry::new(sku("A", 10.0, 10.0, 10.0), 1)];
        let result = pack_order(&entries, &[scenario_box()], Some("XL"), &PackingConfig::default());
        assert_eq!(result, Err(ValidationError::UnknownBox("XL".to_string())));
    }

    #[test]
    fn manual_overweight_box_fails_with_weight_reason() {
        let entries = vec![OrderLineEntry::new(
            sku("HEAVY", 100.0, 80.0, 50.0).with_unit_weight(5.0),
            30,
        )];
        let boxes = [scenario_box().with_box_weight(1.0).with_max_weight(100.0)];
        let summary = pack_order(&entries, &boxes, Some("M"), &PackingConfig::default()).unwrap();
        assert_eq!(summary.status, PackingStatus::Failed);
        assert_eq!(summary.selections.len(), 1);
        assert_eq!(summary.leftover, 0);
        assert!(matches!(
            summary.failure,
            Some(PackingFailure::WeightExceeded { .. })
        ));
    }

    #[test]
    fn progress_events_end_with_finished() {
        let request = OrderRequest::new(
            vec![OrderLineEntry::new(sku("A", 100.0, 100.0, 100.0), 2)],
            vec![
                Carton::new("S", BoxDims::new(100.0, 100.0, 100.0)).unwrap(),
                Carton::new("M", BoxDims::new(300.0, 100.0, 100.0)).unwrap(),
            ],
        );
        let mut events = Vec::new();
        let summary =
            pack_order_with_progress(&request, &PackingConfig::default(), |e| events.push(e.clone()))
                .unwrap();
        assert_eq!(summary.status, PackingStatus::Success);

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                PackEvent::BoxEvaluated { .. } => "evaluated",
                PackEvent::BoxRejected { .. } => "rejected",
                PackEvent::BoxSelected { .. } => "selected",
                PackEvent::Finished { .. } => "finished",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["evaluated", "rejected", "evaluated", "selected", "finished"]
        );

        let json = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(json["type"], "BoxEvaluated");
        assert_eq!(json["boxId"], "S");
    }

    #[test]
    fn custom_policy_is_honoured() {
        struct LastFirst;
        impl MixedLayerPolicy for LastFirst {
            fn priority(&self, entries: &[EntryState<'_>]) -> Vec<usize> {
                (0..entries.len()).rev().collect()
            }
        }

        let request = OrderRequest::new(
            vec![
                OrderLineEntry::new(sku("A", 100.0, 100.0, 100.0), 1),
                OrderLineEntry::new(sku("B", 50.0, 50.0, 50.0), 2),
            ],
            vec![Carton::new("M", BoxDims::new(300.0, 100.0, 100.0)).unwrap()],
        );
        let summary =
            pack_with_policy(&request, &PackingConfig::default(), &LastFirst, |_| {}).unwrap();
        let first_column = &summary.selections[0].layers[0].layer.columns[0];
        assert_eq!(first_column.item_id, "B");
    }

    #[test]
    fn parallel_matches_sequential() {
        let requests: Vec<OrderRequest> = (1..=8)
            .map(|n| {
                OrderRequest::new(
                    vec![
                        OrderLineEntry::new(sku("A", 100.0, 80.0, 50.0), n * 20),
                        OrderLineEntry::new(sku("B", 40.0, 40.0, 40.0), n),
                    ],
                    vec![
                        scenario_box(),
                        Carton::new("S", BoxDims::new(300.0, 200.0, 200.0)).unwrap(),
                    ],
                )
            })
            .collect();
        let config = PackingConfig::default();
        let parallel = pack_orders_parallel(&requests, &config);
        let sequential: Vec<_> = requests.iter().map(|r| pack_request(r, &config)).collect();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn empty_order_is_pending_without_selections() {
        let summary = pack_order(&[], &[scenario_box()], None, &PackingConfig::default()).unwrap();
        assert_eq!(summary.status, PackingStatus::Pending);
        assert!(summary.selections.is_empty());
        assert_eq!(summary.leftover, 0);
    }
}
