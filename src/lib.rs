//! Carton packing engine: picks the smallest adequate shipping box for an
//! order and lays the order's items out in stacked layers.

pub mod api;
pub mod arrangement;
pub mod config;
pub mod geometry;
pub mod layer;
pub mod model;
pub mod optimizer;
pub mod orientation;
pub mod plan;
pub mod record;
pub mod selector;
pub mod stack;
pub mod summary;
pub mod types;
pub mod weight;

pub use model::{BoxDims, Carton, ItemDims, ItemProfile, OrderLineEntry, ValidationError};
pub use optimizer::{
    OrderRequest, PackEvent, PackingConfig, pack_order, pack_order_split, pack_request,
};
pub use plan::{QuantityPlan, QuantityRange, plan_quantities};
pub use record::{PackingInputs, PackingRecord};
pub use summary::{PackingFailure, PackingSelection, PackingStatus, PackingSummary};
