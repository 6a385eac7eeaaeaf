//! Domain records flowing through the reconciliation loop: the persisted
//! tracked item, the live upstream snapshot, per-iteration outcomes, and the
//! sold-inventory filter.

pub mod clock;
pub mod item;
pub(crate) mod lenient;
pub mod outcome;
pub mod snapshot;
pub mod sold;

pub use clock::{format_scanned_at, SystemClock, WallClock};
pub use item::{BoxDimensions, ListingMetadata, TrackedItem};
pub use outcome::{ItemState, ReconciliationOutcome};
pub use snapshot::{SellerInfo, UpstreamSnapshot, ON_SALE_STATUS};
pub use sold::SoldSkuSet;
