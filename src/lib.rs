//! Ordered track-list view synchronization core.
//!
//! The crate keeps a rendered list of track rows in sync with a backend
//! collection that changes from arbitrary threads. Backend code publishes
//! tag events on shared [`bus::EventBus`]es; per-row listener tasks raise
//! coalesced dirty bits; membership changes drive snapshot reconciliation
//! that reuses row instances by identity and animates surviving rows to
//! their new positions. All view mutation is funneled through a
//! [`marshal::UiMarshaller`] so the rendering side stays single-threaded.

pub mod bus;
pub mod buses;
pub mod config;
pub mod dirty;
pub mod item_cache;
pub mod listener;
pub mod marshal;
pub mod positioner;
pub mod protocol;
pub mod reconciler;
pub mod track_row;
pub mod view_sync;

pub use bus::{EventBus, Subscription};
pub use buses::TrackBuses;
pub use config::SyncConfig;
pub use marshal::{EventLoopQueue, UiCallback, UiMarshaller};
pub use protocol::{
    BackendQuery, DownloadStatus, MembershipEvent, ProgressChanged, StatusChanged, TimeChanged,
    TrackRecord,
};
pub use track_row::{RowDisplay, RowFactory, StandardRowFactory, TrackRow};
pub use view_sync::{spawn_view_sync, ViewSync, ViewSyncContext};
