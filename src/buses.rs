//! Process-lifetime bus instances shared by producers and row listeners.

use std::sync::Arc;

use crate::{
    bus::EventBus,
    config::SyncConfig,
    protocol::{MembershipEvent, ProgressChanged, StatusChanged, TimeChanged},
};

/// The per-concern event buses of the track-list view. Constructed once at
/// startup and shared by `Arc`; the buses live for the whole process and
/// are never torn down. Subscriber-side resources are still released
/// explicitly (see [`crate::bus::Subscription::close`]).
pub struct TrackBuses {
    /// Download/favorite state changes.
    pub status: EventBus<StatusChanged>,
    /// Transfer progress changes.
    pub progress: EventBus<ProgressChanged>,
    /// Playback position changes.
    pub time: EventBus<TimeChanged>,
    /// Collection membership and order changes.
    pub membership: EventBus<MembershipEvent>,
}

impl TrackBuses {
    pub fn new(config: &SyncConfig) -> Arc<Self> {
        Arc::new(TrackBuses {
            status: EventBus::new(config.bus_capacity),
            progress: EventBus::new(config.bus_capacity),
            time: EventBus::new(config.bus_capacity),
            membership: EventBus::new(config.bus_capacity),
        })
    }
}
