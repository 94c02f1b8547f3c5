//! Event-bus protocol shared by all view-sync components.
//!
//! This module defines the payloads exchanged between backend producers
//! (downloads, playlist edits, favorite toggles, file-system scans), the
//! per-row listener tasks, and the reconciliation coordinator.

/// Download lifecycle state for one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    New,         // Known to the backend, nothing fetched yet
    Queued,      // Waiting for a download slot
    Downloading, // Transfer in progress
    Downloaded,  // Present on disk
    Failed,      // Last transfer attempt failed
}

impl Default for DownloadStatus {
    fn default() -> Self {
        DownloadStatus::New
    }
}

/// One backend track record as delivered in an ordered snapshot.
///
/// `id` is the stable identity: two snapshots refer to the same track iff
/// their ids match, even when every other field changed in between.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TrackRecord {
    /// Stable track id. An empty id marks the record as malformed.
    pub id: String,
    /// Track title.
    pub title: String,
    /// Track artist.
    #[serde(default)]
    pub artist: String,
    /// File size in bytes, 0 when unknown.
    #[serde(default)]
    pub size_bytes: u64,
    /// Published/release date string as discovered from the backend.
    #[serde(default)]
    pub published: String,
    /// Download lifecycle state.
    #[serde(default)]
    pub status: DownloadStatus,
    /// Transfer progress, 0..=100.
    #[serde(default)]
    pub progress_percent: u8,
    /// Last known playback position in milliseconds.
    #[serde(default)]
    pub position_ms: u64,
    /// Total duration in milliseconds, 0 when unknown.
    #[serde(default)]
    pub duration_ms: u64,
    /// Favorite flag toggled by the user.
    #[serde(default)]
    pub favorite: bool,
}

/// Decodes an ordered backend snapshot from its JSON payload form.
pub fn snapshot_from_json(payload: &str) -> Result<Vec<TrackRecord>, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Download/favorite state changed for one track. Tag only: consumers
/// re-query current state on receipt, so rapid-fire events coalesce.
#[derive(Debug, Clone)]
pub struct StatusChanged {
    /// Stable track id.
    pub id: String,
}

/// Transfer progress changed for one track. Tag only.
#[derive(Debug, Clone)]
pub struct ProgressChanged {
    /// Stable track id.
    pub id: String,
}

/// Playback position changed for one track. Tag only.
#[derive(Debug, Clone)]
pub struct TimeChanged {
    /// Stable track id.
    pub id: String,
}

/// Collection membership and order notifications.
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    /// Membership or order of the backend collection changed; consumers
    /// fetch a fresh snapshot and reconcile.
    ItemsChanged,
    /// One track left the collection. Terminal event for that track's
    /// row listener.
    ItemRemoved(String),
}

/// Read-side interface to the backend collection.
///
/// Implemented by the embedding application over whatever store it keeps
/// (database, in-memory playlist, remote mirror). Must be cheap enough to
/// call from the UI-thread context.
pub trait BackendQuery: Send + Sync {
    /// Current ordered collection snapshot.
    fn snapshot(&self) -> Vec<TrackRecord>;
    /// Current state of one track, `None` once it left the collection.
    fn record(&self, id: &str) -> Option<TrackRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_decodes_with_defaulted_fields() {
        let payload = r#"[
            {"id": "t1", "title": "First", "status": "downloading", "progress_percent": 40},
            {"id": "t2", "title": "Second"}
        ]"#;
        let snapshot = snapshot_from_json(payload).expect("snapshot should decode");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, "t1");
        assert_eq!(snapshot[0].status, DownloadStatus::Downloading);
        assert_eq!(snapshot[0].progress_percent, 40);
        assert_eq!(snapshot[1].status, DownloadStatus::New);
        assert_eq!(snapshot[1].artist, "");
        assert!(!snapshot[1].favorite);
    }

    #[test]
    fn snapshot_rejects_malformed_payload() {
        assert!(snapshot_from_json("{\"not\": \"a list\"}").is_err());
    }
}
