//! Live view row for one track identity.
//!
//! A `TrackRow` is constructed once per identity appearance, owned strongly
//! by the reconciled row list, and indexed weakly by the item cache. Its
//! renderer-visible state lives in [`RowDisplay`] and is only mutated by the
//! coalesced refresh running on the UI-thread context.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, Weak,
};

use log::debug;
use tokio::sync::watch;

use crate::{
    config::SyncConfig,
    dirty::{DirtyFlags, RefreshLatch, DIRTY_ALL, DIRTY_PROGRESS, DIRTY_STATUS, DIRTY_TIME},
    marshal::UiMarshaller,
    positioner::RowMotion,
    protocol::{BackendQuery, DownloadStatus, TrackRecord},
};

/// Extra extent of rows that render an error/failure line.
const ERROR_LINE_PX: f32 = 16.0;

/// Renderer-visible state of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDisplay {
    pub title: String,
    /// Artist and published date, joined for the secondary line.
    pub subtitle: String,
    pub status_text: String,
    pub progress_percent: u8,
    /// "mm:ss / mm:ss" position readout, empty when nothing is known.
    pub time_text: String,
    pub favorite: bool,
    /// Measured row extent in logical pixels.
    pub extent_px: f32,
}

/// Shared dependencies handed to every constructed row.
#[derive(Clone)]
pub struct RowContext {
    pub marshaller: Arc<dyn UiMarshaller>,
    pub backend: Arc<dyn BackendQuery>,
    /// Set when any row's extent changes so the next frame re-applies
    /// positions.
    pub layout_dirty: Arc<AtomicBool>,
    pub base_extent_px: f32,
}

pub struct TrackRow {
    id: String,
    record: Mutex<TrackRecord>,
    display: Mutex<RowDisplay>,
    motion: Mutex<RowMotion>,
    dirty: DirtyFlags,
    refresh_latch: RefreshLatch,
    destroyed: AtomicBool,
    teardown_tx: watch::Sender<bool>,
    teardown_rx: watch::Receiver<bool>,
    self_weak: Weak<TrackRow>,
    context: RowContext,
    /// Construction failure text for placeholder rows.
    error_text: Option<String>,
}

impl TrackRow {
    fn build(record: TrackRecord, error_text: Option<String>, context: RowContext) -> Arc<Self> {
        let (teardown_tx, teardown_rx) = watch::channel(false);
        Arc::new_cyclic(|self_weak| {
            let display = render_display(&record, error_text.as_deref(), context.base_extent_px);
            TrackRow {
                id: record.id.clone(),
                record: Mutex::new(record),
                display: Mutex::new(display),
                motion: Mutex::new(RowMotion::default()),
                dirty: DirtyFlags::new(),
                refresh_latch: RefreshLatch::new(),
                destroyed: AtomicBool::new(false),
                teardown_tx,
                teardown_rx,
                self_weak: self_weak.clone(),
                context,
                error_text,
            }
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the renderer-visible state.
    pub fn display(&self) -> RowDisplay {
        self.display.lock().expect("row display lock poisoned").clone()
    }

    pub fn extent_px(&self) -> f32 {
        self.display.lock().expect("row display lock poisoned").extent_px
    }

    pub(crate) fn motion(&self) -> &Mutex<RowMotion> {
        &self.motion
    }

    /// Current display position in logical pixels.
    pub fn position_px(&self) -> f32 {
        self.motion.lock().expect("row motion lock poisoned").current_px
    }

    pub fn is_error(&self) -> bool {
        self.error_text.is_some()
    }

    /// Watch handle observed by this row's listener task; flips to `true`
    /// exactly once, on the first [`destroy`](Self::destroy) call.
    pub fn teardown_watch(&self) -> watch::Receiver<bool> {
        self.teardown_rx.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Raises dirty bits and schedules at most one coalesced refresh on the
    /// UI-thread context. Called from listener tasks.
    pub fn mark_dirty(&self, flags: u8) {
        if self.is_destroyed() {
            return;
        }
        self.dirty.raise(flags);
        if self.refresh_latch.arm() {
            // The queue holds the row weakly so a dropped row never runs a
            // stale refresh.
            let row = self.self_weak.clone();
            self.context.marshaller.enqueue(Box::new(move || {
                if let Some(row) = row.upgrade() {
                    row.run_refresh();
                }
            }));
        }
    }

    /// Forces a full re-render of the row on the next refresh.
    pub fn request_refresh(&self) {
        self.mark_dirty(DIRTY_ALL);
    }

    /// Adopts a replaced backend record carrying the same identity. The row
    /// is updated in place, never rebuilt, so in-flight animations survive.
    pub fn update_record(&self, record: &TrackRecord) {
        let changed = {
            let mut current = self.record.lock().expect("row record lock poisoned");
            if *current != *record {
                *current = record.clone();
                true
            } else {
                false
            }
        };
        if changed {
            self.request_refresh();
        }
    }

    /// Detaches the row: signals its listener task to exit and close its
    /// subscriptions. Safe to call more than once; only the first call has
    /// an effect.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.teardown_tx.send(true);
        debug!("Row {} destroyed", self.id);
    }

    /// Consumes the raised dirty bits and applies the matching partial
    /// display updates. Runs on the UI-thread context.
    fn run_refresh(&self) {
        // Disarm before taking, so a raise racing with this refresh either
        // lands in the taken set or arms the next one.
        self.refresh_latch.disarm();
        let taken = self.dirty.take();
        if taken == 0 || self.is_destroyed() {
            return;
        }

        // Read-after-notify: events carried only the tag, current values
        // come from the backend.
        if self.error_text.is_none() {
            if let Some(current) = self.context.backend.record(&self.id) {
                let mut record = self.record.lock().expect("row record lock poisoned");
                *record = current;
            }
        }
        let record = self.record.lock().expect("row record lock poisoned").clone();
        let next = render_display(&record, self.error_text.as_deref(), self.context.base_extent_px);

        let mut display = self.display.lock().expect("row display lock poisoned");
        let extent_changed = (next.extent_px - display.extent_px).abs() > f32::EPSILON;
        if taken & DIRTY_STATUS != 0 {
            display.title = next.title;
            display.subtitle = next.subtitle;
            display.status_text = next.status_text.clone();
            display.favorite = next.favorite;
            display.extent_px = next.extent_px;
        }
        if taken & DIRTY_PROGRESS != 0 {
            display.progress_percent = next.progress_percent;
            // Progress is rendered inside the status line while downloading.
            if record.status == DownloadStatus::Downloading {
                display.status_text = next.status_text;
            }
        }
        if taken & DIRTY_TIME != 0 {
            display.time_text = next.time_text;
        }
        drop(display);

        if extent_changed && taken & DIRTY_STATUS != 0 {
            self.context.layout_dirty.store(true, Ordering::SeqCst);
            debug!("Row {} extent changed, re-layout flagged", self.id);
        }
    }
}

/// Constructs view rows for snapshot records.
pub trait RowFactory: Send + Sync {
    /// Builds the row for `record`. Runs exactly once per identity
    /// appearance.
    fn build(&self, record: &TrackRecord) -> Result<Arc<TrackRow>, String>;
    /// Placeholder row substituted when `build` fails, so one bad record
    /// never aborts a reconciliation pass.
    fn build_error(&self, id: &str, error: &str) -> Arc<TrackRow>;
}

/// Default factory wiring rows to the shared marshaller and backend.
pub struct StandardRowFactory {
    context: RowContext,
}

impl StandardRowFactory {
    pub fn new(
        marshaller: Arc<dyn UiMarshaller>,
        backend: Arc<dyn BackendQuery>,
        layout_dirty: Arc<AtomicBool>,
        config: &SyncConfig,
    ) -> Self {
        StandardRowFactory {
            context: RowContext {
                marshaller,
                backend,
                layout_dirty,
                base_extent_px: config.row_height_px,
            },
        }
    }
}

impl RowFactory for StandardRowFactory {
    fn build(&self, record: &TrackRecord) -> Result<Arc<TrackRow>, String> {
        if record.id.is_empty() {
            return Err("record has an empty id".to_string());
        }
        Ok(TrackRow::build(record.clone(), None, self.context.clone()))
    }

    fn build_error(&self, id: &str, error: &str) -> Arc<TrackRow> {
        let placeholder = TrackRecord {
            id: id.to_string(),
            title: "Unavailable track".to_string(),
            artist: String::new(),
            size_bytes: 0,
            published: String::new(),
            status: DownloadStatus::Failed,
            progress_percent: 0,
            position_ms: 0,
            duration_ms: 0,
            favorite: false,
        };
        TrackRow::build(placeholder, Some(error.to_string()), self.context.clone())
    }
}

fn render_display(record: &TrackRecord, error_text: Option<&str>, base_extent_px: f32) -> RowDisplay {
    let status_text = match error_text {
        Some(error) => format!("Unavailable: {}", error),
        None => match record.status {
            DownloadStatus::New => String::new(),
            DownloadStatus::Queued => "Queued".to_string(),
            DownloadStatus::Downloading => {
                format!("Downloading {}%", record.progress_percent.min(100))
            }
            DownloadStatus::Downloaded => format_size(record.size_bytes),
            DownloadStatus::Failed => "Download failed".to_string(),
        },
    };
    let subtitle = match (record.artist.is_empty(), record.published.is_empty()) {
        (true, true) => String::new(),
        (false, true) => record.artist.clone(),
        (true, false) => record.published.clone(),
        (false, false) => format!("{} | {}", record.artist, record.published),
    };
    let time_text = if record.duration_ms > 0 {
        format!(
            "{} / {}",
            format_time(record.position_ms),
            format_time(record.duration_ms)
        )
    } else if record.position_ms > 0 {
        format_time(record.position_ms)
    } else {
        String::new()
    };
    let has_error_line = error_text.is_some() || record.status == DownloadStatus::Failed;
    RowDisplay {
        title: record.title.clone(),
        subtitle,
        status_text,
        progress_percent: record.progress_percent.min(100),
        time_text,
        favorite: record.favorite,
        extent_px: base_extent_px + if has_error_line { ERROR_LINE_PX } else { 0.0 },
    }
}

/// "mm:ss" readout, spilling into hours past 59:59.
pub fn format_time(ms: u64) -> String {
    let total_secs = ms / 1000;
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}", mins, secs)
}

/// Human-readable byte size.
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
