//! Per-row event listener tasks.
//!
//! Each live row runs exactly one listener task for the duration of its
//! life. The task merges the status/progress/time buses and the membership
//! bus into one select loop, raises the matching dirty bit for its own id,
//! and exits on the terminal `ItemRemoved` event or on the row's teardown
//! signal. Every exit path closes all subscriptions; a listener outliving
//! its row is a structural defect, prevented by the weak row handle and the
//! unconditional teardown check.

use std::sync::{Arc, Weak};

use log::debug;
use tokio::sync::watch;

use crate::{
    bus::Subscription,
    buses::TrackBuses,
    dirty::{DIRTY_PROGRESS, DIRTY_STATUS, DIRTY_TIME},
    protocol::{MembershipEvent, ProgressChanged, StatusChanged, TimeChanged},
    track_row::TrackRow,
};

/// Everything one listener task owns.
pub struct RowListenerContext {
    pub id: String,
    /// Weak so the queue of pending events never keeps a dead row alive.
    pub row: Weak<TrackRow>,
    pub status: Subscription<StatusChanged>,
    pub progress: Subscription<ProgressChanged>,
    pub time: Subscription<TimeChanged>,
    pub membership: Subscription<MembershipEvent>,
    pub teardown: watch::Receiver<bool>,
}

/// Opens this row's subscriptions on the shared buses.
pub fn subscribe_row(buses: &TrackBuses, row: &Arc<TrackRow>) -> RowListenerContext {
    RowListenerContext {
        id: row.id().to_string(),
        row: Arc::downgrade(row),
        status: buses.status.subscribe(),
        progress: buses.progress.subscribe(),
        time: buses.time.subscribe(),
        membership: buses.membership.subscribe(),
        teardown: row.teardown_watch(),
    }
}

pub fn spawn_row_listener(
    handle: &tokio::runtime::Handle,
    context: RowListenerContext,
) -> tokio::task::JoinHandle<()> {
    handle.spawn(run_row_listener(context))
}

async fn run_row_listener(mut context: RowListenerContext) {
    loop {
        // Teardown may have been signaled before this iteration's select
        // registered interest; check unconditionally.
        if *context.teardown.borrow() {
            break;
        }
        tokio::select! {
            changed = context.teardown.changed() => {
                if changed.is_err() || *context.teardown.borrow() {
                    break;
                }
            }
            event = context.status.recv() => match event {
                Some(event) if event.id == context.id => {
                    if !raise(&context.row, DIRTY_STATUS) {
                        break;
                    }
                }
                Some(_) => {}
                None => break,
            },
            event = context.progress.recv() => match event {
                Some(event) if event.id == context.id => {
                    if !raise(&context.row, DIRTY_PROGRESS) {
                        break;
                    }
                }
                Some(_) => {}
                None => break,
            },
            event = context.time.recv() => match event {
                Some(event) if event.id == context.id => {
                    if !raise(&context.row, DIRTY_TIME) {
                        break;
                    }
                }
                Some(_) => {}
                None => break,
            },
            event = context.membership.recv() => match event {
                Some(MembershipEvent::ItemRemoved(id)) if id == context.id => break,
                Some(_) => {}
                None => break,
            },
        }
    }
    context.status.close();
    context.progress.close();
    context.time.close();
    context.membership.close();
    debug!("Row listener exited for id {}", context.id);
}

fn raise(row: &Weak<TrackRow>, flag: u8) -> bool {
    match row.upgrade() {
        Some(row) => {
            row.mark_dirty(flag);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SyncConfig,
        marshal::{EventLoopQueue, UiMarshaller},
        protocol::{BackendQuery, TrackRecord},
        track_row::{RowFactory, StandardRowFactory},
    };
    use std::sync::{atomic::AtomicBool, Arc, Mutex};
    use std::time::Duration;

    struct StoreBackend {
        records: Mutex<Vec<TrackRecord>>,
    }

    impl BackendQuery for StoreBackend {
        fn snapshot(&self) -> Vec<TrackRecord> {
            self.records.lock().expect("store lock poisoned").clone()
        }
        fn record(&self, id: &str) -> Option<TrackRecord> {
            self.records
                .lock()
                .expect("store lock poisoned")
                .iter()
                .find(|r| r.id == id)
                .cloned()
        }
    }

    fn record(id: &str, progress: u8) -> TrackRecord {
        TrackRecord {
            id: id.to_string(),
            title: id.to_string(),
            artist: String::new(),
            size_bytes: 0,
            published: String::new(),
            status: crate::protocol::DownloadStatus::Downloading,
            progress_percent: progress,
            position_ms: 0,
            duration_ms: 0,
            favorite: false,
        }
    }

    struct ListenerHarness {
        buses: Arc<TrackBuses>,
        queue: Arc<EventLoopQueue>,
        row: Arc<TrackRow>,
    }

    impl ListenerHarness {
        fn new(id: &str) -> Self {
            let config = SyncConfig::default();
            let buses = TrackBuses::new(&config);
            let queue = Arc::new(EventLoopQueue::new());
            let backend = Arc::new(StoreBackend {
                records: Mutex::new(vec![record(id, 10)]),
            });
            let marshaller: Arc<dyn UiMarshaller> = queue.clone();
            let store: Arc<dyn BackendQuery> = backend;
            let factory = StandardRowFactory::new(
                marshaller,
                store,
                Arc::new(AtomicBool::new(false)),
                &config,
            );
            let row = factory.build(&record(id, 10)).expect("row should build");
            ListenerHarness { buses, queue, row }
        }

        fn context(&self) -> RowListenerContext {
            subscribe_row(&self.buses, &self.row)
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("failed to build runtime")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn events_for_own_id_schedule_a_refresh() {
        let harness = ListenerHarness::new("mine");
        let runtime = runtime();
        runtime.block_on(async {
            let handle = spawn_row_listener(&tokio::runtime::Handle::current(), harness.context());

            harness.buses.progress.publish(ProgressChanged {
                id: "other".to_string(),
            });
            harness.buses.progress.publish(ProgressChanged {
                id: "mine".to_string(),
            });
            settle().await;

            // Only the matching event raised a refresh.
            assert_eq!(harness.queue.process_pending(), 1);
            assert!(!handle.is_finished());
            harness.row.destroy();
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("listener should exit after teardown")
                .expect("listener task panicked");
        });
    }

    #[test]
    fn terminal_removed_event_stops_the_listener() {
        let harness = ListenerHarness::new("mine");
        let runtime = runtime();
        runtime.block_on(async {
            let handle = spawn_row_listener(&tokio::runtime::Handle::current(), harness.context());

            harness
                .buses
                .membership
                .publish(MembershipEvent::ItemRemoved("other".to_string()));
            settle().await;
            assert!(!handle.is_finished());

            harness
                .buses
                .membership
                .publish(MembershipEvent::ItemRemoved("mine".to_string()));
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("listener should exit on terminal event")
                .expect("listener task panicked");
        });
    }

    #[test]
    fn teardown_signaled_before_spawn_exits_immediately() {
        let harness = ListenerHarness::new("mine");
        let runtime = runtime();
        runtime.block_on(async {
            harness.row.destroy();
            let handle = spawn_row_listener(&tokio::runtime::Handle::current(), harness.context());
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("listener should observe pre-existing teardown")
                .expect("listener task panicked");
        });
    }

    #[test]
    fn dropped_row_ends_the_listener_on_next_event() {
        let harness = ListenerHarness::new("mine");
        let runtime = runtime();
        runtime.block_on(async {
            let context = harness.context();
            let handle = spawn_row_listener(&tokio::runtime::Handle::current(), context);

            let ListenerHarness { buses, queue, row } = harness;
            drop(row);
            drop(queue);
            buses.status.publish(StatusChanged {
                id: "mine".to_string(),
            });
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("listener should exit once the row is gone")
                .expect("listener task panicked");
        });
    }

    #[test]
    fn rapid_progress_events_yield_single_refresh_with_latest_value() {
        let harness = ListenerHarness::new("mine");
        let runtime = runtime();
        runtime.block_on(async {
            let handle = spawn_row_listener(&tokio::runtime::Handle::current(), harness.context());

            for _ in 0..5 {
                harness.buses.progress.publish(ProgressChanged {
                    id: "mine".to_string(),
                });
            }
            settle().await;

            // Five events, one marshaled refresh.
            assert_eq!(harness.queue.process_pending(), 1);
            harness.row.destroy();
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("listener should exit after teardown")
                .expect("listener task panicked");
        });
    }
}
