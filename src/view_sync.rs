//! Track-list view synchronization service.
//!
//! Owns the reconciliation engine, the positioner, and the per-row listener
//! tasks. A dedicated thread consumes the membership bus and enqueues one
//! marshaled reconcile pass per observed `ItemsChanged`; passes run on the
//! UI-thread context in observation order. The rendering layer reads
//! [`ViewSync::rows`] / [`ViewSync::is_empty`] and pumps
//! [`ViewSync::tick`] once per frame.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
    thread,
    time::Instant,
};

use log::{debug, info};

use crate::{
    bus::Subscription,
    buses::TrackBuses,
    config::SyncConfig,
    listener::{spawn_row_listener, subscribe_row},
    marshal::UiMarshaller,
    positioner::AnimatedPositioner,
    protocol::{BackendQuery, MembershipEvent},
    reconciler::ReconciliationEngine,
    track_row::{RowFactory, StandardRowFactory, TrackRow},
};

/// Wiring required to start the view-sync service.
pub struct ViewSyncContext {
    /// Shared process-wide event buses.
    pub buses: Arc<TrackBuses>,
    /// Read-side interface to the backend collection.
    pub backend: Arc<dyn BackendQuery>,
    /// UI-thread context all view mutation is scheduled onto.
    pub marshaller: Arc<dyn UiMarshaller>,
    pub config: SyncConfig,
}

/// Shared handle of the running service.
pub struct ViewSync {
    buses: Arc<TrackBuses>,
    backend: Arc<dyn BackendQuery>,
    marshaller: Arc<dyn UiMarshaller>,
    /// Mutex only ferries the engine across the thread boundary; every
    /// lock happens on the UI-thread context (single-writer discipline).
    engine: Mutex<ReconciliationEngine>,
    positioner: AnimatedPositioner,
    rows: Mutex<Vec<Arc<TrackRow>>>,
    empty: AtomicBool,
    layout_dirty: Arc<AtomicBool>,
    listeners: Mutex<HashMap<String, tokio::task::JoinHandle<()>>>,
    runtime_handle: tokio::runtime::Handle,
    self_weak: Weak<ViewSync>,
}

/// Spawns the membership-loop thread and returns the service handle.
pub fn spawn_view_sync(context: ViewSyncContext) -> Arc<ViewSync> {
    let ViewSyncContext {
        buses,
        backend,
        marshaller,
        config,
    } = context;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build view-sync runtime");
    let layout_dirty = Arc::new(AtomicBool::new(false));
    let factory: Arc<dyn RowFactory> = Arc::new(StandardRowFactory::new(
        Arc::clone(&marshaller),
        Arc::clone(&backend),
        Arc::clone(&layout_dirty),
        &config,
    ));
    // Subscribe before the service is visible so no membership event
    // published after spawn is missed.
    let membership = buses.membership.subscribe();

    let sync = Arc::new_cyclic(|self_weak| ViewSync {
        buses: Arc::clone(&buses),
        backend,
        marshaller,
        engine: Mutex::new(ReconciliationEngine::new(factory)),
        positioner: AnimatedPositioner::new(&config),
        rows: Mutex::new(Vec::new()),
        empty: AtomicBool::new(true),
        layout_dirty,
        listeners: Mutex::new(HashMap::new()),
        runtime_handle: runtime.handle().clone(),
        self_weak: self_weak.clone(),
    });

    let service = Arc::clone(&sync);
    thread::spawn(move || {
        runtime.block_on(run_membership_loop(service, membership));
    });
    sync
}

async fn run_membership_loop(sync: Arc<ViewSync>, mut membership: Subscription<MembershipEvent>) {
    debug!("View sync service started");
    while let Some(event) = membership.recv().await {
        match event {
            MembershipEvent::ItemsChanged => sync.request_reconcile(),
            // Folded into the next reconcile; per-row listeners consume it
            // as their terminal event.
            MembershipEvent::ItemRemoved(_) => {}
        }
    }
    membership.close();
    info!("Membership bus closed, view sync service exiting");
}

impl ViewSync {
    /// Rows in display order. The returned vector shares ownership with the
    /// view; cloning it is cheap.
    pub fn rows(&self) -> Vec<Arc<TrackRow>> {
        self.rows.lock().expect("view rows lock poisoned").clone()
    }

    /// Explicit empty-collection signal for the rendering layer.
    pub fn is_empty(&self) -> bool {
        self.empty.load(Ordering::SeqCst)
    }

    /// Schedules a reconcile pass on the UI-thread context. Passes apply in
    /// request order.
    pub fn request_reconcile(&self) {
        let service = self.self_weak.clone();
        self.marshaller.enqueue(Box::new(move || {
            if let Some(service) = service.upgrade() {
                service.reconcile_pass();
            }
        }));
    }

    /// One reconcile pass. Runs on the UI-thread context.
    fn reconcile_pass(&self) {
        let snapshot = self.backend.snapshot();
        let plan = {
            let mut engine = self.engine.lock().expect("reconciler lock poisoned");
            engine.reconcile(&snapshot)
        };
        let constructed: HashSet<&str> = plan.constructed.iter().map(String::as_str).collect();

        {
            let mut listeners = self.listeners.lock().expect("listener registry lock poisoned");
            for id in &plan.removed {
                // The listener exits through the row's teardown signal;
                // dropping the join handle merely detaches it.
                listeners.remove(id);
            }
            listeners.retain(|_, handle| !handle.is_finished());
            for row in &plan.rows {
                if constructed.contains(row.id()) {
                    let context = subscribe_row(&self.buses, row);
                    let handle = spawn_row_listener(&self.runtime_handle, context);
                    listeners.insert(row.id().to_string(), handle);
                }
            }
        }

        let now = Instant::now();
        let mut offset = 0.0f32;
        for row in &plan.rows {
            let target = offset;
            offset += row.extent_px();
            if constructed.contains(row.id()) {
                // New rows appear in place.
                self.positioner.place(row, target);
            } else {
                self.positioner.move_to(row, target, now);
            }
        }
        self.layout_dirty.store(false, Ordering::SeqCst);

        {
            let mut rows = self.rows.lock().expect("view rows lock poisoned");
            // Dropping the previous vector releases the strong ownership of
            // removed rows.
            *rows = plan.rows;
        }
        self.empty.store(plan.is_empty, Ordering::SeqCst);
    }

    /// Frame tick: re-applies targets after row-extent changes and advances
    /// animations. Returns true while another frame is needed. Runs on the
    /// UI-thread context.
    pub fn tick(&self, now: Instant) -> bool {
        let rows = self.rows();
        if self.layout_dirty.swap(false, Ordering::SeqCst) {
            let mut offset = 0.0f32;
            for row in &rows {
                let target = offset;
                offset += row.extent_px();
                self.positioner.move_to(row, target, now);
            }
        }
        self.positioner.tick(&rows, now)
    }
}
