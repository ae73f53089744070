//! Collaborators that record what a compute asks of the controller

use controller::{ComputeContext, ImageScanner, NotificationBus, PersistenceTrigger};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Notification bus keeping every emit and dispatch
#[derive(Default)]
pub struct RecordingBus {
    emitted: Mutex<Vec<(String, Value)>>,
    dispatched: Mutex<Vec<(String, Value, String)>>,
}

impl RecordingBus {
    /// Payloads emitted under `event`, oldest first
    pub fn emitted(&self, event: &str) -> Vec<Value> {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn dispatched(&self) -> Vec<(String, Value, String)> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.emitted.lock().unwrap().clear();
        self.dispatched.lock().unwrap().clear();
    }
}

impl NotificationBus for RecordingBus {
    fn emit(&self, event: &str, payload: Value) {
        self.emitted.lock().unwrap().push((event.to_string(), payload));
    }

    fn dispatch(&self, action: &str, payload: Value, compute_id: &str) {
        self.dispatched
            .lock()
            .unwrap()
            .push((action.to_string(), payload, compute_id.to_string()));
    }
}

/// Counts save requests
#[derive(Default)]
pub struct RecordingPersistence {
    saves: AtomicUsize,
}

impl RecordingPersistence {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl PersistenceTrigger for RecordingPersistence {
    fn save(&self) {
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
}

/// Image scanner returning a fixed list for every kind
#[derive(Default)]
pub struct StaticImages {
    paths: Vec<PathBuf>,
}

impl StaticImages {
    pub fn new(paths: &[&str]) -> Self {
        Self {
            paths: paths.iter().map(PathBuf::from).collect(),
        }
    }
}

impl ImageScanner for StaticImages {
    fn scan(&self, _kind: &str) -> Vec<PathBuf> {
        self.paths.clone()
    }
}

/// Everything a test needs to observe a compute
pub struct TestHarness {
    pub bus: Arc<RecordingBus>,
    pub persistence: Arc<RecordingPersistence>,
    pub context: ComputeContext,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_images(StaticImages::default())
    }

    pub fn with_images(images: StaticImages) -> Self {
        let bus = Arc::new(RecordingBus::default());
        let persistence = Arc::new(RecordingPersistence::default());
        let context = ComputeContext {
            notification: bus.clone(),
            persistence: persistence.clone(),
            images: Arc::new(images),
            local_compute_enabled: false,
        };
        Self {
            bus,
            persistence,
            context,
        }
    }
}
