use std::sync::Arc;

use docgraph_core::ProgressBus;

/// Shared application state: the one thing this crate wires to a
/// WebSocket — the Progress Bus (§6). Everything else (document storage,
/// upload handling, auth) lives outside this crate's scope.
#[derive(Clone)]
pub struct AppState {
    pub progress_bus: Arc<ProgressBus>,
}

impl AppState {
    pub fn new(progress_bus: Arc<ProgressBus>) -> Arc<Self> {
        Arc::new(Self { progress_bus })
    }
}
