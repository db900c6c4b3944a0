use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::services::workbench::Workbench;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub workbench: Arc<Workbench>,
    pub metrics: Arc<PrometheusHandle>,
}

impl AppState {
    pub fn new(workbench: Workbench, metrics: PrometheusHandle) -> Self {
        Self {
            workbench: Arc::new(workbench),
            metrics: Arc::new(metrics),
        }
    }
}
