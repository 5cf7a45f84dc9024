use axum::{Router, extract::State, http::StatusCode, routing::get};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Readiness flags flipped as startup milestones complete. `/healthz`
/// reports 503 until both are set.
#[derive(Debug, Default)]
pub struct Readiness {
    db: AtomicBool,
    queue: AtomicBool,
}

impl Readiness {
    pub fn mark_db_ready(&self) {
        self.db.store(true, Ordering::Relaxed);
    }

    pub fn mark_queue_ready(&self) {
        self.queue.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.db.load(Ordering::Relaxed) && self.queue.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
struct HealthState {
    readiness: Arc<Readiness>,
    prometheus: PrometheusHandle,
}

/// Liveness, readiness, and metrics endpoints for the worker.
pub fn router(readiness: Arc<Readiness>, prometheus: PrometheusHandle) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(HealthState {
            readiness,
            prometheus,
        })
}

async fn livez() -> &'static str {
    "ok"
}

async fn healthz(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics(State(state): State<HealthState>) -> String {
    state.prometheus.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_until_both_flags_set() {
        let readiness = Readiness::default();
        assert!(!readiness.is_ready());

        readiness.mark_db_ready();
        assert!(!readiness.is_ready());

        readiness.mark_queue_ready();
        assert!(readiness.is_ready());
    }
}
