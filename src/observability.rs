use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub phases: BTreeMap<String, PhaseMetrics>,
    pub images_built: u64,
    pub images_tagged: u64,
    pub images_pushed: u64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct PhaseMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `phase`; the duration is recorded when the timer drops.
    pub fn start_phase(&self, phase: &str) -> PhaseTimer {
        PhaseTimer {
            phase: phase.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
        }
    }

    pub fn record_build(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.images_built += 1;
        }
    }

    pub fn record_tag(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.images_tagged += 1;
        }
    }

    pub fn record_push(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.images_pushed += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot::default();
        }
    }
}

pub struct PhaseTimer {
    phase: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.phases.entry(self.phase.clone()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(
            phase = self.phase.as_str(),
            duration_ms, "Phase duration recorded"
        );
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        images_built = snapshot.images_built,
        images_tagged = snapshot.images_tagged,
        images_pushed = snapshot.images_pushed,
        "Image build metrics summary"
    );
    for (phase, metrics) in &snapshot.phases {
        info!(
            phase = phase.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Phase metrics"
        );
    }
}

impl MetricsSnapshot {
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        for (name, help, value) in [
            (
                "pipeline_image_builds_total",
                "Number of images built",
                self.images_built,
            ),
            (
                "pipeline_image_tags_total",
                "Number of images tagged without a build",
                self.images_tagged,
            ),
            (
                "pipeline_image_pushes_total",
                "Number of images pushed to a container registry",
                self.images_pushed,
            ),
        ] {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {value}\n"));
        }

        output.push_str("# HELP pipeline_image_phase_calls_total Phase invocation count\n");
        output.push_str("# TYPE pipeline_image_phase_calls_total counter\n");
        output.push_str(
            "# HELP pipeline_image_phase_duration_seconds_total Accumulated phase duration in seconds\n",
        );
        output.push_str("# TYPE pipeline_image_phase_duration_seconds_total counter\n");
        output.push_str(
            "# HELP pipeline_image_phase_duration_seconds_max Maximum phase duration in seconds\n",
        );
        output.push_str("# TYPE pipeline_image_phase_duration_seconds_max gauge\n");
        for (phase, metrics) in &self.phases {
            output.push_str(&format!(
                "pipeline_image_phase_calls_total{{phase=\"{}\"}} {}\n",
                phase, metrics.calls
            ));
            output.push_str(&format!(
                "pipeline_image_phase_duration_seconds_total{{phase=\"{}\"}} {:.6}\n",
                phase,
                metrics.total_duration_ms / 1_000.0
            ));
            output.push_str(&format!(
                "pipeline_image_phase_duration_seconds_max{{phase=\"{}\"}} {:.6}\n",
                phase,
                metrics.max_duration_ms / 1_000.0
            ));
        }
        output
    }
}
