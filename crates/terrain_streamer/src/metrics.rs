use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use tile_scheduler::Statistics;

pub struct StreamerMetrics {
    pub registry: Registry,
    pub tiles_received_total: IntCounterVec,
    pub tiles_deleted_total: IntCounterVec,
    pub tiles_unavailable_total: IntCounterVec,
    pub gpu_quads: IntGaugeVec,
    pub ram_tiles: IntGaugeVec,
    pub in_transit: IntGaugeVec,
    pub graph_runs_total: IntCounter,
    pub graph_failures_total: IntCounter,
    pub graph_run_seconds: Histogram,
}

impl StreamerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("terrain_streamer".into()), None)?;

        macro_rules! reg {
            ($m:expr) => {{
                let m = $m?;
                registry.register(Box::new(m.clone()))?;
                m
            }};
        }

        Ok(Self {
            tiles_received_total: reg!(IntCounterVec::new(
                Opts::new("tiles_received_total", "Tiles uploaded into a GPU layer"),
                &["scheduler"]
            )),
            tiles_deleted_total: reg!(IntCounterVec::new(
                Opts::new("tiles_deleted_total", "Tiles evicted from the GPU"),
                &["scheduler"]
            )),
            tiles_unavailable_total: reg!(IntCounterVec::new(
                Opts::new("tiles_unavailable_total", "Tiles that could not be loaded"),
                &["scheduler"]
            )),
            gpu_quads: reg!(IntGaugeVec::new(Opts::new("gpu_quads", "Quads resident on the GPU"), &["scheduler"])),
            ram_tiles: reg!(IntGaugeVec::new(Opts::new("ram_tiles", "Assembled tiles in the RAM cache"), &["scheduler"])),
            in_transit: reg!(IntGaugeVec::new(Opts::new("tiles_in_transit", "Tiles requested but not delivered"), &["scheduler"])),
            graph_runs_total: reg!(IntCounter::new("compute_graph_runs_total", "Compute graph runs started")),
            graph_failures_total: reg!(IntCounter::new("compute_graph_failures_total", "Compute graph runs that failed")),
            graph_run_seconds: reg!(Histogram::with_opts(HistogramOpts::new(
                "compute_graph_run_seconds",
                "Wall time of successful compute graph runs"
            ))),
            registry,
        })
    }

    pub fn update_statistics(&self, statistics: &[(String, Statistics)]) {
        for (scheduler, s) in statistics {
            self.gpu_quads.with_label_values(&[scheduler.as_str()]).set(s.n_gpu_quads as i64);
            self.ram_tiles.with_label_values(&[scheduler.as_str()]).set(s.n_ram_tiles as i64);
            self.in_transit.with_label_values(&[scheduler.as_str()]).set(s.n_in_transit as i64);
        }
    }

    pub fn router(&self) -> Router {
        let reg = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let reg = reg.clone();
                async move {
                    let mut buf = Vec::new();
                    match TextEncoder::new().encode(&reg.gather(), &mut buf) {
                        Ok(()) => String::from_utf8_lossy(&buf).into_owned().into_response(),
                        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
                    }
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_are_exported_per_scheduler() {
        let metrics = StreamerMetrics::new().unwrap();
        let stats = Statistics { n_gpu_quads: 12, n_ram_tiles: 40, n_in_transit: 3, ..Default::default() };
        metrics.update_statistics(&[("geometry".into(), stats)]);
        metrics.tiles_unavailable_total.with_label_values(&["ortho"]).inc();

        let mut buf = Vec::new();
        TextEncoder::new().encode(&metrics.registry.gather(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(r#"terrain_streamer_gpu_quads{scheduler="geometry"} 12"#));
        assert!(text.contains(r#"terrain_streamer_tiles_unavailable_total{scheduler="ortho"} 1"#));
    }
}
