//! Scrape orchestration across enabled collectors.

use std::sync::Arc;
use std::time::Instant;

use gpusight_collector::{Collector, CollectorError};
use gpusight_common::{MetricDesc, MetricSink, MetricType, Sample, build_fq_name};
use tracing::{debug, error, info};

/// Subsystem of the per-collector scrape metrics.
const SUBSYSTEM: &str = "scrape";

/// Runs every enabled collector once per scrape.
pub struct Scraper {
    collectors: Vec<Arc<dyn Collector>>,
    duration: Arc<MetricDesc>,
    success: Arc<MetricDesc>,
}

/// Create a shareable scraper handle.
pub type SharedScraper = Arc<Scraper>;

impl Scraper {
    /// Create a scraper whose own metrics live under `namespace`.
    pub fn new(
        namespace: &str,
        collectors: Vec<Arc<dyn Collector>>,
    ) -> Result<Self, CollectorError> {
        let duration = MetricDesc::new(
            build_fq_name(namespace, SUBSYSTEM, "collector_duration_seconds"),
            "Duration of a collector scrape.",
            MetricType::Gauge,
            &["collector"],
        )?;
        let success = MetricDesc::new(
            build_fq_name(namespace, SUBSYSTEM, "collector_success"),
            "Whether a collector succeeded.",
            MetricType::Gauge,
            &["collector"],
        )?;

        Ok(Self {
            collectors,
            duration: Arc::new(duration),
            success: Arc::new(success),
        })
    }

    /// Names of the collectors this scraper runs.
    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Run every collector and return all samples, followed by the
    /// per-collector duration and success samples.
    ///
    /// A failing collector is logged and reported as unsuccessful; samples it
    /// emitted before failing are kept.
    pub fn scrape(&self) -> Vec<Sample> {
        let mut samples = Vec::new();
        let mut outcomes = Vec::with_capacity(self.collectors.len());

        for collector in &self.collectors {
            let name = collector.name();
            let start = Instant::now();
            let result = collector.update(&mut samples);
            let elapsed = start.elapsed().as_secs_f64();

            match &result {
                Ok(()) => {
                    debug!(collector = name, duration_seconds = elapsed, "Collector succeeded")
                }
                Err(e) => error!(
                    collector = name,
                    duration_seconds = elapsed,
                    error = %e,
                    "Collector failed"
                ),
            }

            outcomes.push((name, elapsed, result.is_ok()));
        }

        for (name, elapsed, ok) in outcomes {
            self.emit(&mut samples, &self.duration, name, elapsed);
            self.emit(&mut samples, &self.success, name, if ok { 1.0 } else { 0.0 });
        }

        samples
    }

    /// Release every collector's resources.
    pub fn shutdown(&self) {
        for collector in &self.collectors {
            collector.shutdown();
            info!(collector = collector.name(), "Collector shut down");
        }
    }

    fn emit(&self, sink: &mut dyn MetricSink, desc: &Arc<MetricDesc>, collector: &str, value: f64) {
        match Sample::new(Arc::clone(desc), vec![collector.to_string()], value) {
            Ok(sample) => sink.emit(sample),
            Err(e) => error!(error = %e, "Dropping malformed scrape sample"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpusight_collector::BackendError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstCollector {
        name: &'static str,
        fail: bool,
        shutdowns: AtomicUsize,
    }

    impl ConstCollector {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                shutdowns: AtomicUsize::new(0),
            })
        }
    }

    impl Collector for ConstCollector {
        fn name(&self) -> &'static str {
            self.name
        }

        fn update(&self, sink: &mut dyn MetricSink) -> gpusight_collector::Result<()> {
            let desc = MetricDesc::new(
                format!("node_{}_value", self.name),
                "A constant",
                MetricType::Gauge,
                &[],
            )?;
            sink.emit(Sample::new(Arc::new(desc), Vec::new(), 7.0)?);

            if self.fail {
                return Err(BackendError::Shutdown("const").into());
            }
            Ok(())
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn find<'a>(samples: &'a [Sample], name: &str, collector: &str) -> Option<&'a Sample> {
        samples
            .iter()
            .find(|s| s.desc().fq_name() == name && s.label("collector") == Some(collector))
    }

    #[test]
    fn test_scrape_success_and_failure() {
        let scraper = Scraper::new(
            "node",
            vec![ConstCollector::new("good", false), ConstCollector::new("bad", true)],
        )
        .unwrap();

        let samples = scraper.scrape();

        // Both collectors' own samples survive, including the failing one's.
        assert!(samples.iter().any(|s| s.desc().fq_name() == "node_good_value"));
        assert!(samples.iter().any(|s| s.desc().fq_name() == "node_bad_value"));

        let good = find(&samples, "node_scrape_collector_success", "good").unwrap();
        let bad = find(&samples, "node_scrape_collector_success", "bad").unwrap();
        assert_eq!(good.value(), 1.0);
        assert_eq!(bad.value(), 0.0);

        let duration = find(&samples, "node_scrape_collector_duration_seconds", "bad").unwrap();
        assert!(duration.value() >= 0.0);
    }

    #[test]
    fn test_scrape_no_collectors() {
        let scraper = Scraper::new("node", Vec::new()).unwrap();
        assert!(scraper.scrape().is_empty());
        assert!(scraper.collector_names().is_empty());
    }

    #[test]
    fn test_shutdown_reaches_every_collector() {
        let a = ConstCollector::new("a", false);
        let b = ConstCollector::new("b", true);
        let scraper = Scraper::new("node", vec![a.clone(), b.clone()]).unwrap();

        scraper.shutdown();

        assert_eq!(a.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(b.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(scraper.collector_names(), vec!["a", "b"]);
    }
}
