use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::scheduler::IndexingReport;
use crate::segment::IndexStats;

/// Prometheus metrics for indexing and search
#[derive(Clone)]
pub struct SourcedexMetrics {
    // Counters
    pub files_indexed: CounterVec,
    pub file_warnings: Counter,
    pub indexing_runs: CounterVec,
    pub compactions: Counter,
    pub searches_total: CounterVec,
    pub search_errors: Counter,
    pub partial_results: CounterVec,

    // Gauges
    pub generation: GaugeVec,
    pub live_documents: GaugeVec,
    pub index_size_bytes: GaugeVec,

    // Histograms
    pub indexing_duration: Histogram,
    pub search_latency: HistogramVec,

    registry: Arc<Registry>,
}

impl SourcedexMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Counters
        let files_indexed = CounterVec::new(
            Opts::new("sourcedex_files_indexed_total", "Files indexed by change kind"),
            &["change"],
        )?;
        registry.register(Box::new(files_indexed.clone()))?;

        let file_warnings = Counter::with_opts(Opts::new(
            "sourcedex_file_warnings_total",
            "Files indexed with a warning (fallback tokenization, unreadable content)",
        ))?;
        registry.register(Box::new(file_warnings.clone()))?;

        let indexing_runs = CounterVec::new(
            Opts::new("sourcedex_indexing_runs_total", "Indexing runs by final state"),
            &["state"],
        )?;
        registry.register(Box::new(indexing_runs.clone()))?;

        let compactions = Counter::with_opts(Opts::new(
            "sourcedex_compactions_total",
            "Completed segment compactions",
        ))?;
        registry.register(Box::new(compactions.clone()))?;

        let searches_total = CounterVec::new(
            Opts::new("sourcedex_searches_total", "Queries by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(searches_total.clone()))?;

        let search_errors = Counter::with_opts(Opts::new(
            "sourcedex_search_errors_total",
            "Queries rejected or failed",
        ))?;
        registry.register(Box::new(search_errors.clone()))?;

        let partial_results = CounterVec::new(
            Opts::new(
                "sourcedex_partial_results_total",
                "Queries answered with partial results after a timeout or cancellation",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(partial_results.clone()))?;

        // Gauges
        let generation = GaugeVec::new(
            Opts::new("sourcedex_generation", "Published index generation per project"),
            &["project"],
        )?;
        registry.register(Box::new(generation.clone()))?;

        let live_documents = GaugeVec::new(
            Opts::new("sourcedex_live_documents", "Live documents per project"),
            &["project"],
        )?;
        registry.register(Box::new(live_documents.clone()))?;

        let index_size_bytes = GaugeVec::new(
            Opts::new("sourcedex_index_size_bytes", "Segment bytes per project"),
            &["project"],
        )?;
        registry.register(Box::new(index_size_bytes.clone()))?;

        // Histograms
        let indexing_duration = Histogram::with_opts(
            HistogramOpts::new("sourcedex_indexing_duration_seconds", "Indexing run duration")
                .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 1800.0]),
        )?;
        registry.register(Box::new(indexing_duration.clone()))?;

        let search_latency = HistogramVec::new(
            HistogramOpts::new("sourcedex_search_latency_seconds", "Query latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["kind"],
        )?;
        registry.register(Box::new(search_latency.clone()))?;

        Ok(Self {
            files_indexed,
            file_warnings,
            indexing_runs,
            compactions,
            searches_total,
            search_errors,
            partial_results,
            generation,
            live_documents,
            index_size_bytes,
            indexing_duration,
            search_latency,
            registry: Arc::new(registry),
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Record the outcome of an indexing run
    pub fn record_run(&self, report: &IndexingReport) {
        self.indexing_runs
            .with_label_values(&[report.state.as_str()])
            .inc();
        self.files_indexed
            .with_label_values(&["added"])
            .inc_by(report.added as f64);
        self.files_indexed
            .with_label_values(&["modified"])
            .inc_by(report.modified as f64);
        self.files_indexed
            .with_label_values(&["deleted"])
            .inc_by(report.deleted as f64);
        self.file_warnings.inc_by(report.warnings.len() as f64);
        self.indexing_duration
            .observe(report.duration_ms as f64 / 1000.0);
    }

    pub fn record_compaction(&self) {
        self.compactions.inc();
    }

    /// Record a query of `kind` ("search" or "suggest")
    pub fn record_search(&self, kind: &str, duration_secs: f64, partial: bool) {
        self.searches_total.with_label_values(&[kind]).inc();
        self.search_latency
            .with_label_values(&[kind])
            .observe(duration_secs);
        if partial {
            self.partial_results.with_label_values(&[kind]).inc();
        }
    }

    pub fn record_search_error(&self) {
        self.search_errors.inc();
    }

    pub fn set_index_stats(&self, project: &str, stats: &IndexStats) {
        self.generation
            .with_label_values(&[project])
            .set(stats.generation as f64);
        self.live_documents
            .with_label_values(&[project])
            .set(stats.live_doc_count as f64);
        self.index_size_bytes
            .with_label_values(&[project])
            .set(stats.size_bytes as f64);
    }

    /// Prometheus text exposition of every metric
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
