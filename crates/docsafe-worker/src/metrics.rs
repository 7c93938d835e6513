//! Scan metrics
//!
//! Plain atomic counters that are always available, mirrored to OpenTelemetry
//! instruments from the global meter when `observability-opentelemetry` is
//! enabled.

use docsafe_core::ScanVerdict;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[cfg(feature = "observability-opentelemetry")]
use opentelemetry::{
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanMetricsSnapshot {
    pub scanned: u64,
    pub clean: u64,
    pub infected: u64,
    pub error: u64,
    pub skipped: u64,
    pub duration_samples: u64,
    pub total_duration_ms: u64,
}

#[derive(Default)]
pub struct ScanMetrics {
    scanned: AtomicU64,
    clean: AtomicU64,
    infected: AtomicU64,
    error: AtomicU64,
    skipped: AtomicU64,
    duration_samples: AtomicU64,
    total_duration_ms: AtomicU64,
    #[cfg(feature = "observability-opentelemetry")]
    otel: Option<OtelScanMetrics>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters plus instruments created from `meter`.
    #[cfg(feature = "observability-opentelemetry")]
    pub fn with_meter(meter: Meter) -> Self {
        Self {
            otel: Some(OtelScanMetrics::new(meter)),
            ..Self::default()
        }
    }

    /// Record one scan attempt: `scanned`, a duration sample, and exactly one
    /// of `clean`, `infected` or `error`.
    pub fn record_scan(&self, verdict: &ScanVerdict, duration: Duration) {
        self.scanned.fetch_add(1, Ordering::Relaxed);
        let outcome = match verdict {
            ScanVerdict::Clean => &self.clean,
            ScanVerdict::Infected(_) => &self.infected,
            ScanVerdict::Error(_) => &self.error,
        };
        outcome.fetch_add(1, Ordering::Relaxed);
        self.duration_samples.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);

        #[cfg(feature = "observability-opentelemetry")]
        if let Some(ref otel) = self.otel {
            let attrs = [KeyValue::new("outcome", verdict.label())];
            otel.scan_counter.add(1, &attrs);
            otel.scan_duration.record(duration.as_secs_f64(), &attrs);
        }
    }

    /// A task dropped by the terminal-status guard without scanning.
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "observability-opentelemetry")]
        if let Some(ref otel) = self.otel {
            otel.skip_counter.add(1, &[]);
        }
    }

    pub fn snapshot(&self) -> ScanMetricsSnapshot {
        ScanMetricsSnapshot {
            scanned: self.scanned.load(Ordering::Relaxed),
            clean: self.clean.load(Ordering::Relaxed),
            infected: self.infected.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            duration_samples: self.duration_samples.load(Ordering::Relaxed),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Scan instruments
#[cfg(feature = "observability-opentelemetry")]
struct OtelScanMetrics {
    scan_counter: Counter<u64>,
    scan_duration: Histogram<f64>,
    skip_counter: Counter<u64>,
}

#[cfg(feature = "observability-opentelemetry")]
impl OtelScanMetrics {
    fn new(meter: Meter) -> Self {
        let scan_counter = meter
            .u64_counter("docsafe.scan.count")
            .with_description("Scan attempts by outcome")
            .build();

        let scan_duration = meter
            .f64_histogram("docsafe.scan.duration")
            .with_description("Scan duration in seconds")
            .with_unit("s")
            .build();

        let skip_counter = meter
            .u64_counter("docsafe.scan.skipped")
            .with_description("Tasks skipped because the document was already final")
            .build();

        Self {
            scan_counter,
            scan_duration,
            skip_counter,
        }
    }
}
