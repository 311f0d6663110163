//! Process-wide metrics and tracing span helpers.
//!
//! With the `metrics` feature, [`METRICS`] holds OpenTelemetry instruments
//! exported into a Prometheus registry; [`render_metrics`] produces the text
//! exposition. With the `tracing` feature, [`tracing_helpers`] builds the
//! spans used around queries, transactions and domain operations.

#[cfg(feature = "metrics")]
pub use exported::{render_metrics, CaregateMetrics, METRICS};

#[cfg(feature = "metrics")]
mod exported {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<CaregateMetrics> = Lazy::new(CaregateMetrics::init);

    pub struct CaregateMetrics {
        registry: Registry,
        _provider: SdkMeterProvider,
        pub query_duration: Histogram<f64>,
        pub query_errors: Counter<u64>,
        pub appointments_booked: Counter<u64>,
        pub booking_conflicts: Counter<u64>,
        pub status_transitions: Counter<u64>,
        pub emergency_admissions: Counter<u64>,
        pub discharges: Counter<u64>,
    }

    impl CaregateMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
                Err(e) => {
                    log::warn!("prometheus exporter unavailable, metrics will not be exported: {e}");
                    SdkMeterProvider::builder().build()
                }
            };
            let meter = provider.meter("caregate");

            Self {
                query_duration: meter
                    .f64_histogram("caregate_query_duration_seconds")
                    .with_description("Duration of database queries")
                    .build(),
                query_errors: meter
                    .u64_counter("caregate_query_errors_total")
                    .with_description("Database queries that returned an error")
                    .build(),
                appointments_booked: meter
                    .u64_counter("caregate_appointments_booked_total")
                    .with_description("Appointments created by patients")
                    .build(),
                booking_conflicts: meter
                    .u64_counter("caregate_booking_conflicts_total")
                    .with_description("Bookings rejected because the slot was taken")
                    .build(),
                status_transitions: meter
                    .u64_counter("caregate_status_transitions_total")
                    .with_description("Appointment status transitions by target status")
                    .build(),
                emergency_admissions: meter
                    .u64_counter("caregate_emergency_admissions_total")
                    .with_description("Emergency bookings that admitted a patient")
                    .build(),
                discharges: meter
                    .u64_counter("caregate_discharges_total")
                    .with_description("Admissions closed by discharge or cancellation")
                    .build(),
                registry,
                _provider: provider,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors.add(1, &[]);
        }

        pub fn record_booking(&self) {
            self.appointments_booked.add(1, &[]);
        }

        pub fn record_booking_conflict(&self) {
            self.booking_conflicts.add(1, &[]);
        }

        pub fn record_transition(&self, to: &'static str) {
            self.status_transitions
                .add(1, &[KeyValue::new("status", to)]);
        }

        pub fn record_emergency_admission(&self) {
            self.emergency_admissions.add(1, &[]);
        }

        pub fn record_discharge(&self) {
            self.discharges.add(1, &[]);
        }

        fn render(&self) -> String {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("failed to encode metrics: {e}");
            }
            String::from_utf8(buffer).unwrap_or_default()
        }
    }

    /// Prometheus text exposition of every caregate instrument.
    pub fn render_metrics() -> String {
        METRICS.render()
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    const MAX_STATEMENT_LEN: usize = 120;

    pub fn execute_query_span(query: &str) -> Span {
        let statement = query.trim();
        let statement = match statement.char_indices().nth(MAX_STATEMENT_LEN) {
            Some((idx, _)) => &statement[..idx],
            None => statement,
        };
        info_span!("caregate.query", db.statement = %statement)
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("caregate.connect")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("caregate.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("caregate.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("caregate.transaction.rollback")
    }

    /// Span around a domain operation such as `book_appointment`.
    pub fn operation_span(operation: &'static str) -> Span {
        info_span!("caregate.operation", operation)
    }
}
