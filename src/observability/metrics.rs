//! Metrics collection.
//!
//! # Metrics
//! - `document_synthesized_total` (counter): synthesized documents by status
//! - `document_adopted_total` (counter): candidates adopted through coercion
//! - `document_rejected_total` (counter): failed constructions by reason
//! - `body_events_total` (counter): delivered body events by kind
//!
//! # Design Decisions
//! - No exporter is installed here; the embedding process owns the recorder
//! - Without a recorder every update is a no-op

use hyper::StatusCode;
use metrics::counter;

use crate::stream::EventKind;

pub fn record_synthesized(status: StatusCode) {
    counter!("document_synthesized_total", "status" => status.as_u16().to_string()).increment(1);
}

pub fn record_adopted() {
    counter!("document_adopted_total").increment(1);
}

/// `reason` is `"coercion"` or `"invalid_body"`.
pub fn record_rejected(reason: &'static str) {
    counter!("document_rejected_total", "reason" => reason).increment(1);
}

pub fn record_body_event(kind: EventKind) {
    counter!("body_events_total", "kind" => kind.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Headers};
    use crate::stream::ReadableBody;
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    /// Keeps every counter in memory, keyed as `name{label=value,...}`.
    #[derive(Default)]
    struct CountingRecorder {
        counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
    }

    impl CountingRecorder {
        fn value(&self, key: &str) -> u64 {
            self.counters
                .lock()
                .unwrap()
                .get(key)
                .map_or(0, |c| c.load(Ordering::SeqCst))
        }
    }

    impl Recorder for CountingRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            let labels: Vec<String> = key
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect();
            let name = if labels.is_empty() {
                key.name().to_string()
            } else {
                format!("{}{{{}}}", key.name(), labels.join(","))
            };
            let cell = self.counters.lock().unwrap().entry(name).or_default().clone();
            Counter::from_arc(cell)
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_document_counters() {
        let recorder = CountingRecorder::default();

        metrics::with_local_recorder(&recorder, || {
            let (sender, body) = ReadableBody::channel();
            let doc = Document::synthesize(StatusCode::OK, Headers::new(), body).unwrap();
            let _adopted = Document::coerce(doc).unwrap();

            let _ = Document::coerce(Headers::new());

            let (dead, body) = ReadableBody::channel();
            dead.abort();
            let _ = Document::synthesize(StatusCode::OK, Headers::new(), body);

            let (live, body) = ReadableBody::channel();
            live.send("chunk").unwrap();
            live.finish();
            body.resume();
            drop(sender);
        });

        assert_eq!(recorder.value("document_synthesized_total{status=200}"), 1);
        assert_eq!(recorder.value("document_adopted_total"), 1);
        assert_eq!(recorder.value("document_rejected_total{reason=coercion}"), 1);
        assert_eq!(recorder.value("document_rejected_total{reason=invalid_body}"), 1);
        assert_eq!(recorder.value("body_events_total{kind=data}"), 1);
        assert_eq!(recorder.value("body_events_total{kind=end}"), 1);
        assert_eq!(recorder.value("body_events_total{kind=aborted}"), 2);
    }
}
