//! Payload processing pipeline
//!
//! Shared by both acquisition modes: parse the payload, pick the target
//! database, hand the record to the sink. Every failure is recovered here —
//! an incomplete record or a lost write never propagates into the
//! acquisition loops.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::persist::MeasurementSink;
use crate::record;
use crate::route::target_database;

/// Parse-route-persist glue around a sink.
#[derive(Clone)]
pub struct Pipeline {
    sink: Arc<dyn MeasurementSink>,
}

impl Pipeline {
    pub fn new(sink: Arc<dyn MeasurementSink>) -> Self {
        Self { sink }
    }

    /// Process one payload from the given source (peer address or file path).
    ///
    /// Infallible by design: incomplete records are dropped, persistence
    /// failures lose that single record, and acquisition continues either way.
    pub async fn process(&self, payload: &str, source: &str) {
        debug!(source, bytes = payload.len(), "Processing payload");

        let record = match record::parse_payload(payload) {
            Ok(record) => record,
            Err(reason) => {
                warn!(source, %reason, "Discarding incomplete record");
                return;
            },
        };

        let target = target_database(record.classification);
        if let Err(e) = self.sink.persist(target, &record).await {
            error!(
                source,
                order_no = %record.order_no,
                target_db = target,
                error = %e,
                "Failed to store measurement, record lost"
            );
        }
    }
}
