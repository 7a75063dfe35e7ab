//! Outbound buffer for Salesforce data events.
//!
//! Rows accumulate until their serialized size reaches the payload limit,
//! then go out as one rowset. The buffer is cleared only after the delivery
//! port confirms the batch; a failed flush leaves it exactly as it was.

use crate::app::ports::DeliveryPort;
use crate::common::constants::PAYLOAD_LIMIT_IN_BYTES;
use crate::common::error::{IntegratorError, Result};
use crate::common::types::User;
use crate::pipeline::table::Table;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One entry of a data-event rowset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataEventRow {
    pub keys: Map<String, Value>,
    pub values: Map<String, Value>,
}

impl DataEventRow {
    /// Row `row` of an export table, keyed by `key_column`.
    pub fn from_table_row(table: &Table, row: usize, key_column: &str) -> Result<Self> {
        let mut values = table.row_object(row).ok_or_else(|| {
            IntegratorError::MissingField(format!("export row {row} does not exist"))
        })?;
        let key = values
            .remove(key_column)
            .ok_or_else(|| {
                IntegratorError::MissingField(format!("export has no key column '{key_column}'"))
            })?;
        if key.is_null() || key.as_str().is_some_and(|s| s.trim().is_empty()) {
            return Err(IntegratorError::MissingField(format!(
                "export row {row} has an empty '{key_column}'"
            )));
        }

        let mut keys = Map::new();
        keys.insert(key_column.to_string(), key);
        Ok(Self { keys, values })
    }
}

impl From<&User> for DataEventRow {
    fn from(user: &User) -> Self {
        let mut keys = Map::new();
        keys.insert("user_id".to_string(), json!(user.id));

        // data extensions only hold scalars, so nested records travel as JSON text
        let courses = serde_json::to_string(&user.courses).unwrap_or_else(|_| "[]".to_string());
        let values = json!({
            "name": user.name,
            "cpf": user.cpf,
            "email": user.email,
            "points": user.points,
            "user_type": user.user_type.map(|t| t.to_string()),
            "branch": user.tenancy.is_branch(),
            "trails": user.trails.join("; "),
            "courses": courses,
        });
        let values = match values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { keys, values }
    }
}

pub struct BatchSender {
    delivery: Arc<dyn DeliveryPort>,
    buffer: Vec<DataEventRow>,
    size: usize,
    limit: usize,
}

impl BatchSender {
    pub fn new(delivery: Arc<dyn DeliveryPort>) -> Self {
        Self::with_limit(delivery, PAYLOAD_LIMIT_IN_BYTES)
    }

    pub fn with_limit(delivery: Arc<dyn DeliveryPort>, limit: usize) -> Self {
        Self {
            delivery,
            buffer: Vec::new(),
            size: 0,
            limit,
        }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Queue a row. Its size is the length of its JSON serialization.
    pub fn append(&mut self, row: DataEventRow) -> Result<()> {
        let bytes = serde_json::to_vec(&row)?.len();
        self.size += bytes;
        self.buffer.push(row);
        crate::observability::metrics::sender::record_appended();
        debug!(bytes, buffered = self.size, limit = self.limit, "Row appended to send buffer");
        Ok(())
    }

    pub fn ready_to_send(&self) -> bool {
        self.size >= self.limit
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size
    }

    /// Deliver the buffered rows as one rowset and return how many were sent.
    ///
    /// An empty buffer is a no-op returning 0. On error nothing is cleared.
    #[instrument(skip(self), fields(rows = self.buffer.len(), bytes = self.size))]
    pub async fn flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            info!("Send buffer empty, nothing to flush");
            return Ok(0);
        }

        let started = Instant::now();
        let payload = serde_json::to_value(&self.buffer)?;
        if let Err(e) = self.delivery.deliver(&payload).await {
            crate::observability::metrics::sender::delivery_failed();
            warn!("Batch delivery failed, keeping {} buffered rows: {}", self.buffer.len(), e);
            return Err(e);
        }

        let rows = self.buffer.len();
        crate::observability::metrics::sender::batch_delivered(self.size);
        self.buffer.clear();
        self.size = 0;
        info!(rows, secs = started.elapsed().as_secs_f64(), "Batch delivered");
        Ok(rows)
    }
}
