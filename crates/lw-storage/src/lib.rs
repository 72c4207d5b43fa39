use chrono::{DateTime, Utc};
use lw_core::lead::Lead;
use lw_core::tenant::Tier;
use lw_core::trace::{DeliveryStatus, TraceRecord};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const LEAD_LOG_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// Rollup over the lead log, averaged over delivered attempts only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeSummary {
    pub average_latency_ms: f64,
    pub delivered_count: u64,
}

/// Append-only durable record of every intake attempt plus the one mutable
/// claim flag. Each append and each flag update is a single SQLite statement,
/// so records stay atomic under concurrent callers.
pub struct LeadStore {
    conn: Connection,
}

impl LeadStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > LEAD_LOG_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: LEAD_LOG_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_lead_log.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    /// Appends one intake attempt. Records are never updated or deleted
    /// through this path; a duplicate trace id is a caller bug and surfaces
    /// as a constraint error.
    pub fn append(&self, record: &TraceRecord) -> Result<(), StorageError> {
        let lead_json = serde_json::to_string(&record.lead)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        self.conn.execute(
            "
            INSERT INTO lead_log (
                trace_id,
                client_id,
                client_name,
                client_tier,
                latency_ms,
                status,
                ts,
                lead_json,
                is_claimed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                record.trace_id,
                record.client_id,
                record.client_name,
                record.client_tier.map(|tier| tier.as_str()),
                record.latency_ms as i64,
                record.status.as_str(),
                record.timestamp.to_rfc3339(),
                lead_json,
                record.claimed as i64,
            ],
        )?;

        Ok(())
    }

    /// Marks a record claimed. Returns whether a record with the trace id
    /// exists; re-marking an already claimed record is a no-op that still
    /// reports true.
    pub fn set_claimed(&self, trace_id: &str) -> Result<bool, StorageError> {
        let changes = self.conn.execute(
            "UPDATE lead_log SET is_claimed = 1 WHERE trace_id = ?1",
            params![trace_id],
        )?;
        Ok(changes > 0)
    }

    /// Latest intake attempts, most recent first.
    pub fn recent(&self, limit: usize) -> Result<Vec<TraceRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT trace_id, client_id, client_name, client_tier,
                   latency_ms, status, ts, lead_json, is_claimed
            FROM lead_log
            ORDER BY ts DESC, rowid DESC
            LIMIT ?1
            ",
        )?;

        let rows = stmt.query_map(params![limit as i64], RawRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }

    /// Average latency across delivered attempts and the delivered count.
    /// Failed attempts keep their measured latency on record but do not pull
    /// the average.
    pub fn summary(&self) -> Result<IntakeSummary, StorageError> {
        let (delivered_count, average): (i64, Option<f64>) = self.conn.query_row(
            "SELECT COUNT(*), AVG(latency_ms) FROM lead_log WHERE status = 'DELIVERED'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(IntakeSummary {
            average_latency_ms: average.unwrap_or(0.0),
            delivered_count: delivered_count as u64,
        })
    }

    #[cfg(test)]
    fn table_exists(&self, name: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Column values exactly as stored, before domain decoding.
struct RawRow {
    trace_id: String,
    client_id: String,
    client_name: Option<String>,
    client_tier: Option<String>,
    latency_ms: i64,
    status: String,
    ts: String,
    lead_json: String,
    is_claimed: i64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            trace_id: row.get(0)?,
            client_id: row.get(1)?,
            client_name: row.get(2)?,
            client_tier: row.get(3)?,
            latency_ms: row.get(4)?,
            status: row.get(5)?,
            ts: row.get(6)?,
            lead_json: row.get(7)?,
            is_claimed: row.get(8)?,
        })
    }

    fn decode(self) -> Result<TraceRecord, StorageError> {
        let client_tier = self
            .client_tier
            .map(|tier| Tier::from_str(&tier).map_err(StorageError::Serialization))
            .transpose()?;
        let status =
            DeliveryStatus::from_str(&self.status).map_err(StorageError::Serialization)?;
        let timestamp = DateTime::parse_from_rfc3339(&self.ts)
            .map_err(|err| StorageError::Timestamp(err.to_string()))?
            .with_timezone(&Utc);
        let lead: Lead = serde_json::from_str(&self.lead_json)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        Ok(TraceRecord {
            trace_id: self.trace_id,
            client_id: self.client_id,
            client_name: self.client_name,
            client_tier,
            latency_ms: self.latency_ms as u64,
            status,
            timestamp,
            lead,
            claimed: self.is_claimed != 0,
        })
    }
}
