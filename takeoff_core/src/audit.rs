//! # Calculation Audit Trail
//!
//! Every engine invocation, successful or not, produces exactly one
//! [`AuditRecord`]. Records are append-only: recorders number them with a
//! monotonically increasing sequence and never update or delete them.
//!
//! Two recorders are provided:
//!
//! - [`AuditLog`]: in memory, optionally forwarding each record to
//!   [`AuditSink`]s such as [`TracingSink`]
//! - [`JsonlAuditLog`]: one JSON record per line in a file, appended under
//!   an exclusive OS lock
//!
//! ## Example
//!
//! ```rust
//! use takeoff_core::audit::{AuditLog, AuditRecorder};
//!
//! let log = AuditLog::new();
//! assert_eq!(log.records().unwrap().len(), 0);
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Parameters;
use crate::errors::{CalcError, CalcResult, ErrorKind};
use crate::trace::CalculationStep;
use crate::units::Unit;

// ============================================================================
// Records
// ============================================================================

/// Who asked for a calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    System,
    User { id: String },
    Ai { model: String },
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Actor::User { id: id.into() }
    }

    pub fn ai(model: impl Into<String>) -> Self {
        Actor::Ai { model: model.into() }
    }
}

impl Default for Actor {
    fn default() -> Self {
        Actor::System
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::System => write!(f, "system"),
            Actor::User { id } => write!(f, "user:{}", id),
            Actor::Ai { model } => write!(f, "ai:{}", model),
        }
    }
}

/// Parses `system`, `user:<id>` or `ai:<model>`.
impl FromStr for Actor {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("system") {
            return Ok(Actor::System);
        }
        match s.split_once(':') {
            Some((kind, rest)) if !rest.is_empty() && kind.eq_ignore_ascii_case("user") => Ok(Actor::user(rest)),
            Some((kind, rest)) if !rest.is_empty() && kind.eq_ignore_ascii_case("ai") => Ok(Actor::ai(rest)),
            _ => Err(CalcError::invalid_parameter(
                "actor",
                s,
                "expected 'system', 'user:<id>' or 'ai:<model>'",
            )),
        }
    }
}

/// Sequence number assigned by a recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditRecordId(pub u64);

impl std::fmt::Display for AuditRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
}

/// What an invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success {
        quantity_id: Uuid,
        raw_result: f64,
        value: f64,
        unit: Unit,
    },
    Failure {
        kind: ErrorKind,
        message: String,
        error: CalcError,
    },
}

impl AuditOutcome {
    pub fn failure(error: &CalcError) -> Self {
        AuditOutcome::Failure {
            kind: error.kind(),
            message: error.to_string(),
            error: error.clone(),
        }
    }

    pub fn status(&self) -> AuditStatus {
        match self {
            AuditOutcome::Success { .. } => AuditStatus::Success,
            AuditOutcome::Failure { .. } => AuditStatus::Failure,
        }
    }
}

/// Immutable record of one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Zero until a recorder assigns it
    #[serde(default)]
    pub sequence: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembly_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembly_code: Option<String>,

    /// Formula as attempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    /// Parameters as attempted
    #[serde(default)]
    pub parameters: Parameters,

    #[serde(default)]
    pub steps: Vec<CalculationStep>,

    pub outcome: AuditOutcome,

    pub actor: Actor,

    pub started_at: DateTime<Utc>,

    pub duration_us: u64,

    pub engine_version: String,
}

impl AuditRecord {
    pub fn status(&self) -> AuditStatus {
        self.outcome.status()
    }

    pub fn is_success(&self) -> bool {
        self.status() == AuditStatus::Success
    }

    pub fn error(&self) -> Option<&CalcError> {
        match &self.outcome {
            AuditOutcome::Failure { error, .. } => Some(error),
            AuditOutcome::Success { .. } => None,
        }
    }
}

impl std::fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} {} {}",
            self.sequence,
            self.started_at.to_rfc3339(),
            self.actor,
            self.assembly_code.as_deref().unwrap_or("-")
        )?;
        match &self.outcome {
            AuditOutcome::Success { value, unit, .. } => write!(f, " ok {} {}", value, unit),
            AuditOutcome::Failure { kind, message, .. } => write!(f, " {}: {}", kind, message),
        }
    }
}

// ============================================================================
// Recorders
// ============================================================================

/// Append-only store of audit records.
pub trait AuditRecorder: Send + Sync {
    /// Append `record`, assigning the next sequence number.
    fn record(&self, record: AuditRecord) -> CalcResult<AuditRecordId>;

    /// Every record, in sequence order.
    fn records(&self) -> CalcResult<Vec<AuditRecord>>;

    fn for_element(&self, element_id: &Uuid) -> CalcResult<Vec<AuditRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.element_id.as_ref() == Some(element_id))
            .collect())
    }

    fn by_status(&self, status: AuditStatus) -> CalcResult<Vec<AuditRecord>> {
        Ok(self.records()?.into_iter().filter(|r| r.status() == status).collect())
    }
}

/// Where an [`AuditLog`] forwards records after storing them.
pub trait AuditSink: Send + Sync {
    fn forward(&self, record: &AuditRecord);
}

/// Emits each record as a structured `tracing` event.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn forward(&self, record: &AuditRecord) {
        match &record.outcome {
            AuditOutcome::Success { value, unit, .. } => tracing::info!(
                sequence = record.sequence,
                actor = %record.actor,
                element = ?record.element_id,
                assembly = ?record.assembly_code,
                value = *value,
                unit = %unit,
                duration_us = record.duration_us,
                "AUDIT"
            ),
            AuditOutcome::Failure { kind, message, .. } => tracing::info!(
                sequence = record.sequence,
                actor = %record.actor,
                element = ?record.element_id,
                assembly = ?record.assembly_code,
                error_kind = %kind,
                error = %message,
                duration_us = record.duration_us,
                "AUDIT"
            ),
        }
    }
}

/// In-memory audit recorder.
pub struct AuditLog {
    records: Mutex<Vec<AuditRecord>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("record_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            sinks,
        }
    }

    /// Resume a log from previously saved records. Sequence numbering continues after the last one.
    pub fn from_records(records: Vec<AuditRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            sinks: Vec::new(),
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    pub fn count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn lock(&self) -> CalcResult<std::sync::MutexGuard<'_, Vec<AuditRecord>>> {
        self.records
            .lock()
            .map_err(|_| CalcError::internal("audit log mutex poisoned"))
    }
}

impl AuditRecorder for AuditLog {
    fn record(&self, mut record: AuditRecord) -> CalcResult<AuditRecordId> {
        {
            let mut records = self.lock()?;
            record.sequence = records.last().map_or(1, |r| r.sequence + 1);
            records.push(record.clone());
        }
        for sink in &self.sinks {
            sink.forward(&record);
        }
        Ok(AuditRecordId(record.sequence))
    }

    fn records(&self) -> CalcResult<Vec<AuditRecord>> {
        Ok(self.lock()?.clone())
    }
}

/// Bytes read per step when scanning back for the last record
const TAIL_CHUNK: u64 = 4096;

/// File-backed recorder writing JSON Lines.
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    /// Use `path`, creating the file on first write.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_error(&self, operation: &str, e: std::io::Error) -> CalcError {
        CalcError::file_error(operation, self.path.display().to_string(), e.to_string())
    }

    fn read_all(&self, file: &File) -> CalcResult<Vec<AuditRecord>> {
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.file_error("read audit log", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: AuditRecord = serde_json::from_str(&line).map_err(|e| {
                CalcError::serialization(format!("{} line {}: {}", self.path.display(), index + 1, e))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Sequence number of the last record, reading backwards from the end of the file.
    fn last_sequence(&self, file: &mut File) -> CalcResult<u64> {
        let seek_error = |e| self.file_error("seek audit log", e);
        let mut start = file.seek(SeekFrom::End(0)).map_err(seek_error)?;
        let mut tail: Vec<u8> = Vec::new();
        loop {
            if let Some(end) = tail.iter().rposition(|b| !b.is_ascii_whitespace()) {
                if let Some(newline) = tail[..end].iter().rposition(|&b| b == b'\n') {
                    return self.parse_sequence(&tail[newline + 1..=end]);
                }
                if start == 0 {
                    return self.parse_sequence(&tail[..=end]);
                }
            } else if start == 0 {
                return Ok(0);
            }

            let step = TAIL_CHUNK.min(start);
            start -= step;
            file.seek(SeekFrom::Start(start)).map_err(seek_error)?;
            let mut chunk = vec![0; step as usize];
            file.read_exact(&mut chunk)
                .map_err(|e| self.file_error("read audit log", e))?;
            chunk.extend_from_slice(&tail);
            tail = chunk;
        }
    }

    fn parse_sequence(&self, line: &[u8]) -> CalcResult<u64> {
        #[derive(Deserialize)]
        struct Sequence {
            sequence: u64,
        }
        let parsed: Sequence = serde_json::from_slice(line).map_err(|e| {
            CalcError::serialization(format!("{} last line: {}", self.path.display(), e))
        })?;
        Ok(parsed.sequence)
    }
}

impl AuditRecorder for JsonlAuditLog {
    fn record(&self, mut record: AuditRecord) -> CalcResult<AuditRecordId> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.file_error("open audit log", e))?;

        FileExt::lock_exclusive(&file).map_err(|e| self.file_error("lock audit log", e))?;

        let result = (|| -> CalcResult<AuditRecordId> {
            record.sequence = self.last_sequence(&mut file)? + 1;
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            file.write_all(line.as_bytes())
                .map_err(|e| self.file_error("append audit log", e))?;
            file.sync_data()
                .map_err(|e| self.file_error("sync audit log", e))?;
            Ok(AuditRecordId(record.sequence))
        })();

        let _ = FileExt::unlock(&file);
        result
    }

    fn records(&self) -> CalcResult<Vec<AuditRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.file_error("open audit log", e)),
        };
        FileExt::lock_shared(&file).map_err(|e| self.file_error("lock audit log", e))?;
        let result = self.read_all(&file);
        let _ = FileExt::unlock(&file);
        result
    }
}
