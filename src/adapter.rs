//! Policy store adapters.
//!
//! An adapter hands the coordinator a batch of `(section, ptype, values)`
//! rows at load time and accepts the full rule set back on save. The
//! database-backed adapter lives outside this crate; the two here cover
//! seeded in-memory rule sets and the classic CSV policy file.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// One stored rule. `section` is `"p"` for policy rules and `"g"` for
/// role-assignment rules; `ptype` is the model key (`"p"`, `"g"`, `"g2"`, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRow {
    pub section: String,
    pub ptype: String,
    pub values: Vec<String>,
}

impl PolicyRow {
    /// Build a row from its ptype; the section is the ptype's leading
    /// letter (`"g2"` → `"g"`).
    pub fn new(ptype: impl Into<String>, values: Vec<String>) -> Self {
        let ptype = ptype.into();
        let section = ptype.chars().take(1).collect();
        Self { section, ptype, values }
    }
}

pub trait Adapter: Send + Sync {
    /// Batched load of every stored rule.
    fn load_policy(&self) -> Result<Vec<PolicyRow>, EngineError>;

    /// Persist the full rule set, replacing previous contents.
    fn save_policy(&self, rows: &[PolicyRow]) -> Result<(), EngineError>;
}

/// Adapter over a seeded in-memory row list. Used in tests and by hosts
/// that manage persistence themselves.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    rows: Mutex<Vec<PolicyRow>>,
}

impl MemoryAdapter {
    pub fn new(rows: Vec<PolicyRow>) -> Self {
        Self { rows: Mutex::new(rows) }
    }
}

impl Adapter for MemoryAdapter {
    fn load_policy(&self) -> Result<Vec<PolicyRow>, EngineError> {
        Ok(self.rows.lock().clone())
    }

    fn save_policy(&self, rows: &[PolicyRow]) -> Result<(), EngineError> {
        *self.rows.lock() = rows.to_vec();
        Ok(())
    }
}

/// Adapter over a CSV policy file:
///
/// ```text
/// p, alice, /data1, read
/// g, alice, admin
/// ```
///
/// Empty lines and `#` comments are skipped; a line without at least a
/// ptype and one value is skipped with a warning.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
}

impl FileAdapter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl Adapter for FileAdapter {
    fn load_policy(&self) -> Result<Vec<PolicyRow>, EngineError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            EngineError::Adapter(format!("cannot read `{}`: {e}", self.path.display()))
        })?;

        let mut rows = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split(',').map(|p| p.trim().to_string());
            let Some(ptype) = parts.next().filter(|p| !p.is_empty()) else {
                tracing::warn!(line = lineno + 1, "skipping policy line without a ptype");
                continue;
            };
            let values: Vec<String> = parts.collect();
            if values.is_empty() {
                tracing::warn!(line = lineno + 1, %ptype, "skipping policy line without values");
                continue;
            }
            rows.push(PolicyRow::new(ptype, values));
        }

        tracing::info!(path = %self.path.display(), rules = rows.len(), "Loaded policy file");
        Ok(rows)
    }

    fn save_policy(&self, rows: &[PolicyRow]) -> Result<(), EngineError> {
        let mut out = String::new();
        for row in rows {
            out.push_str(&row.ptype);
            for value in &row.values {
                out.push_str(", ");
                out.push_str(value);
            }
            out.push('\n');
        }
        std::fs::write(&self.path, out).map_err(|e| {
            EngineError::Adapter(format!("cannot write `{}`: {e}", self.path.display()))
        })
    }
}
