use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use rusqlite_migration::{Migrations, M};
use tracing::{debug, warn};

use crate::app::{MurmurError, Result};
use crate::domain::{Pattern, SelectorSpec};
use crate::store::PatternBackend;

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open the database at `path`, quarantining it first if it is corrupt
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        match Self::open(path) {
            Err(MurmurError::Database(ref e)) if is_corruption(e) => {
                let quarantine = quarantine_path(path);
                warn!(
                    "Pattern database {} is corrupt ({}), moving it to {}",
                    path.display(),
                    e,
                    quarantine.display()
                );
                std::fs::rename(path, &quarantine)?;
                Self::open(path)
            }
            other => other,
        }
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.run_migrations()?;
        Ok(backend)
    }

    fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        // Opening is lazy; touch the header so a garbage file fails here
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))?;
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.run_migrations()?;
        Ok(backend)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;
        migrations.to_latest(&mut conn)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            MurmurError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }
}

fn is_corruption(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
    )
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

struct PatternRow {
    id: String,
    site_shape_id: String,
    selector_spec: String,
    confidence: f64,
    success_count: u32,
    failure_count: u32,
    created_at: String,
    last_used_at: String,
}

impl PatternRow {
    fn decode(self) -> Result<Pattern> {
        let selector_spec: SelectorSpec = serde_json::from_str(&self.selector_spec).map_err(|e| {
            MurmurError::CorruptPatternStore(format!("pattern {}: bad selector spec: {}", self.id, e))
        })?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(MurmurError::CorruptPatternStore(format!(
                "pattern {}: confidence {} out of range",
                self.id, self.confidence
            )));
        }
        let created_at = SqliteBackend::parse_datetime(&self.created_at).ok_or_else(|| {
            MurmurError::CorruptPatternStore(format!("pattern {}: bad created_at", self.id))
        })?;
        let last_used_at = SqliteBackend::parse_datetime(&self.last_used_at).ok_or_else(|| {
            MurmurError::CorruptPatternStore(format!("pattern {}: bad last_used_at", self.id))
        })?;

        Ok(Pattern {
            id: self.id,
            site_shape_id: self.site_shape_id,
            selector_spec,
            confidence: self.confidence,
            success_count: self.success_count,
            failure_count: self.failure_count,
            created_at,
            last_used_at,
        })
    }
}

impl PatternBackend for SqliteBackend {
    fn load_all(&self) -> Result<Vec<Pattern>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, site_shape_id, selector_spec, confidence, success_count, failure_count,
                    created_at, last_used_at
             FROM patterns ORDER BY site_shape_id, confidence DESC, last_used_at DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(PatternRow {
                    id: row.get(0)?,
                    site_shape_id: row.get(1)?,
                    selector_spec: row.get(2)?,
                    confidence: row.get(3)?,
                    success_count: row.get(4)?,
                    failure_count: row.get(5)?,
                    created_at: row.get(6)?,
                    last_used_at: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MurmurError::CorruptPatternStore(e.to_string()))?;

        let patterns = rows
            .into_iter()
            .map(PatternRow::decode)
            .collect::<Result<Vec<_>>>()?;

        debug!("Loaded {} patterns from database", patterns.len());
        Ok(patterns)
    }

    fn save_all(&self, patterns: &[Pattern]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM patterns", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO patterns (id, site_shape_id, selector_spec, confidence,
                                       success_count, failure_count, created_at, last_used_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for pattern in patterns {
                stmt.execute(params![
                    pattern.id,
                    pattern.site_shape_id,
                    serde_json::to_string(&pattern.selector_spec)?,
                    pattern.confidence,
                    pattern.success_count,
                    pattern.failure_count,
                    pattern.created_at.to_rfc3339(),
                    pattern.last_used_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        debug!("Saved {} patterns to database", patterns.len());
        Ok(())
    }
}
