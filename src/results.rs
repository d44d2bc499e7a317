use chrono::{DateTime, Local, SecondsFormat};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::app_dirs::AppDirs;
use crate::error::StoreError;
use crate::score::ScoreResult;

pub type ResultId = i64;

/// Number of results shown on a user's dashboard
pub const DASHBOARD_LIMIT: usize = 50;

/// Who a result is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub username: String,
}

/// A persisted result row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub id: ResultId,
    pub user_id: i64,
    pub username: String,
    pub typed_text: String,
    pub created_at: DateTime<Local>,
    pub score: ScoreResult,
}

/// Cross-user aggregates for the examiner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_tests: usize,
    pub unique_users: usize,
    pub avg_wpm: f64,
    pub avg_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub tests: usize,
    pub avg_wpm: f64,
    pub avg_accuracy: f64,
}

/// A user's recent results with their averages
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub sessions: usize,
    pub average_wpm: f64,
    pub average_accuracy: f64,
    pub history: Vec<StoredResult>,
}

/// Accepts one result per finished session.
pub trait ResultSink {
    fn record(
        &mut self,
        user: &Identity,
        score: &ScoreResult,
        typed_text: &str,
    ) -> Result<ResultId, StoreError>;
}

/// Read paths over persisted results.
pub trait ResultReader {
    /// A single result, only if it belongs to `user`.
    fn get_result(
        &self,
        id: ResultId,
        user: &Identity,
    ) -> Result<Option<StoredResult>, StoreError>;
    /// Newest first
    fn history(&self, user: &Identity, limit: usize) -> Result<Vec<StoredResult>, StoreError>;
    /// Every user's results, newest first
    fn all_results(&self) -> Result<Vec<StoredResult>, StoreError>;
    fn summary(&self) -> Result<Summary, StoreError>;
    /// Ordered by number of tests, most first
    fn per_user_summary(&self) -> Result<Vec<UserSummary>, StoreError>;
}

pub fn dashboard<R: ResultReader + ?Sized>(
    reader: &R,
    user: &Identity,
) -> Result<Dashboard, StoreError> {
    let history = reader.history(user, DASHBOARD_LIMIT)?;
    let sessions = history.len();
    let (average_wpm, average_accuracy) = if sessions == 0 {
        (0.0, 0.0)
    } else {
        let n = sessions as f64;
        (
            history.iter().map(|r| r.score.wpm).sum::<f64>() / n,
            history
                .iter()
                .map(|r| r.score.accuracy_percent)
                .sum::<f64>()
                / n,
        )
    };

    Ok(Dashboard {
        sessions,
        average_wpm,
        average_accuracy,
        history,
    })
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    elapsed_seconds INTEGER NOT NULL,
    total_chars INTEGER NOT NULL,
    correct_chars INTEGER NOT NULL,
    incorrect_chars INTEGER NOT NULL,
    extra_chars INTEGER NOT NULL,
    missed_chars INTEGER NOT NULL,
    total_words INTEGER NOT NULL,
    correct_words INTEGER NOT NULL,
    wpm REAL NOT NULL,
    net_wpm REAL NOT NULL,
    accuracy REAL NOT NULL,
    consistency REAL NOT NULL,
    typos INTEGER NOT NULL,
    typed_text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_user ON results(user_id);
CREATE INDEX IF NOT EXISTS idx_results_created_at ON results(created_at);
"#;

const SELECT_RESULT: &str = r#"
SELECT r.id, r.user_id, u.username, r.typed_text, r.created_at,
       r.elapsed_seconds, r.total_chars, r.correct_chars, r.incorrect_chars,
       r.extra_chars, r.missed_chars, r.total_words, r.correct_words,
       r.wpm, r.net_wpm, r.accuracy, r.consistency, r.typos
FROM results r
JOIN users u ON r.user_id = u.id
"#;

/// SQLite-backed result store
#[derive(Debug)]
pub struct ResultsDb {
    conn: Connection,
}

impl ResultsDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open the database under the user's state directory.
    pub fn open_default() -> Result<Self, StoreError> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("typemark_results.db"));
        Self::open(path)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Look up a user by name, creating the row on first use.
    pub fn ensure_user(&self, username: &str) -> Result<Identity, StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO users (username) VALUES (?1)",
            [username],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )?;
        Ok(Identity {
            id,
            username: username.to_string(),
        })
    }

    pub fn find_user(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(|id| Identity {
            id,
            username: username.to_string(),
        }))
    }

    fn query_results<P: rusqlite::Params>(
        &self,
        tail: &str,
        params: P,
    ) -> Result<Vec<StoredResult>, StoreError> {
        let sql = format!("{SELECT_RESULT} {tail}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, read_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

fn count(row: &Row<'_>, idx: usize) -> rusqlite::Result<usize> {
    let value: i64 = row.get(idx)?;
    usize::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredResult> {
    let created_at: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Local);

    Ok(StoredResult {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        typed_text: row.get(3)?,
        created_at,
        score: ScoreResult {
            elapsed_seconds: count(row, 5)? as u64,
            total_chars: count(row, 6)?,
            correct_chars: count(row, 7)?,
            incorrect_chars: count(row, 8)?,
            extra_chars: count(row, 9)?,
            missed_chars: count(row, 10)?,
            total_words: count(row, 11)?,
            correct_words: count(row, 12)?,
            wpm: row.get(13)?,
            net_wpm: row.get(14)?,
            accuracy_percent: row.get(15)?,
            consistency_percent: row.get(16)?,
            typos: count(row, 17)?,
        },
    })
}

impl ResultSink for ResultsDb {
    fn record(
        &mut self,
        user: &Identity,
        score: &ScoreResult,
        typed_text: &str,
    ) -> Result<ResultId, StoreError> {
        let inserted = self.conn.execute(
            r#"
            INSERT INTO results
            (user_id, elapsed_seconds, total_chars, correct_chars, incorrect_chars,
             extra_chars, missed_chars, total_words, correct_words,
             wpm, net_wpm, accuracy, consistency, typos, typed_text, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                user.id,
                score.elapsed_seconds as i64,
                score.total_chars as i64,
                score.correct_chars as i64,
                score.incorrect_chars as i64,
                score.extra_chars as i64,
                score.missed_chars as i64,
                score.total_words as i64,
                score.correct_words as i64,
                score.wpm,
                score.net_wpm,
                score.accuracy_percent,
                score.consistency_percent,
                score.typos as i64,
                typed_text,
                Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            ],
        );

        match inserted {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                info!(result_id = id, user = %user.username, "result recorded");
                Ok(id)
            }
            Err(e) => {
                warn!(user = %user.username, error = %e, "failed to record result");
                Err(e.into())
            }
        }
    }
}

impl ResultReader for ResultsDb {
    fn get_result(
        &self,
        id: ResultId,
        user: &Identity,
    ) -> Result<Option<StoredResult>, StoreError> {
        Ok(self
            .query_results("WHERE r.id = ?1 AND r.user_id = ?2", params![id, user.id])?
            .into_iter()
            .next())
    }

    fn history(&self, user: &Identity, limit: usize) -> Result<Vec<StoredResult>, StoreError> {
        self.query_results(
            "WHERE r.user_id = ?1 ORDER BY r.created_at DESC, r.id DESC LIMIT ?2",
            params![user.id, limit as i64],
        )
    }

    fn all_results(&self) -> Result<Vec<StoredResult>, StoreError> {
        self.query_results("ORDER BY r.created_at DESC, r.id DESC", [])
    }

    fn summary(&self) -> Result<Summary, StoreError> {
        let summary = self.conn.query_row(
            r#"
            SELECT COUNT(*), COUNT(DISTINCT user_id), AVG(wpm), AVG(accuracy)
            FROM results
            "#,
            [],
            |row| {
                let avg_wpm: Option<f64> = row.get(2)?;
                let avg_accuracy: Option<f64> = row.get(3)?;
                Ok(Summary {
                    total_tests: count(row, 0)?,
                    unique_users: count(row, 1)?,
                    avg_wpm: avg_wpm.unwrap_or(0.0),
                    avg_accuracy: avg_accuracy.unwrap_or(0.0),
                })
            },
        )?;
        Ok(summary)
    }

    fn per_user_summary(&self) -> Result<Vec<UserSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT u.username, COUNT(r.id) AS tests, AVG(r.wpm), AVG(r.accuracy)
            FROM results r
            JOIN users u ON r.user_id = u.id
            GROUP BY r.user_id
            ORDER BY tests DESC, u.username ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(UserSummary {
                username: row.get(0)?,
                tests: count(row, 1)?,
                avg_wpm: row.get(2)?,
                avg_accuracy: row.get(3)?,
            })
        })?;

        let mut summary = Vec::new();
        for row in rows {
            summary.push(row?);
        }
        Ok(summary)
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: ResultId,
    username: &'a str,
    created_at: String,
    elapsed_seconds: u64,
    wpm: f64,
    net_wpm: f64,
    accuracy: f64,
    consistency: f64,
    correct_chars: usize,
    incorrect_chars: usize,
    extra_chars: usize,
    missed_chars: usize,
    correct_words: usize,
    total_words: usize,
    typos: usize,
}

/// Write results as CSV with a header row.
pub fn export_csv<W: io::Write>(writer: W, rows: &[StoredResult]) -> Result<(), StoreError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for r in rows {
        wtr.serialize(CsvRow {
            id: r.id,
            username: &r.username,
            created_at: r.created_at.to_rfc3339(),
            elapsed_seconds: r.score.elapsed_seconds,
            wpm: r.score.wpm,
            net_wpm: r.score.net_wpm,
            accuracy: r.score.accuracy_percent,
            consistency: r.score.consistency_percent,
            correct_chars: r.score.correct_chars,
            incorrect_chars: r.score.incorrect_chars,
            extra_chars: r.score.extra_chars,
            missed_chars: r.score.missed_chars,
            correct_words: r.score.correct_words,
            total_words: r.score.total_words,
            typos: r.score.typos,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::score;
    use crate::time_series::SampleSeries;

    fn sample_score(typed: &str) -> ScoreResult {
        score("The cat sat", typed, 60, &SampleSeries::new())
    }

    #[test]
    fn test_ensure_user_is_idempotent() {
        let db = ResultsDb::open_in_memory().unwrap();
        let a = db.ensure_user("ada").unwrap();
        let b = db.ensure_user("ada").unwrap();
        let c = db.ensure_user("grace").unwrap();

        assert_eq!(a, b);
        assert_ne!(a.id, c.id);
        assert_eq!(db.find_user("ada").unwrap(), Some(a));
        assert_eq!(db.find_user("nobody").unwrap(), None);
    }

    #[test]
    fn test_record_round_trips_every_field() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        let user = db.ensure_user("ada").unwrap();
        let mut result = sample_score("The dog sat");
        result.consistency_percent = 87.654321;

        let id = db.record(&user, &result, "The dog sat").unwrap();
        let stored = db.get_result(id, &user).unwrap().unwrap();

        assert_eq!(stored.score, result);
        assert_eq!(stored.typed_text, "The dog sat");
        assert_eq!(stored.username, "ada");
        assert_eq!(stored.user_id, user.id);
    }

    #[test]
    fn test_get_result_scoped_to_owner() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        let ada = db.ensure_user("ada").unwrap();
        let grace = db.ensure_user("grace").unwrap();
        let id = db.record(&ada, &sample_score("The cat sat"), "The cat sat").unwrap();

        assert!(db.get_result(id, &grace).unwrap().is_none());
        assert!(db.get_result(id + 100, &ada).unwrap().is_none());
    }

    #[test]
    fn test_history_newest_first_with_limit() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        let ada = db.ensure_user("ada").unwrap();
        let first = db.record(&ada, &sample_score("The"), "The").unwrap();
        let second = db.record(&ada, &sample_score("The cat"), "The cat").unwrap();
        let third = db.record(&ada, &sample_score("The cat sat"), "The cat sat").unwrap();

        let ids: Vec<_> = db.history(&ada, 2).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third, second]);
        assert!(first < second);
    }

    #[test]
    fn test_summaries() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        let ada = db.ensure_user("ada").unwrap();
        let grace = db.ensure_user("grace").unwrap();

        let perfect = sample_score("The cat sat");
        let partial = sample_score("The dog sat");
        db.record(&ada, &perfect, "The cat sat").unwrap();
        db.record(&ada, &partial, "The dog sat").unwrap();
        db.record(&grace, &perfect, "The cat sat").unwrap();

        let summary = db.summary().unwrap();
        assert_eq!(summary.total_tests, 3);
        assert_eq!(summary.unique_users, 2);
        assert!((summary.avg_wpm - (3.0 + 2.0 + 3.0) / 3.0).abs() < 1e-9);

        let per_user = db.per_user_summary().unwrap();
        assert_eq!(per_user.len(), 2);
        assert_eq!(per_user[0].username, "ada");
        assert_eq!(per_user[0].tests, 2);
        assert!((per_user[0].avg_wpm - 2.5).abs() < 1e-9);
        assert_eq!(per_user[1].username, "grace");

        assert_eq!(db.all_results().unwrap().len(), 3);
    }

    #[test]
    fn test_empty_summary_averages_are_zero() {
        let db = ResultsDb::open_in_memory().unwrap();
        let summary = db.summary().unwrap();
        assert_eq!(summary.total_tests, 0);
        assert_eq!(summary.avg_wpm, 0.0);
        assert_eq!(summary.avg_accuracy, 0.0);
        assert!(db.per_user_summary().unwrap().is_empty());
    }

    #[test]
    fn test_dashboard() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        let ada = db.ensure_user("ada").unwrap();

        let empty = dashboard(&db, &ada).unwrap();
        assert_eq!(empty.sessions, 0);
        assert_eq!(empty.average_wpm, 0.0);

        db.record(&ada, &sample_score("The cat sat"), "The cat sat").unwrap();
        db.record(&ada, &sample_score("The dog sat"), "The dog sat").unwrap();

        let board = dashboard(&db, &ada).unwrap();
        assert_eq!(board.sessions, 2);
        assert!((board.average_wpm - 2.5).abs() < 1e-9);
        assert!((board.average_accuracy - (100.0 + 200.0 / 3.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_export_csv() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        let ada = db.ensure_user("ada").unwrap();
        db.record(&ada, &sample_score("The cat sat"), "The cat sat").unwrap();

        let mut out = Vec::new();
        export_csv(&mut out, &db.all_results().unwrap()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert!(lines.next().unwrap().starts_with("id,username,created_at,elapsed_seconds,wpm"));
        assert!(lines.next().unwrap().contains(",ada,"));
        assert!(lines.next().is_none());
    }
}
