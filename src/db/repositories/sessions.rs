use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::{
    db::{
        helpers::{
            parse_datetime, parse_optional_datetime, parse_reason, parse_status, to_i64, to_u64,
        },
        models::{SessionRecord, SessionStatus},
        Database,
    },
    session::TerminationReason,
};

const SESSION_COLUMNS: &str = "id, started_at, stopped_at, status, termination_reason, duration_ms, violation_total, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<SessionRecord> {
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let status: String = row.get("status")?;
    let termination_reason: Option<String> = row.get("termination_reason")?;
    let duration_ms: i64 = row.get("duration_ms")?;
    let violation_total: i64 = row.get("violation_total")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(SessionRecord {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        status: parse_status(&status)?,
        termination_reason: parse_reason(termination_reason)?,
        duration_ms: to_u64(duration_ms, "duration_ms")?,
        violation_total: to_u64(violation_total, "violation_total")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Inserts a running session and returns its newly assigned id.
    pub async fn create_session(&self, started_at: DateTime<Utc>, duration_ms: u64) -> Result<String> {
        self.execute(move |conn| {
            let id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO sessions (id, started_at, stopped_at, status, termination_reason, duration_ms, violation_total, created_at, updated_at)
                 VALUES (?1, ?2, NULL, ?3, NULL, ?4, 0, ?5, ?5)",
                params![
                    id,
                    started_at.to_rfc3339(),
                    SessionStatus::Running.as_str(),
                    to_i64(duration_ms)?,
                    now,
                ],
            )?;
            Ok(id)
        })
        .await
    }

    pub async fn update_session_progress(
        &self,
        session_id: &str,
        violation_total: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET violation_total = ?1,
                     updated_at = ?2
                 WHERE id = ?3 AND status = 'Running'",
                params![to_i64(violation_total)?, updated_at.to_rfc3339(), session_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Records the terminal outcome. The reason is write-once: a row that
    /// already carries one is left untouched.
    pub async fn mark_session_stopped(
        &self,
        session_id: &str,
        reason: TerminationReason,
        violation_total: u64,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     termination_reason = ?2,
                     violation_total = ?3,
                     stopped_at = ?4,
                     updated_at = ?4
                 WHERE id = ?5 AND termination_reason IS NULL",
                params![
                    SessionStatus::Stopped.as_str(),
                    reason.as_str(),
                    to_i64(violation_total)?,
                    stopped_at.to_rfc3339(),
                    session_id,
                ],
            )?;

            if rows_affected == 0 {
                let exists: Option<String> = conn
                    .query_row(
                        "SELECT id FROM sessions WHERE id = ?1",
                        params![session_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Err(anyhow!("session {session_id} not found"));
                }
            }

            Ok(())
        })
        .await
    }

    pub async fn mark_session_interrupted(
        &self,
        session_id: &str,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     stopped_at = ?2,
                     updated_at = ?2
                 WHERE id = ?3",
                params![
                    SessionStatus::Interrupted.as_str(),
                    stopped_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;

            let mut rows = stmt.query(params![session_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn get_incomplete_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE status = 'Running'
                 ORDER BY started_at DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Marks every session left `Running` by a previous process as
    /// interrupted. Returns how many were recovered.
    pub async fn recover_incomplete_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let sessions = self.get_incomplete_sessions().await?;
        for session in &sessions {
            log::warn!(
                "Recovered incomplete session {}; marking as Interrupted",
                session.id
            );
            self.mark_session_interrupted(&session.id, now).await?;
        }
        Ok(sessions.len())
    }
}
