use anyhow::Result;
use rusqlite::params;

use crate::{
    audit::ViolationEvent,
    db::{helpers::parse_datetime, models::ViolationRecord, Database},
};

impl Database {
    /// Mirrors an audit event into the durable store.
    pub async fn append_violation(&self, event: &ViolationEvent) -> Result<i64> {
        let record = event.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO violations (session_id, label, occurred_at)
                 VALUES (?1, ?2, ?3)",
                params![record.session_id, record.label, record.timestamp.to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn list_violations(&self, session_id: &str) -> Result<Vec<ViolationRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, label, occurred_at
                 FROM violations
                 WHERE session_id = ?1
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut violations = Vec::new();
            while let Some(row) = rows.next()? {
                let occurred_at: String = row.get(3)?;
                violations.push(ViolationRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    label: row.get(2)?,
                    occurred_at: parse_datetime(&occurred_at, "occurred_at")?,
                });
            }
            Ok(violations)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn violations_are_listed_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("proctor.sqlite3")).unwrap();
        let id = db.create_session(Utc::now(), 60_000).await.unwrap();

        db.append_violation(&ViolationEvent::new(id.clone(), "Phone detected"))
            .await
            .unwrap();
        db.append_violation(&ViolationEvent::new(id.clone(), "looking away"))
            .await
            .unwrap();

        let labels: Vec<_> = db
            .list_violations(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|violation| violation.label)
            .collect();
        assert_eq!(labels, vec!["Phone detected", "looking away"]);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected_by_foreign_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("proctor.sqlite3")).unwrap();

        assert!(db
            .append_violation(&ViolationEvent::new("ghost", "Phone detected"))
            .await
            .is_err());
    }
}
