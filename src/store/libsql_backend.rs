//! libSQL backend — async `Store` implementation over a local database
//! file (or `:memory:` in tests).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::{BuriedPr, Store};
use crate::types::{TrackedPr, zero_time};

const PR_COLUMNS: &str = "url, review_status, title, author, repo_name, repo_owner, repo_url, \
     is_draft, last_updated, last_pr_commenter, threads_actionable, threads_waiting, \
     additions, deletions, review_requested_from, buried, raw_json";

/// libSQL store backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async
/// use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("could not create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("could not open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("could not connect: {e}")))?;

        let store = Self { db: Arc::new(db), conn };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "database opened");
        Ok(store)
    }

    /// In-memory database (tests).
    pub async fn open_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("could not create memory db: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("could not connect: {e}")))?;

        let store = Self { db: Arc::new(db), conn };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    async fn meta_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT value FROM meta WHERE key = ?1", params![key])
            .await
            .map_err(|e| StoreError::Query(format!("meta_get {key}: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| StoreError::Query(format!("meta_get {key}: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("meta_get {key}: {e}"))),
        }
    }

    async fn meta_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute("REPLACE INTO meta (key, value) VALUES (?1, ?2)", params![key, value])
            .await
            .map_err(|e| StoreError::Query(format!("meta_set {key}: {e}")))?;
        Ok(())
    }

    async fn meta_delete(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM meta WHERE key = ?1", params![key])
            .await
            .map_err(|e| StoreError::Query(format!("meta_delete {key}: {e}")))?;
        Ok(())
    }
}

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Parse an RFC 3339 string from the database; degrades to the zero
/// timestamp instead of failing the row.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.to_utc())
        .unwrap_or_else(|_| zero_time())
}

fn row_to_pr(row: &libsql::Row) -> Result<TrackedPr, libsql::Error> {
    let review_requested_from: String = row.get(14)?;
    let raw_json: Option<String> = row.get(16).ok();

    Ok(TrackedPr {
        url: row.get(0)?,
        review_status: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        repo_name: row.get(4)?,
        repo_owner: row.get(5)?,
        repo_url: row.get(6)?,
        is_draft: row.get::<i64>(7)? != 0,
        last_updated: parse_datetime(&row.get::<String>(8)?),
        last_pr_commenter: row.get(9)?,
        threads_actionable: row.get::<i64>(10)? as u32,
        threads_waiting: row.get::<i64>(11)? as u32,
        additions: row.get(12)?,
        deletions: row.get(13)?,
        review_requested_from: if review_requested_from.is_empty() {
            Vec::new()
        } else {
            review_requested_from.split(',').map(str::to_string).collect()
        },
        buried: row.get::<i64>(15)? != 0,
        raw_json: raw_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

#[async_trait]
impl Store for LibSqlStore {
    async fn credential(&self) -> Result<Option<String>, StoreError> {
        self.meta_get("credential").await
    }

    async fn set_credential(&self, token: &str) -> Result<(), StoreError> {
        self.meta_set("credential", token).await
    }

    async fn rate_limited_until(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(value) = self.meta_get("rate_limited_until").await? else {
            return Ok(None);
        };
        let until = parse_datetime(&value);
        if until <= now {
            self.meta_delete("rate_limited_until").await?;
            return Ok(None);
        }
        Ok(Some(until))
    }

    async fn set_rate_limited_until(&self, until: DateTime<Utc>) -> Result<(), StoreError> {
        self.meta_set("rate_limited_until", &until.to_rfc3339()).await
    }

    async fn last_fetched(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.meta_get("last_fetched").await?.map(|v| parse_datetime(&v)))
    }

    async fn prs(&self) -> Result<Vec<TrackedPr>, StoreError> {
        let mut rows = self
            .conn
            .query(&format!("SELECT {PR_COLUMNS} FROM prs"), ())
            .await
            .map_err(|e| StoreError::Query(format!("prs: {e}")))?;

        let mut prs = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => prs.push(
                    row_to_pr(&row).map_err(|e| StoreError::Query(format!("prs row: {e}")))?,
                ),
                Ok(None) => break,
                Err(e) => return Err(StoreError::Query(format!("prs: {e}"))),
            }
        }
        Ok(prs)
    }

    async fn replace_prs(
        &self,
        prs: &[TrackedPr],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        debug!(prs = prs.len(), "storing prs");

        self.conn
            .execute("DELETE FROM prs", ())
            .await
            .map_err(|e| StoreError::Query(format!("replace_prs delete: {e}")))?;

        for pr in prs {
            let raw_json = pr.raw_json.as_ref().map(|v| v.to_string());
            self.conn
                .execute(
                    &format!(
                        "INSERT INTO prs ({PR_COLUMNS}) VALUES \
                         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                    ),
                    params![
                        pr.url.clone(),
                        pr.review_status.clone(),
                        pr.title.clone(),
                        pr.author.clone(),
                        pr.repo_name.clone(),
                        pr.repo_owner.clone(),
                        pr.repo_url.clone(),
                        pr.is_draft as i64,
                        pr.last_updated.to_rfc3339(),
                        pr.last_pr_commenter.clone(),
                        pr.threads_actionable as i64,
                        pr.threads_waiting as i64,
                        pr.additions,
                        pr.deletions,
                        pr.review_requested_from.join(","),
                        pr.buried as i64,
                        opt_text_owned(raw_json),
                    ],
                )
                .await
                .map_err(|e| StoreError::Query(format!("replace_prs insert: {e}")))?;
        }

        self.meta_set("last_fetched", &fetched_at.to_rfc3339()).await
    }

    async fn buried_prs(&self) -> Result<Vec<BuriedPr>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT url, last_updated FROM prs WHERE buried = 1", ())
            .await
            .map_err(|e| StoreError::Query(format!("buried_prs: {e}")))?;

        let mut buried = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => buried.push(BuriedPr {
                    url: row
                        .get::<String>(0)
                        .map_err(|e| StoreError::Query(format!("buried_prs row: {e}")))?,
                    last_updated: parse_datetime(
                        &row.get::<String>(1)
                            .map_err(|e| StoreError::Query(format!("buried_prs row: {e}")))?,
                    ),
                }),
                Ok(None) => break,
                Err(e) => return Err(StoreError::Query(format!("buried_prs: {e}"))),
            }
        }
        Ok(buried)
    }

    async fn bury(&self, url: &str) -> Result<(), StoreError> {
        self.conn
            .execute("UPDATE prs SET buried = 1 WHERE url = ?1", params![url])
            .await
            .map_err(|e| StoreError::Query(format!("bury: {e}")))?;
        Ok(())
    }

    async fn unbury(&self, url: &str) -> Result<(), StoreError> {
        self.conn
            .execute("UPDATE prs SET buried = 0 WHERE url = ?1", params![url])
            .await
            .map_err(|e| StoreError::Query(format!("unbury: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pr(url: &str) -> TrackedPr {
        TrackedPr {
            url: url.to_string(),
            title: "title".to_string(),
            author: "alice".to_string(),
            last_updated: Utc::now(),
            review_requested_from: vec!["bob".to_string(), "carol".to_string()],
            raw_json: Some(serde_json::json!({"url": url})),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn replace_and_list_round_trip() {
        let store = LibSqlStore::open_memory().await.unwrap();
        let fetched_at = Utc::now();

        store.replace_prs(&[pr("a"), pr("b")], fetched_at).await.unwrap();

        let prs = store.prs().await.unwrap();
        assert_eq!(prs.len(), 2);
        let a = prs.iter().find(|p| p.url == "a").unwrap();
        assert_eq!(a.review_requested_from, vec!["bob".to_string(), "carol".to_string()]);
        assert_eq!(a.raw_json.as_ref().unwrap()["url"], "a");

        let last = store.last_fetched().await.unwrap().unwrap();
        assert_eq!(last.timestamp(), fetched_at.timestamp());

        // wholesale replacement drops missing prs
        store.replace_prs(&[pr("b")], Utc::now()).await.unwrap();
        assert_eq!(store.prs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bury_round_trip_with_snapshot() {
        let store = LibSqlStore::open_memory().await.unwrap();
        store.replace_prs(&[pr("a"), pr("b")], Utc::now()).await.unwrap();

        store.bury("a").await.unwrap();
        let buried = store.buried_prs().await.unwrap();
        assert_eq!(buried.len(), 1);
        assert_eq!(buried[0].url, "a");

        store.unbury("a").await.unwrap();
        assert!(store.buried_prs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_window_auto_clears() {
        let store = LibSqlStore::open_memory().await.unwrap();
        let now = Utc::now();

        assert!(store.rate_limited_until(now).await.unwrap().is_none());

        store.set_rate_limited_until(now + Duration::minutes(10)).await.unwrap();
        assert!(store.rate_limited_until(now).await.unwrap().is_some());

        // past the window: cleared on read, and stays cleared
        let later = now + Duration::minutes(11);
        assert!(store.rate_limited_until(later).await.unwrap().is_none());
        assert!(store.rate_limited_until(now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn credential_round_trip() {
        let store = LibSqlStore::open_memory().await.unwrap();
        assert!(store.credential().await.unwrap().is_none());

        store.set_credential("ghp_token").await.unwrap();
        assert_eq!(store.credential().await.unwrap().unwrap(), "ghp_token");
    }

    #[tokio::test]
    async fn opens_a_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("prowl.db");

        {
            let store = LibSqlStore::open(&path).await.unwrap();
            store.replace_prs(&[pr("a")], Utc::now()).await.unwrap();
            store.bury("a").await.unwrap();
        }

        // reopen: prs and bury flag survive
        let store = LibSqlStore::open(&path).await.unwrap();
        let prs = store.prs().await.unwrap();
        assert_eq!(prs.len(), 1);
        assert!(prs[0].buried);
    }
}
