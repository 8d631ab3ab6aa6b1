use super::model::ClientRow;
use crate::model::{Client, NotificationMessage, Recipient};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let url = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid database url: {url}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL and create its parent
/// directory. Other URLs (including in-memory ones) pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn insert_event(pool: &Pool, title: &str) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO events (title) VALUES (?) RETURNING id")
        .bind(title)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn insert_client(
    pool: &Pool,
    tg_id: &str,
    first_name: Option<&str>,
    job_title: Option<&str>,
    event_id: Option<i64>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO clients (tg_id, first_name, job_title, event_id) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(tg_id)
    .bind(first_name)
    .bind(job_title)
    .bind(event_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert client {tg_id}"))?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn get_client(pool: &Pool, id: i64) -> Result<Option<Client>> {
    let row = sqlx::query_as::<_, ClientRow>(
        "SELECT id, tg_id, first_name, job_title, is_speaker, event_id, created_at FROM clients WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Client::from))
}

/// Every client's messaging id, in insertion order.
#[instrument(skip_all)]
pub async fn list_recipients(pool: &Pool) -> Result<Vec<Recipient>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT tg_id FROM clients ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().map(Recipient::new).collect())
}

#[instrument(skip_all)]
pub async fn insert_lecture(pool: &Pool, title: &str) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO lectures (title) VALUES (?) RETURNING id")
        .bind(title)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

/// Display names of a lecture's speakers, falling back to the messaging id.
#[instrument(skip_all)]
pub async fn lecture_speaker_names(pool: &Pool, lecture_id: i64) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT COALESCE(c.first_name, c.tg_id) FROM lecture_speakers ls \
         JOIN clients c ON c.id = ls.client_id WHERE ls.lecture_id = ? ORDER BY c.id",
    )
    .bind(lecture_id)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

#[instrument(skip_all)]
pub async fn insert_notification(pool: &Pool, title: &str, message: &str) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO notifications (title, message) VALUES (?, ?) RETURNING id")
        .bind(title)
        .bind(message)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn get_notification(pool: &Pool, id: i64) -> Result<Option<NotificationMessage>> {
    let row = sqlx::query("SELECT id, title, message FROM notifications WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| NotificationMessage {
        id: row.get("id"),
        title: row.get("title"),
        message: row.get("message"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn prepare_sqlite_url_passes_memory_and_other_schemes() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://localhost/db"),
            "postgres://localhost/db"
        );
    }

    #[test]
    fn prepare_sqlite_url_creates_parent_dir() {
        let td = tempfile::tempdir().unwrap();
        let db_path = td.path().join("nested").join("meetup.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let prepared = prepare_sqlite_url(&url);
        assert_eq!(prepared, url);
        assert!(td.path().join("nested").exists());
    }

    #[tokio::test]
    async fn recipients_follow_client_order() {
        let pool = setup_pool().await;
        let event = insert_event(&pool, "Python Meetup").await.unwrap();
        insert_client(&pool, "300", Some("Ann"), None, Some(event))
            .await
            .unwrap();
        insert_client(&pool, "100", None, Some("Backend dev"), None)
            .await
            .unwrap();
        let recipients = list_recipients(&pool).await.unwrap();
        assert_eq!(recipients, vec![Recipient::from("300"), Recipient::from("100")]);
    }

    #[tokio::test]
    async fn client_and_notification_roundtrip() {
        let pool = setup_pool().await;
        let cid = insert_client(&pool, "42", Some("Bob"), Some("CTO"), None)
            .await
            .unwrap();
        let client = get_client(&pool, cid).await.unwrap().unwrap();
        assert_eq!(client.tg_id, "42");
        assert!(!client.is_speaker);

        let nid = insert_notification(&pool, "Doors open", "See you at 18:30")
            .await
            .unwrap();
        let n = get_notification(&pool, nid).await.unwrap().unwrap();
        assert_eq!(n.title, "Doors open");
        assert_eq!(n.message, "See you at 18:30");
        assert!(get_notification(&pool, nid + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_tg_id_is_rejected() {
        let pool = setup_pool().await;
        insert_client(&pool, "7", None, None, None).await.unwrap();
        assert!(insert_client(&pool, "7", None, None, None).await.is_err());
    }
}
