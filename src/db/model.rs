//! Row models used by repositories.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::model::Client;

#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    pub id: i64,
    pub tg_id: String,
    pub first_name: Option<String>,
    pub job_title: Option<String>,
    pub is_speaker: bool,
    pub event_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: row.id,
            tg_id: row.tg_id,
            first_name: row.first_name,
            job_title: row.job_title,
            is_speaker: row.is_speaker,
            event_id: row.event_id,
            created_at: row.created_at,
        }
    }
}
