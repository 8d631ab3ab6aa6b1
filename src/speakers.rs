//! Lecture speaker assignment.
//!
//! A client linked to a lecture as a speaker always carries `is_speaker = 1`.
//! Links and flags are written in the same transaction so the two can never
//! disagree.

use anyhow::{bail, Result};
use tracing::{info, instrument};

use crate::db::Pool;

/// Replace the speakers of `lecture_id` with `client_ids` and flag each of
/// them as a speaker. Unlinked clients keep their flag: they may still speak
/// at another lecture.
#[instrument(skip_all, fields(lecture_id = lecture_id))]
pub async fn assign_speakers(pool: &Pool, lecture_id: i64, client_ids: &[i64]) -> Result<()> {
    let mut ids = client_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let mut tx = pool.begin().await?;
    let lecture: Option<i64> = sqlx::query_scalar("SELECT id FROM lectures WHERE id = ?")
        .bind(lecture_id)
        .fetch_optional(&mut *tx)
        .await?;
    if lecture.is_none() {
        bail!("lecture {lecture_id} does not exist");
    }

    sqlx::query("DELETE FROM lecture_speakers WHERE lecture_id = ?")
        .bind(lecture_id)
        .execute(&mut *tx)
        .await?;

    for client_id in &ids {
        let flagged = sqlx::query("UPDATE clients SET is_speaker = 1 WHERE id = ?")
            .bind(client_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if flagged == 0 {
            // Dropping `tx` rolls back the links removed above.
            bail!("client {client_id} does not exist");
        }
        sqlx::query("INSERT INTO lecture_speakers (lecture_id, client_id) VALUES (?, ?)")
            .bind(lecture_id)
            .bind(client_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    info!(lecture_id, speakers = ids.len(), "lecture speakers assigned");
    Ok(())
}
