//! Scheduled purge of expired form links and stale auth artefacts.
//!
//! Expired rows are already rejected on lookup, so this is housekeeping.
//! The schedule is a cron expression with a seconds field.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::config::FormsConfig;
use crate::db::{self, DbPool};

/// Rows removed in one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub forms_removed: u64,
    pub otps_removed: u64,
    pub refresh_tokens_removed: u64,
}

/// Delete everything that expired at or before `now`
pub async fn purge_expired_at(pool: &DbPool, now: DateTime<Utc>) -> Result<SweepStats> {
    let cutoff = db::timestamp(now);

    let forms_removed = sqlx::query("DELETE FROM forms WHERE expires_at <= ?")
        .bind(&cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    let otps_removed = sqlx::query("DELETE FROM otps WHERE expires_at <= ?")
        .bind(&cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    let refresh_tokens_removed = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
        .bind(&cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    crate::api::metrics::record_forms_swept(forms_removed);

    Ok(SweepStats {
        forms_removed,
        otps_removed,
        refresh_tokens_removed,
    })
}

pub async fn purge_expired(pool: &DbPool) -> Result<SweepStats> {
    purge_expired_at(pool, Utc::now()).await
}

pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    Schedule::from_str(expression)
        .with_context(|| format!("Invalid sweep schedule: {}", expression))
}

/// Spawn the background sweep task
pub fn spawn_form_sweep_task(db: DbPool, config: FormsConfig) -> Result<()> {
    if !config.sweep_enabled {
        tracing::info!("Form link sweep is disabled");
        return Ok(());
    }

    let schedule = parse_schedule(&config.sweep_schedule)?;
    tracing::info!(schedule = %config.sweep_schedule, "Starting form link sweep task");

    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!("Sweep schedule has no upcoming runs, stopping");
                break;
            };

            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match purge_expired(&db).await {
                Ok(stats) => {
                    tracing::info!(
                        forms = stats.forms_removed,
                        otps = stats.otps_removed,
                        refresh_tokens = stats.refresh_tokens_removed,
                        "Sweep completed"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Sweep failed");
                }
            }
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FormType;
    use crate::forms::FormIssuer;
    use crate::test_support::*;
    use chrono::Duration;

    #[test]
    fn test_parse_schedule() {
        let schedule = parse_schedule("0 0 0 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "00:00:00");

        assert!(parse_schedule("every day").is_err());
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_links() {
        let pool = test_pool().await;
        let user_id = seed_user(&pool, "0241234567", "Kente Couture").await;
        let issuer = FormIssuer::new(pool.clone(), TEST_SECRET.to_string(), test_config().forms);

        let now = Utc::now();
        issuer
            .issue_at(&user_id, FormType::Male, now - Duration::days(40))
            .await
            .unwrap();
        issuer
            .issue_at(&user_id, FormType::Female, now)
            .await
            .unwrap();

        let stats = purge_expired_at(&pool, now).await.unwrap();
        assert_eq!(stats.forms_removed, 1);
        assert_eq!(count_rows(&pool, "forms").await, 1);

        let again = purge_expired_at(&pool, now).await.unwrap();
        assert_eq!(again, SweepStats::default());
    }
}
