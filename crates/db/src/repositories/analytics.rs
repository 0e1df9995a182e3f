use bulkpix_core::analytics::{AnalyticsEvent, AnalyticsSink};

use crate::DbPool;

/// Persists funnel events to the `analytics_events` table. Writes run on a
/// detached task and failures are logged, never surfaced; losing an event is
/// acceptable, stalling the conversation is not.
#[derive(Clone)]
pub struct SqlAnalyticsSink {
    pool: DbPool,
}

impl SqlAnalyticsSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(pool: &DbPool, event: &AnalyticsEvent) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_string(&event.payload).unwrap_or_else(|_| "{}".to_string());
        sqlx::query(
            "INSERT INTO analytics_events (event_type, user_id, payload_json, occurred_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&event.event_type)
        .bind(&event.user_id)
        .bind(payload)
        .bind(event.occurred_at.to_rfc3339())
        .execute(pool)
        .await?;
        Ok(())
    }
}

impl AnalyticsSink for SqlAnalyticsSink {
    fn record(&self, event: AnalyticsEvent) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(err) = Self::insert(&pool, &event).await {
                tracing::warn!(
                    event_name = "analytics.write_failed",
                    event_type = %event.event_type,
                    user_id = %event.user_id,
                    error = %err,
                    "dropping analytics event"
                );
            }
        });
    }
}
