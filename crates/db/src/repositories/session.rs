use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use bulkpix_core::domain::session::{Session, SessionStore};
use bulkpix_core::errors::SessionStoreError;

use crate::DbPool;

/// Sqlite-backed session store. Expiry is enforced on read: a row whose
/// `expires_at` has passed is deleted and reported as absent, so an abandoned
/// conversation restarts from the product picker.
pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> SessionStoreError {
    SessionStoreError::Backend(err.to_string())
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<Session>, SessionStoreError> {
        let row = sqlx::query(
            "SELECT payload_json, expires_at FROM sessions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at_raw = row.get::<String, _>("expires_at");
        let expires_at = DateTime::parse_from_rfc3339(&expires_at_raw)
            .map_err(|err| SessionStoreError::Decode(format!("expires_at: {err}")))?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            self.clear(user_id).await?;
            return Ok(None);
        }

        let payload = row.get::<String, _>("payload_json");
        let session = serde_json::from_str::<Session>(&payload)
            .map_err(|err| SessionStoreError::Decode(err.to_string()))?;
        Ok(Some(session))
    }

    async fn set(
        &self,
        user_id: &str,
        session: &Session,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        let payload = serde_json::to_string(session)
            .map_err(|err| SessionStoreError::Decode(err.to_string()))?;
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .map_err(|err| SessionStoreError::Backend(format!("ttl out of range: {err}")))?;

        sqlx::query(
            "INSERT INTO sessions (user_id, state, payload_json, expires_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                state = excluded.state,
                payload_json = excluded.payload_json,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(state_tag(session))
        .bind(&payload)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), SessionStoreError> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

/// Denormalized state column for operational queries. The payload stays
/// authoritative.
fn state_tag(session: &Session) -> String {
    match serde_json::to_value(session.state) {
        Ok(serde_json::Value::String(tag)) => tag,
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bulkpix_core::domain::catalog::SpecStep;
    use bulkpix_core::domain::session::{Selections, Session, SessionState, SessionStore};

    use super::SqlSessionStore;
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlSessionStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlSessionStore::new(pool)
    }

    #[tokio::test]
    async fn set_get_clear_round_trip() {
        let store = store().await;

        let mut session = Session::new(SessionState::AskingQuantity);
        session.selections = Selections::for_product("blankets");
        session.selections.set_option(SpecStep::Fabric, "fabric_sherpa");
        session.selections.set_option(SpecStep::Size, "size_med_30x40");

        store
            .set("447000000001", &session, Duration::from_secs(3600))
            .await
            .expect("set");

        let loaded = store.get("447000000001").await.expect("get").expect("present");
        assert_eq!(loaded, session);

        store.clear("447000000001").await.expect("clear");
        assert!(store.get("447000000001").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn expired_sessions_read_back_as_absent() {
        let store = store().await;
        let session = Session::new(SessionState::SelectingProduct);

        store.set("447000000002", &session, Duration::ZERO).await.expect("set");

        assert!(store.get("447000000002").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn set_overwrites_the_previous_session() {
        let store = store().await;

        let first = Session::new(SessionState::SelectingProduct);
        store.set("447000000003", &first, Duration::from_secs(3600)).await.expect("set");

        let mut second = Session::new(SessionState::AskingEmail);
        second.selections.quantity = Some(40);
        store.set("447000000003", &second, Duration::from_secs(3600)).await.expect("set");

        let loaded = store.get("447000000003").await.expect("get").expect("present");
        assert_eq!(loaded.state, SessionState::AskingEmail);
        assert_eq!(loaded.selections.quantity, Some(40));
    }

    #[tokio::test]
    async fn unknown_user_reads_as_absent() {
        let store = store().await;
        assert!(store.get("447999999999").await.expect("get").is_none());
    }
}
