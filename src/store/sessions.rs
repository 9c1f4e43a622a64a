//! Session and player rows for bootstrap and reconnection.
//!
//! Writes are fire-and-forget: they run on their own task and only log on
//! failure, so the host tick never waits on the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::state::PlayerRecord;
use crate::session::{Session, SessionStatus};
use crate::ws::protocol::PlayerId;

use super::supabase::{StoreError, SupabaseClient};

const SESSIONS_TABLE: &str = "game_sessions";
const PLAYERS_TABLE: &str = "session_players";

/// Persisted session row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub join_code: String,
    pub host_id: PlayerId,
    pub status: SessionStatus,
    pub max_players: i32,
    pub zone_center_x: f32,
    pub zone_center_y: f32,
    pub zone_radius: f32,
    pub zone_phase: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionRow {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            join_code: session.join_code.clone(),
            host_id: session.host_id,
            status: session.status,
            max_players: session.max_players as i32,
            zone_center_x: session.zone.center_x,
            zone_center_y: session.zone.center_y,
            zone_radius: session.zone.radius,
            zone_phase: session.zone.phase as i32,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

/// Persisted player row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRow {
    pub session_id: Uuid,
    pub player_id: PlayerId,
    pub display_name: String,
    pub is_host: bool,
    pub is_bot: bool,
    pub is_connected: bool,
    pub kills: i32,
    pub updated_at: DateTime<Utc>,
}

impl PlayerRow {
    pub fn from_record(session_id: Uuid, record: &PlayerRecord) -> Self {
        Self {
            session_id,
            player_id: record.player_id,
            display_name: record.display_name.clone(),
            is_host: record.is_host,
            is_bot: record.is_bot,
            is_connected: record.is_connected,
            kills: record.kills as i32,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: SessionStatus,
}

/// Best-effort persistence. A store built without a client is disabled:
/// writes are no-ops and reads find nothing.
#[derive(Clone, Default)]
pub struct SessionStore {
    client: Option<SupabaseClient>,
}

impl SessionStore {
    pub fn new(client: Option<SupabaseClient>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn persist_session(&self, session: &Session) {
        let row = SessionRow::from(session);
        self.spawn_write("persist_session", move |client| async move {
            client.upsert(SESSIONS_TABLE, &row, "id").await
        });
    }

    pub fn persist_player(&self, session_id: Uuid, record: &PlayerRecord) {
        let row = PlayerRow::from_record(session_id, record);
        self.spawn_write("persist_player", move |client| async move {
            client
                .upsert(PLAYERS_TABLE, &row, "session_id,player_id")
                .await
        });
    }

    pub fn mark_status(&self, session_id: Uuid, status: SessionStatus) {
        self.spawn_write("mark_status", move |client| async move {
            let query = format!("id=eq.{}", session_id);
            client
                .update(SESSIONS_TABLE, &query, &StatusUpdate { status })
                .await
        });
    }

    pub async fn load_session_by_code(&self, code: &str) -> Result<Option<SessionRow>, StoreError> {
        let Some(client) = &self.client else {
            return Ok(None);
        };
        let query = format!("join_code=eq.{}&order=created_at.desc&limit=1", code);
        client.get_one(SESSIONS_TABLE, &query).await
    }

    pub async fn load_player(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
    ) -> Result<Option<PlayerRow>, StoreError> {
        let Some(client) = &self.client else {
            return Ok(None);
        };
        let query = format!("session_id=eq.{}&player_id=eq.{}", session_id, player_id);
        client.get_one(PLAYERS_TABLE, &query).await
    }

    fn spawn_write<F, Fut>(&self, operation: &'static str, write: F)
    where
        F: FnOnce(SupabaseClient) -> Fut,
        Fut: std::future::Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        let Some(client) = self.client.clone() else {
            return;
        };
        let fut = write(client);
        tokio::spawn(async move {
            match fut.await {
                Ok(()) => debug!(operation, "Store write completed"),
                Err(e) => warn!(operation, error = %e, "Store write failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::game::state::initial_zone;

    #[tokio::test]
    async fn disabled_store_is_a_no_op() {
        let store = SessionStore::disabled();
        assert!(!store.is_enabled());

        let session = Session::new(
            Uuid::new_v4(),
            4,
            initial_zone(&Tuning::default()),
            chrono::Duration::hours(2),
        );
        store.persist_session(&session);
        store.mark_status(session.id, SessionStatus::Active);

        assert!(store.load_session_by_code("ABCDEF").await.unwrap().is_none());
        assert!(store
            .load_player(session.id, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn session_rows_serialize_status_in_snake_case() {
        let session = Session::new(
            Uuid::new_v4(),
            4,
            initial_zone(&Tuning::default()),
            chrono::Duration::hours(2),
        );
        let value = serde_json::to_value(SessionRow::from(&session)).unwrap();
        assert_eq!(value["status"], "lobby");
        assert_eq!(value["join_code"], session.join_code);
    }
}
