//! Session service - creates session hosts and routes joins to them

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Tuning;
use crate::game::state::initial_zone;
use crate::game::{Catalog, HostRuntime};
use crate::store::SessionStore;
use crate::ws::protocol::{ClientMsg, JoinRejection, JoinResult, PlayerId, ZoneState};

use super::error::SessionError;
use super::model::{generate_join_code, normalize_join_code, Session, SessionStatus};
use super::registry::{SessionHandle, SessionRegistry};

/// Hard ceiling on requested session sizes
pub const MAX_SESSION_PLAYERS: usize = 16;

/// What a caller learns after being admitted to a session
#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    pub session_id: Uuid,
    pub join_code: String,
    pub player_id: PlayerId,
    pub is_host: bool,
    /// Proof of identity for reconnecting, the socket and player actions
    pub token: Uuid,
}

/// Public view of a session. `host_id` grants nothing without the host's token.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub join_code: String,
    pub host_id: PlayerId,
    pub status: SessionStatus,
    pub max_players: usize,
    pub player_count: usize,
    pub zone: ZoneState,
    pub expires_at: DateTime<Utc>,
}

impl SessionInfo {
    fn from_handle(handle: &SessionHandle) -> Self {
        let session = handle.snapshot();
        Self {
            session_id: session.id,
            join_code: session.join_code,
            host_id: session.host_id,
            status: session.status,
            max_players: session.max_players,
            player_count: handle.player_count(),
            zone: session.zone,
            expires_at: session.expires_at,
        }
    }
}

/// Creates sessions, spawns their host runtimes and admits players
pub struct SessionService {
    registry: Arc<SessionRegistry>,
    store: SessionStore,
    catalog: Arc<Catalog>,
    tuning: Tuning,
}

impl SessionService {
    pub fn new(registry: Arc<SessionRegistry>, store: SessionStore, tuning: Tuning) -> Self {
        Self {
            registry,
            store,
            catalog: Arc::new(Catalog::default()),
            tuning,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Create a session in the lobby, start its host and admit the creator as host
    pub async fn create_session(
        &self,
        display_name: String,
        max_players: Option<usize>,
        bots: Option<usize>,
    ) -> Result<JoinOutcome, SessionError> {
        let max_players = max_players
            .unwrap_or(self.tuning.default_max_players)
            .clamp(1, MAX_SESSION_PLAYERS);
        // The creator always keeps a seat
        let bots = bots
            .unwrap_or(self.tuning.default_bot_count)
            .min(max_players - 1);

        let host_id = PlayerId::new_v4();
        let mut session = Session::new(
            host_id,
            max_players,
            initial_zone(&self.tuning),
            chrono::Duration::seconds(self.tuning.session_ttl_secs),
        );
        while self.registry.code_in_use(&session.join_code) {
            session.join_code = generate_join_code(&mut rand::thread_rng());
        }

        let session_id = session.id;
        let join_code = session.join_code.clone();
        self.store.persist_session(&session);

        let seed = rand::random::<u64>();
        let (mut runtime, handle) = HostRuntime::new(
            session,
            self.tuning.clone(),
            self.catalog.clone(),
            self.store.clone(),
            seed,
        );
        for n in 1..=bots {
            runtime.add_bot(format!("Bot_{}", n));
        }

        self.registry.insert(handle.clone());
        info!(
            session_id = %session_id,
            join_code = %join_code,
            max_players,
            bots,
            "Created new session"
        );

        let registry = self.registry.clone();
        tokio::spawn(async move {
            runtime.run().await;

            // Cleanup after the host stops
            registry.remove(&session_id);
            info!(session_id = %session_id, "Session removed from registry");
        });

        self.admit(&handle, host_id, display_name, false).await
    }

    /// Join a session by code. Fails synchronously with a named reason when
    /// the session cannot take the player, otherwise waits for the host.
    ///
    /// Naming a member's `player_id` is a reconnect and needs that member's
    /// token. Any other join gets a fresh id from the server.
    pub async fn join_session(
        &self,
        join_code: &str,
        display_name: String,
        player_id: Option<PlayerId>,
        token: Option<Uuid>,
    ) -> Result<JoinOutcome, SessionError> {
        let Some(handle) = self.registry.get_by_code(join_code) else {
            return Err(self.missing_session(join_code).await);
        };

        let session = handle.snapshot();
        let reconnect_id = player_id.filter(|id| handle.is_member(id));
        if let Some(id) = reconnect_id {
            if !handle.verify_token(&id, token) {
                warn!(session_id = %session.id, player_id = %id, "Reconnect with bad token refused");
                return Err(SessionError::InvalidToken);
            }
        }
        let is_reconnect = reconnect_id.is_some();

        if session.status == SessionStatus::Ended || session.is_expired(Utc::now()) {
            return Err(SessionError::NotJoinable);
        }
        if session.status == SessionStatus::Active && !is_reconnect {
            return Err(SessionError::NotJoinable);
        }
        if !is_reconnect && handle.members.len() >= session.max_players {
            return Err(SessionError::Full);
        }

        let sender = reconnect_id.unwrap_or_else(PlayerId::new_v4);
        self.admit(&handle, sender, display_name, is_reconnect).await
    }

    /// Ask the host to start the match. Only the host may do this.
    pub async fn start_session(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
        token: Option<Uuid>,
    ) -> Result<SessionInfo, SessionError> {
        let handle = self.authorized(session_id, player_id, token)?;

        let session = handle.snapshot();
        if session.host_id != player_id {
            return Err(SessionError::NotHost);
        }
        if session.status != SessionStatus::Lobby {
            return Err(SessionError::NotJoinable);
        }

        handle.relay.submit(player_id, ClientMsg::StartMatch).await?;
        info!(session_id = %session_id, "Match start requested");
        Ok(SessionInfo::from_handle(&handle))
    }

    /// Mark a player as gone. Their record is kept for reconnecting.
    pub async fn leave_session(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
        token: Option<Uuid>,
    ) -> Result<(), SessionError> {
        let handle = self.authorized(session_id, player_id, token)?;
        handle.relay.submit(player_id, ClientMsg::Leave).await
    }

    /// The session's handle, if `player_id` is a member holding `token`
    pub fn authorized(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
        token: Option<Uuid>,
    ) -> Result<SessionHandle, SessionError> {
        let handle = self.registry.get(&session_id).ok_or(SessionError::NotFound)?;
        if !handle.is_member(&player_id) {
            return Err(SessionError::NotFound);
        }
        if !handle.verify_token(&player_id, token) {
            return Err(SessionError::InvalidToken);
        }
        Ok(handle)
    }

    pub fn get_session(&self, join_code: &str) -> Result<SessionInfo, SessionError> {
        self.registry
            .get_by_code(join_code)
            .map(|handle| SessionInfo::from_handle(&handle))
            .ok_or(SessionError::NotFound)
    }

    pub fn handle(&self, session_id: &Uuid) -> Option<SessionHandle> {
        self.registry.get(session_id)
    }

    async fn admit(
        &self,
        handle: &SessionHandle,
        sender: PlayerId,
        display_name: String,
        is_reconnect: bool,
    ) -> Result<JoinOutcome, SessionError> {
        let player_id = is_reconnect.then_some(sender);
        match handle
            .relay
            .request_join(sender, display_name, player_id)
            .await?
        {
            JoinResult::Accepted { player_id, is_host } => {
                let session = handle.snapshot();
                Ok(JoinOutcome {
                    session_id: session.id,
                    join_code: session.join_code,
                    player_id,
                    is_host,
                    token: handle.issue_token(player_id),
                })
            }
            JoinResult::Rejected {
                reason: JoinRejection::Full,
            } => Err(SessionError::Full),
            JoinResult::Rejected {
                reason: JoinRejection::NotJoinable,
            } => Err(SessionError::NotJoinable),
        }
    }

    /// A code unknown to this process may still name a persisted session
    /// that is no longer hosted here
    async fn missing_session(&self, join_code: &str) -> SessionError {
        match self
            .store
            .load_session_by_code(&normalize_join_code(join_code))
            .await
        {
            Ok(Some(_)) => SessionError::NotJoinable,
            Ok(None) => SessionError::NotFound,
            Err(e) => {
                warn!(error = %e, "Session lookup in store failed");
                SessionError::NotFound
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn service() -> SessionService {
        SessionService::new(
            Arc::new(SessionRegistry::new()),
            SessionStore::disabled(),
            Tuning::default(),
        )
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn creator_is_admitted_as_host_with_bots() {
        let service = service();
        let created = assert_ok!(
            service
                .create_session("alice".to_string(), Some(4), Some(2))
                .await
        );
        assert!(created.is_host);

        let info = assert_ok!(service.get_session(&created.join_code));
        assert_eq!(info.status, SessionStatus::Lobby);
        assert_eq!(info.host_id, created.player_id);
        assert_eq!(info.player_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn guests_join_by_code_until_full() {
        let service = service();
        let created = assert_ok!(service.create_session("host".to_string(), Some(2), None).await);

        let guest = assert_ok!(
            service
                .join_session(&created.join_code.to_lowercase(), "guest".to_string(), None, None)
                .await
        );
        assert!(!guest.is_host);
        assert_eq!(guest.session_id, created.session_id);

        let third = service
            .join_session(&created.join_code, "third".to_string(), None, None)
            .await;
        assert_eq!(third.unwrap_err(), SessionError::Full);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_codes_are_not_found() {
        let service = service();
        let result = service.join_session("ZZZZZZ", "x".to_string(), None, None).await;
        assert_eq!(result.unwrap_err(), SessionError::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn started_sessions_only_take_reconnects() {
        let service = service();
        let created = assert_ok!(service.create_session("host".to_string(), Some(4), None).await);
        let guest = assert_ok!(
            service
                .join_session(&created.join_code, "guest".to_string(), None, None)
                .await
        );

        let not_host = service
            .start_session(created.session_id, guest.player_id, Some(guest.token))
            .await;
        assert_eq!(not_host.unwrap_err(), SessionError::NotHost);

        assert_ok!(
            service
                .start_session(created.session_id, created.player_id, Some(created.token))
                .await
        );
        let handle = service.handle(&created.session_id).unwrap();
        wait_until(|| handle.status() == SessionStatus::Active).await;

        let late = service
            .join_session(&created.join_code, "late".to_string(), None, None)
            .await;
        assert_eq!(late.unwrap_err(), SessionError::NotJoinable);

        let back = assert_ok!(
            service
                .join_session(
                    &created.join_code,
                    "guest".to_string(),
                    Some(guest.player_id),
                    Some(guest.token)
                )
                .await
        );
        assert_eq!(back.player_id, guest.player_id);
        assert_eq!(back.token, guest.token);
        assert!(!back.is_host);
    }

    #[tokio::test(start_paused = true)]
    async fn published_host_id_is_not_a_credential() {
        let service = service();
        let created = assert_ok!(service.create_session("host".to_string(), Some(4), None).await);
        let host_id = assert_ok!(service.get_session(&created.join_code)).host_id;

        for token in [None, Some(Uuid::new_v4())] {
            let stolen = service
                .join_session(&created.join_code, "mallory".to_string(), Some(host_id), token)
                .await;
            assert_eq!(stolen.unwrap_err(), SessionError::InvalidToken);

            let start = service.start_session(created.session_id, host_id, token).await;
            assert_eq!(start.unwrap_err(), SessionError::InvalidToken);
        }

        // An unknown id is not adopted; the newcomer gets its own
        let chosen = Uuid::new_v4();
        let guest = assert_ok!(
            service
                .join_session(&created.join_code, "guest".to_string(), Some(chosen), None)
                .await
        );
        assert_ne!(guest.player_id, chosen);
        assert_ne!(guest.player_id, host_id);
        assert_ne!(guest.token, created.token);

        let handle = service.handle(&created.session_id).unwrap();
        assert_eq!(handle.status(), SessionStatus::Lobby);
        assert_eq!(handle.player_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_sessions_leave_the_registry() {
        let service = service();
        let created = assert_ok!(service.create_session("host".to_string(), Some(4), None).await);
        let guest = assert_ok!(
            service
                .join_session(&created.join_code, "guest".to_string(), None, None)
                .await
        );
        assert_ok!(
            service
                .start_session(created.session_id, created.player_id, Some(created.token))
                .await
        );
        let handle = service.handle(&created.session_id).unwrap();
        wait_until(|| handle.status() == SessionStatus::Active).await;

        assert_ok!(service.leave_session(created.session_id, guest.player_id, Some(guest.token)).await);

        let registry = service.registry().clone();
        wait_until(|| registry.get(&created.session_id).is_none()).await;
        assert_eq!(handle.status(), SessionStatus::Ended);
        assert_eq!(
            service.get_session(&created.join_code).unwrap_err(),
            SessionError::NotFound
        );
    }
}
