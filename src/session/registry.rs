//! In-memory index of running sessions

use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::relay::Relay;
use crate::ws::protocol::PlayerId;

use super::model::{normalize_join_code, Session, SessionStatus};

/// Handle to a running session host
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub session: Arc<RwLock<Session>>,
    pub relay: Relay,
    /// Every player ever admitted (kept after leaving, for reconnect)
    pub members: Arc<DashSet<PlayerId>>,
    /// Connected players, bots included
    pub player_count: Arc<AtomicUsize>,
    /// Secret handed to each admitted player, required to act as them later
    pub tokens: Arc<DashMap<PlayerId, Uuid>>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> SessionStatus {
        self.session.read().status
    }

    pub fn is_member(&self, player_id: &PlayerId) -> bool {
        self.members.contains(player_id)
    }

    /// The player's token, minted on first admission
    pub fn issue_token(&self, player_id: PlayerId) -> Uuid {
        *self.tokens.entry(player_id).or_insert_with(Uuid::new_v4)
    }

    pub fn verify_token(&self, player_id: &PlayerId, token: Option<Uuid>) -> bool {
        match (token, self.tokens.get(player_id)) {
            (Some(given), Some(issued)) => given == *issued,
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Session {
        self.session.read().clone()
    }
}

/// Registry of all sessions hosted by this process
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
    codes: DashMap<String, Uuid>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            codes: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn get_by_code(&self, code: &str) -> Option<SessionHandle> {
        let id = *self.codes.get(&normalize_join_code(code))?;
        self.get(&id)
    }

    /// Whether a join code is already taken by a live session
    pub fn code_in_use(&self, code: &str) -> bool {
        self.codes.contains_key(code)
    }

    pub fn insert(&self, handle: SessionHandle) {
        let code = handle.session.read().join_code.clone();
        self.codes.insert(code, handle.id);
        self.sessions.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        let (_, handle) = self.sessions.remove(id)?;
        let code = handle.session.read().join_code.clone();
        self.codes.remove(&code);
        Some(handle)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_players(&self) -> usize {
        self.sessions
            .iter()
            .map(|s| s.value().player_count())
            .sum()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::game::state::initial_zone;
    use std::time::Duration;

    fn handle() -> SessionHandle {
        let session = Session::new(
            Uuid::new_v4(),
            8,
            initial_zone(&Tuning::default()),
            chrono::Duration::hours(2),
        );
        let (relay, _) = Relay::new(session.id, Duration::from_secs(5));
        SessionHandle {
            id: session.id,
            session: Arc::new(RwLock::new(session)),
            relay,
            members: Arc::new(DashSet::new()),
            player_count: Arc::new(AtomicUsize::new(3)),
            tokens: Arc::new(DashMap::new()),
        }
    }

    #[test]
    fn lookup_by_code_is_case_insensitive() {
        let registry = SessionRegistry::new();
        let handle = handle();
        let code = handle.session.read().join_code.clone();
        registry.insert(handle.clone());

        let found = registry.get_by_code(&code.to_lowercase()).unwrap();
        assert_eq!(found.id, handle.id);
        assert_eq!(registry.total_players(), 3);
    }

    #[test]
    fn remove_frees_the_code() {
        let registry = SessionRegistry::new();
        let handle = handle();
        let code = handle.session.read().join_code.clone();
        registry.insert(handle.clone());

        assert!(registry.remove(&handle.id).is_some());
        assert!(!registry.code_in_use(&code));
        assert!(registry.get_by_code(&code).is_none());
        assert_eq!(registry.active_sessions(), 0);
    }

    #[test]
    fn tokens_are_stable_per_player() {
        let handle = handle();
        let player = Uuid::new_v4();
        let token = handle.issue_token(player);

        assert_eq!(handle.issue_token(player), token);
        assert!(handle.verify_token(&player, Some(token)));
        assert!(!handle.verify_token(&player, None));
        assert!(!handle.verify_token(&player, Some(Uuid::new_v4())));
        assert!(!handle.verify_token(&Uuid::new_v4(), Some(token)));
    }
}
