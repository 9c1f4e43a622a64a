//! Session metadata shared between the host runtime and the HTTP layer

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::{PlayerId, ZoneState};

/// Join codes avoid look-alike characters (0/O, 1/I/L)
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const JOIN_CODE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Lobby,
    Active,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub join_code: String,
    pub host_id: PlayerId,
    pub status: SessionStatus,
    pub max_players: usize,
    pub zone: ZoneState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(host_id: PlayerId, max_players: usize, zone: ZoneState, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            join_code: generate_join_code(&mut rand::thread_rng()),
            host_id,
            status: SessionStatus::Lobby,
            max_players,
            zone,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub fn generate_join_code<R: Rng>(rng: &mut R) -> String {
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.gen_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalize user-typed codes before lookup
pub fn normalize_join_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
