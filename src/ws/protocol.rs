//! Relay protocol message definitions
//! These are the payload types exchanged between clients and the session host

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable per-session player identifier
pub type PlayerId = Uuid;

/// Loot item identifier (unique per session)
pub type LootId = Uuid;

/// 2D vector used for positions and velocities
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Self) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Messages sent from a client to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Ask the host to admit (or re-admit) a player
    JoinRequest {
        request_id: Uuid,
        display_name: String,
        /// Present when reconnecting to an existing player record
        player_id: Option<PlayerId>,
    },

    /// Host player starts the match
    StartMatch,

    /// Claimed movement for the sender
    PositionUpdate {
        position: Vec2,
        rotation: f32,
        velocity: Vec2,
    },

    /// Melee attack toward an aim point
    AttackRequest {
        /// Weapon the client believes is equipped (informational only)
        weapon_id: String,
        aim_x: f32,
        aim_y: f32,
        is_special: bool,
    },

    /// Pick up a loot item
    PickupRequest { loot_id: LootId },

    /// Request a full loot list
    LootSyncRequest,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the session (record kept for reconnection)
    Leave,
}

/// Messages sent from the host to every client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        player_id: PlayerId,
        server_time: u64,
    },

    /// Answer to a `join_request`
    JoinAck {
        request_id: Uuid,
        result: JoinResult,
    },

    /// Player joined (or reconnected to) the session
    PlayerJoined { player: PlayerInfo },

    /// Player left the session
    PlayerLeft { player_id: PlayerId, reason: String },

    /// Match has started; every player's spawn state
    MatchStarted {
        players: Vec<PlayerInfo>,
        zone: ZoneState,
    },

    /// Batched accepted movement (sent at a fixed interval)
    PositionBroadcast {
        /// Host clock at send time
        sent_at: u64,
        updates: Vec<PositionEntry>,
    },

    /// Host-owned field changes, batched per resolution step
    PlayerUpdates { updates: Vec<PlayerDelta> },

    /// Player health reached zero
    PlayerDeath {
        victim_id: PlayerId,
        /// `None` for zone deaths
        killer_id: Option<PlayerId>,
    },

    /// Match is over
    GameOver {
        winner_id: Option<PlayerId>,
        stats: Vec<PlayerStat>,
    },

    /// New loot on the ground
    LootSpawned { item: LootItem },

    /// Loot picked up and removed from the world
    LootPickedUp { loot_id: LootId, player_id: PlayerId },

    /// Full loot list
    LootSync { items: Vec<LootItem> },

    /// Conflict zone changed phase
    ZoneUpdate { zone: ZoneState },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Outcome of a join request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinResult {
    Accepted { player_id: PlayerId, is_host: bool },
    Rejected { reason: JoinRejection },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinRejection {
    Full,
    NotJoinable,
}

/// Player info for lobby/join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub display_name: String,
    pub is_host: bool,
    pub is_bot: bool,
    pub position: Vec2,
    /// `None` until the player has spawned
    pub health: Option<f32>,
    pub equipped_weapon: String,
    pub equipped_armor: Option<String>,
}

/// One player's accepted movement inside a `position_broadcast`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub player_id: PlayerId,
    pub position: Vec2,
    pub rotation: f32,
    pub velocity: Vec2,
    /// Host receive time; interpolation orders samples by this
    pub timestamp: u64,
}

/// Changed host-owned fields for one player
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerDelta {
    pub player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stun_until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipped_weapon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipped_armor: Option<String>,
}

impl PlayerDelta {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            ..Self::default()
        }
    }
}

/// Kind of item a loot pickup grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LootKind {
    Weapon,
    Armor,
}

/// Loot lying in the world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootItem {
    pub id: LootId,
    #[serde(rename = "type")]
    pub kind: LootKind,
    pub item_id: String,
    pub x: f32,
    pub y: f32,
}

impl LootItem {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Conflict zone (shrinking safe area) state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub center_x: f32,
    pub center_y: f32,
    /// Current zone radius
    pub radius: f32,
    /// Current shrink phase (0 = initial, increases each shrink)
    pub phase: u32,
    /// Damage per second outside the zone at this phase
    pub damage_per_second: f32,
}

impl ZoneState {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.center_x, self.center_y)
    }
}

/// Per-player line of the game-over statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStat {
    pub player_id: PlayerId,
    pub name: String,
    pub kills: u32,
    pub is_bot: bool,
}
