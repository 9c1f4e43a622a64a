//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated, `*` for any)
    pub client_origin: String,

    /// Session store credentials; `None` disables persistence
    pub store: Option<StoreConfig>,

    /// Gameplay tuning shared by every session
    pub tuning: Tuning,
}

/// Credentials for the relational session store
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase service role key (bypasses RLS - server only!)
    pub service_role_key: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let store = match (env::var("SUPABASE_URL"), env::var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Ok(supabase_url), Ok(service_role_key)) => Some(StoreConfig {
                supabase_url,
                service_role_key,
            }),
            _ => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            store,
            tuning: Tuning::from_env()?,
        })
    }
}

/// Gameplay constants. Times are milliseconds, distances world units.
#[derive(Clone, Debug)]
pub struct Tuning {
    pub world_width: f32,
    pub world_height: f32,
    pub default_max_players: usize,
    /// Largest accepted displacement between two position updates
    pub max_displacement: f32,

    pub interpolation_capacity: usize,
    pub interpolation_delay_ms: u64,
    pub max_extrapolation_ms: u64,

    pub cooldown_jitter_ms: u64,
    pub special_cooldown_ms: u64,
    pub hitbox_radius: f32,
    pub victory_delay_ms: u64,

    pub zone_tick_ms: u64,
    pub zone_base_dps: f32,

    pub pickup_radius: f32,
    pub initial_loot_count: usize,

    pub join_ack_timeout_ms: u64,
    pub session_ttl_secs: i64,

    pub default_bot_count: usize,
    pub bot_speed: f32,
    pub bot_pickup_interval_ms: u64,
    pub bot_wander_interval_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            world_width: 2000.0,
            world_height: 2000.0,
            default_max_players: 8,
            max_displacement: 150.0,

            interpolation_capacity: 20,
            interpolation_delay_ms: 100,
            max_extrapolation_ms: 250,

            cooldown_jitter_ms: 50,
            special_cooldown_ms: 5000,
            hitbox_radius: 20.0,
            victory_delay_ms: 3000,

            zone_tick_ms: 500,
            zone_base_dps: 5.0,

            pickup_radius: 60.0,
            initial_loot_count: 12,

            join_ack_timeout_ms: 5000,
            session_ttl_secs: 2 * 60 * 60,

            default_bot_count: 0,
            bot_speed: 180.0,
            bot_pickup_interval_ms: 500,
            bot_wander_interval_ms: 2000,
        }
    }
}

impl Tuning {
    /// Defaults with individual overrides from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut tuning = Self::default();
        override_from_env("MAX_PLAYERS", &mut tuning.default_max_players)?;
        override_from_env("MAX_DISPLACEMENT", &mut tuning.max_displacement)?;
        override_from_env("INTERPOLATION_DELAY_MS", &mut tuning.interpolation_delay_ms)?;
        override_from_env("VICTORY_DELAY_MS", &mut tuning.victory_delay_ms)?;
        override_from_env("JOIN_ACK_TIMEOUT_MS", &mut tuning.join_ack_timeout_ms)?;
        override_from_env("BOT_COUNT", &mut tuning.default_bot_count)?;
        Ok(tuning)
    }
}

fn override_from_env<T: FromStr>(key: &'static str, slot: &mut T) -> Result<(), ConfigError> {
    if let Ok(raw) = env::var(key) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::Invalid(key))?;
    }
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_rejects_garbage() {
        env::set_var("MELEE_TEST_TUNING_KNOB", "not-a-number");
        let mut slot = 5u64;
        let err = override_from_env("MELEE_TEST_TUNING_KNOB", &mut slot).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("MELEE_TEST_TUNING_KNOB")));
        assert_eq!(slot, 5);
    }

    #[test]
    fn override_applies_value() {
        env::set_var("MELEE_TEST_TUNING_OK", " 42 ");
        let mut slot = 5usize;
        override_from_env("MELEE_TEST_TUNING_OK", &mut slot).unwrap();
        assert_eq!(slot, 42);
    }
}
