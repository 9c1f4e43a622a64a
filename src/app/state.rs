//! Application state shared across routes

use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::session::{SessionRegistry, SessionService};
use crate::store::{SessionStore, SupabaseClient};
use crate::util::rate_limit::{create_limiter, Limiter, SESSION_API_RATE_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionService>,
    pub registry: Arc<SessionRegistry>,
    /// Guards session create/join
    pub api_limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let store = match &config.store {
            Some(store_config) => SessionStore::new(Some(SupabaseClient::new(store_config))),
            None => {
                warn!("SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY not set, session persistence disabled");
                SessionStore::disabled()
            }
        };

        let registry = Arc::new(SessionRegistry::new());
        let sessions = Arc::new(SessionService::new(
            registry.clone(),
            store,
            config.tuning.clone(),
        ));

        Self {
            config,
            sessions,
            registry,
            api_limiter: create_limiter(SESSION_API_RATE_LIMIT),
        }
    }
}
