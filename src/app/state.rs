//! Application state shared across routes

use std::sync::Arc;

use crate::catalog::SongCatalog;
use crate::config::Config;
use crate::engine::{MatchController, MatchHandle, MatchRules};
use crate::fetch::arcapi::ArcApiClient;
use crate::session::{MemorySessionStore, SessionStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<SongCatalog>,
    pub sessions: Arc<dyn SessionStore>,
    pub match_handle: MatchHandle,
}

impl AppState {
    pub fn new(config: Config, catalog: SongCatalog) -> Self {
        let config = Arc::new(config);
        let catalog = Arc::new(catalog);

        // Initialize score API client
        let fetcher = ArcApiClient::new(&config);

        // Initialize session history store
        let sessions: Arc<dyn SessionStore> = MemorySessionStore::shared();

        // Spawn the match controller task
        let rules = MatchRules {
            max_concurrent_polls: config.max_concurrent_polls,
            ..MatchRules::default()
        };
        let match_handle =
            MatchController::spawn(fetcher, catalog.clone(), sessions.clone(), rules);

        Self {
            config,
            catalog,
            sessions,
            match_handle,
        }
    }
}
