pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod membership;
pub mod routes;

use std::sync::Arc;

use auth::Authenticator;
use config::Config;
use gateway::channels::ChannelRegistry;
use gateway::dispatcher::LiveUpdateDispatcher;
use membership::ProjectMembership;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub channels: Arc<ChannelRegistry>,
    pub dispatcher: LiveUpdateDispatcher,
    pub authenticator: Arc<dyn Authenticator>,
    pub membership: Arc<dyn ProjectMembership>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        membership: Arc<dyn ProjectMembership>,
    ) -> Self {
        let channels = Arc::new(ChannelRegistry::new());
        Self {
            config: Arc::new(config),
            dispatcher: LiveUpdateDispatcher::new(Arc::clone(&channels)),
            channels,
            authenticator,
            membership,
        }
    }
}
