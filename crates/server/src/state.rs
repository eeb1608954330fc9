//! Shared application state

use std::sync::Arc;

use parking_lot::RwLock;
use voice_bridge_config::Settings;
use voice_bridge_core::AgentConnector;
use voice_bridge_transport::{CallControl, WsAgentConnector};

use crate::registry::SessionRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Configuration behind a lock for hot-reload support
    pub config: Arc<RwLock<Settings>>,
    /// Live media streams and call statuses
    pub registry: Arc<SessionRegistry>,
    /// Provider REST client
    pub call_control: Arc<CallControl>,
    /// Factory for agent backend sessions
    pub connector: Arc<dyn AgentConnector>,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        let call_control = Arc::new(CallControl::new(config.telephony.clone()));
        let connector = Arc::new(WsAgentConnector::new(
            config.agent.endpoint.clone(),
            config.agent.api_key.clone(),
        ));

        Self {
            config: Arc::new(RwLock::new(config)),
            registry: Arc::new(SessionRegistry::new()),
            call_control,
            connector,
        }
    }
}
