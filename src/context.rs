use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::mapping::IssueMappingConfiguration;
use crate::services::ImsConnector;

/// Everything a command needs: settings, one connector and the mapping it
/// runs under.
#[derive(Clone)]
pub struct AppContext<C: IssueMappingConfiguration> {
    pub config: AppConfig,
    pub connector: Arc<dyn ImsConnector<Config = C>>,
    pub mapping: C,
}

impl<C: IssueMappingConfiguration> AppContext<C> {
    pub fn new(config: AppConfig, connector: Arc<dyn ImsConnector<Config = C>>, mapping: C) -> Self {
        Self {
            config,
            connector,
            mapping,
        }
    }
}
