use crate::groups;

/// Prefix of every environment variable read by the configuration groups.
pub const ENV_PREFIX: &str = "RECON_";

/// All configuration groups.  `new()` applies environment overrides, `default()` does not.
#[derive(Debug, Clone, Default)]
pub struct ReconConfig {
    pub client: groups::client::ConfigValueGroup,
    pub session: groups::session::ConfigValueGroup,
    pub log: groups::log::ConfigValueGroup,
}

impl ReconConfig {
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.client.apply_env_overrides();
        self.session.apply_env_overrides();
        self.log.apply_env_overrides();
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client.endpoint = endpoint.into();
        self
    }
}
