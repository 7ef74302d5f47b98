pub mod groups;
pub mod macros;
mod recon_config;

// Re-exported for use in the config_group macro.
pub use utils::configuration_utils::ParsableConfigValue;
pub use recon_config::{ReconConfig, ENV_PREFIX};
