#![cfg_attr(feature = "strict", deny(warnings))]

pub mod configuration_utils;
pub use configuration_utils::ParsableConfigValue;

mod guards;
pub use guards::{CwdGuard, EnvVarGuard};

mod paths;
pub use paths::normalized_path_from_user_string;
