use std::path::PathBuf;

use recon_config::ReconConfig;
use utils::normalized_path_from_user_string;

#[derive(Clone, Debug, PartialEq)]
pub enum LoggingMode {
    Directory(PathBuf),
    File(PathBuf),
    Console,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub logging_mode: LoggingMode,
    pub use_json: bool,
    pub file_prefix: String,
    pub version: String,
    /// Console verbosity requested on the command line; `RUST_LOG` still wins.
    pub console_level: Option<String>,
}

impl LoggingConfig {
    /// Resolves the logging setup from the `log` config group.
    pub fn from_config(config: &ReconConfig, version: impl Into<String>) -> LoggingConfig {
        let logging_mode = match config.log.dest.as_deref() {
            None | Some("") => LoggingMode::Console,
            Some(log_dest) => {
                let path = normalized_path_from_user_string(log_dest);

                if log_dest.ends_with('/') || log_dest.ends_with('\\') || path.is_dir() {
                    LoggingMode::Directory(path)
                } else {
                    LoggingMode::File(path)
                }
            },
        };

        let use_json = match &config.log.format {
            Some(format) => format.trim().eq_ignore_ascii_case("json"),
            None => logging_mode != LoggingMode::Console,
        };

        Self {
            logging_mode,
            use_json,
            file_prefix: config.log.prefix.clone(),
            version: version.into(),
            console_level: None,
        }
    }

    pub fn with_console_level(mut self, level: impl Into<String>) -> Self {
        self.console_level = Some(level.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_console_when_dest_unset() {
        let cfg = LoggingConfig::from_config(&ReconConfig::default(), "test");
        assert_eq!(cfg.logging_mode, LoggingMode::Console);
        assert!(!cfg.use_json);
    }

    #[test]
    fn test_directory_and_file_modes() {
        let dir = tempdir().unwrap();

        let mut config = ReconConfig::default();
        config.log.dest = Some(dir.path().to_str().unwrap().to_owned());
        let cfg = LoggingConfig::from_config(&config, "test");
        assert_eq!(cfg.logging_mode, LoggingMode::Directory(dir.path().to_path_buf()));
        assert!(cfg.use_json);

        let file = dir.path().join("recon.log");
        config.log.dest = Some(file.to_str().unwrap().to_owned());
        config.log.format = Some("text".to_owned());
        let cfg = LoggingConfig::from_config(&config, "test");
        assert_eq!(cfg.logging_mode, LoggingMode::File(file));
        assert!(!cfg.use_json);
    }
}
