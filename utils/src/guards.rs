use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Sets an environment variable for the lifetime of the guard, restoring the previous value
/// (or removing the variable) on drop.
///
/// Env mutation is process-global; tests using this should be marked `#[serial]`.
///
/// ```no_run
/// use utils::EnvVarGuard;
///
/// let _guard = EnvVarGuard::set("RECON_SESSION_POLL_INTERVAL", "1s");
/// ```
pub struct EnvVarGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvVarGuard {
    pub fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
        let prev = env::var(key).ok();
        unsafe {
            env::set_var(key, value);
        }
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.prev {
                Some(v) => env::set_var(self.key, v),
                None => env::remove_var(self.key),
            }
        }
    }
}

/// Changes the working directory until dropped.  Failing to restore on drop is ignored.
pub struct CwdGuard {
    prev: PathBuf,
}

impl CwdGuard {
    pub fn set(new_dir: &Path) -> std::io::Result<Self> {
        let prev = env::current_dir()?;
        env::set_current_dir(new_dir)?;
        Ok(Self { prev })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.prev);
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::tempdir;

    use super::*;

    #[test]
    #[serial(default_config_env)]
    fn env_var_guard_restores_previous_value() {
        let key = "RECON_TEST_GUARD_RESTORE";
        let _outer = EnvVarGuard::set(key, "initial");

        {
            let _guard = EnvVarGuard::set(key, "temporary");
            assert_eq!(env::var(key).unwrap(), "temporary");
        }

        assert_eq!(env::var(key).unwrap(), "initial");
    }

    #[test]
    #[serial(default_config_env)]
    fn env_var_guard_removes_fresh_variable() {
        let key = "RECON_TEST_GUARD_FRESH";
        assert!(env::var(key).is_err());

        {
            let _guard = EnvVarGuard::set(key, "temporary");
            assert!(env::var(key).is_ok());
        }

        assert!(env::var(key).is_err());
    }

    #[test]
    #[serial(default_config_env)]
    fn cwd_guard_restores_directory() {
        let tmp = tempdir().unwrap();
        let original_dir = env::current_dir().unwrap();

        {
            let _guard = CwdGuard::set(tmp.path()).unwrap();
            assert_eq!(env::current_dir().unwrap(), tmp.path().canonicalize().unwrap());
        }

        assert_eq!(env::current_dir().unwrap(), original_dir);
    }

    #[test]
    fn cwd_guard_reports_missing_directory() {
        assert!(CwdGuard::set(Path::new("/nonexistent/recon/path")).is_err());
    }
}
