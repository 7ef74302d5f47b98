//! Small helpers to log an error at the call site and keep going.
//!
//! ```ignore
//! use error_printer::ErrorPrinter;
//!
//! let _ = client.delete_session(&id).await.warn_error("remote delete failed");
//! ```

use std::fmt::{Debug, Display};
use std::panic::Location;

use tracing::{debug, error, info, warn};

/// Logs the error of a `Result`, returning the `Result` unchanged.
pub trait ErrorPrinter {
    fn log_error<M: Display>(self, message: M) -> Self;

    fn warn_error<M: Display>(self, message: M) -> Self;

    fn info_error<M: Display>(self, message: M) -> Self;

    fn debug_error<M: Display>(self, message: M) -> Self;
}

impl<T, E: Debug> ErrorPrinter for Result<T, E> {
    #[track_caller]
    fn log_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = Location::caller();
            error!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }

    #[track_caller]
    fn warn_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = Location::caller();
            warn!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }

    #[track_caller]
    fn info_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = Location::caller();
            info!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }

    #[track_caller]
    fn debug_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = Location::caller();
            debug!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn test_warn_error_logs_only_errors() {
        let ok: Result<u32, String> = Ok(1);
        assert_eq!(ok.warn_error("should not appear"), Ok(1));
        assert!(!logs_contain("should not appear"));

        let err: Result<u32, String> = Err("boom".to_owned());
        assert!(err.warn_error("status fetch failed").is_err());
        assert!(logs_contain("status fetch failed"));
        assert!(logs_contain("boom"));
    }
}
