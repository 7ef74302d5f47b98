use std::time::Duration;

crate::config_group!({

    /// Base URL of the reconstruction service.  Relative model URLs are resolved against it.
    ///
    /// Use the environment variable `RECON_CLIENT_ENDPOINT` to set this value.
    ref endpoint : String = "http://localhost:5000".to_string();

    /// Timeout for the multipart image upload.  The service may process small jobs
    /// synchronously, so this is minutes-scale.
    ref upload_timeout : Duration = Duration::from_secs(10 * 60);

    /// Timeout for the start-reconstruction call.
    ref start_timeout : Duration = Duration::from_secs(10 * 60);

    /// Timeout for a single status poll.
    ref poll_timeout : Duration = Duration::from_secs(60);

    /// Timeout for everything else (results, model info, delete, downloads).
    ref request_timeout : Duration = Duration::from_secs(30);

    /// Cleanup idle connections that are unused for this amount of time.
    ref idle_connection_timeout : Duration = Duration::from_secs(60);

    /// User agent sent with every request.
    ref user_agent : String = concat!("recon/", env!("CARGO_PKG_VERSION")).to_string();
});
