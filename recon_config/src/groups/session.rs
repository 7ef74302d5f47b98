use std::time::Duration;

crate::config_group!({

    /// Delay between two status polls while a job is processing.
    ///
    /// Use the environment variable `RECON_SESSION_POLL_INTERVAL` to set this value.
    ref poll_interval : Duration = Duration::from_secs(3);

    /// Delay before the next poll after a failed status fetch.
    ref poll_error_delay : Duration = Duration::from_secs(10);

    /// Minimum number of images a batch needs before it may be uploaded.
    ref min_images : usize = 3;
});
