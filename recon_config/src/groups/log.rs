crate::config_group!({

    /// The log destination.  If unset or empty, logs go to the console.
    ///
    /// If this path exists as a directory or ends with a /, a timestamped log file is created in
    /// that directory; otherwise it is used as the log file path.
    ///
    /// Use the environment variable `RECON_LOG_DEST` to set this value.
    ref dest : Option<String> = None;

    /// "json" or "text".  By default files get json and the console gets text.
    ref format : Option<String> = None;

    /// Base name of log files created in a log directory.
    ref prefix : String = "recon".to_string();
});
