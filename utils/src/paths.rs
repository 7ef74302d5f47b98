use std::path::{Path, PathBuf};

/// Turns a path typed by a user (config value, CLI flag) into an absolute path, expanding
/// a leading `~` to the home directory.
pub fn normalized_path_from_user_string(path: impl AsRef<str>) -> PathBuf {
    let expanded = shellexpand::path::tilde(Path::new(path.as_ref()));
    let expanded_path = expanded.as_ref();

    std::path::absolute(expanded_path).unwrap_or_else(|_| expanded_path.to_path_buf())
}
