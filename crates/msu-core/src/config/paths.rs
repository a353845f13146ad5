//! Standard locations for configuration files

use std::path::PathBuf;

/// Directory name under the platform config dir
const APP_DIR_NAME: &str = "msu-prep";

/// Get the configuration directory
///
/// Returns: `{config_dir}/msu-prep` (e.g. `~/.config/msu-prep` on Linux),
/// falling back to `./msu-prep` when the platform has no config dir.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Get the default config file path
///
/// Returns: `{config_dir}/msu-prep/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_app_name() {
        assert!(default_config_dir().ends_with(APP_DIR_NAME));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("test.yaml");
        assert!(path.ends_with("test.yaml"));
        assert!(path.parent().is_some_and(|p| p.ends_with(APP_DIR_NAME)));
    }
}
