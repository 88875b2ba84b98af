//! Where recommend stores its own data (config, datasets).
//!
//! Crawled pages are never cached here. Only the config file and the merged
//! datasets written by `run` live in this directory.

use std::path::PathBuf;

/// File name of the merged dataset written by `run` when no output is given.
pub const DATASET_FILENAME: &str = "brand_dataset.json";

/// Returns the directory where recommend stores config and datasets.
/// On Linux: `~/.local/share/recommend/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("jp", "re-commend", "recommend")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Default location of the merged dataset.
pub fn default_dataset_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(DATASET_FILENAME))
}
