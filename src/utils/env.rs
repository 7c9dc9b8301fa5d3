// src/utils/env.rs

use log::{info, warn};
use std::path::Path;

/// Loads environment variables from the first .env file found.
///
/// Variables already set in the process environment always win; the file only
/// fills in the gaps. A missing file is not an error.
pub fn load_env() {
    let env_paths = [".env", ".env.local", "../.env"];
    let mut loaded_env = false;
    for path in env_paths.iter() {
        if Path::new(path).exists() {
            match dotenv::from_path(path) {
                Ok(()) => {
                    info!("Loaded environment variables from {}", path);
                    loaded_env = true;
                    break;
                }
                Err(e) => {
                    warn!("Failed to load environment from {}: {}", path, e);
                }
            }
        }
    }
    if !loaded_env {
        info!("No .env file found, using environment variables from system");
    }
}
