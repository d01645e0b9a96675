//! Locating the alignment tool executables.

use crate::config::Config;
use crate::error::{Result, WgaError};
use crate::tool::AlignmentTool;
use std::path::PathBuf;

/// Find the executable for `tool`.
///
/// Search order:
/// 1. Explicit override in the configuration
/// 2. Same directory as the current executable (bundled installs)
/// 3. System PATH
pub fn find_binary(tool: AlignmentTool, config: &Config) -> Result<PathBuf> {
    let name = tool.program();

    // 1. Configured path wins, but it has to exist
    if let Some(path) = config.binary_overrides.get(&tool) {
        if path.exists() {
            return Ok(path.clone());
        }
        log::warn!("Configured {name} binary {} does not exist", path.display());
        return Err(WgaError::BinaryNotFound(path.display().to_string()));
    }

    // 2. Next to our own executable
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let binary = exe_dir.join(name);
            if binary.is_file() {
                return Ok(binary);
            }
        }
    }

    // 3. PATH
    if let Ok(path) = which::which(name) {
        return Ok(path);
    }

    Err(WgaError::BinaryNotFound(name.to_string()))
}
