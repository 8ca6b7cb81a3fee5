// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::read_to_string;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Fallible;

/// Session defaults, read from `drillstack.toml` when one exists in the
/// working directory. Every field has a default, so a missing file or a
/// partial file both work.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the curriculum server.
    pub server_url: String,
    /// Authenticated user id. Absent for phantom users, whose progress
    /// does not outlive the process.
    pub user_id: Option<String>,
    /// Directory holding the progress database.
    pub data_dir: PathBuf,
    /// Cards per practice stack.
    pub stack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            user_id: None,
            data_dir: PathBuf::from("."),
            stack_size: 8,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Fallible<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("drillstack.db")
    }
}

#[cfg(test)]
mod tests {
    use std::fs::write;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Path::new("./derpherp.toml")).unwrap();
        assert_eq!(config.server_url, "http://localhost:8000");
        assert_eq!(config.user_id, None);
        assert_eq!(config.stack_size, 8);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drillstack.toml");
        write(&path, "server_url = \"http://example.com\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.server_url, "http://example.com");
        assert_eq!(config.stack_size, 8);
    }

    #[test]
    fn test_full_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drillstack.toml");
        write(
            &path,
            "server_url = \"http://example.com\"\nuser_id = \"user-1\"\ndata_dir = \"/tmp\"\nstack_size = 3\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.user_id.as_deref(), Some("user-1"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/drillstack.db"));
        assert_eq!(config.stack_size, 3);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drillstack.toml");
        write(&path, "server_url = [not toml").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
