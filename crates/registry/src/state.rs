use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tagarela_messaging::ServerIdentity;
use tracing::warn;

use crate::RegistryError;

/// The registry's server map plus its backing file.
///
/// The map only ever grows: a name, once ranked, keeps its rank for the
/// lifetime of the deployment, and dead servers are never removed (an
/// operator has to edit the file offline to retire one — a documented
/// limitation of rank-based election).
///
/// The whole map is rewritten to disk on every mutation. A torn or
/// missing file is treated as an empty registry; peers re-register on
/// their next heartbeat cycle, so at most the last pending write is lost.
#[derive(Debug)]
pub struct RegistryState {
    path: PathBuf,
    servers: BTreeMap<String, ServerIdentity>,
    next_rank: u32,
}

impl RegistryState {
    /// Load from `path`, starting empty if the file is absent or torn.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let servers = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, ServerIdentity>>(&content)
            {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "registry file unreadable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        let next_rank = servers.values().map(|s| s.rank).max().unwrap_or(0) + 1;

        Self {
            path,
            servers,
            next_rank,
        }
    }

    /// The full server map.
    pub fn servers(&self) -> &BTreeMap<String, ServerIdentity> {
        &self.servers
    }

    /// Rank for `name`, assigning the next free rank on first sight.
    /// Idempotent: repeat calls return the original rank.
    pub fn rank(&mut self, name: &str) -> Result<u32, RegistryError> {
        if let Some(identity) = self.servers.get(name) {
            return Ok(identity.rank);
        }

        let rank = self.next_rank;
        self.next_rank += 1;
        self.servers.insert(
            name.to_string(),
            ServerIdentity {
                rank,
                last_beat: unix_now(),
            },
        );
        self.save()?;
        Ok(rank)
    }

    /// Record a heartbeat for `name`. Unknown names are ignored — a
    /// heartbeat never auto-registers.
    pub fn heartbeat(&mut self, name: &str) -> Result<bool, RegistryError> {
        match self.servers.get_mut(name) {
            Some(identity) => {
                identity.last_beat = unix_now();
                self.save()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rewrite the backing file with the current map.
    fn save(&self) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.servers)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Seconds since the Unix epoch, as a float like the heartbeat wire format.
fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref_servers.json");
        (dir, path)
    }

    #[test]
    fn ranks_are_assigned_in_registration_order() {
        let (_dir, path) = scratch();
        let mut state = RegistryState::load(&path);

        assert_eq!(state.rank("srv1").unwrap(), 1);
        assert_eq!(state.rank("srv2").unwrap(), 2);
        assert_eq!(state.rank("srv3").unwrap(), 3);
    }

    #[test]
    fn rank_is_idempotent() {
        let (_dir, path) = scratch();
        let mut state = RegistryState::load(&path);

        assert_eq!(state.rank("srv1").unwrap(), 1);
        assert_eq!(state.rank("srv2").unwrap(), 2);
        assert_eq!(state.rank("srv1").unwrap(), 1);
        assert_eq!(state.servers().len(), 2);
    }

    #[test]
    fn ranks_survive_reload() {
        let (_dir, path) = scratch();
        {
            let mut state = RegistryState::load(&path);
            state.rank("srv1").unwrap();
            state.rank("srv2").unwrap();
        }

        let mut reloaded = RegistryState::load(&path);
        assert_eq!(reloaded.rank("srv1").unwrap(), 1);
        // A new name continues the sequence, never reusing a rank.
        assert_eq!(reloaded.rank("srv3").unwrap(), 3);
    }

    #[test]
    fn heartbeat_updates_known_servers_only() {
        let (_dir, path) = scratch();
        let mut state = RegistryState::load(&path);
        state.rank("srv1").unwrap();

        let before = state.servers()["srv1"].last_beat;
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert!(state.heartbeat("srv1").unwrap());
        assert!(state.servers()["srv1"].last_beat > before);

        assert!(!state.heartbeat("ghost").unwrap());
        assert!(!state.servers().contains_key("ghost"));
    }

    #[test]
    fn torn_file_starts_empty() {
        let (_dir, path) = scratch();
        std::fs::write(&path, "{\"srv1\": {\"rank\": 1, \"last_b").unwrap();

        let mut state = RegistryState::load(&path);
        assert!(state.servers().is_empty());
        assert_eq!(state.rank("srv1").unwrap(), 1);
    }

    #[test]
    fn missing_file_starts_empty() {
        let (_dir, path) = scratch();
        let state = RegistryState::load(&path);
        assert!(state.servers().is_empty());
    }
}
