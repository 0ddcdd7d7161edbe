use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tagarela_messaging::LamportClock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::logs::RecordLog;
use crate::ServerError;

/// Channels seeded into a fresh deployment.
const DEFAULT_CHANNELS: &[&str] = &["general", "random", "dev"];

/// On-disk shape of `registry.json`.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    channels: BTreeSet<String>,
    users: BTreeSet<String>,
}

/// The server's channel and user sets, persisted to `registry.json`.
///
/// Mutated only by the request loop; the replica listener treats
/// replicated records as log data, never as registry edits.
#[derive(Debug)]
pub struct ChannelRegistry {
    path: PathBuf,
    channels: BTreeSet<String>,
    users: BTreeSet<String>,
}

impl ChannelRegistry {
    /// Load from `path`. An absent or torn file is replaced with the
    /// seeded defaults, written synchronously before any request is
    /// served.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let path = path.into();
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<RegistryFile>(&content) {
                Ok(file) => {
                    return Ok(Self {
                        path,
                        channels: file.channels,
                        users: file.users,
                    })
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "registry file unreadable, reseeding");
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no registry file, seeding defaults");
            }
        }

        let registry = Self {
            path,
            channels: DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect(),
            users: BTreeSet::new(),
        };
        registry.save()?;
        Ok(registry)
    }

    pub fn channels(&self) -> Vec<String> {
        self.channels.iter().cloned().collect()
    }

    pub fn users(&self) -> Vec<String> {
        self.users.iter().cloned().collect()
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    pub fn has_user(&self, user: &str) -> bool {
        self.users.contains(user)
    }

    /// Add a channel and persist. The caller has already checked for
    /// duplicates and reserved names.
    pub fn insert_channel(&mut self, channel: &str) -> Result<(), ServerError> {
        self.channels.insert(channel.to_string());
        self.save()
    }

    /// Add a user and persist. Adding an existing user is a no-op
    /// (login is idempotent).
    pub fn insert_user(&mut self, user: &str) -> Result<(), ServerError> {
        if self.users.insert(user.to_string()) {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<(), ServerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = RegistryFile {
            channels: self.channels.clone(),
            users: self.users.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

/// State shared between a server's request loop and replica listener.
pub struct ServerCore {
    /// This server's unique name, stamped as `origin` on every record
    /// it produces.
    pub name: String,
    pub clock: LamportClock,
    pub registry: Mutex<ChannelRegistry>,
    pub publications: RecordLog,
    pub messages: RecordLog,
}

impl ServerCore {
    /// Open (or seed) all persistent state under `data_dir`.
    pub fn open(name: impl Into<String>, data_dir: impl AsRef<Path>) -> Result<Self, ServerError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        Ok(Self {
            name: name.into(),
            clock: LamportClock::new(),
            registry: Mutex::new(ChannelRegistry::load(data_dir.join("registry.json"))?),
            publications: RecordLog::open(data_dir.join("publications.jsonl"))?,
            messages: RecordLog::open(data_dir.join("messages.jsonl"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_registry_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ChannelRegistry::load(dir.path().join("registry.json")).unwrap();

        assert_eq!(registry.channels(), vec!["dev", "general", "random"]);
        assert!(registry.users().is_empty());
        // Seeding is written out before any request is served.
        assert!(dir.path().join("registry.json").exists());
    }

    #[test]
    fn mutations_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        {
            let mut registry = ChannelRegistry::load(&path).unwrap();
            registry.insert_channel("ops").unwrap();
            registry.insert_user("alice").unwrap();
        }

        let registry = ChannelRegistry::load(&path).unwrap();
        assert!(registry.has_channel("ops"));
        assert!(registry.has_user("alice"));
    }

    #[test]
    fn torn_registry_file_reseeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{\"channels\": [\"gen").unwrap();

        let registry = ChannelRegistry::load(&path).unwrap();
        assert!(registry.has_channel("general"));
        assert!(registry.users().is_empty());
    }

    #[test]
    fn insert_user_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ChannelRegistry::load(dir.path().join("registry.json")).unwrap();

        registry.insert_user("alice").unwrap();
        registry.insert_user("alice").unwrap();
        assert_eq!(registry.users(), vec!["alice"]);
    }

    #[test]
    fn core_opens_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let core = ServerCore::open("srv1", dir.path()).unwrap();

        assert_eq!(core.name, "srv1");
        assert!(dir.path().join("registry.json").exists());
        assert!(dir.path().join("publications.jsonl").exists());
        assert!(dir.path().join("messages.jsonl").exists());
    }
}
