//! JSON-backed registry of broadcast destinations (chat groups).

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::NotifyError;

/// One broadcast destination and its delivery state. Field names stay in
/// the registry file's original convention so existing files keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(rename = "ativo")]
    pub active: bool,
    #[serde(rename = "nome")]
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct DestinationRegistry {
    path: PathBuf,
}

impl DestinationRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// All known destinations keyed by chat id; a missing file is an empty
    /// registry.
    pub fn list(&self) -> Result<BTreeMap<String, Destination>, NotifyError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| NotifyError::RegistryRead {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Chat ids currently enabled for delivery.
    pub fn active_destinations(&self) -> Result<Vec<String>, NotifyError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|(_, destination)| destination.active)
            .map(|(chat_id, _)| chat_id)
            .collect())
    }

    /// Register a destination, or update its name when it already exists.
    /// New destinations start inactive unless `active` is set.
    pub fn add(
        &self,
        chat_id: &str,
        name: Option<&str>,
        active: bool,
    ) -> Result<(), NotifyError> {
        let mut destinations = self.list()?;
        match destinations.get_mut(chat_id) {
            Some(existing) => {
                if let Some(name) = name {
                    existing.name = name.to_string();
                }
            }
            None => {
                destinations.insert(
                    chat_id.to_string(),
                    Destination {
                        active,
                        name: name.unwrap_or("Grupo sem nome").to_string(),
                    },
                );
                info!(chat_id, active, "destination registered");
            }
        }
        self.save(&destinations)
    }

    /// Forget a destination entirely. Returns whether it existed.
    pub fn remove(&self, chat_id: &str) -> Result<bool, NotifyError> {
        let mut destinations = self.list()?;
        let existed = destinations.remove(chat_id).is_some();
        if existed {
            self.save(&destinations)?;
            info!(chat_id, "destination removed");
        } else {
            debug!(chat_id, "attempted to remove unknown destination");
        }
        Ok(existed)
    }

    /// Enable or disable delivery. Returns whether the destination exists.
    pub fn set_active(&self, chat_id: &str, active: bool) -> Result<bool, NotifyError> {
        let mut destinations = self.list()?;
        match destinations.get_mut(chat_id) {
            Some(destination) => {
                destination.active = active;
                self.save(&destinations)?;
                info!(chat_id, active, "destination delivery state changed");
                Ok(true)
            }
            None => {
                debug!(chat_id, "attempted to toggle unknown destination");
                Ok(false)
            }
        }
    }

    fn save(&self, destinations: &BTreeMap<String, Destination>) -> Result<(), NotifyError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| NotifyError::RegistryWrite {
                path: self.path.clone(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(destinations)?;
        fs::write(&self.path, json).map_err(|source| NotifyError::RegistryWrite {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, DestinationRegistry) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let registry = DestinationRegistry::new(tmp.path().join("grupos.json"));
        (tmp, registry)
    }

    #[test]
    fn missing_file_is_an_empty_registry() {
        let (_tmp, registry) = registry();
        assert!(registry.list().expect("list").is_empty());
        assert!(registry.active_destinations().expect("active").is_empty());
    }

    #[test]
    fn new_destinations_start_inactive_by_default() {
        let (_tmp, registry) = registry();
        registry.add("-100123", Some("Contabilidade"), false).expect("add");
        assert!(registry.active_destinations().expect("active").is_empty());

        assert!(registry.set_active("-100123", true).expect("activate"));
        assert_eq!(
            registry.active_destinations().expect("active"),
            vec!["-100123"]
        );
    }

    #[test]
    fn add_updates_name_without_touching_state() {
        let (_tmp, registry) = registry();
        registry.add("-100123", Some("Old"), true).expect("add");
        registry.add("-100123", Some("New"), false).expect("re-add");

        let destinations = registry.list().expect("list");
        let destination = &destinations["-100123"];
        assert_eq!(destination.name, "New");
        assert!(destination.active);
    }

    #[test]
    fn remove_reports_whether_the_destination_existed() {
        let (_tmp, registry) = registry();
        registry.add("-100123", None, true).expect("add");
        assert!(registry.remove("-100123").expect("remove"));
        assert!(!registry.remove("-100123").expect("remove again"));
    }

    #[test]
    fn registry_file_keeps_the_original_field_names() {
        let (_tmp, registry) = registry();
        registry.add("-100123", Some("Fiscal"), true).expect("add");
        let raw = std::fs::read_to_string(registry.path.clone()).expect("raw");
        assert!(raw.contains("\"ativo\""));
        assert!(raw.contains("\"nome\""));
    }
}
