//! Persistence of custom scenarios
//!
//! The generator only talks to the [`ScenarioStore`] trait; two stores are
//! provided: an in-process map and a directory of `<name>.json` files.

use crate::error::{Result, RiskError};
use crate::scenario::Scenario;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage collaborator for user-defined scenarios
pub trait ScenarioStore: Send + Sync {
    /// Save a scenario, replacing any scenario with the same name
    fn save(&self, scenario: &Scenario) -> Result<()>;

    /// Load a scenario by name; `Ok(None)` when it does not exist
    fn load(&self, name: &str) -> Result<Option<Scenario>>;

    /// Names of all stored scenarios, sorted
    fn list(&self) -> Result<Vec<String>>;
}

/// Scenario store backed by a map
#[derive(Debug, Default)]
pub struct InMemoryScenarioStore {
    scenarios: RwLock<BTreeMap<String, Scenario>>,
}

impl InMemoryScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scenarios.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.read().is_empty()
    }
}

impl ScenarioStore for InMemoryScenarioStore {
    fn save(&self, scenario: &Scenario) -> Result<()> {
        self.scenarios
            .write()
            .insert(scenario.name().to_string(), scenario.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Scenario>> {
        Ok(self.scenarios.read().get(name).cloned())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.scenarios.read().keys().cloned().collect())
    }
}

/// Scenario store writing one pretty-printed JSON file per scenario
#[derive(Debug, Clone)]
pub struct JsonDirScenarioStore {
    dir: PathBuf,
}

impl JsonDirScenarioStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(|c: char| matches!(c, '/' | '\\'))
        {
            return Err(RiskError::Storage(format!(
                "Scenario name cannot be used as a file name: {:?}",
                name
            )));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

impl ScenarioStore for JsonDirScenarioStore {
    fn save(&self, scenario: &Scenario) -> Result<()> {
        let path = self.path_for(scenario.name())?;
        let json = serde_json::to_string_pretty(scenario)?;
        fs::write(&path, json)?;

        debug!(scenario = scenario.name(), path = %path.display(), "Scenario saved");
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Scenario>> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        let scenario: Scenario = serde_json::from_str(&contents)?;

        if scenario.name() != name {
            return Err(RiskError::Storage(format!(
                "{} holds scenario '{}'",
                path.display(),
                scenario.name()
            )));
        }

        Ok(Some(scenario))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
