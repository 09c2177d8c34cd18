//! Serde model of an already-parsed job definition.
//!
//! The engine reads only the replicate count and input identity of each
//! entry; `options` is carried through to templates untouched.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDefinition {
    pub jobs: Vec<JobEntry>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEntry {
    #[serde(default)]
    pub nstruct: Option<u64>,
    #[serde(default)]
    pub input: InputSpec,
    /// Output tag; defaults to the input resource name.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub options: serde_json::Value,
}

impl JobEntry {
    pub fn inline(resource: impl Into<String>, nstruct: u64) -> Self {
        let input = InputSpec::Inline {
            resource: resource.into(),
        };
        Self::with_input(input, nstruct)
    }

    pub fn pool(resource: impl Into<String>, nstruct: u64) -> Self {
        let input = InputSpec::Pool {
            resource: resource.into(),
        };
        Self::with_input(input, nstruct)
    }

    fn with_input(input: InputSpec, nstruct: u64) -> Self {
        Self {
            nstruct: Some(nstruct),
            input,
            tag: None,
            label: None,
            options: serde_json::Value::Null,
        }
    }
}

/// Where a job entry's input comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSpec {
    /// Declared inside the job entry; never shared with another entry.
    Inline { resource: String },
    /// Loaded once from the shared pool; entries naming the same resource share it.
    Pool { resource: String },
    #[default]
    Missing,
}

/// `node` may only be enumerated once `depends_on` has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub node: u64,
    pub depends_on: u64,
}

impl JobDefinition {
    pub fn new(jobs: Vec<JobEntry>) -> Self {
        Self {
            jobs,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, node: u64, depends_on: u64) -> Self {
        self.dependencies.push(Dependency { node, depends_on });
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let def: JobDefinition = serde_json::from_str(json)?;
        def.validate()?;
        Ok(def)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(EngineError::InvalidDefinition(
                "at least one job entry is required".to_string(),
            ));
        }
        for (i, entry) in self.jobs.iter().enumerate() {
            if entry.nstruct == Some(0) {
                return Err(EngineError::InvalidDefinition(format!(
                    "job entry {} declares nstruct = 0",
                    i + 1
                )));
            }
        }
        let n = self.jobs.len() as u64;
        for dep in &self.dependencies {
            if dep.node == 0 || dep.node > n || dep.depends_on == 0 || dep.depends_on > n {
                return Err(EngineError::InvalidDefinition(format!(
                    "dependency {} -> {} names a job entry that does not exist",
                    dep.depends_on, dep.node
                )));
            }
        }
        Ok(())
    }
}
