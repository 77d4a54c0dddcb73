//! Pipeline and stage definition structs with load-time validation.

use crate::core::ArtifactKind;
use crate::engine::RetryPolicy;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Deployment environment a pipeline targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment.
    Dev,
    /// Production environment. Deployments default to requiring approval.
    Prod,
}

impl Environment {
    /// Returns the lowercase name of the environment.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => Err(ConfigError::new(format!(
                "unknown environment '{other}', expected one of: dev, prod"
            ))),
        }
    }
}

/// The unit of work a stage asks the provider to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageAction {
    /// Check out a source revision. Produces a source tree.
    FetchSource {
        /// Repository owner.
        owner: String,
        /// Repository name.
        repo: String,
        /// Branch to fetch.
        branch: String,
    },
    /// Run a build over the input payload. Produces a build output.
    RunBuild {
        /// Commands executed in order.
        commands: Vec<String>,
        /// Environment variables passed to the build.
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// Apply the input payload to a deployment target.
    ApplyDeployment {
        /// The environment to deploy into.
        target: Environment,
        /// Whether the provider must obtain approval before applying.
        require_approval: bool,
    },
}

fn default_timeout_ms() -> u64 {
    60_000
}

/// Definition of one stage. Immutable after pipeline construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage name within the pipeline.
    pub name: String,
    /// What the stage asks the provider to do.
    pub action: StageAction,
    /// Names of stages that must succeed before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Artifact kinds this stage consumes.
    #[serde(default)]
    pub inputs: Vec<ArtifactKind>,
    /// Artifact kind this stage produces.
    pub output: ArtifactKind,
    /// Retry settings for this stage.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Deadline for a single attempt, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl StageConfig {
    /// Creates a stage with default retry and timeout settings.
    #[must_use]
    pub fn new(name: impl Into<String>, action: StageAction, output: ArtifactKind) -> Self {
        Self {
            name: name.into(),
            action,
            depends_on: Vec::new(),
            inputs: Vec::new(),
            output,
            retry: RetryPolicy::default(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Adds a dependency edge.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    /// Declares an input artifact kind.
    #[must_use]
    pub fn with_input(mut self, kind: ArtifactKind) -> Self {
        self.inputs.push(kind);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-attempt deadline.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A named, ordered pipeline definition.
///
/// Validated once at load; the engine only accepts validated configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Unique pipeline name. Single-flight execution is keyed on this.
    pub name: String,
    /// The environment this pipeline targets.
    pub environment: Environment,
    /// The stages, in declaration order.
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    /// Creates a pipeline definition. Call [`validate`](Self::validate)
    /// before handing it to the engine.
    #[must_use]
    pub fn new(name: impl Into<String>, environment: Environment) -> Self {
        Self {
            name: name.into(),
            environment,
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    /// Parses and validates a definition from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::new(format!("malformed pipeline definition: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a definition from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::new(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Validates the definition.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an empty or whitespace-only pipeline
    /// name, an empty stage list, duplicate stage names, unknown or
    /// self-referential dependencies, dependency cycles, input kinds no
    /// dependency produces, or a zero `max_attempts`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::new("pipeline name cannot be empty"));
        }
        if self.stages.is_empty() {
            return Err(ConfigError::new(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(ConfigError::new(format!(
                    "pipeline '{}' contains a stage with an empty name",
                    self.name
                )));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::new(format!(
                    "duplicate stage name '{}'",
                    stage.name
                ))
                .with_stages(vec![stage.name.clone()]));
            }
            if stage.retry.max_attempts == 0 {
                return Err(ConfigError::new(format!(
                    "stage '{}' has max_attempts = 0; at least one attempt is required",
                    stage.name
                ))
                .with_stages(vec![stage.name.clone()]));
            }
        }

        let by_name: HashMap<&str, &StageConfig> =
            self.stages.iter().map(|s| (s.name.as_str(), s)).collect();

        for stage in &self.stages {
            for dep in &stage.depends_on {
                if dep == &stage.name {
                    return Err(ConfigError::new(format!(
                        "stage '{}' cannot depend on itself",
                        stage.name
                    ))
                    .with_stages(vec![stage.name.clone()]));
                }
                if !by_name.contains_key(dep.as_str()) {
                    return Err(ConfigError::new(format!(
                        "stage '{}' depends on unknown stage '{dep}'",
                        stage.name
                    ))
                    .with_stages(vec![stage.name.clone(), dep.clone()]));
                }
            }

            for kind in &stage.inputs {
                let satisfied = stage
                    .depends_on
                    .iter()
                    .filter_map(|dep| by_name.get(dep.as_str()))
                    .any(|dep| dep.output == *kind);
                if !satisfied {
                    return Err(ConfigError::new(format!(
                        "stage '{}' declares input {kind} but no dependency produces it",
                        stage.name
                    ))
                    .with_stages(vec![stage.name.clone()]));
                }
            }
        }

        self.detect_cycles(&by_name)
    }

    fn detect_cycles(&self, by_name: &HashMap<&str, &StageConfig>) -> Result<(), ConfigError> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut in_stack: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();

        for stage in &self.stages {
            if !visited.contains(stage.name.as_str()) {
                if let Some(cycle) =
                    dfs_cycle(stage.name.as_str(), by_name, &mut visited, &mut in_stack, &mut path)
                {
                    return Err(ConfigError::new(format!(
                        "dependency cycle: {}",
                        cycle.join(" -> ")
                    ))
                    .with_stages(cycle));
                }
            }
        }

        Ok(())
    }
}

fn dfs_cycle<'a>(
    node: &'a str,
    by_name: &HashMap<&'a str, &'a StageConfig>,
    visited: &mut HashSet<&'a str>,
    in_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    in_stack.insert(node);
    path.push(node);

    if let Some(stage) = by_name.get(node) {
        for dep in &stage.depends_on {
            let dep = dep.as_str();
            if !visited.contains(dep) {
                if let Some(found) = dfs_cycle(dep, by_name, visited, in_stack, path) {
                    return Some(found);
                }
            } else if in_stack.contains(dep) {
                let start = path.iter().position(|n| *n == dep)?;
                let mut cycle: Vec<String> = path[start..].iter().map(ToString::to_string).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
        }
    }

    path.pop();
    in_stack.remove(node);
    None
}
