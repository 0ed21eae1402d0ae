//! Workflow Data Model
//!
//! Core data structures describing a staged load workflow.
//!
//! # Example YAML Format
//!
//! ```yaml
//! workflow_id: nightly_sales_load
//! workflow_stages:
//!   - execution_type: parallel
//!     execution_flag: y
//!     scripts:
//!       - load_customers.sql
//!       - load_products.sql
//!
//!   - execution_type: sequential
//!     execution_flag: y
//!     scripts:
//!       - load_orders.sql
//!       - build_order_facts.sql
//!
//!   - execution_type: parallel
//!     execution_flag: n
//!     scripts: refresh_reporting.sql
//! ```

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a script to run; doubles as the job name in audit records.
pub type ScriptId = String;

/// How the scripts of a stage are executed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum ExecutionMode {
    /// All scripts fan out at once, bounded by the concurrency cap
    Parallel,
    /// Scripts run one at a time in declaration order
    Sequential,
    /// Anything else found in configuration; fails the run when reached
    Unsupported(String),
}

impl From<String> for ExecutionMode {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "parallel" => Self::Parallel,
            "sequential" => Self::Sequential,
            _ => Self::Unsupported(value),
        }
    }
}

impl From<ExecutionMode> for String {
    fn from(mode: ExecutionMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Sequential => write!(f, "sequential"),
            Self::Unsupported(raw) => write!(f, "{}", raw),
        }
    }
}

/// A unit of the workflow executed in one mode.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Stage {
    /// Parallel or sequential execution
    #[serde(rename = "execution_type", alias = "execution_mode")]
    pub execution_mode: ExecutionMode,

    /// Scripts run by this stage, in order
    #[serde(deserialize_with = "single_or_vec", default)]
    pub scripts: Vec<ScriptId>,

    /// Disabled stages are dropped before orchestration
    #[serde(
        rename = "execution_flag",
        alias = "enabled",
        deserialize_with = "flag_or_bool",
        default = "default_enabled"
    )]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Deserializes either a single string or array of strings into Vec<String>
fn single_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.trim().to_string()]),
        Value::Array(arr) => arr
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.trim().to_string()),
                _ => Err(de::Error::custom("Expected string in scripts list")),
            })
            .collect(),
        _ => Err(de::Error::custom("Expected string or array of strings")),
    }
}

/// Accepts the `y`/`n` flags of the config table as well as plain booleans.
fn flag_or_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(true),
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" => Ok(true),
            "n" | "no" | "false" => Ok(false),
            other => Err(de::Error::custom(format!(
                "Invalid execution flag '{}' (expected y or n)",
                other
            ))),
        },
        _ => Err(de::Error::custom("Expected y/n flag or boolean")),
    }
}

impl Stage {
    /// Creates an enabled parallel stage.
    ///
    /// # Example
    ///
    /// ```
    /// use loadflow::workflow::Stage;
    ///
    /// let stage = Stage::parallel(["load_a.sql", "load_b.sql"]);
    /// assert_eq!(stage.scripts.len(), 2);
    /// ```
    pub fn parallel<I, S>(scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_mode(ExecutionMode::Parallel, scripts)
    }

    /// Creates an enabled sequential stage.
    pub fn sequential<I, S>(scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_mode(ExecutionMode::Sequential, scripts)
    }

    /// Creates an enabled stage with an arbitrary mode.
    pub fn with_mode<I, S>(execution_mode: ExecutionMode, scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            execution_mode,
            scripts: scripts.into_iter().map(Into::into).collect(),
            enabled: true,
        }
    }

    /// Marks the stage as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Ordered list of stages for one workflow.
///
/// Immutable once a run starts; the orchestrator only reads it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WorkflowDefinition {
    /// Identifier shared by every run of this workflow
    pub workflow_id: String,

    /// Stages in execution order
    #[serde(rename = "workflow_stages", alias = "stages", default)]
    pub stages: Vec<Stage>,
}

impl WorkflowDefinition {
    /// Creates an empty definition.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Returns a copy holding only the enabled stages.
    pub fn enabled_only(&self) -> Self {
        Self {
            workflow_id: self.workflow_id.clone(),
            stages: self.enabled_stages().cloned().collect(),
        }
    }

    /// Iterates over enabled stages in order.
    pub fn enabled_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|stage| stage.enabled)
    }

    /// Every script of every enabled stage, in execution order.
    pub fn job_names(&self) -> Vec<ScriptId> {
        self.enabled_stages()
            .flat_map(|stage| stage.scripts.iter().cloned())
            .collect()
    }

    /// Returns true if no stage is enabled.
    pub fn is_empty(&self) -> bool {
        self.enabled_stages().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_mode_from_string() {
        assert_eq!(ExecutionMode::from("parallel".to_string()), ExecutionMode::Parallel);
        assert_eq!(ExecutionMode::from("Sequential".to_string()), ExecutionMode::Sequential);
        assert_eq!(
            ExecutionMode::from("batch".to_string()),
            ExecutionMode::Unsupported("batch".to_string())
        );
    }

    #[test]
    fn test_stage_yaml_with_flags() {
        let yaml = r#"
execution_type: parallel
execution_flag: N
scripts: only_one.sql
"#;
        let stage: Stage = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(stage.execution_mode, ExecutionMode::Parallel);
        assert_eq!(stage.scripts, vec!["only_one.sql"]);
        assert!(!stage.enabled);
    }

    #[test]
    fn test_stage_defaults_to_enabled() {
        let yaml = "execution_mode: sequential\nscripts: [a.sql, b.sql]\n";
        let stage: Stage = serde_yaml::from_str(yaml).unwrap();
        assert!(stage.enabled);
        assert_eq!(stage.scripts.len(), 2);
    }

    #[test]
    fn test_stage_rejects_bad_flag() {
        let yaml = "execution_type: parallel\nexecution_flag: maybe\nscripts: a.sql\n";
        let result: Result<Stage, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_mode_is_preserved() {
        let yaml = "execution_type: fanout\nscripts: a.sql\n";
        let stage: Stage = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(stage.execution_mode, ExecutionMode::Unsupported("fanout".into()));
    }

    #[test]
    fn test_enabled_stages_filter() {
        let definition = WorkflowDefinition::new("wf")
            .with_stage(Stage::parallel(["s1", "s2"]))
            .with_stage(Stage::sequential(["skip"]).disabled())
            .with_stage(Stage::sequential(["s3"]));

        let enabled = definition.enabled_only();
        assert_eq!(enabled.stages.len(), 2);
        assert_eq!(definition.job_names(), vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_definition_is_empty_when_all_disabled() {
        let definition = WorkflowDefinition::new("wf").with_stage(Stage::parallel(["a"]).disabled());
        assert!(definition.is_empty());
    }

    #[test]
    fn test_mode_serializes_as_string() {
        let stage = Stage::sequential(["a"]);
        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(json["execution_type"], "sequential");
    }
}
