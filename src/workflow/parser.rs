//! Workflow Parser
//!
//! Loads workflow definitions from YAML (or JSON) configuration files and
//! drops disabled stages so the orchestrator only ever sees enabled ones.

use std::fs;

use log::{debug, info};

use super::model::WorkflowDefinition;
use super::validator::validate_workflow;
use crate::error::ConfigError;

/// Loads a workflow from a YAML file.
///
/// This function:
/// 1. Reads and parses the file
/// 2. Validates the enabled stages
/// 3. Returns a definition holding only enabled stages
///
/// # Example
///
/// ```rust,no_run
/// use loadflow::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("nightly.yaml")?;
///     println!("Loaded {} stages", workflow.stages.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: &str) -> Result<WorkflowDefinition, ConfigError> {
    info!("Loading workflow from: {}", path);

    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    debug!("Workflow content loaded ({} bytes)", content.len());

    parse_workflow(&content).map_err(|e| match e {
        ConfigError::Parse { reason, .. } => ConfigError::Parse {
            path: path.to_string(),
            reason,
        },
        other => other,
    })
}

/// Parses and validates a workflow definition from a string.
pub fn parse_workflow(content: &str) -> Result<WorkflowDefinition, ConfigError> {
    let definition: WorkflowDefinition =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;

    let total = definition.stages.len();

    validate_workflow(&definition).map_err(|errors| {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ConfigError::Invalid(joined)
    })?;

    let enabled = definition.enabled_only();

    info!(
        "Parsed workflow '{}': {} stages, {} enabled, {} jobs",
        enabled.workflow_id,
        total,
        enabled.stages.len(),
        enabled.job_names().len()
    );

    Ok(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::ExecutionMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
workflow_id: nightly
workflow_stages:
  - execution_type: parallel
    execution_flag: y
    scripts: [s1.sql, s2.sql]
  - execution_type: sequential
    execution_flag: n
    scripts: [skipped.sql]
  - execution_type: sequential
    execution_flag: Y
    scripts: [s3.sql, s4.sql]
"#;

    #[test]
    fn test_parse_filters_disabled() {
        let workflow = parse_workflow(SAMPLE).unwrap();
        assert_eq!(workflow.workflow_id, "nightly");
        assert_eq!(workflow.stages.len(), 2);
        assert_eq!(workflow.stages[1].execution_mode, ExecutionMode::Sequential);
        assert_eq!(workflow.job_names(), vec!["s1.sql", "s2.sql", "s3.sql", "s4.sql"]);
    }

    #[test]
    fn test_parse_json_config() {
        let json = r#"{"workflow_id": "wf", "workflow_stages": [
            {"execution_type": "parallel", "execution_flag": "y", "scripts": ["a"]}
        ]}"#;
        let workflow = parse_workflow(json).unwrap();
        assert_eq!(workflow.stages.len(), 1);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_workflow("workflow_stages: [[[");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        let yaml = r#"
workflow_id: wf
workflow_stages:
  - execution_type: parallel
    scripts: [a, a]
"#;
        let result = parse_workflow(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("'a'")));
    }

    #[test]
    fn test_load_workflow_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let workflow = load_workflow(file.path().to_str().unwrap()).unwrap();
        assert_eq!(workflow.stages.len(), 2);
    }

    #[test]
    fn test_load_workflow_missing_file() {
        let result = load_workflow("/nonexistent/workflow.yaml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
