//! Engine configuration and graph document validation.

use tracing::debug;

use crate::error::{ConfigError, KeystoneError, Result};
use crate::graph::Graph;

use super::types::EngineConfig;

/// Upper bound on `concurrency`.
pub const MAX_CONCURRENCY: usize = 64;

/// Concurrency above which a warning is emitted.
const HIGH_CONCURRENCY: usize = 16;

/// Validator for engine configuration.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn into_result(self) -> Result<Self> {
        match self.errors.first() {
            None => Ok(self),
            Some(first) => Err(KeystoneError::Config(ConfigError::validation(
                first.message.clone(),
                first.field.clone(),
            ))),
        }
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates engine configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &EngineConfig) -> Result<ValidationResult> {
        let result = self.check(config);
        if result.is_valid() {
            debug!("Configuration validation passed");
        }
        result.into_result()
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &EngineConfig) -> ValidationResult {
        let mut result = ValidationResult::default();
        Self::validate_concurrency(config.concurrency, &mut result);
        Self::validate_state(config, &mut result);
        Self::validate_import(config, &mut result);

        if config.lock.holder.as_deref().is_some_and(|h| h.trim().is_empty()) {
            result.error("lock.holder", "Lock holder cannot be blank; omit it to generate one");
        }
        result
    }

    /// Validates a target graph: references and explicit dependencies must
    /// point inside the graph, and the graph must be acyclic.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate_graph(&self, graph: &Graph) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if graph.is_empty() {
            result.warnings.push(String::from("Graph declares no resources"));
        }

        for resource in graph.resources() {
            for dependency in graph.dependencies(resource.urn()) {
                if !graph.contains(dependency) {
                    result.error(
                        resource.urn().to_string(),
                        format!("Depends on {dependency}, which is not declared"),
                    );
                }
            }
            if resource.display_name().is_none() {
                result
                    .warnings
                    .push(format!("{} has no name and cannot be matched for import", resource.urn()));
            }
        }

        if let Err(e) = graph.validate_acyclic() {
            result.error("dependencies", e.to_string());
        }

        result.into_result()
    }

    fn validate_concurrency(concurrency: usize, result: &mut ValidationResult) {
        if concurrency == 0 || concurrency > MAX_CONCURRENCY {
            result.error(
                "concurrency",
                format!("Concurrency must be between 1 and {MAX_CONCURRENCY}, got {concurrency}"),
            );
        } else if concurrency > HIGH_CONCURRENCY {
            result.warnings.push(format!(
                "Concurrency {concurrency} may exceed provider rate limits"
            ));
        }
    }

    fn validate_state(config: &EngineConfig, result: &mut ValidationResult) {
        let path = &config.state.path;
        if path.as_os_str().is_empty() {
            result.error("state.path", "State path cannot be empty");
        } else if path.extension().is_none_or(|ext| ext != "json") {
            result
                .warnings
                .push(format!("State path {} does not end in .json", path.display()));
        }
    }

    fn validate_import(config: &EngineConfig, result: &mut ValidationResult) {
        match config.import.workspace_id.as_deref() {
            Some(id) if id.trim().is_empty() => {
                result.error("import.workspace_id", "Workspace id cannot be blank");
            }
            None if config.import.enabled => {
                result.warnings.push(String::from(
                    "Import is enabled without import.workspace_id; imported resources will record an empty workspace",
                ));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PropertyMap, PropertyRef, PropertyValue, Resource, Urn};

    #[test]
    fn test_defaults_valid_with_warning() {
        let result = ConfigValidator::new().validate(&EngineConfig::default()).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("workspace_id"));
    }

    #[test]
    fn test_concurrency_bounds() {
        let validator = ConfigValidator::new();
        for bad in [0, MAX_CONCURRENCY + 1] {
            let config = EngineConfig {
                concurrency: bad,
                ..EngineConfig::default()
            };
            let err = validator.validate(&config).unwrap_err();
            assert!(err.to_string().contains("Concurrency must be between"));
        }

        let config = EngineConfig {
            concurrency: 32,
            ..EngineConfig::default()
        };
        let result = validator.validate(&config).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("rate limits")));
    }

    #[test]
    fn test_blank_fields_collected() {
        let mut config = EngineConfig::default();
        config.import.workspace_id = Some(String::from(" "));
        config.lock.holder = Some(String::new());
        config.state.path = std::path::PathBuf::new();

        let result = ConfigValidator::new().check(&config);
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["state.path", "import.workspace_id", "lock.holder"]);
    }

    #[test]
    fn test_graph_with_undeclared_dependency() {
        let mut graph = Graph::new();
        let mut props = PropertyMap::new();
        props.insert("name".into(), PropertyValue::from("Canvas"));
        props.insert(
            "event".into(),
            PropertyRef::property(Urn::new("event", "e9"), "id").into(),
        );
        graph.add_resource(Resource::new("plan", "p1", props));

        let err = ConfigValidator::new().validate_graph(&graph).unwrap_err();
        assert!(err.to_string().contains("event:e9"));
    }

    #[test]
    fn test_graph_cycle_rejected() {
        let mut graph = Graph::new();
        graph.add_resource(Resource::new("a", "1", PropertyMap::new()));
        graph.add_resource(Resource::new("b", "1", PropertyMap::new()));
        graph.add_dependency(&Urn::new("a", "1"), &Urn::new("b", "1"));
        graph.add_dependency(&Urn::new("b", "1"), &Urn::new("a", "1"));

        let result = ConfigValidator::new().validate_graph(&graph);
        assert!(result.is_err());
    }
}
