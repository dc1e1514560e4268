use crate::assign::{AssignmentOptions, GroupingStrategy, DEFAULT_MAX_TEMPLATE_SIZE};
use crate::error::SynthError;
use crate::validate::ValidationOptions;
use serde::Deserialize;
use std::path::PathBuf;

/// Settings consumed by the synthesis orchestrator.
///
/// Every key is optional in TOML; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SynthConfig {
    pub out_dir: PathBuf,
    pub skip_validation: bool,
    pub pretty_print: bool,
    pub strict: bool,
    /// Stop validating after the first layer that fails.
    pub fail_fast: bool,
    /// Allow units to be split into a root plus linked documents.
    pub enable_linked_templates: bool,
    /// Split even when a unit fits in one document.
    pub prefer_linked_templates: bool,
    pub max_template_size: usize,
    pub grouping_strategy: GroupingStrategy,
    /// Relative path prefix written into `templateLink.relativePath`.
    pub linked_template_base: String,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            out_dir: PathBuf::from("synth.out"),
            skip_validation: false,
            pretty_print: true,
            strict: false,
            fail_fast: true,
            enable_linked_templates: false,
            prefer_linked_templates: false,
            max_template_size: DEFAULT_MAX_TEMPLATE_SIZE,
            grouping_strategy: GroupingStrategy::ByTier,
            linked_template_base: String::new(),
        }
    }
}

impl SynthConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, SynthError> {
        let config: SynthConfig =
            toml::from_str(source).map_err(|e| SynthError::Config(e.to_string()))?;
        if config.max_template_size == 0 {
            return Err(SynthError::Config(
                "max-template-size must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn assignment_options(&self) -> AssignmentOptions {
        AssignmentOptions {
            max_template_size: self.max_template_size,
            strategy: self.grouping_strategy,
            prefer_linked: self.prefer_linked_templates,
            custom_grouping: None,
        }
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            strict: self.strict,
            fail_fast: self.fail_fast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = SynthConfig::from_toml_str("").unwrap();
        assert_eq!(config, SynthConfig::default());
        assert_eq!(config.max_template_size, 3_670_016);
        assert!(config.pretty_print);
    }

    #[test]
    fn keys_are_kebab_case() {
        let config = SynthConfig::from_toml_str(
            r#"
out-dir = "build/arm"
strict = true
enable-linked-templates = true
prefer-linked-templates = true
max-template-size = 1048576
grouping-strategy = "by-dependency"
"#,
        )
        .unwrap();
        assert_eq!(config.out_dir, PathBuf::from("build/arm"));
        assert!(config.strict);
        assert!(config.enable_linked_templates);
        assert_eq!(config.grouping_strategy, GroupingStrategy::ByDependency);

        let options = config.assignment_options();
        assert!(options.prefer_linked);
        assert_eq!(options.max_template_size, 1_048_576);
        assert!(config.validation_options().strict);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SynthConfig::from_toml_str("pretty = false").unwrap_err();
        assert!(matches!(err, SynthError::Config(_)));
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let err = SynthConfig::from_toml_str("max-template-size = 0").unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }
}
