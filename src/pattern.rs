use crate::error::{Result, VarianceError};
use crate::replacement::{PositionalReplacement, Replacement};
use crate::value::ScalarValue;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Placeholder substituted by each expansion value in a filename template
pub const FILENAME_TARGET: &str = "{{target}}";

/// Largest number of files a `sequential` pattern may generate
pub const MAX_SEQUENTIAL_FILES: u64 = 10_000;

/// Files generated from one template, in value order
pub type GeneratedFileSet = Vec<PathBuf>;

/// How a template's filename is expanded into concrete filenames
#[derive(Debug, Clone, PartialEq)]
pub enum FilenamePattern {
    /// One file per integer in `from..=to`
    Sequential { template: String, from: i64, to: i64 },
    /// One file per listed value, in order
    List {
        template: String,
        values: Vec<ScalarValue>,
    },
}

impl FilenamePattern {
    #[must_use]
    pub fn template(&self) -> &str {
        match self {
            Self::Sequential { template, .. } | Self::List { template, .. } => template,
        }
    }

    /// The expansion values, in generation order
    #[must_use]
    pub fn values(&self) -> Vec<ScalarValue> {
        match self {
            Self::Sequential { from, to, .. } => (*from..=*to).map(ScalarValue::Integer).collect(),
            Self::List { values, .. } => values.clone(),
        }
    }

    /// Filename generated for `value`
    #[must_use]
    pub fn filename_for(&self, value: &ScalarValue) -> String {
        self.template()
            .replace(FILENAME_TARGET, &value.to_string())
    }
}

/// One entry of a device's `<kind>_templates` list
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSpec {
    /// Template file, relative to the device's `config` directory
    pub source_path: PathBuf,
    pub pattern: FilenamePattern,
    /// Positional replacements run against the generated files
    pub templated_replacements: Vec<PositionalReplacement>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTemplateSpec {
    #[serde(default, alias = "source_path")]
    path: Option<String>,
    #[serde(default)]
    filename_pattern: Option<RawFilenamePattern>,
    #[serde(default)]
    templated_replacements: Option<Vec<PositionalReplacement>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFilenamePattern {
    #[serde(default, rename = "type")]
    pattern_type: Option<String>,
    #[serde(default)]
    filename_template: Option<String>,
    #[serde(default)]
    from: Option<i64>,
    #[serde(default)]
    to: Option<i64>,
    #[serde(default, rename = "list", alias = "values")]
    values: Option<Vec<ScalarValue>>,
}

impl RawTemplateSpec {
    fn display_name(&self) -> String {
        self.filename_pattern
            .as_ref()
            .and_then(|p| p.filename_template.clone())
            .or_else(|| self.path.clone())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }
}

fn missing(field: &str, template: &str) -> VarianceError {
    VarianceError::MissingField {
        field: field.to_string(),
        template: template.to_string(),
    }
}

impl TemplateSpec {
    /// Builds a template entry from its override-file mapping.
    ///
    /// # Errors
    ///
    /// - `VarianceError::Yaml` if a field has the wrong type.
    /// - `VarianceError::MissingField` naming the absent field and the template.
    /// - `VarianceError::UnsupportedPattern` for an unknown `filename_pattern.type`.
    /// - `VarianceError::MissingPlaceholder` if the filename template lacks `{{target}}`.
    pub fn from_yaml(value: serde_yaml::Value) -> Result<Self> {
        let raw: RawTemplateSpec = serde_yaml::from_value(value)?;
        let name = raw.display_name();

        let path = raw.path.ok_or_else(|| missing("path", &name))?;
        let pattern = raw
            .filename_pattern
            .ok_or_else(|| missing("filename_pattern", &name))?;
        let pattern_type = pattern
            .pattern_type
            .ok_or_else(|| missing("filename_pattern.type", &name))?;
        let template = pattern
            .filename_template
            .ok_or_else(|| missing("filename_pattern.filename_template", &name))?;

        let pattern = match pattern_type.as_str() {
            "sequential" => FilenamePattern::Sequential {
                from: pattern
                    .from
                    .ok_or_else(|| missing("filename_pattern.from", &name))?,
                to: pattern
                    .to
                    .ok_or_else(|| missing("filename_pattern.to", &name))?,
                template,
            },
            "list" => FilenamePattern::List {
                values: pattern
                    .values
                    .ok_or_else(|| missing("filename_pattern.list", &name))?,
                template,
            },
            _ => {
                return Err(VarianceError::UnsupportedPattern {
                    pattern_type,
                    template: name,
                });
            }
        };

        if let FilenamePattern::Sequential { from, to, .. } = pattern {
            let span = i128::from(to) - i128::from(from) + 1;
            if span > i128::from(MAX_SEQUENTIAL_FILES) {
                return Err(VarianceError::RangeTooLarge {
                    template: name,
                    from,
                    to,
                    limit: MAX_SEQUENTIAL_FILES,
                });
            }
        }

        if !pattern.template().contains(FILENAME_TARGET) {
            return Err(VarianceError::MissingPlaceholder {
                template: pattern.template().to_string(),
            });
        }

        Ok(Self {
            source_path: PathBuf::from(path),
            pattern,
            templated_replacements: raw.templated_replacements.unwrap_or_default(),
        })
    }
}

/// Expands one template file into a file per pattern value.
///
/// Each generated file is a copy of the template placed next to it. Templated
/// replacements then run over the generated files in order, and finally the
/// template itself is deleted, unless one of the values regenerated its name.
///
/// # Errors
///
/// - `VarianceError::TemplateNotFound` if the template is missing or not a regular file.
/// - `VarianceError::ValueCountMismatch` from a templated replacement; the
///   generated files are left in place and the template is not deleted.
/// - `VarianceError::Io` on copy or delete failures.
pub fn expand(spec: &TemplateSpec, base_dir: &Path) -> Result<GeneratedFileSet> {
    let source = base_dir.join(&spec.source_path);
    if !source.is_file() {
        return Err(VarianceError::TemplateNotFound { path: source });
    }

    debug!(template = %spec.pattern.template(), "expanding template");
    let values = spec.pattern.values();
    if values.is_empty() {
        warn!(
            template = %spec.pattern.template(),
            "template pattern produced no values"
        );
    }

    let mut generated = Vec::with_capacity(values.len());
    for value in &values {
        let path = source.with_file_name(spec.pattern.filename_for(value));
        // a value naming the template itself keeps the template as that file
        if path != source {
            fs::copy(&source, &path)?;
        }
        debug!(file = %path.display(), "expanded template");
        generated.push(path);
    }

    for templated in &spec.templated_replacements {
        Replacement::Positional {
            spec: templated.clone(),
            files: generated.clone(),
        }
        .process()?;
    }

    if !generated.contains(&source) {
        fs::remove_file(&source)?;
    }
    info!(
        template = %source.display(),
        generated = generated.len(),
        "template expansion complete"
    );
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec_from(yaml: &str) -> Result<TemplateSpec> {
        TemplateSpec::from_yaml(serde_yaml::from_str(yaml).unwrap())
    }

    fn setup_template(contents: &str) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("ess")).unwrap();
        fs::write(temp_dir.path().join("ess/bess_template.json"), contents).unwrap();
        temp_dir
    }

    #[test]
    fn test_parse_sequential() {
        let spec = spec_from(
            r"
path: ess/bess_template.json
filename_pattern:
  type: sequential
  filename_template: bess_{{target}}.json
  from: 1
  to: 3
",
        )
        .unwrap();
        assert_eq!(spec.source_path, PathBuf::from("ess/bess_template.json"));
        assert_eq!(
            spec.pattern,
            FilenamePattern::Sequential {
                template: "bess_{{target}}.json".to_string(),
                from: 1,
                to: 3
            }
        );
        assert!(spec.templated_replacements.is_empty());
    }

    #[test]
    fn test_parse_list_with_replacements() {
        let spec = spec_from(
            r"
path: ess/bess_template.json
filename_pattern:
  type: list
  filename_template: bess_{{target}}.json
  list: [alpha, 2]
templated_replacements:
  - target: '{{ESS_ID}}'
  - target: '{{NAME}}'
    list: [a, b]
",
        )
        .unwrap();
        assert_eq!(
            spec.pattern.values(),
            vec![ScalarValue::from("alpha"), ScalarValue::Integer(2)]
        );
        assert_eq!(spec.templated_replacements.len(), 2);
        assert_eq!(spec.templated_replacements[0].values, None);
    }

    #[test]
    fn test_parse_missing_fields() {
        let result = spec_from("filename_pattern: {type: list, filename_template: 'x_{{target}}', list: [1]}");
        match result {
            Err(VarianceError::MissingField { field, template }) => {
                assert_eq!(field, "path");
                assert_eq!(template, "x_{{target}}");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let result = spec_from("path: a.json");
        assert!(matches!(
            result,
            Err(VarianceError::MissingField { ref field, ref template })
                if field == "filename_pattern" && template == "a.json"
        ));

        let result = spec_from("path: a.json\nfilename_pattern: {filename_template: 'a_{{target}}'}");
        assert!(matches!(
            result,
            Err(VarianceError::MissingField { ref field, .. }) if field == "filename_pattern.type"
        ));

        let result = spec_from("path: a.json\nfilename_pattern: {type: list}");
        assert!(matches!(
            result,
            Err(VarianceError::MissingField { ref field, .. })
                if field == "filename_pattern.filename_template"
        ));

        let result = spec_from(
            "path: a.json\nfilename_pattern: {type: sequential, filename_template: 'a_{{target}}', from: 1}",
        );
        assert!(matches!(
            result,
            Err(VarianceError::MissingField { ref field, .. }) if field == "filename_pattern.to"
        ));

        let result =
            spec_from("path: a.json\nfilename_pattern: {type: list, filename_template: 'a_{{target}}'}");
        assert!(matches!(
            result,
            Err(VarianceError::MissingField { ref field, .. }) if field == "filename_pattern.list"
        ));
    }

    #[test]
    fn test_parse_unsupported_type() {
        let result = spec_from(
            "path: a.json\nfilename_pattern: {type: random, filename_template: 'a_{{target}}'}",
        );
        assert!(matches!(
            result,
            Err(VarianceError::UnsupportedPattern { ref pattern_type, .. }) if pattern_type == "random"
        ));
    }

    #[test]
    fn test_parse_rejects_oversized_range() {
        let result = spec_from(
            "path: a.json\nfilename_pattern: {type: sequential, filename_template: 'a_{{target}}', from: 0, to: 9223372036854775807}",
        );
        assert!(matches!(
            result,
            Err(VarianceError::RangeTooLarge { from: 0, to: i64::MAX, .. })
        ));

        let result = spec_from(
            "path: a.json\nfilename_pattern: {type: sequential, filename_template: 'a_{{target}}', from: 1, to: 10000}",
        );
        assert!(result.is_ok());

        let result = spec_from(
            "path: a.json\nfilename_pattern: {type: sequential, filename_template: 'a_{{target}}', from: -9223372036854775808, to: 9223372036854775807}",
        );
        assert!(matches!(result, Err(VarianceError::RangeTooLarge { .. })));
    }

    #[test]
    fn test_parse_missing_placeholder() {
        let result =
            spec_from("path: a.json\nfilename_pattern: {type: list, filename_template: b.json, list: [1]}");
        assert!(matches!(result, Err(VarianceError::MissingPlaceholder { .. })));
    }

    #[test]
    fn test_expand_sequential() {
        let temp_dir = setup_template("{\"id\": 0}");
        let spec = TemplateSpec {
            source_path: PathBuf::from("ess/bess_template.json"),
            pattern: FilenamePattern::Sequential {
                template: "bess_{{target}}.json".to_string(),
                from: 2,
                to: 5,
            },
            templated_replacements: Vec::new(),
        };

        let generated = expand(&spec, temp_dir.path()).unwrap();

        assert_eq!(generated.len(), 5 - 2 + 1);
        let dir = temp_dir.path().join("ess");
        for (i, path) in generated.iter().enumerate() {
            assert_eq!(*path, dir.join(format!("bess_{}.json", i + 2)));
            assert_eq!(fs::read_to_string(path).unwrap(), "{\"id\": 0}");
        }
        assert!(!dir.join("bess_template.json").exists());
    }

    #[test]
    fn test_expand_list_with_templated_replacements() {
        let temp_dir = setup_template("{\"name\": \"{{ESS_ID}}\", \"index\": {{INDEX}}}");
        let spec = TemplateSpec {
            source_path: PathBuf::from("ess/bess_template.json"),
            pattern: FilenamePattern::List {
                template: "bess_{{target}}.json".to_string(),
                values: vec!["north".into(), "south".into()],
            },
            templated_replacements: vec![
                PositionalReplacement {
                    target: "{{ESS_ID}}".to_string(),
                    values: Some(vec!["ess_n".into(), "ess_s".into()]),
                },
                PositionalReplacement {
                    target: "{{INDEX}}".to_string(),
                    values: None,
                },
            ],
        };

        let generated = expand(&spec, temp_dir.path()).unwrap();

        let dir = temp_dir.path().join("ess");
        assert_eq!(
            generated,
            vec![dir.join("bess_north.json"), dir.join("bess_south.json")]
        );
        assert_eq!(
            fs::read_to_string(&generated[0]).unwrap(),
            "{\"name\": \"ess_n\", \"index\": 1}"
        );
        assert_eq!(
            fs::read_to_string(&generated[1]).unwrap(),
            "{\"name\": \"ess_s\", \"index\": 2}"
        );
        assert!(!dir.join("bess_template.json").exists());
    }

    #[test]
    fn test_expand_missing_template() {
        let temp_dir = TempDir::new().unwrap();
        let spec = TemplateSpec {
            source_path: PathBuf::from("nope.json"),
            pattern: FilenamePattern::List {
                template: "n_{{target}}.json".to_string(),
                values: vec![ScalarValue::Integer(1)],
            },
            templated_replacements: Vec::new(),
        };
        let result = expand(&spec, temp_dir.path());
        assert!(matches!(result, Err(VarianceError::TemplateNotFound { .. })));

        fs::create_dir(temp_dir.path().join("nope.json")).unwrap();
        let result = expand(&spec, temp_dir.path());
        assert!(matches!(result, Err(VarianceError::TemplateNotFound { .. })));
    }

    #[test]
    fn test_expand_keeps_template_on_replacement_failure() {
        let temp_dir = setup_template("{{ESS_ID}}");
        let spec = TemplateSpec {
            source_path: PathBuf::from("ess/bess_template.json"),
            pattern: FilenamePattern::Sequential {
                template: "bess_{{target}}.json".to_string(),
                from: 1,
                to: 2,
            },
            templated_replacements: vec![PositionalReplacement {
                target: "{{ESS_ID}}".to_string(),
                values: Some(vec!["only_one".into()]),
            }],
        };

        let result = expand(&spec, temp_dir.path());
        assert!(matches!(result, Err(VarianceError::ValueCountMismatch { .. })));
        assert!(temp_dir.path().join("ess/bess_template.json").is_file());
    }

    #[test]
    fn test_expand_empty_range() {
        let temp_dir = setup_template("x");
        let spec = TemplateSpec {
            source_path: PathBuf::from("ess/bess_template.json"),
            pattern: FilenamePattern::Sequential {
                template: "bess_{{target}}.json".to_string(),
                from: 3,
                to: 1,
            },
            templated_replacements: Vec::new(),
        };

        let generated = expand(&spec, temp_dir.path()).unwrap();
        assert!(generated.is_empty());
        assert!(!temp_dir.path().join("ess/bess_template.json").exists());
    }

    #[test]
    fn test_expand_value_matching_template_name() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("ess");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bess_1.json"), "{{N}}").unwrap();
        let spec = TemplateSpec {
            source_path: PathBuf::from("ess/bess_1.json"),
            pattern: FilenamePattern::Sequential {
                template: "bess_{{target}}.json".to_string(),
                from: 1,
                to: 2,
            },
            templated_replacements: vec![PositionalReplacement {
                target: "{{N}}".to_string(),
                values: None,
            }],
        };

        let generated = expand(&spec, temp_dir.path()).unwrap();
        assert_eq!(generated, vec![dir.join("bess_1.json"), dir.join("bess_2.json")]);
        assert_eq!(fs::read_to_string(dir.join("bess_1.json")).unwrap(), "1");
        assert_eq!(fs::read_to_string(dir.join("bess_2.json")).unwrap(), "2");
    }
}
