use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for variance operations
#[derive(Error, Debug)]
pub enum VarianceError {
    /// IO error when reading, writing or copying files
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File not found error with specific path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// A required field is absent from a template or replacement entry
    #[error("Missing required field '{field}' in template '{template}'")]
    MissingField { field: String, template: String },

    /// `filename_pattern.type` is neither `sequential` nor `list`
    #[error("Pattern type '{pattern_type}' is not supported (template '{template}')")]
    UnsupportedPattern {
        pattern_type: String,
        template: String,
    },

    /// A filename template that would expand every value to the same name
    #[error("Filename template '{template}' does not contain the {{{{target}}}} placeholder")]
    MissingPlaceholder { template: String },

    /// The template file named by a template entry is missing or not a regular file
    #[error("Template file '{path}' does not exist or is not a file")]
    TemplateNotFound { path: PathBuf },

    /// Positional substitution got a different number of values than files
    #[error(
        "The number of values provided is not the same as the number of templates expanded for '{target}': {values} values, {files} files"
    )]
    ValueCountMismatch {
        target: String,
        values: usize,
        files: usize,
    },

    /// A `replacements` entry in the override file could not be decoded
    #[error("Invalid replacement #{index}: {source}")]
    InvalidReplacement {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    /// A device names a variant with no matching directory in the template library
    #[error("'{variant}' is not a valid variant of '{device}': {path} does not exist")]
    InvalidVariant {
        device: String,
        variant: String,
        path: PathBuf,
    },

    /// A device with several variants has no `<kind>_variant` key
    #[error("{site}'s {device} has variants, but no variant key was found")]
    MissingVariant { site: String, device: String },

    /// An override key holds a value of the wrong shape
    #[error("Invalid value for '{key}': {source}")]
    InvalidSetting {
        key: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A `sequential` pattern spans more files than can be generated
    #[error("Range {from}..={to} of template '{template}' exceeds {limit} files")]
    RangeTooLarge {
        template: String,
        from: i64,
        to: i64,
        limit: u64,
    },

    /// A test fixture is not valid JSON
    #[error("Unable to parse test file {path}: {source}")]
    InvalidTestFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Regex compilation error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Invalid include/exclude glob
    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),

    /// `WalkDir` error when traversing directories
    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error while reading the override file
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, VarianceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VarianceError::FileNotFound {
            path: PathBuf::from("/test/file.txt"),
        };
        assert_eq!(format!("{err}"), "File not found: /test/file.txt");

        let err = VarianceError::MissingField {
            field: "filename_pattern".to_string(),
            template: "bess_{{target}}.json".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Missing required field 'filename_pattern' in template 'bess_{{target}}.json'"
        );

        let err = VarianceError::UnsupportedPattern {
            pattern_type: "random".to_string(),
            template: "x".to_string(),
        };
        assert!(format!("{err}").contains("'random'"));

        let err = VarianceError::MissingPlaceholder {
            template: "bess.json".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Filename template 'bess.json' does not contain the {{target}} placeholder"
        );

        let err = VarianceError::ValueCountMismatch {
            target: "{{ESS_ID}}".to_string(),
            values: 1,
            files: 2,
        };
        assert!(format!("{err}").contains("1 values"));
        assert!(format!("{err}").contains("2 files"));

        let err = VarianceError::MissingVariant {
            site: "alpha".to_string(),
            device: "twins".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "alpha's twins has variants, but no variant key was found"
        );

        let err = VarianceError::RangeTooLarge {
            template: "bess_{{target}}.json".to_string(),
            from: 0,
            to: i64::MAX,
            limit: 10_000,
        };
        assert_eq!(
            format!("{err}"),
            format!("Range 0..={} of template 'bess_{{{{target}}}}.json' exceeds 10000 files", i64::MAX)
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let err: VarianceError = io_err.into();
        assert!(matches!(err, VarianceError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: VarianceError = json_err.into();
        assert!(matches!(err, VarianceError::Json(_)));
    }

    #[test]
    fn test_error_from_glob() {
        let glob_err = globset::Glob::new("a[").unwrap_err();
        let err: VarianceError = glob_err.into();
        assert!(matches!(err, VarianceError::Glob(_)));
    }
}
