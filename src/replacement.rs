use crate::error::{Result, VarianceError};
use crate::fs_utils::{read_file_contents, resolve_globs};
use crate::value::ScalarValue;
use regex::{NoExpand, Regex};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the site override file. It is never rewritten by a fileset replacement.
pub const OVERRIDE_SPEC_FILE: &str = "variance.yml";

/// Files searched by a fileset replacement that has no `include` list
pub const DEFAULT_INCLUDE: &str = "config/**/*.json";

/// Compiles a replacement target.
///
/// Targets are regular expressions. Placeholders such as `{{SITE_ID}}` are not
/// valid regex syntax and are matched literally instead.
///
/// # Errors
///
/// Returns `VarianceError::Regex` only if the escaped literal fails to compile.
pub fn compile_target(target: &str) -> Result<Regex> {
    Regex::new(target)
        .or_else(|_| Regex::new(&regex::escape(target)))
        .map_err(Into::into)
}

/// Replaces one placeholder with a different value in each of an ordered list
/// of files (`templated_replacements` of a template entry).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionalReplacement {
    pub target: String,
    /// Values matched to files by position; `1..=n` when absent
    #[serde(default, rename = "list", alias = "values")]
    pub values: Option<Vec<ScalarValue>>,
}

impl PositionalReplacement {
    /// Values paired with `file_count` files, defaulting to `1..=file_count`
    #[must_use]
    pub fn values_for(&self, file_count: usize) -> Vec<ScalarValue> {
        self.values.clone().unwrap_or_else(|| {
            (1..=file_count as i64).map(ScalarValue::Integer).collect()
        })
    }

    /// Replaces `target` in `files[i]` with `values[i]`.
    ///
    /// # Errors
    ///
    /// - `VarianceError::ValueCountMismatch` if values and files differ in
    ///   length; no file is touched in that case.
    /// - `VarianceError::FileNotFound` or `VarianceError::Io` on read/write failures.
    pub fn apply(&self, files: &[PathBuf]) -> Result<()> {
        let values = self.values_for(files.len());
        if values.len() != files.len() {
            return Err(VarianceError::ValueCountMismatch {
                target: self.target.clone(),
                values: values.len(),
                files: files.len(),
            });
        }

        let pattern = compile_target(&self.target)?;
        for (value, path) in values.iter().zip(files) {
            let contents = read_file_contents(path)?;
            let replacement = value.to_string();
            let new_contents = pattern.replace_all(&contents, NoExpand(&replacement));
            fs::write(path, new_contents.as_bytes())?;
            debug!(
                target_pattern = %self.target,
                value = %replacement,
                file = %path.display(),
                "replaced templated target"
            );
        }
        Ok(())
    }
}

/// Replaces one placeholder with a single value across a glob-resolved set of
/// files (the site-wide `replacements` list).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilesetReplacement {
    pub target: String,
    pub value: ScalarValue,
    #[serde(default)]
    pub include: Option<Vec<String>>,
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

impl FilesetReplacement {
    /// Resolves the include/exclude globs against `root`. The override file is
    /// always excluded.
    ///
    /// # Errors
    ///
    /// Returns `VarianceError::Glob` or `VarianceError::WalkDir` from glob resolution.
    pub fn resolve(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let include = self.include.clone().unwrap_or_else(|| {
            info!(
                target_pattern = %self.target,
                "no 'include' for replacement, assuming default configuration"
            );
            vec![DEFAULT_INCLUDE.to_string()]
        });
        let mut exclude = self.exclude.clone().unwrap_or_default();
        exclude.push(OVERRIDE_SPEC_FILE.to_string());

        resolve_globs(root, &include, &exclude)
    }

    /// Replaces every match of `target` with `value` in each resolved regular
    /// file. Returns the number of files whose contents changed.
    ///
    /// # Errors
    ///
    /// Returns resolution errors, `VarianceError::Regex`, or `VarianceError::Io`
    /// if a matched file cannot be read or written.
    pub fn apply(&self, root: &Path) -> Result<usize> {
        let files = self.resolve(root)?;
        let pattern = compile_target(&self.target)?;
        let value = self.value.to_string();

        let mut changed = 0;
        for path in &files {
            if path.is_file() {
                let contents = fs::read_to_string(path)?;
                let new_contents = pattern.replace_all(&contents, NoExpand(&value));
                if new_contents != contents {
                    fs::write(path, new_contents.as_bytes())?;
                    changed += 1;
                    debug!(
                        target_pattern = %self.target,
                        value = %value,
                        file = %path.display(),
                        "replaced target"
                    );
                }
            } else if !path.is_dir() {
                warn!(file = %path.display(), "matched path was not found");
            }
        }
        Ok(changed)
    }
}

/// A replacement bound to the files it operates on.
#[derive(Debug, Clone)]
pub enum Replacement {
    /// Values paired with an explicit, ordered file list
    Positional {
        spec: PositionalReplacement,
        files: Vec<PathBuf>,
    },
    /// One value applied to every file matched under `root`
    Fileset {
        spec: FilesetReplacement,
        root: PathBuf,
    },
}

impl Replacement {
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Positional { spec, .. } => &spec.target,
            Self::Fileset { spec, .. } => &spec.target,
        }
    }

    /// The files this replacement will rewrite
    ///
    /// # Errors
    ///
    /// Returns glob resolution errors for fileset replacements.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        match self {
            Self::Positional { files, .. } => Ok(files.clone()),
            Self::Fileset { spec, root } => spec.resolve(root),
        }
    }

    /// Ordered values this replacement substitutes; one per file for
    /// positional replacements, a single value for fileset replacements.
    #[must_use]
    pub fn values(&self) -> Vec<ScalarValue> {
        match self {
            Self::Positional { spec, files } => spec.values_for(files.len()),
            Self::Fileset { spec, .. } => vec![spec.value.clone()],
        }
    }

    /// Runs the replacement. Returns the number of files written.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`PositionalReplacement::apply`] and
    /// [`FilesetReplacement::apply`].
    pub fn process(&self) -> Result<usize> {
        match self {
            Self::Positional { spec, files } => spec.apply(files).map(|()| files.len()),
            Self::Fileset { spec, root } => spec.apply(root),
        }
    }
}
