use crate::error::{Result, VarianceError};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reads the contents of a file at the given path
///
/// # Errors
///
/// - `VarianceError::FileNotFound` if the path doesn't exist or isn't a file.
/// - `VarianceError::Io` if there's an error reading the file.
pub fn read_file_contents(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(VarianceError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    fs::read_to_string(path).map_err(std::convert::Into::into)
}

/// Builds a set of globs whose `*` never crosses a path separator, so `a*.json`
/// only matches at the top level and `config/**/*.json` matches at any depth.
fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.trim_start_matches("./");
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
    }
    Ok(builder.build()?)
}

/// Resolves include/exclude globs relative to `root`.
///
/// Returns every entry under `root` (files, directories and anything else the
/// walk yields) matched by at least one include glob and by no exclude glob,
/// sorted by path.
///
/// # Errors
///
/// - `VarianceError::Glob` if a pattern is malformed.
/// - `VarianceError::WalkDir` if the tree cannot be traversed.
pub fn resolve_globs(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    let include = build_glob_set(include)?;
    let exclude = build_glob_set(exclude)?;

    let mut matched = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if include.is_match(relative) && !exclude.is_match(relative) {
            matched.push(entry.into_path());
        }
    }

    Ok(matched)
}

/// Recursively copies `src` into `dst`, merging with whatever `dst` already holds.
///
/// # Errors
///
/// Returns `VarianceError::WalkDir` or `VarianceError::Io` on traversal or copy failures.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Moves a directory, merging into `dst` when it already exists.
///
/// # Errors
///
/// Returns `VarianceError::Io` if the rename, copy or cleanup fails.
pub fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    if dst.exists() {
        copy_dir_all(src, dst)?;
        fs::remove_dir_all(src)?;
    } else {
        fs::rename(src, dst)?;
    }
    Ok(())
}
