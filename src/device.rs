use crate::error::{Result, VarianceError};
use crate::fs_utils::{copy_dir_all, move_dir};
use crate::pattern::{GeneratedFileSet, TemplateSpec, expand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Variant every device starts from; its files are always copied first.
pub const ROOT_VARIANT: &str = "root";

/// Sub-directory of a variant (and of a device) holding test fixtures
pub const TESTS_DIR: &str = "tests";

/// Template library directory for a device kind: `<variants_root>/<kind>_variants`
#[must_use]
pub fn variants_dir(variants_root: &Path, kind: &str) -> PathBuf {
    variants_root.join(format!("{kind}_variants"))
}

/// One device of a site, e.g. `config/<site>/ess-controller`.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    kind: String,
    variant: String,
    directory: PathBuf,
}

impl Device {
    #[must_use]
    pub fn new(kind: &str, site_dir: &Path) -> Self {
        Self {
            kind: kind.to_string(),
            variant: ROOT_VARIANT.to_string(),
            directory: site_dir.join(kind),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn set_variant(&mut self, variant: impl Into<String>) {
        self.variant = variant.into();
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Generated configuration: `<device>/config`
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.directory.join("config")
    }

    /// Generated test fixtures: `<device>/tests`
    #[must_use]
    pub fn tests_dir(&self) -> PathBuf {
        self.directory.join(TESTS_DIR)
    }

    /// Removes the output of a previous run.
    ///
    /// # Errors
    ///
    /// Returns `VarianceError::Io` if an existing directory cannot be removed.
    pub fn clear_previous_files(&self) -> Result<()> {
        for dir in [self.config_dir(), self.tests_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
                info!(dir = %dir.display(), "removed previous files");
            } else {
                info!(dir = %dir.display(), "no previous files to remove");
            }
        }
        Ok(())
    }

    /// Copies the `root` variant into `config`, then moves a copied
    /// `config/tests` directory out to the sibling `tests`.
    ///
    /// # Errors
    ///
    /// - `VarianceError::InvalidVariant` if the kind has no `root` variant.
    /// - `VarianceError::Io` or `VarianceError::WalkDir` on copy failures.
    pub fn copy_root_files(&self, variants_root: &Path) -> Result<()> {
        let root_dir = variants_dir(variants_root, &self.kind).join(ROOT_VARIANT);
        if !root_dir.is_dir() {
            return Err(VarianceError::InvalidVariant {
                device: self.kind.clone(),
                variant: ROOT_VARIANT.to_string(),
                path: root_dir,
            });
        }

        let config_dir = self.config_dir();
        copy_dir_all(&root_dir, &config_dir)?;

        let copied_tests = config_dir.join(TESTS_DIR);
        if copied_tests.is_dir() {
            debug!(dir = %copied_tests.display(), "moving root tests out of config");
            move_dir(&copied_tests, &self.tests_dir())?;
        }
        Ok(())
    }

    /// Merges the selected variant's directories into `config/<name>`, and its
    /// `tests` directory into the device's `tests`.
    ///
    /// # Errors
    ///
    /// - `VarianceError::InvalidVariant` if the variant directory doesn't exist.
    /// - `VarianceError::Io` or `VarianceError::WalkDir` on copy failures.
    pub fn copy_variant_files(&self, variants_root: &Path) -> Result<()> {
        let variant_dir = variants_dir(variants_root, &self.kind).join(&self.variant);
        if !variant_dir.is_dir() {
            return Err(VarianceError::InvalidVariant {
                device: self.kind.clone(),
                variant: self.variant.clone(),
                path: variant_dir,
            });
        }
        if self.variant == ROOT_VARIANT {
            return Ok(());
        }

        let mut entries = fs::read_dir(&variant_dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let name = entry.file_name();
            let path = entry.path();
            if path.is_dir() {
                let dest = if name == TESTS_DIR {
                    debug!(dir = %path.display(), "found tests in variant files");
                    self.tests_dir()
                } else {
                    self.config_dir().join(&name)
                };
                copy_dir_all(&path, &dest)?;
            } else {
                fs::create_dir_all(self.config_dir())?;
                fs::copy(&path, self.config_dir().join(&name))?;
            }
        }
        Ok(())
    }

    /// Copies root files, then the variant files on top of them.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Device::copy_root_files`] and
    /// [`Device::copy_variant_files`].
    pub fn copy_all_files(&self, variants_root: &Path) -> Result<()> {
        self.copy_root_files(variants_root)?;
        info!(device = %self.kind, "copied root files");
        self.copy_variant_files(variants_root)?;
        info!(device = %self.kind, variant = %self.variant, "copied variant files");
        Ok(())
    }

    /// Expands each template relative to the device's `config` directory.
    ///
    /// # Errors
    ///
    /// Stops at the first template that fails; see [`expand`].
    pub fn expand_templates(&self, templates: &[TemplateSpec]) -> Result<Vec<GeneratedFileSet>> {
        let config_dir = self.config_dir();
        templates
            .iter()
            .map(|template| expand(template, &config_dir))
            .collect()
    }
}
