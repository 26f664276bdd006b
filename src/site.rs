use crate::device::{Device, ROOT_VARIANT, variants_dir};
use crate::error::{Result, VarianceError};
use crate::expression::walk;
use crate::fs_utils::read_file_contents;
use crate::pattern::TemplateSpec;
use crate::replacement::{FilesetReplacement, OVERRIDE_SPEC_FILE, Replacement};
use crate::value::ScalarValue;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{Formatter, PrettyFormatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory (under the workspace root) holding one sub-directory per site
pub const SITES_DIR: &str = "config";

/// Device kinds recognised by default
pub const DEFAULT_DEVICE_KINDS: [&str; 5] = [
    "twins",
    "ess-controller",
    "site-controller",
    "fleet-manager",
    "powercloud",
];

/// Configuration shared by every site of a run
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Workspace root holding `config/` and the `<kind>_variants/` libraries
    pub root_dir: PathBuf,
    /// Site sub-directories with these names are processed as devices
    pub device_kinds: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            root_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            device_kinds: DEFAULT_DEVICE_KINDS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl SiteConfig {
    #[must_use]
    pub fn sites_dir(&self) -> PathBuf {
        self.root_dir.join(SITES_DIR)
    }

    /// Names of every site directory, sorted
    ///
    /// # Errors
    ///
    /// Returns `VarianceError::Io` if the sites directory cannot be read.
    pub fn site_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.sites_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Sites to run, in name order: the `requested` ones without duplicates,
    /// or every site when none are requested
    ///
    /// # Errors
    ///
    /// Returns `VarianceError::Io` if every site is needed and the sites
    /// directory cannot be read.
    pub fn select_sites(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return self.site_ids();
        }
        let mut sites = requested.to_vec();
        sites.sort();
        sites.dedup();
        Ok(sites)
    }
}

/// The site override file (`variance.yml`): variant selection, templates and
/// site-wide replacements, keyed by device kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSpec {
    entries: serde_yaml::Mapping,
}

impl OverrideSpec {
    /// Parses an override document. An empty document is an empty spec.
    ///
    /// # Errors
    ///
    /// Returns `VarianceError::Yaml` if the text is not YAML or not a mapping.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: serde_yaml::Value = serde_yaml::from_str(text)?;
        let entries = match document {
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            serde_yaml::Value::String(s) if s.is_empty() => serde_yaml::Mapping::new(),
            other => serde_yaml::from_value(other)?,
        };
        Ok(Self { entries })
    }

    fn entry(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.entries.get(key)
    }

    /// Value of `<kind>_variant`, if the key is present
    ///
    /// # Errors
    ///
    /// Returns `VarianceError::InvalidSetting` naming the key when its value is
    /// not a scalar.
    pub fn variant(&self, kind: &str) -> Result<Option<String>> {
        let key = format!("{kind}_variant");
        let Some(value) = self.entry(&key) else {
            return Ok(None);
        };
        serde_yaml::from_value::<ScalarValue>(value.clone())
            .map(|v| Some(v.to_string()))
            .map_err(|source| VarianceError::InvalidSetting { key, source })
    }

    /// Entries of `<kind>_templates`, if the key is present
    ///
    /// # Errors
    ///
    /// Returns the first template entry's configuration error.
    pub fn templates(&self, kind: &str) -> Result<Option<Vec<TemplateSpec>>> {
        let Some(value) = self.entry(&format!("{kind}_templates")) else {
            return Ok(None);
        };
        let entries: Vec<serde_yaml::Value> = serde_yaml::from_value(value.clone())?;
        entries
            .into_iter()
            .map(TemplateSpec::from_yaml)
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Entries of `replacements`; empty when the key is absent
    ///
    /// # Errors
    ///
    /// Returns `VarianceError::InvalidReplacement` for the first malformed entry.
    pub fn replacements(&self) -> Result<Vec<FilesetReplacement>> {
        let Some(value) = self.entry("replacements") else {
            return Ok(Vec::new());
        };
        let entries: Vec<serde_yaml::Value> = serde_yaml::from_value(value.clone())?;
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                serde_yaml::from_value(entry)
                    .map_err(|source| VarianceError::InvalidReplacement { index, source })
            })
            .collect()
    }
}

/// What one site run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteSummary {
    /// Device kinds processed, in directory order
    pub devices: Vec<String>,
    /// Files changed by site-wide replacements
    pub replaced_files: usize,
    /// Test fixtures whose expressions were evaluated
    pub evaluated_tests: usize,
}

/// A site directory under `config/`
#[derive(Debug, Clone)]
pub struct Site {
    id: String,
    directory: PathBuf,
    config: SiteConfig,
}

impl Site {
    /// Opens a site, creating its directory and an empty override file if needed.
    ///
    /// # Errors
    ///
    /// Returns `VarianceError::Io` if either cannot be created.
    pub fn open(config: &SiteConfig, id: &str) -> Result<Self> {
        let directory = config.sites_dir().join(id);
        fs::create_dir_all(&directory)?;

        let override_path = directory.join(OVERRIDE_SPEC_FILE);
        if !override_path.exists() {
            fs::write(&override_path, "")?;
        }

        Ok(Self {
            id: id.to_string(),
            directory,
            config: config.clone(),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[must_use]
    pub fn override_path(&self) -> PathBuf {
        self.directory.join(OVERRIDE_SPEC_FILE)
    }

    /// Loads the site's override file.
    ///
    /// # Errors
    ///
    /// Returns `VarianceError::Yaml` if the file is malformed.
    pub fn load_override_spec(&self) -> Result<OverrideSpec> {
        let path = self.override_path();
        if !path.is_file() {
            warn!(site = %self.id, "no override file was found");
            return Ok(OverrideSpec::default());
        }
        OverrideSpec::from_yaml_str(&read_file_contents(&path)?)
    }

    /// Runs the whole pipeline for this site: device files and templates,
    /// then site-wide replacements, then test fixture expressions.
    ///
    /// # Errors
    ///
    /// Stops at the first error of any stage.
    pub fn generate(&self) -> Result<SiteSummary> {
        debug!(site = %self.id, "retrieving override file");
        let spec = self.load_override_spec()?;
        let mut summary = SiteSummary::default();
        let mut test_dirs = Vec::new();

        let mut entries = fs::read_dir(&self.directory)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let kind = entry.file_name().to_string_lossy().into_owned();
            if !self.config.device_kinds.contains(&kind) {
                warn!(site = %self.id, dir = %kind, "not a valid device type");
                continue;
            }

            if let Some(tests) = self.process_device(&kind, &spec)? {
                test_dirs.push(tests);
            }
            summary.devices.push(kind);
        }

        let replacements = spec.replacements()?;
        if !replacements.is_empty() {
            debug!(site = %self.id, "making replacements");
            summary.replaced_files = self.replace_all_targets(replacements)?;
            info!(site = %self.id, files = summary.replaced_files, "finished making replacements");
        }

        for dir in &test_dirs {
            debug!(dir = %dir.display(), "evaluating test expressions");
            summary.evaluated_tests += evaluate_test_dir(dir)?;
        }

        Ok(summary)
    }

    /// Regenerates one device; returns its `tests` directory if it has one.
    fn process_device(&self, kind: &str, spec: &OverrideSpec) -> Result<Option<PathBuf>> {
        let mut device = Device::new(kind, &self.directory);
        device.clear_previous_files()?;

        match spec.variant(kind)? {
            Some(variant) => device.set_variant(variant),
            None => {
                let library = variants_dir(&self.config.root_dir, kind);
                if !library.is_dir() {
                    return Err(VarianceError::InvalidVariant {
                        device: kind.to_string(),
                        variant: ROOT_VARIANT.to_string(),
                        path: library,
                    });
                }
                if fs::read_dir(&library)?.count() != 1 {
                    return Err(VarianceError::MissingVariant {
                        site: self.id.clone(),
                        device: kind.to_string(),
                    });
                }
                warn!(site = %self.id, device = kind, "assuming a root configuration");
            }
        }

        device.copy_all_files(&self.config.root_dir)?;

        if let Some(templates) = spec.templates(kind)? {
            debug!(dir = %device.directory().display(), "expanding templates");
            device.expand_templates(&templates)?;
        }

        let tests = device.tests_dir();
        if tests.is_dir() {
            Ok(Some(tests))
        } else {
            info!(site = %self.id, device = kind, "found no tests");
            Ok(None)
        }
    }

    /// Applies site-wide replacements in order; returns the number of file
    /// rewrites.
    ///
    /// # Errors
    ///
    /// Stops at the first failing replacement.
    pub fn replace_all_targets(&self, replacements: Vec<FilesetReplacement>) -> Result<usize> {
        let mut changed = 0;
        for spec in replacements {
            changed += Replacement::Fileset {
                spec,
                root: self.directory.clone(),
            }
            .process()?;
        }
        Ok(changed)
    }
}

/// Evaluates expressions in every regular file directly inside `dir`.
/// Returns the number of files rewritten.
///
/// # Errors
///
/// Returns `VarianceError::InvalidTestFile` for a fixture that isn't JSON, or
/// IO errors.
pub fn evaluate_test_dir(dir: &Path) -> Result<usize> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);

    let mut evaluated = 0;
    for entry in entries {
        let path = entry.path();
        if path.is_file() {
            evaluate_test_file(&path)?;
            evaluated += 1;
        }
    }
    Ok(evaluated)
}

/// Decodes a JSON fixture, evaluates its expressions and writes it back with
/// four-space indentation.
///
/// # Errors
///
/// Returns `VarianceError::InvalidTestFile` if the file is not JSON, or IO errors.
pub fn evaluate_test_file(path: &Path) -> Result<()> {
    let contents = read_file_contents(path)?;
    let fixture: Value =
        serde_json::from_str(&contents).map_err(|source| VarianceError::InvalidTestFile {
            path: path.to_path_buf(),
            source,
        })?;

    let evaluated = walk(fixture);

    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, AsciiFormatter::new());
    evaluated.serialize(&mut serializer)?;
    fs::write(path, buffer)?;

    info!(file = %path.display(), "finished parsing numerical expressions");
    Ok(())
}

/// Four-space pretty printing with every non-ASCII character written as a
/// `\uXXXX` escape (UTF-16 surrogate pairs above the BMP)
struct AsciiFormatter<'a> {
    pretty: PrettyFormatter<'a>,
}

impl AsciiFormatter<'_> {
    fn new() -> Self {
        Self {
            pretty: PrettyFormatter::with_indent(b"    "),
        }
    }
}

impl Formatter for AsciiFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.pretty.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.pretty.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..index])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}
