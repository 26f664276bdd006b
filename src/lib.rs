//! # variance
//!
//! Generates per-site device configuration from a library of template files and
//! a site override file (`variance.yml`).
//!
//! ## Pipeline
//!
//! 1. **Template expansion**: one template file becomes a family of files, one
//!    per value of a `sequential` range or an explicit `list`, optionally
//!    followed by positional replacements over the generated files.
//! 2. **Replacements**: a placeholder is replaced by a single value in every
//!    file matched by include/exclude globs.
//! 3. **Expression evaluation**: arithmetic left in JSON test fixtures by the
//!    previous stages is evaluated.
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```no_run
//! use variance::{Site, SiteConfig};
//!
//! let config = SiteConfig::default();
//! for id in config.site_ids()? {
//!     let summary = Site::open(&config, &id)?.generate()?;
//!     println!("{id}: {} devices", summary.devices.len());
//! }
//! # Ok::<(), variance::VarianceError>(())
//! ```
//!
//! ### As a CLI Tool
//!
//! ```bash
//! # Regenerate every site under ./config
//! variance
//!
//! # One site, with progress logs
//! variance --site north --log-level info
//! ```

pub mod device;
pub mod error;
pub mod expression;
pub mod fs_utils;
pub mod pattern;
pub mod replacement;
pub mod site;
pub mod value;

#[cfg(test)]
mod test_support;

// Re-export main types and functions for convenience
pub use device::Device;
pub use error::{Result, VarianceError};
pub use expression::{evaluate_string, walk};
pub use pattern::{FilenamePattern, GeneratedFileSet, TemplateSpec, expand};
pub use replacement::{FilesetReplacement, PositionalReplacement, Replacement};
pub use site::{OverrideSpec, Site, SiteConfig, SiteSummary};
pub use value::ScalarValue;
