//! Library installation on top of envfile sections
//!
//! A library lives in a directory with a `houdini-library.json` descriptor.
//! Installing it writes a `library:<name>` section that extends
//! `HOUDINI_PATH` (and `PYTHONPATH` when the library ships a `python/`
//! directory) and records where and which version was installed. A `DEFAULT`
//! section placed before all other sections keeps Houdini's own search paths
//! in front.

use std::path::Path;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::envfile::{
    library_path_var, library_section_name, library_version_var, validate_section_name, Envfile, NamedSection,
    Placement,
};
use crate::error::{EnvfileError, Result};

pub const DESCRIPTOR_FILE: &str = "houdini-library.json";
pub const DEFAULT_SECTION: &str = "DEFAULT";
pub const PYTHON_DIR: &str = "python";

/// Contents of `houdini-library.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDescriptor {
    pub library_name: String,
    pub library_version: String,
    /// Extra raw assignment lines copied into the library section
    #[serde(default)]
    pub environment: Vec<String>,
}

impl LibraryDescriptor {
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Load the descriptor of the library in `directory`
    pub fn load(directory: &Path) -> Result<Self> {
        let path = directory.join(DESCRIPTOR_FILE);
        if !path.is_file() {
            return Err(EnvfileError::MissingDescriptor { path });
        }
        let input = std::fs::read_to_string(&path)?;
        Self::from_json(&input)
    }
}

/// Settings for [`install_library`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Replace an existing section for the same library
    pub overwrite: bool,
    /// Tool version written into the generated comments
    pub tool_version: String,
    /// `YYYY-MM-DD HH:MM` written into the generated comments
    pub timestamp: String,
}

impl InstallOptions {
    /// Options stamped with this crate's version and the current local time
    pub fn new(overwrite: bool) -> Self {
        Self {
            overwrite,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: current_timestamp(),
        }
    }
}

fn current_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default()
}

/// What [`install_library`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    /// A previous installation of the same library was replaced
    Overwritten,
}

/// A library section as seen by listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledLibrary {
    pub name: String,
    pub version: Option<String>,
    pub path: Option<String>,
}

/// Every library section in file order
pub fn installed_libraries(envfile: &Envfile) -> Vec<InstalledLibrary> {
    envfile
        .iter_named_sections()
        .filter_map(|section| {
            let name = section.library_name()?;
            Some(InstalledLibrary {
                name: name.to_string(),
                version: section.library_version(),
                path: section.library_path(),
            })
        })
        .collect()
}

/// Write the `library:<name>` section for the library in `directory`
///
/// Fails without modifying the envfile when the library name cannot be
/// stored in a section marker ([`EnvfileError::InvalidSectionName`]), when a
/// value spans several lines ([`EnvfileError::MultilineValue`]), or with
/// [`EnvfileError::AlreadyInstalled`] when the library is present and
/// `options.overwrite` is unset.
pub fn install_library(
    envfile: &mut Envfile,
    descriptor: &LibraryDescriptor,
    directory: &Path,
    options: &InstallOptions,
) -> Result<InstallOutcome> {
    let name = &descriptor.library_name;
    let section_name = library_section_name(name);
    if name.is_empty() {
        return Err(EnvfileError::InvalidSectionName { name: section_name });
    }
    validate_section_name(&section_name)?;
    let previous = envfile.find_named(&section_name).is_some();
    if previous && !options.overwrite {
        return Err(EnvfileError::AlreadyInstalled { name: name.clone() });
    }

    let mut section = NamedSection::new(section_name.as_str(), "").with_separator(envfile.separator());
    let dir = directory.to_string_lossy().into_owned();
    write_library_body(&mut section, descriptor, directory, &dir, options)?;

    write_default_section(envfile, options)?;
    match envfile.find_named(&section_name) {
        Some(id) => {
            let existing = envfile
                .named_mut(id)
                .ok_or_else(|| EnvfileError::SectionNotFound { name: section_name.clone() })?;
            *existing = section;
        }
        None => {
            envfile.add_section(section, Placement::End)?;
        }
    }

    info!(library = %name, version = %descriptor.library_version, path = %dir, "installed library");
    Ok(if previous {
        InstallOutcome::Overwritten
    } else {
        InstallOutcome::Installed
    })
}

fn write_library_body(
    section: &mut NamedSection,
    descriptor: &LibraryDescriptor,
    directory: &Path,
    dir: &str,
    options: &InstallOptions,
) -> Result<()> {
    let name = &descriptor.library_name;
    write_header(section, options);
    section.add_variable("HOUDINI_PATH", &["$HOUDINI_PATH", dir])?;
    let python = directory.join(PYTHON_DIR);
    if python.is_dir() {
        let python = python.to_string_lossy().into_owned();
        section.add_variable("PYTHONPATH", &["$PYTHONPATH", python.as_str()])?;
    }
    section.add_variable(&library_path_var(name), &[dir])?;
    section.add_variable(&library_version_var(name), &[descriptor.library_version.as_str()])?;
    if !descriptor.environment.is_empty() {
        section.add_comment("Environment variables specified by the library:");
        for line in &descriptor.environment {
            section.add_line(line);
        }
    }
    Ok(())
}

/// Remove the section of library `name`
pub fn uninstall_library(envfile: &mut Envfile, name: &str) -> Result<()> {
    envfile.remove_section(&library_section_name(name))?;
    info!(library = %name, "removed library");
    Ok(())
}

/// Reset the `DEFAULT` section, creating it before the first named section
fn write_default_section(envfile: &mut Envfile, options: &InstallOptions) -> Result<()> {
    let section = match envfile.find_named(DEFAULT_SECTION) {
        Some(id) => envfile.named_mut(id).ok_or_else(|| EnvfileError::SectionNotFound {
            name: DEFAULT_SECTION.to_string(),
        })?,
        None => {
            let placement = envfile.first_named_id().map_or(Placement::End, Placement::Before);
            debug!(?placement, "creating DEFAULT section");
            envfile.add_named_section(DEFAULT_SECTION, "", placement)?
        }
    };
    section.clear();
    write_header(section, options);
    section.add_variable("HOUDINI_PATH", &["&"])?;
    section.add_variable("PYTHONPATH", &["&"])?;
    Ok(())
}

fn write_header(section: &mut NamedSection, options: &InstallOptions) {
    section.add_comment(&format!("  Automatically generated by houdini-manage v{}", options.tool_version));
    section.add_comment(&format!("  Last update: {}", options.timestamp));
}
