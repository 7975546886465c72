//! Error types for envfile parsing and editing

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, EnvfileError>;

/// Errors raised while reading, editing or writing an environment file.
#[derive(Debug, Error)]
pub enum EnvfileError {
    /// A `BEGIN_SECTION` marker had no `END_SECTION` before end of input.
    #[error("missing END_SECTION for section \"{name}\"")]
    UnterminatedSection { name: String },

    /// No named section with this name exists.
    #[error("no such section: \"{name}\"")]
    SectionNotFound { name: String },

    /// A section name that the `BEGIN_SECTION(<name>)` marker cannot carry:
    /// empty, or containing `)` or a line break.
    #[error("invalid section name: {name:?}")]
    InvalidSectionName { name: String },

    /// A variable value containing a line break, which an assignment line cannot hold.
    #[error("value of {name} spans multiple lines")]
    MultilineValue { name: String },

    /// An insert was anchored on a section that is not part of the envfile.
    #[error("insert reference does not belong to this envfile")]
    InvalidInsertReference,

    /// The library is installed and overwriting was not requested.
    #[error("library \"{name}\" is already installed")]
    AlreadyInstalled { name: String },

    /// The library directory has no `houdini-library.json`.
    #[error("missing library configuration file: {}", path.display())]
    MissingDescriptor { path: PathBuf },

    /// The library descriptor is not valid JSON or lacks required keys.
    #[error("invalid library configuration: {0}")]
    Descriptor(#[from] serde_json::Error),

    /// A built-in marker pattern failed to compile.
    #[error("invalid marker pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
