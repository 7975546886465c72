//! # houdini-manage
//!
//! Section-preserving editing of Houdini environment files (`houdini.env`).
//!
//! ## File Format
//!
//! An env file is free-form text in which tools may own *named sections*:
//!
//! ```text
//! HOUDINI_PATH="&"
//! # BEGIN_SECTION(library:foo)
//! HLIBPATH_foo="/opt/foo"
//! HLIBVERSION_foo="1.2.0"
//! # END_SECTION
//! ```
//!
//! Everything outside a marker pair is kept byte for byte. Markers must start
//! a line; one or more `#` are accepted on read and exactly one is written.
//! Section bodies are normalized to end with a single newline.
//!
//! ## Libraries
//!
//! A section named `library:<name>` describes an installed library through
//! the `HLIBPATH_<name>` and `HLIBVERSION_<name>` assignments in its body.
//! See [`library`] for installing and removing them.
//!
//! ## Example
//!
//! ```
//! use houdini_manage::{Decoder, Placement};
//!
//! let mut env = Decoder::new().decode("HOUDINI_PATH=\"&\"\n").unwrap();
//! let section = env.add_named_section("library:foo", "", Placement::End).unwrap();
//! section.add_variable("HLIBVERSION_foo", &["1.2.0"]).unwrap();
//!
//! assert_eq!(env.get_library("foo").unwrap().library_version().as_deref(), Some("1.2.0"));
//! assert!(env.is_changed());
//! ```

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod envfile;
pub mod error;
pub mod library;
pub mod vars;

pub use config::{resolve_envfile_path, Preferences};
pub use decoder::{parse, Decoder};
pub use encoder::Encoder;
pub use envfile::{Envfile, NamedSection, Placement, PlainSection, Section, SectionId};
pub use error::{EnvfileError, Result};
pub use library::{
    install_library, installed_libraries, uninstall_library, InstallOptions, InstallOutcome,
    InstalledLibrary, LibraryDescriptor,
};
pub use vars::PathListSeparator;
