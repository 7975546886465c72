//! Envfile data structures

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use tracing::debug;

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{EnvfileError, Result};
use crate::vars::{self, PathListSeparator};

// Section marker constants, as written back out
pub const BEGIN_MARKER_PREFIX: &str = "# BEGIN_SECTION(";
pub const BEGIN_MARKER_SUFFIX: &str = ")";
pub const END_MARKER: &str = "# END_SECTION";

// Library naming convention
pub const LIBRARY_PREFIX: &str = "library:";
pub const LIBRARY_PATH_PREFIX: &str = "HLIBPATH_";
pub const LIBRARY_VERSION_PREFIX: &str = "HLIBVERSION_";

/// Section name used for the library `<name>`.
pub fn library_section_name(name: &str) -> String {
    format!("{}{}", LIBRARY_PREFIX, name)
}

/// Variable holding the install directory of library `<name>`.
pub fn library_path_var(name: &str) -> String {
    format!("{}{}", LIBRARY_PATH_PREFIX, name)
}

/// Variable holding the version of library `<name>`.
pub fn library_version_var(name: &str) -> String {
    format!("{}{}", LIBRARY_VERSION_PREFIX, name)
}

/// Check that `name` survives a round trip through `BEGIN_SECTION(<name>)`
///
/// The marker cannot carry an empty name, a `)` or a line break.
pub fn validate_section_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains([')', '\n', '\r']) {
        return Err(EnvfileError::InvalidSectionName { name: name.to_string() });
    }
    Ok(())
}

/// Text outside of any section markers, kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlainSection {
    /// Raw text including its original line terminators
    pub content: String,
}

impl PlainSection {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Append a raw line (terminator included)
    pub fn push_line(&mut self, line: &str) {
        self.content.push_str(line);
    }
}

/// A region delimited by `# BEGIN_SECTION(<name>)` and `# END_SECTION`
///
/// The body is either empty or ends with exactly one line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSection {
    name: String,
    content: String,
    separator: PathListSeparator,
}

impl NamedSection {
    /// Create a section, normalizing the body's trailing newlines
    pub fn new(name: impl Into<String>, content: &str) -> Self {
        Self {
            name: name.into(),
            content: normalize_body(content),
            separator: PathListSeparator::default(),
        }
    }

    /// Use `separator` when joining the parts of values added with [`add_variable`](Self::add_variable)
    pub fn with_separator(mut self, separator: PathListSeparator) -> Self {
        self.separator = separator;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn separator(&self) -> PathListSeparator {
        self.separator
    }

    pub fn clear(&mut self) {
        self.content.clear();
    }

    /// Append `text` as comment lines, one `# ` prefixed line per input line
    pub fn add_comment(&mut self, text: &str) {
        for line in text.split('\n') {
            self.content.push_str("# ");
            self.content.push_str(line);
            self.content.push('\n');
        }
    }

    /// Append `name="v1<sep>v2..."`
    ///
    /// Values containing line breaks are refused and leave the body untouched.
    pub fn add_variable<S: AsRef<str>>(&mut self, name: &str, values: &[S]) -> Result<()> {
        let line = vars::format_assignment(name, values, self.separator)?;
        self.content.push_str(&line);
        Ok(())
    }

    /// Append a raw line, terminated by exactly one newline
    pub fn add_line(&mut self, raw: &str) {
        self.content.push_str(raw.trim_end_matches(['\r', '\n']));
        self.content.push('\n');
    }

    /// First word of the value assigned to `name` in the body
    pub fn extract_var(&self, name: &str) -> Option<String> {
        vars::extract_value(&self.content, name)
    }

    pub fn is_library(&self) -> bool {
        self.name.starts_with(LIBRARY_PREFIX)
    }

    /// Name with the `library:` prefix stripped, `None` for other sections
    pub fn library_name(&self) -> Option<&str> {
        self.name.strip_prefix(LIBRARY_PREFIX)
    }

    pub fn library_path(&self) -> Option<String> {
        let name = self.library_name().filter(|n| !n.is_empty())?;
        self.extract_var(&library_path_var(name))
    }

    pub fn library_version(&self) -> Option<String> {
        let name = self.library_name().filter(|n| !n.is_empty())?;
        self.extract_var(&library_version_var(name))
    }
}

/// Strip trailing line terminators and put a single one back
///
/// Keeps a `\r\n` terminator if that is what the body ended with.
fn normalize_body(content: &str) -> String {
    let trimmed = content.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return String::new();
    }
    let eol = if content[trimmed.len()..].starts_with("\r\n") { "\r\n" } else { "\n" };
    format!("{}{}", trimmed, eol)
}

/// One unit of envfile content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Plain(PlainSection),
    Named(NamedSection),
}

impl Section {
    /// Append the on-disk form of this section to `output`
    pub fn render(&self, output: &mut String) {
        match self {
            Section::Plain(plain) => output.push_str(&plain.content),
            Section::Named(named) => {
                output.push_str(BEGIN_MARKER_PREFIX);
                output.push_str(&named.name);
                output.push_str(BEGIN_MARKER_SUFFIX);
                output.push('\n');
                output.push_str(&named.content);
                output.push_str(END_MARKER);
                output.push('\n');
            }
        }
    }

    pub fn as_named(&self) -> Option<&NamedSection> {
        match self {
            Section::Named(named) => Some(named),
            Section::Plain(_) => None,
        }
    }

    pub fn as_named_mut(&mut self) -> Option<&mut NamedSection> {
        match self {
            Section::Named(named) => Some(named),
            Section::Plain(_) => None,
        }
    }

    pub fn as_plain(&self) -> Option<&PlainSection> {
        match self {
            Section::Plain(plain) => Some(plain),
            Section::Named(_) => None,
        }
    }
}

impl From<PlainSection> for Section {
    fn from(section: PlainSection) -> Self {
        Section::Plain(section)
    }
}

impl From<NamedSection> for Section {
    fn from(section: NamedSection) -> Self {
        Section::Named(section)
    }
}

/// Stable handle to a section within one [`Envfile`]
///
/// Handles are never reused, so they stay unambiguous when two sections share
/// a name and become dangling once their section is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(u64);

/// Where [`Envfile::add_section`] inserts a new section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    End,
    Before(SectionId),
    After(SectionId),
}

/// A parsed environment file: an ordered sequence of sections
///
/// Duplicate section names are allowed; every lookup by name resolves to the
/// first match in file order.
#[derive(Debug, Clone)]
pub struct Envfile {
    sections: Vec<(SectionId, Section)>,
    next_id: u64,
    changed: bool,
    separator: PathListSeparator,
}

impl Default for Envfile {
    fn default() -> Self {
        Self {
            sections: Vec::new(),
            next_id: 0,
            changed: false,
            separator: PathListSeparator::default(),
        }
    }
}

impl Envfile {
    /// Create an empty envfile
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an envfile from already parsed sections, in order
    ///
    /// Empty plain sections are dropped. The result is not marked changed.
    pub fn from_sections(sections: impl IntoIterator<Item = Section>) -> Self {
        let mut envfile = Self::new();
        for section in sections {
            if matches!(&section, Section::Plain(plain) if plain.is_empty()) {
                continue;
            }
            let id = envfile.allocate_id();
            envfile.sections.push((id, section));
        }
        envfile
    }

    /// Use `separator` for named sections created through this envfile
    pub fn with_separator(mut self, separator: PathListSeparator) -> Self {
        self.separator = separator;
        self
    }

    pub fn separator(&self) -> PathListSeparator {
        self.separator
    }

    /// Whether the envfile was modified since it was parsed or last rendered
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// All sections in file order with their handles
    pub fn sections(&self) -> impl Iterator<Item = (SectionId, &Section)> + '_ {
        self.sections.iter().map(|(id, section)| (*id, section))
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.position(id).map(|idx| &self.sections[idx].1)
    }

    pub fn named(&self, id: SectionId) -> Option<&NamedSection> {
        self.section(id).and_then(Section::as_named)
    }

    /// Mutable access to a named section by handle; marks the envfile changed
    pub fn named_mut(&mut self, id: SectionId) -> Option<&mut NamedSection> {
        let idx = self.position(id)?;
        let named = self.sections[idx].1.as_named_mut()?;
        self.changed = true;
        Some(named)
    }

    /// Named sections in file order
    pub fn iter_named_sections(&self) -> impl Iterator<Item = &NamedSection> + '_ {
        self.sections.iter().filter_map(|(_, section)| section.as_named())
    }

    /// Handle of the first named section called `name`
    pub fn find_named(&self, name: &str) -> Option<SectionId> {
        self.sections
            .iter()
            .find(|(_, section)| section.as_named().is_some_and(|named| named.name == name))
            .map(|(id, _)| *id)
    }

    pub fn get_named_section(&self, name: &str) -> Option<&NamedSection> {
        self.iter_named_sections().find(|named| named.name == name)
    }

    /// Mutable access to the first section called `name`; marks the envfile changed
    pub fn get_named_section_mut(&mut self, name: &str) -> Option<&mut NamedSection> {
        let id = self.find_named(name)?;
        self.named_mut(id)
    }

    /// Shorthand for the section `library:<name>`
    pub fn get_library(&self, name: &str) -> Option<&NamedSection> {
        self.get_named_section(&library_section_name(name))
    }

    pub fn get_library_mut(&mut self, name: &str) -> Option<&mut NamedSection> {
        self.get_named_section_mut(&library_section_name(name))
    }

    pub fn get_first_named_section(&self) -> Option<&NamedSection> {
        self.iter_named_sections().next()
    }

    /// Handle of the first named section in file order
    pub fn first_named_id(&self) -> Option<SectionId> {
        self.sections
            .iter()
            .find(|(_, section)| section.as_named().is_some())
            .map(|(id, _)| *id)
    }

    /// Insert `section` at `placement`
    ///
    /// Fails with [`EnvfileError::InvalidSectionName`] for a named section
    /// whose name cannot be written as a marker, and with
    /// [`EnvfileError::InvalidInsertReference`] if the anchor is not part of
    /// this envfile; nothing is modified in either case.
    pub fn add_section(&mut self, section: impl Into<Section>, placement: Placement) -> Result<SectionId> {
        let section = section.into();
        if let Section::Named(named) = &section {
            validate_section_name(&named.name)?;
        }
        let index = self.insert_index(placement)?;
        let id = self.allocate_id();
        self.sections.insert(index, (id, section));
        self.changed = true;
        debug!(index, ?placement, "inserted section");
        Ok(id)
    }

    /// Create a named section with this envfile's separator and insert it
    pub fn add_named_section(
        &mut self,
        name: impl Into<String>,
        content: &str,
        placement: Placement,
    ) -> Result<&mut NamedSection> {
        let section = NamedSection::new(name, content).with_separator(self.separator);
        let id = self.add_section(section, placement)?;
        self.named_mut(id).ok_or(EnvfileError::InvalidInsertReference)
    }

    pub fn add_plain_content(&mut self, content: impl Into<String>, placement: Placement) -> Result<&mut PlainSection> {
        let id = self.add_section(PlainSection::new(content), placement)?;
        let idx = self.position(id).ok_or(EnvfileError::InvalidInsertReference)?;
        match &mut self.sections[idx].1 {
            Section::Plain(plain) => Ok(plain),
            Section::Named(_) => Err(EnvfileError::InvalidInsertReference),
        }
    }

    /// Remove the first named section called `name` and return it
    pub fn remove_section(&mut self, name: &str) -> Result<Section> {
        let id = self
            .find_named(name)
            .ok_or_else(|| EnvfileError::SectionNotFound { name: name.to_string() })?;
        self.remove(id).ok_or_else(|| EnvfileError::SectionNotFound { name: name.to_string() })
    }

    /// Remove a section by handle
    pub fn remove(&mut self, id: SectionId) -> Option<Section> {
        let idx = self.position(id)?;
        let (_, section) = self.sections.remove(idx);
        self.changed = true;
        debug!(index = idx, "removed section");
        Some(section)
    }

    /// Write every section in order to `writer` and clear the changed flag
    pub fn render<W: Write>(&mut self, writer: W) -> Result<()> {
        Encoder::new().encode_to_writer(self, writer)?;
        self.changed = false;
        Ok(())
    }

    fn insert_index(&self, placement: Placement) -> Result<usize> {
        match placement {
            Placement::End => Ok(self.sections.len()),
            Placement::Before(anchor) => self.position(anchor).ok_or(EnvfileError::InvalidInsertReference),
            Placement::After(anchor) => self
                .position(anchor)
                .map(|idx| idx + 1)
                .ok_or(EnvfileError::InvalidInsertReference),
        }
    }

    fn position(&self, id: SectionId) -> Option<usize> {
        self.sections.iter().position(|(candidate, _)| *candidate == id)
    }

    fn allocate_id(&mut self) -> SectionId {
        let id = SectionId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl FromStr for Envfile {
    type Err = EnvfileError;

    fn from_str(s: &str) -> Result<Self> {
        Decoder::new().decode(s)
    }
}

impl fmt::Display for Envfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Encoder::new().encode(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envfile {
        "HOUDINI_PATH=\"&\"\n\
         # BEGIN_SECTION(DEFAULT)\n\
         PYTHONPATH=\"&\"\n\
         # END_SECTION\n\
         # BEGIN_SECTION(library:foo)\n\
         HLIBPATH_foo=\"/opt/foo\"\n\
         HLIBVERSION_foo=\"1.2.0\"\n\
         # END_SECTION\n"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_named_body_normalized() {
        assert_eq!(NamedSection::new("a", "x=1").content(), "x=1\n");
        assert_eq!(NamedSection::new("a", "x=1\n\n\n").content(), "x=1\n");
        assert_eq!(NamedSection::new("a", "x=1\r\n").content(), "x=1\r\n");
        assert_eq!(NamedSection::new("a", "").content(), "");
        assert_eq!(NamedSection::new("a", "\n\n").content(), "");
    }

    #[test]
    fn test_add_comment_prefixes_each_line() {
        let mut section = NamedSection::new("a", "");
        section.add_comment("first\nsecond");
        assert_eq!(section.content(), "# first\n# second\n");
    }

    #[test]
    fn test_add_line_single_newline() {
        let mut section = NamedSection::new("a", "");
        section.add_line("FOO=bar\n\n");
        section.add_line("BAZ=1");
        assert_eq!(section.content(), "FOO=bar\nBAZ=1\n");
    }

    #[test]
    fn test_clear_keeps_name() {
        let mut section = NamedSection::new("library:foo", "x=1\n");
        section.clear();
        assert_eq!(section.content(), "");
        assert_eq!(section.name(), "library:foo");
    }

    #[test]
    fn test_add_variable_then_extract() {
        let mut section = NamedSection::new("library:foo", "").with_separator(PathListSeparator::Colon);
        section.add_variable("HLIBPATH_foo", &["/opt/a", "/opt/b"]).unwrap();
        assert_eq!(section.extract_var("HLIBPATH_foo").as_deref(), Some("/opt/a:/opt/b"));

        section.add_variable("QUOTED", &["a \"b\""]).unwrap();
        assert_eq!(section.extract_var("QUOTED").as_deref(), Some("a \"b\""));
    }

    #[test]
    fn test_add_variable_uses_host_separator_by_default() {
        let mut section = NamedSection::new("x", "");
        section.add_variable("P", &["a", "b"]).unwrap();
        let expected = format!("a{}b", PathListSeparator::host().as_str());
        assert_eq!(section.extract_var("P"), Some(expected));
    }

    #[test]
    fn test_add_variable_refuses_multiline_value() {
        let mut section = NamedSection::new("x", "A=1\n");
        let err = section.add_variable("V", &["a\nb"]).unwrap_err();
        assert!(matches!(err, EnvfileError::MultilineValue { ref name } if name == "V"));
        assert_eq!(section.content(), "A=1\n");
    }

    #[test]
    fn test_library_accessors() {
        let env = sample();
        let lib = env.get_library("foo").unwrap();
        assert!(lib.is_library());
        assert_eq!(lib.library_name(), Some("foo"));
        assert_eq!(lib.library_path().as_deref(), Some("/opt/foo"));
        assert_eq!(lib.library_version().as_deref(), Some("1.2.0"));

        let default = env.get_named_section("DEFAULT").unwrap();
        assert!(!default.is_library());
        assert_eq!(default.library_name(), None);
        assert_eq!(default.library_path(), None);
    }

    #[test]
    fn test_library_missing_variables() {
        let section = NamedSection::new("library:bar", "# nothing here\n");
        assert_eq!(section.library_path(), None);
        assert_eq!(section.library_version(), None);
    }

    #[test]
    fn test_parsed_envfile_is_unchanged() {
        let env = sample();
        assert!(!env.is_changed());
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn test_iter_named_sections_in_order() {
        let env = sample();
        let names: Vec<_> = env.iter_named_sections().map(NamedSection::name).collect();
        assert_eq!(names, vec!["DEFAULT", "library:foo"]);
        assert_eq!(env.get_first_named_section().unwrap().name(), "DEFAULT");
    }

    #[test]
    fn test_duplicate_names_first_match_wins() {
        let mut env: Envfile = "# BEGIN_SECTION(dup)\nA=1\n# END_SECTION\n\
                                # BEGIN_SECTION(dup)\nA=2\n# END_SECTION\n"
            .parse()
            .unwrap();
        assert_eq!(env.get_named_section("dup").unwrap().extract_var("A").as_deref(), Some("1"));

        env.remove_section("dup").unwrap();
        assert_eq!(env.get_named_section("dup").unwrap().extract_var("A").as_deref(), Some("2"));
    }

    #[test]
    fn test_add_section_appends_by_default() {
        let mut env = sample();
        env.add_named_section("extra", "", Placement::End).unwrap();
        assert!(env.is_changed());
        assert_eq!(env.iter_named_sections().last().unwrap().name(), "extra");
    }

    #[test]
    fn test_add_section_before_and_after() {
        let mut env = sample();
        let first = env.first_named_id().unwrap();
        env.add_named_section("before", "", Placement::Before(first)).unwrap();
        env.add_named_section("after", "", Placement::After(first)).unwrap();

        let names: Vec<_> = env.iter_named_sections().map(NamedSection::name).collect();
        assert_eq!(names, vec!["before", "DEFAULT", "after", "library:foo"]);
    }

    #[test]
    fn test_handles_disambiguate_duplicate_names() {
        let mut env = Envfile::new();
        env.add_named_section("dup", "A=1", Placement::End).unwrap();
        let second = env.add_section(NamedSection::new("dup", "A=2"), Placement::End).unwrap();
        env.add_plain_content("# marker\n", Placement::Before(second)).unwrap();

        let rendered = env.to_string();
        assert_eq!(
            rendered,
            "# BEGIN_SECTION(dup)\nA=1\n# END_SECTION\n\
             # marker\n\
             # BEGIN_SECTION(dup)\nA=2\n# END_SECTION\n"
        );
    }

    #[test]
    fn test_add_section_with_stale_reference() {
        let mut env = sample();
        let id = env.find_named("DEFAULT").unwrap();
        env.remove(id).unwrap();
        env.render(Vec::new()).unwrap();

        let result = env.add_named_section("x", "", Placement::After(id));
        assert!(matches!(result, Err(EnvfileError::InvalidInsertReference)));
        assert!(!env.is_changed());
        assert!(env.get_named_section("x").is_none());
    }

    #[test]
    fn test_add_section_rejects_names_markers_cannot_hold() {
        let mut env = sample();
        let before = env.to_string();
        for name in ["library:a)b", "a\nb", "a\r", ""] {
            let err = env.add_named_section(name, "X=1\n", Placement::End).unwrap_err();
            assert!(matches!(err, EnvfileError::InvalidSectionName { name: ref bad } if bad == name));
        }
        assert!(!env.is_changed());
        assert_eq!(env.to_string(), before);
    }

    #[test]
    fn test_added_section_survives_reparse() {
        let mut env = Envfile::new();
        env.add_named_section("library:a(b c", "X=1\n", Placement::End).unwrap();
        let reparsed: Envfile = env.to_string().parse().unwrap();
        assert_eq!(reparsed.get_library("a(b c").unwrap().content(), "X=1\n");
    }

    #[test]
    fn test_validate_section_name() {
        assert!(validate_section_name("library:foo").is_ok());
        assert!(validate_section_name("with spaces").is_ok());
        assert!(validate_section_name("a)").is_err());
        assert!(validate_section_name("").is_err());
    }

    #[test]
    fn test_remove_section() {
        let mut env = sample();
        let removed = env.remove_section("library:foo").unwrap();
        assert_eq!(removed.as_named().unwrap().name(), "library:foo");
        assert!(env.get_library("foo").is_none());
        assert!(env.is_changed());
    }

    #[test]
    fn test_remove_missing_section_leaves_envfile_untouched() {
        let mut env = sample();
        let before = env.to_string();
        let err = env.remove_section("library:nope").unwrap_err();
        assert!(matches!(err, EnvfileError::SectionNotFound { ref name } if name == "library:nope"));
        assert!(!env.is_changed());
        assert_eq!(env.to_string(), before);
    }

    #[test]
    fn test_mutable_access_marks_changed() {
        let mut env = sample();
        env.get_library_mut("foo").unwrap().add_line("EXTRA=1");
        assert!(env.is_changed());
        assert!(env.get_library("foo").unwrap().content().ends_with("EXTRA=1\n"));
    }

    #[test]
    fn test_render_resets_changed() {
        let mut env = sample();
        env.remove_section("DEFAULT").unwrap();
        let mut first = Vec::new();
        env.render(&mut first).unwrap();
        assert!(!env.is_changed());

        let mut second = Vec::new();
        env.render(&mut second).unwrap();
        assert_eq!(first, second);
        assert!(!env.is_changed());
    }

    #[test]
    fn test_from_sections_drops_empty_plain() {
        let env = Envfile::from_sections(vec![
            Section::Plain(PlainSection::new("")),
            Section::Named(NamedSection::new("a", "")),
        ]);
        assert_eq!(env.len(), 1);
    }
}
