//! Envfile decoder

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::envfile::{Envfile, NamedSection, PlainSection, Section};
use crate::error::{EnvfileError, Result};
use crate::vars::PathListSeparator;

/// Compiled begin/end marker patterns
struct Markers {
    begin: Regex,
    end: Regex,
}

impl Markers {
    fn compile() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            begin: Regex::new(r"^#+\s*BEGIN_SECTION\(([^)]+)\)\s*$")?,
            end: Regex::new(r"^#+\s*END_SECTION\s*")?,
        })
    }

    /// Patterns shared by every decoder, compiled on first use
    fn get() -> Result<&'static Markers> {
        static MARKERS: OnceLock<std::result::Result<Markers, regex::Error>> = OnceLock::new();
        MARKERS
            .get_or_init(Markers::compile)
            .as_ref()
            .map_err(|err| EnvfileError::Pattern(err.clone()))
    }

    fn begin_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.begin.captures(line).and_then(|caps| caps.get(1)).map(|m| m.as_str())
    }

    fn is_end(&self, line: &str) -> bool {
        self.end.is_match(line)
    }
}

/// Name captured from a `BEGIN_SECTION(<name>)` line, if it is one
pub fn parse_begin_marker(line: &str) -> Result<Option<&str>> {
    Ok(Markers::get()?.begin_name(line))
}

pub fn is_end_marker(line: &str) -> Result<bool> {
    Ok(Markers::get()?.is_end(line))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseState {
    /// Outside any section, accumulating plain text
    Scanning,
    /// Inside the named section, until the first end marker
    Collecting { name: String },
}

/// Decodes environment files into sections
pub struct Decoder {
    separator: PathListSeparator,
}

impl Decoder {
    /// Create a new decoder using the host path-list separator
    pub fn new() -> Self {
        Self {
            separator: PathListSeparator::default(),
        }
    }

    /// Separator that decoded sections use for variables added later
    pub fn with_separator(mut self, separator: PathListSeparator) -> Self {
        self.separator = separator;
        self
    }

    /// Decode an envfile from a string
    ///
    /// Markers are only recognized at line starts. Nested begin markers are
    /// treated as body text; the first end marker closes the open section.
    pub fn decode(&self, input: &str) -> Result<Envfile> {
        let mut sections = Vec::new();
        let mut plain = PlainSection::default();
        let mut body = String::new();
        let mut state = ParseState::Scanning;
        let markers = Markers::get()?;

        for line in input.split_inclusive('\n') {
            match &state {
                ParseState::Scanning => {
                    if let Some(name) = markers.begin_name(line) {
                        let finished = std::mem::take(&mut plain);
                        if !finished.is_empty() {
                            sections.push(Section::Plain(finished));
                        }
                        state = ParseState::Collecting { name: name.to_string() };
                    } else {
                        plain.push_line(line);
                    }
                }
                ParseState::Collecting { name } => {
                    if markers.is_end(line) {
                        let named = NamedSection::new(name.as_str(), &body).with_separator(self.separator);
                        sections.push(Section::Named(named));
                        body.clear();
                        state = ParseState::Scanning;
                    } else {
                        body.push_str(line);
                    }
                }
            }
        }

        if let ParseState::Collecting { name } = state {
            return Err(EnvfileError::UnterminatedSection { name });
        }
        if !plain.is_empty() {
            sections.push(Section::Plain(plain));
        }

        let envfile = Envfile::from_sections(sections).with_separator(self.separator);
        warn_on_duplicates(&envfile);
        debug!(sections = envfile.len(), "decoded envfile");
        Ok(envfile)
    }

    /// Decode an envfile read to the end from `reader`
    pub fn decode_reader<R: Read>(&self, mut reader: R) -> Result<Envfile> {
        let mut input = String::new();
        reader.read_to_string(&mut input)?;
        self.decode(&input)
    }

    /// Decode an envfile from disk
    pub fn decode_file(&self, path: &Path) -> Result<Envfile> {
        let input = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), bytes = input.len(), "read envfile");
        self.decode(&input)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode an envfile from `reader` with default settings
pub fn parse<R: Read>(reader: R) -> Result<Envfile> {
    Decoder::new().decode_reader(reader)
}

fn warn_on_duplicates(envfile: &Envfile) {
    let mut seen = HashSet::new();
    for section in envfile.iter_named_sections() {
        if !seen.insert(section.name()) {
            warn!(name = section.name(), "duplicate section name, lookups resolve to the first one");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;

    const SCENARIO: &str = "HOUDINI_PATH=\"&\"\n\
# BEGIN_SECTION(library:foo)\n\
HLIBPATH_foo=\"/opt/foo\"\n\
HLIBVERSION_foo=\"1.2.0\"\n\
# END_SECTION\n";

    fn round_trip(input: &str) -> String {
        let envfile = Decoder::new().decode(input).unwrap();
        Encoder::new().encode(&envfile)
    }

    #[test]
    fn test_begin_marker_grammar() {
        assert_eq!(parse_begin_marker("# BEGIN_SECTION(foo)\n").unwrap(), Some("foo"));
        assert_eq!(parse_begin_marker("###BEGIN_SECTION(library:x y)  \n").unwrap(), Some("library:x y"));
        assert_eq!(parse_begin_marker("# BEGIN_SECTION(foo)\r\n").unwrap(), Some("foo"));
        assert_eq!(parse_begin_marker("# BEGIN_SECTION()\n").unwrap(), None);
        assert_eq!(parse_begin_marker("# BEGIN_SECTION(foo) trailing\n").unwrap(), None);
        assert_eq!(parse_begin_marker(" # BEGIN_SECTION(foo)\n").unwrap(), None);
        assert_eq!(parse_begin_marker("# begin_section(foo)\n").unwrap(), None);
    }

    #[test]
    fn test_end_marker_grammar() {
        assert!(is_end_marker("# END_SECTION\n").unwrap());
        assert!(is_end_marker("##END_SECTION").unwrap());
        assert!(is_end_marker("# END_SECTION(foo)\n").unwrap());
        assert!(!is_end_marker("END_SECTION\n").unwrap());
        assert!(!is_end_marker("  # END_SECTION\n").unwrap());
    }

    #[test]
    fn test_marker_patterns_compile_once() {
        let first = Markers::get().unwrap();
        let second = Markers::get().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_decode_scenario() {
        let envfile = Decoder::new().decode(SCENARIO).unwrap();
        let sections: Vec<_> = envfile.sections().map(|(_, s)| s.clone()).collect();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].as_plain().unwrap().content, "HOUDINI_PATH=\"&\"\n");
        assert_eq!(sections[1].as_named().unwrap().name(), "library:foo");

        let lib = envfile.get_library("foo").unwrap();
        assert_eq!(lib.library_version().as_deref(), Some("1.2.0"));
        assert_eq!(lib.library_path().as_deref(), Some("/opt/foo"));
    }

    #[test]
    fn test_round_trip_exact() {
        let input = "# leading comment\n\
\n\
HOUDINI_PATH=\"&\"\n\
# BEGIN_SECTION(DEFAULT)\n\
HOUDINI_PATH=\"&\"\n\
# END_SECTION\n\
between\n\
# BEGIN_SECTION(library:foo)\n\
HLIBPATH_foo=\"/opt/foo\"\n\
# END_SECTION\n\
trailing without newline";
        assert_eq!(round_trip(input), input);
    }

    #[test]
    fn test_round_trip_normalizes_named_bodies() {
        let input = "# BEGIN_SECTION(a)\nx=1\n\n\n# END_SECTION\n";
        assert_eq!(round_trip(input), "# BEGIN_SECTION(a)\nx=1\n# END_SECTION\n");
    }

    #[test]
    fn test_round_trip_rewrites_marker_spelling() {
        let input = "### BEGIN_SECTION(a)  \nx=1\n##END_SECTION\n";
        assert_eq!(round_trip(input), "# BEGIN_SECTION(a)\nx=1\n# END_SECTION\n");
    }

    #[test]
    fn test_empty_input() {
        let envfile = Decoder::new().decode("").unwrap();
        assert!(envfile.is_empty());
        assert_eq!(round_trip(""), "");
    }

    #[test]
    fn test_adjacent_sections_have_no_plain_between() {
        let input = "# BEGIN_SECTION(a)\n# END_SECTION\n# BEGIN_SECTION(b)\n# END_SECTION\n";
        let envfile = Decoder::new().decode(input).unwrap();
        assert_eq!(envfile.len(), 2);
        assert_eq!(envfile.get_named_section("a").unwrap().content(), "");
    }

    #[test]
    fn test_nested_begin_is_body_text() {
        let input = "# BEGIN_SECTION(outer)\n# BEGIN_SECTION(inner)\nx=1\n# END_SECTION\nafter\n";
        let envfile = Decoder::new().decode(input).unwrap();

        assert_eq!(envfile.len(), 2);
        let outer = envfile.get_named_section("outer").unwrap();
        assert_eq!(outer.content(), "# BEGIN_SECTION(inner)\nx=1\n");
        assert!(envfile.get_named_section("inner").is_none());
    }

    #[test]
    fn test_unterminated_section() {
        let err = Decoder::new().decode("# BEGIN_SECTION(x)\nfoo\n").unwrap_err();
        assert!(matches!(err, EnvfileError::UnterminatedSection { ref name } if name == "x"));
    }

    #[test]
    fn test_stray_end_marker_is_plain() {
        let input = "# END_SECTION\nx=1\n";
        let envfile = Decoder::new().decode(input).unwrap();
        assert_eq!(envfile.len(), 1);
        assert_eq!(round_trip(input), input);
    }

    #[test]
    fn test_crlf_preserved_in_plain_text() {
        let input = "A=1\r\nB=2\r\n";
        assert_eq!(round_trip(input), input);
    }

    #[test]
    fn test_decode_reader() {
        let envfile = parse(SCENARIO.as_bytes()).unwrap();
        assert!(envfile.get_library("foo").is_some());
    }

    #[test]
    fn test_decode_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("houdini.env");
        std::fs::write(&path, SCENARIO).unwrap();

        let envfile = Decoder::new().decode_file(&path).unwrap();
        assert_eq!(envfile.to_string(), SCENARIO);
    }

    #[test]
    fn test_decode_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Decoder::new().decode_file(&dir.path().join("nope.env")).unwrap_err();
        assert!(matches!(err, EnvfileError::Io(_)));
    }

    #[test]
    fn test_separator_propagates_to_sections() {
        let mut envfile = Decoder::new()
            .with_separator(PathListSeparator::Semicolon)
            .decode(SCENARIO)
            .unwrap();
        let lib = envfile.get_library_mut("foo").unwrap();
        lib.add_variable("HOUDINI_PATH", &["&", "C:/lib"]).unwrap();
        assert_eq!(lib.extract_var("HOUDINI_PATH").as_deref(), Some("&;C:/lib"));
    }
}
