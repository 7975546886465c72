//! Shell-like variable assignments inside section bodies
//!
//! Assignment lines have the form `NAME="value"`. Values are read back with a
//! narrow, shell-like word splitter: whitespace separates words, double and
//! single quotes group characters into one word, and a backslash escapes the
//! next character (inside double quotes only `"` and `\` are escapable).
//! There is no variable expansion, globbing or comment handling, so this is
//! shell-like rather than shell-compatible.

use crate::error::{EnvfileError, Result};

/// Separator placed between the parts of a path-list value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathListSeparator {
    /// `:` as used on Unix-like hosts
    Colon,
    /// `;` as used on Windows hosts
    Semicolon,
}

impl PathListSeparator {
    pub fn as_str(self) -> &'static str {
        match self {
            PathListSeparator::Colon => ":",
            PathListSeparator::Semicolon => ";",
        }
    }

    /// Separator matching the host convention.
    pub fn host() -> Self {
        if cfg!(windows) {
            PathListSeparator::Semicolon
        } else {
            PathListSeparator::Colon
        }
    }
}

impl Default for PathListSeparator {
    fn default() -> Self {
        Self::host()
    }
}

/// Find the first line of `body` that assigns `name` and return the first
/// word of its value.
///
/// Returns `None` when no line assigns the variable, when nothing follows the
/// `=` (`X=`), or when the value has an unterminated quote. An explicitly
/// quoted empty value (`X=""`) yields `Some("")`.
pub fn extract_value(body: &str, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    let rest = body.split('\n').find_map(|line| line.strip_prefix(prefix.as_str()))?;
    split_words(rest)?.into_iter().next()
}

/// Format `name="part1<sep>part2..."` followed by a newline.
///
/// Values are read back line by line, so a part containing `\n` or `\r` is
/// refused with [`EnvfileError::MultilineValue`].
pub fn format_assignment<S: AsRef<str>>(name: &str, parts: &[S], separator: PathListSeparator) -> Result<String> {
    let joined = parts.iter().map(AsRef::as_ref).collect::<Vec<&str>>().join(separator.as_str());
    if joined.contains(['\n', '\r']) {
        return Err(EnvfileError::MultilineValue { name: name.to_string() });
    }
    Ok(format!("{}=\"{}\"\n", name, escape_double_quoted(&joined)))
}

/// Escape a value for placement between double quotes.
///
/// Every `"` is escaped. A backslash is only escaped where the reader would
/// otherwise consume it, i.e. before `"`, before `\` and at the very end, so
/// Windows paths stay readable in the file.
fn escape_double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => {
                if matches!(chars.peek(), None | Some('"') | Some('\\')) {
                    out.push_str("\\\\");
                } else {
                    out.push('\\');
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    None,
    Double,
    Single,
}

/// Split `input` into shell-like words.
///
/// Returns `None` on an unterminated quote or a trailing lone backslash.
pub fn split_words(input: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut state = QuoteState::None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match state {
            QuoteState::None => match c {
                '"' => {
                    state = QuoteState::Double;
                    in_word = true;
                }
                '\'' => {
                    state = QuoteState::Single;
                    in_word = true;
                }
                '\\' => {
                    current.push(chars.next()?);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
            QuoteState::Double => match c {
                '"' => state = QuoteState::None,
                '\\' => match chars.next()? {
                    escaped @ ('"' | '\\') => current.push(escaped),
                    other => {
                        current.push('\\');
                        current.push(other);
                    }
                },
                c => current.push(c),
            },
            QuoteState::Single => match c {
                '\'' => state = QuoteState::None,
                c => current.push(c),
            },
        }
    }

    if state != QuoteState::None {
        return None;
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}
