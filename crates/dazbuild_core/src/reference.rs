//! Reference grammar: `<file-path>[.<segment>]*`.
//!
//! A file path may itself contain dots (`a.py`, `pkg/mod.test.py`), so the
//! split between path and scope segments is decided against the set of known
//! files: the longest known path that is the whole reference or is followed
//! by a `.` owns it.

use crate::error::{DazError, Result};

/// Normalises caller input: trims whitespace, converts `\` to `/`, drops a
/// leading `./` and accepts `::` as a scope separator.
pub fn normalize(reference: &str) -> String {
    let trimmed = reference.trim().replace('\\', "/").replace("::", ".");
    let mut rest = trimmed.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.trim_start_matches('/').to_string()
}

/// Finds the file owning `reference` among `files`.
pub fn resolve_file<'a, I>(reference: &str, files: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    files
        .into_iter()
        .filter(|path| owns(path, reference))
        .max_by_key(|path| path.len())
}

fn owns(path: &str, reference: &str) -> bool {
    match reference.strip_prefix(path) {
        Some("") => true,
        Some(rest) => rest.starts_with('.') && rest.len() > 1,
        None => false,
    }
}

/// Joins a parent reference and a child scope segment.
pub fn child(parent: &str, name: &str) -> String {
    format!("{}.{}", parent, name)
}

/// Joins a directory and a file name into a file reference.
pub fn child_file(directory: &str, name: &str) -> String {
    let directory = directory.trim_end_matches('/');
    if directory.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", directory, name)
    }
}

/// Returns whether `reference` lies strictly below `ancestor`.
pub fn is_descendant(reference: &str, ancestor: &str) -> bool {
    reference.len() > ancestor.len() + 1
        && reference.starts_with(ancestor)
        && reference.as_bytes()[ancestor.len()] == b'.'
}

/// Validates an element name (one scope segment).
pub fn validate_segment(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_alphabetic() || first == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DazError::InvalidReference(format!(
            "`{}` is not a valid element name",
            name
        )))
    }
}

/// Validates a relative file path used as a new file name.
pub fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('/')
        || name.ends_with('/')
        || name
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        Err(DazError::InvalidReference(format!(
            "`{}` is not a valid relative file path",
            name
        )))
    } else {
        Ok(())
    }
}
