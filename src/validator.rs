//! Id, collection-path, db-name, and document-shape validation.

use crate::document::Document;
use crate::error::Error;

/// Conservative cross-platform path length budget (Windows `MAX_PATH` is the
/// tightest common limit at 260; this leaves headroom for a drive prefix).
pub const MAX_FILE_PATH_LENGTH: usize = 255;

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn has_forbidden_char(segment: &str) -> bool {
    segment.chars().any(|c| matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0'))
}

/// Normalize a collection path: backslash/yen become `/`, runs of `/`
/// collapse, a lone `/` becomes empty, a trailing `/` is added if missing
/// (and the path is non-empty).
#[must_use]
pub fn normalize_collection_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let replaced: String = path
        .chars()
        .map(|c| if c == '\\' || c == '¥' { '/' } else { c })
        .collect();
    let mut segments: Vec<&str> = replaced.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return String::new();
    }
    segments.push("");
    segments.join("/")
}

/// Validate a (normalized) collection path's segments.
///
/// # Errors
/// Returns [`Error::InvalidCollectionPathCharacter`] or
/// [`Error::InvalidCollectionPathLength`].
pub fn validate_collection_path(path: &str, max_len: usize) -> Result<(), Error> {
    if path.len() > max_len {
        return Err(Error::InvalidCollectionPathLength {
            path: path.to_owned(),
            len: path.len(),
            max: max_len,
        });
    }
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        validate_path_segment(segment).map_err(|reason| Error::InvalidCollectionPathCharacter {
            path: path.to_owned(),
            reason,
        })?;
    }
    Ok(())
}

fn validate_path_segment(segment: &str) -> Result<(), String> {
    if segment == "." || segment == ".." {
        return Err(format!("segment `{segment}` is reserved"));
    }
    if WINDOWS_RESERVED
        .iter()
        .any(|r| segment.eq_ignore_ascii_case(r))
    {
        return Err(format!("segment `{segment}` is a Windows-reserved name"));
    }
    if has_forbidden_char(segment) {
        return Err(format!("segment `{segment}` contains a forbidden character"));
    }
    Ok(())
}

/// The maximum id length, derived from `MAX_FILE_PATH_LENGTH`, the working
/// directory length, and the serialization extension length, per §4.1:
/// `maxIdLength = MAX − workingDir.length − 1 − len(ext)`.
#[must_use]
pub fn max_id_length(working_dir_len: usize, ext: &str) -> usize {
    MAX_FILE_PATH_LENGTH.saturating_sub(working_dir_len).saturating_sub(1).saturating_sub(ext.len())
}

/// The maximum collection path length for a given working directory and extension.
#[must_use]
pub fn max_collection_path_length(working_dir_len: usize, ext: &str) -> usize {
    max_id_length(working_dir_len, ext)
}

/// The maximum working directory path length (one byte must remain for at
/// least a one-character id plus the extension).
#[must_use]
pub const fn max_working_directory_length() -> usize {
    MAX_FILE_PATH_LENGTH
}

/// Validate a short id.
///
/// # Errors
/// Returns [`Error::InvalidIdCharacter`] or [`Error::InvalidIdLength`].
pub fn validate_id(id: &str, max_len: usize) -> Result<(), Error> {
    if id.is_empty() {
        return Err(Error::InvalidIdCharacter {
            id: id.to_owned(),
            reason: "id must not be empty".to_owned(),
        });
    }
    if id.len() > max_len {
        return Err(Error::InvalidIdLength {
            id: id.to_owned(),
            len: id.len(),
            max: max_len,
        });
    }
    if id.starts_with('_') || id.starts_with('/') {
        return Err(Error::InvalidIdCharacter {
            id: id.to_owned(),
            reason: "id must not begin with `_` or `/`".to_owned(),
        });
    }
    if id.ends_with('/') {
        return Err(Error::InvalidIdCharacter {
            id: id.to_owned(),
            reason: "id must not end with `/`".to_owned(),
        });
    }
    for segment in id.split('/') {
        if segment.ends_with('.') || segment.ends_with(' ') {
            return Err(Error::InvalidIdCharacter {
                id: id.to_owned(),
                reason: format!("segment `{segment}` must not end with `.` or space"),
            });
        }
        validate_path_segment(segment).map_err(|reason| Error::InvalidIdCharacter {
            id: id.to_owned(),
            reason,
        })?;
    }
    Ok(())
}

/// Validate a database name.
///
/// # Errors
/// Returns [`Error::InvalidDbNameCharacter`] if the name is empty or contains
/// a path separator or any character forbidden in a path segment.
pub fn validate_db_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::InvalidDbNameCharacter {
            name: name.to_owned(),
            reason: "db name must not be empty".to_owned(),
        });
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidDbNameCharacter {
            name: name.to_owned(),
            reason: "db name must not contain a path separator".to_owned(),
        });
    }
    validate_path_segment(name).map_err(|reason| Error::InvalidDbNameCharacter {
        name: name.to_owned(),
        reason,
    })
}

/// Validate a local directory path.
///
/// # Errors
/// Returns [`Error::InvalidLocalDirCharacter`] if the path contains a
/// forbidden character.
pub fn validate_local_dir(dir: &str) -> Result<(), Error> {
    if has_forbidden_char(dir) {
        return Err(Error::InvalidLocalDirCharacter {
            dir: dir.to_owned(),
            reason: "local dir contains a forbidden character".to_owned(),
        });
    }
    Ok(())
}

/// Validate a parsed document: `_id` and `_deleted` are implicitly valid
/// (already extracted), so this only needs to check id shape.
///
/// # Errors
/// Returns [`Error::UndefinedDocumentId`] if `id` is empty, or a validator
/// error if `id` fails shape validation.
pub fn validate_document(doc: &Document, max_id_len: usize) -> Result<(), Error> {
    if doc.id.is_empty() {
        return Err(Error::UndefinedDocumentId);
    }
    validate_id(&doc.id, max_id_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_trails() {
        assert_eq!(normalize_collection_path(""), "");
        assert_eq!(normalize_collection_path("/"), "");
        assert_eq!(normalize_collection_path("a"), "a/");
        assert_eq!(normalize_collection_path("a//b"), "a/b/");
        assert_eq!(normalize_collection_path("a/b/"), "a/b/");
        assert_eq!(normalize_collection_path(r"a\b"), "a/b/");
    }

    #[test]
    fn id_rejects_leading_underscore_or_slash() {
        assert!(validate_id("_hidden", 100).is_err());
        assert!(validate_id("/abs", 100).is_err());
    }

    #[test]
    fn id_rejects_trailing_slash_dot_space() {
        assert!(validate_id("abc/", 100).is_err());
        assert!(validate_id("abc.", 100).is_err());
        assert!(validate_id("abc ", 100).is_err());
    }

    #[test]
    fn id_rejects_too_long() {
        let id = "a".repeat(10);
        assert!(validate_id(&id, 5).is_err());
        assert!(validate_id(&id, 20).is_ok());
    }

    #[test]
    fn id_rejects_windows_reserved_segment() {
        assert!(validate_id("CON", 100).is_err());
        assert!(validate_id("nested/NUL/file", 100).is_err());
    }

    #[test]
    fn collection_path_rejects_dotdot() {
        assert!(validate_collection_path("a/../b/", 100).is_err());
    }

    #[test]
    fn db_name_rejects_separators() {
        assert!(validate_db_name("a/b").is_err());
        assert!(validate_db_name("").is_err());
        assert!(validate_db_name("my-db").is_ok());
    }

    #[test]
    fn max_id_length_budget() {
        assert_eq!(max_id_length(100, ".json"), MAX_FILE_PATH_LENGTH - 100 - 1 - 5);
    }
}
