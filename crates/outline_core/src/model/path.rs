//! Context path helpers and the order-preserving path codec.
//!
//! # Responsibility
//! - Encode an ordered context path into the single string key used by the
//!   context children index.
//! - Decode persisted keys back into paths when rebuilding state.
//!
//! # Invariants
//! - `encode_path(a) == encode_path(b)` iff `a` and `b` hold the same values in
//!   the same order.
//! - Separator and escape characters inside values never produce collisions
//!   (`["a/b", "c"]` and `["a", "b/c"]` encode differently).
//! - `[]` and `[""]` encode differently.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Ordered sequence of item values, root first.
pub type Context = Vec<String>;

/// Reserved value of the outliner's home context.
pub const ROOT_VALUE: &str = "root";

const SEPARATOR: char = '/';
const ESCAPE: char = '\\';
const EMPTY_MARKER: char = '_';

/// Error returned when an encoded key is not a valid path encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathDecodeError {
    /// Key ends in the middle of an escape sequence.
    DanglingEscape(String),
    /// Escape sequence is not one produced by `encode_path`.
    UnknownEscape { key: String, escape: char },
    /// Empty-element marker appears next to other characters.
    MisplacedEmptyMarker(String),
}

impl Display for PathDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingEscape(key) => write!(f, "encoded path ends with escape: `{key}`"),
            Self::UnknownEscape { key, escape } => {
                write!(f, "unknown escape `\\{escape}` in encoded path `{key}`")
            }
            Self::MisplacedEmptyMarker(key) => {
                write!(f, "empty element marker must stand alone in `{key}`")
            }
        }
    }
}

impl Error for PathDecodeError {}

/// Encodes one context path into its index key.
pub fn encode_path<S: AsRef<str>>(path: &[S]) -> String {
    let mut encoded = String::new();
    for (index, value) in path.iter().enumerate() {
        if index > 0 {
            encoded.push(SEPARATOR);
        }
        let value = value.as_ref();
        if value.is_empty() {
            encoded.push(ESCAPE);
            encoded.push(EMPTY_MARKER);
            continue;
        }
        for c in value.chars() {
            if c == ESCAPE || c == SEPARATOR {
                encoded.push(ESCAPE);
            }
            encoded.push(c);
        }
    }
    encoded
}

/// Decodes a key produced by [`encode_path`].
///
/// # Errors
/// - Returns an error for dangling or unknown escape sequences.
pub fn decode_path(key: &str) -> Result<Context, PathDecodeError> {
    if key.is_empty() {
        return Ok(Vec::new());
    }

    let mut path = Vec::new();
    let mut current = String::new();
    let mut empty_marker = false;
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(escaped @ (ESCAPE | SEPARATOR)) => {
                    if empty_marker {
                        return Err(PathDecodeError::MisplacedEmptyMarker(key.to_string()));
                    }
                    current.push(escaped);
                }
                Some(EMPTY_MARKER) => {
                    if empty_marker || !current.is_empty() {
                        return Err(PathDecodeError::MisplacedEmptyMarker(key.to_string()));
                    }
                    empty_marker = true;
                }
                Some(other) => {
                    return Err(PathDecodeError::UnknownEscape {
                        key: key.to_string(),
                        escape: other,
                    });
                }
                None => return Err(PathDecodeError::DanglingEscape(key.to_string())),
            },
            SEPARATOR => {
                path.push(std::mem::take(&mut current));
                empty_marker = false;
            }
            other => {
                if empty_marker {
                    return Err(PathDecodeError::MisplacedEmptyMarker(key.to_string()));
                }
                current.push(other);
            }
        }
    }
    path.push(current);
    Ok(path)
}

/// Returns the value a path denotes (its last element).
pub fn signifier<S: AsRef<str>>(path: &[S]) -> Option<&str> {
    path.last().map(AsRef::as_ref)
}

/// Returns the path without its signifier.
pub fn intersections<S: AsRef<str>>(path: &[S]) -> &[S] {
    match path.split_last() {
        Some((_, rest)) => rest,
        None => path,
    }
}

/// Whether the path is nested below another context.
pub fn has_intersections<S>(path: &[S]) -> bool {
    path.len() > 1
}

/// Whether the path starts at the reserved home context.
pub fn is_root<S: AsRef<str>>(path: &[S]) -> bool {
    path.first().is_some_and(|value| value.as_ref() == ROOT_VALUE)
}

/// Element-wise, order-sensitive path equality.
pub fn paths_equal<A: AsRef<str>, B: AsRef<str>>(left: &[A], right: &[B]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|(a, b)| a.as_ref() == b.as_ref())
}

/// Builds an owned path with `value` appended.
pub fn child_path<S: AsRef<str>>(path: &[S], value: &str) -> Context {
    path.iter()
        .map(|segment| segment.as_ref().to_string())
        .chain(std::iter::once(value.to_string()))
        .collect()
}
