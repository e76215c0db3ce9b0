//! Filename helpers shared by staging and output naming.

use std::path::Path;

const DEFAULT_FILENAME: &str = "input";

/// Maximum filename length kept after sanitizing, in characters.
const MAX_FILENAME_CHARS: usize = 200;

/// Longest extension preserved through truncation, in characters.
const MAX_EXTENSION_CHARS: usize = 16;

/// Sanitize a caller-supplied name for use as a single path component.
///
/// Only the final component of `input` is kept, so a record cannot steer a
/// staged file outside its directory.
pub fn sanitize_filename(input: &str) -> String {
    let base = input.rsplit(['/', '\\']).next().unwrap_or(input);

    let invalid_chars = ['<', '>', ':', '"', '|', '?', '*'];
    let mut result = String::with_capacity(base.len());
    for c in base.chars() {
        if invalid_chars.contains(&c) || c < ' ' {
            result.push('_');
        } else {
            result.push(c);
        }
    }

    // Remove leading and trailing dots and spaces
    let remove_array = ['.', ' '];
    let result = result
        .trim_start_matches(|c| remove_array.contains(&c))
        .trim_end_matches(|c| remove_array.contains(&c));

    if result.is_empty() {
        return DEFAULT_FILENAME.to_string();
    }

    if result.chars().count() <= MAX_FILENAME_CHARS {
        return result.to_string();
    }

    // Keep a plausible extension so codec lookup still works on the staged file
    let ext = Path::new(result)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().count() <= MAX_EXTENSION_CHARS);
    match ext {
        Some(ext) => {
            let keep = MAX_FILENAME_CHARS - ext.chars().count() - 1;
            let stem: String = result.chars().take(keep).collect();
            format!("{}.{}", stem, ext)
        }
        None => result.chars().take(MAX_FILENAME_CHARS).collect(),
    }
}

/// File stem and extension (without the dot) of a filename.
pub fn split_extension(filename: &str) -> (&str, Option<&str>) {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .filter(|e| !e.is_empty());
    (stem, ext)
}
