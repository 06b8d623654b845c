//! Job metadata: well-known keys and the shallow merge rule.
//!
//! Metadata is an open JSON object attached to a job. A merge overwrites
//! the keys present in the partial object and leaves every other key as
//! it was.

use serde_json::{Map, Value};

/// Job metadata object.
pub type Metadata = Map<String, Value>;

/// Which refinery command produced the job (`import`, `refine`, `contract`).
pub const META_KIND: &str = "kind";
/// Primary refined output file.
pub const META_OUTPUT_PATH: &str = "outputPath";
/// Directory whose entries are archived outputs.
pub const META_ARCHIVE_DIR: &str = "archiveDir";
/// Optional profile file attached to the job.
pub const META_PROFILE_PATH: &str = "profilePath";
/// Optional contract file attached to the job.
pub const META_CONTRACT_PATH: &str = "contractPath";
/// Last resolved artifact list, written by the completion handler.
pub const META_ARTIFACTS: &str = "artifacts";

/// Shallow-merge `partial` into `target`.
///
/// Keys in `partial` replace the existing value (including with `null`);
/// keys absent from `partial` are untouched. Returns the merged keys.
pub fn merge_shallow(target: &mut Metadata, partial: Metadata) -> Vec<String> {
    let mut keys = Vec::with_capacity(partial.len());
    for (key, value) in partial {
        keys.push(key.clone());
        target.insert(key, value);
    }
    keys
}

/// Read a string-valued metadata entry, ignoring empty strings.
pub fn str_value<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
