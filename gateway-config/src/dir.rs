//! Scans a `*/*.json` config directory (spec §4.12: "`handlers/*.json`",
//! "`chains/*.json`", "`brokers/*.json`" are each a glob over a directory,
//! not a single file).

use walkdir::WalkDir;

/// List every top-level `*.json` file under `dir`, sorted for deterministic
/// load order. Missing or unreadable directories yield an empty list: an
/// operator who hasn't populated `chains/` yet shouldn't fail startup.
#[must_use]
pub fn json_files(dir: &str) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .filter_map(|entry| entry.path().to_str().map(str::to_string))
        .collect();
    files.sort();
    files
}
