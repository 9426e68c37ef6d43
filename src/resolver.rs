use std::path::Path;

/// Maps a requested or previously-observed filename to the file actually
/// present in `dir`. The downloader may rename or re-extension its output
/// during remuxing (`.ts` -> `.mp4`), and callers sometimes only know the
/// output template, so the lookup tolerates naming drift:
///
/// 1. a `<digits>_` prefix token matches any entry sharing that prefix;
/// 2. otherwise an exact name match wins;
/// 3. otherwise the first entry containing the extension-stripped stem.
pub fn find_actual_file(requested: &str, dir: &Path) -> Option<String> {
    let entries = read_names(dir)?;

    if let Some(prefix) = numeric_prefix(requested) {
        let token = format!("{prefix}_");
        if let Some(hit) = entries.iter().find(|name| name.starts_with(&token)) {
            return Some(hit.clone());
        }
    }

    if entries.iter().any(|name| name == requested) {
        return Some(requested.to_string());
    }

    let stem = strip_extension(requested);
    if !stem.is_empty() {
        if let Some(hit) = entries.iter().find(|name| name.contains(stem)) {
            return Some(hit.clone());
        }
    }

    None
}

fn read_names(dir: &Path) -> Option<Vec<String>> {
    let rd = std::fs::read_dir(dir).ok()?;
    Some(
        rd.filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect(),
    )
}

/// Leading `<digits>_` token, if any.
fn numeric_prefix(name: &str) -> Option<&str> {
    let digits_end = name.find(|c: char| !c.is_ascii_digit())?;
    if digits_end > 0 && name[digits_end..].starts_with('_') {
        Some(&name[..digits_end])
    } else {
        None
    }
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}
