//! Path helpers for ROM scanning and output naming.
//!
//! Extensions are compared case-insensitively (`.SFC` and `.sfc` are the
//! same ROM type). Output names are built from catalog fields, which may
//! contain characters that are not valid inside a single path component.

use std::path::{Path, PathBuf};

/// Get file extension (lowercase, without the dot)
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Get file extension with its leading dot and original case, or "" if none.
/// `Game (USA).sfc` -> `.sfc`
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// Check whether a path's extension is in an allow-list of lowercase extensions
pub fn has_extension_in(path: &Path, allowed: &[String]) -> bool {
    extension_lower(path).is_some_and(|ext| allowed.iter().any(|a| *a == ext))
}

/// Make a catalog string safe to use as one path component.
/// Slashes become `&`, the same substitution used when names are recorded.
pub fn sanitize_component(value: &str) -> String {
    value.replace(['/', '\\'], "&")
}

/// File name of a finished patch: `<game>: <name> patched <version><ext>`
pub fn patched_file_name(game: &str, name: &str, version: &str, extension: &str) -> String {
    format!(
        "{}: {} patched {}{}",
        sanitize_component(game),
        sanitize_component(name),
        sanitize_component(version),
        extension
    )
}

/// Like [`sanitize_component`], but also never yields a name that resolves
/// outside its parent: empty becomes `_`, and `.`/`..` have their dots
/// replaced by `_`.
pub fn sanitize_dir_component(value: &str) -> String {
    let sanitized = sanitize_component(value.trim());
    match sanitized.as_str() {
        "" => "_".to_string(),
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}

/// Directory that holds all outputs for one platform
pub fn platform_dir(output_dir: &Path, platform: &str) -> PathBuf {
    output_dir.join(sanitize_dir_component(platform))
}

/// Parse a comma-separated extension list (`"gb, .GBC,nes"`) into lowercase
/// extensions without dots.
pub fn parse_extension_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lower() {
        assert_eq!(extension_lower(Path::new("Game.SFC")), Some("sfc".to_string()));
        assert_eq!(extension_lower(Path::new("dir/game.gbc")), Some("gbc".to_string()));
        assert_eq!(extension_lower(Path::new("noext")), None);
    }

    #[test]
    fn test_dotted_extension_keeps_case() {
        assert_eq!(dotted_extension(Path::new("Game.SFC")), ".SFC");
        assert_eq!(dotted_extension(Path::new("noext")), "");
    }

    #[test]
    fn test_has_extension_in() {
        let allowed = vec!["gb".to_string(), "nes".to_string()];
        assert!(has_extension_in(Path::new("a.NES"), &allowed));
        assert!(has_extension_in(Path::new("a.gb"), &allowed));
        assert!(!has_extension_in(Path::new("a.gba"), &allowed));
        assert!(!has_extension_in(Path::new("a"), &allowed));
    }

    #[test]
    fn test_patched_file_name() {
        assert_eq!(
            patched_file_name("G", "H", "1.0", ".sfc"),
            "G: H patched 1.0.sfc"
        );
        assert_eq!(
            patched_file_name("Pokemon Red", "Fire/Ice", "2", ".gb"),
            "Pokemon Red: Fire&Ice patched 2.gb"
        );
    }

    #[test]
    fn test_platform_dir_stays_inside_output() {
        let out = Path::new("/out");
        assert_eq!(platform_dir(out, "snes"), Path::new("/out/snes"));
        assert_eq!(platform_dir(out, ".."), Path::new("/out/__"));
        assert_eq!(platform_dir(out, "."), Path::new("/out/_"));
        assert_eq!(platform_dir(out, ""), Path::new("/out/_"));
        assert_eq!(platform_dir(out, "../etc"), Path::new("/out/..&etc"));
        for platform in ["..", ".", "", " .. ", "a/../b"] {
            let dir = platform_dir(out, platform);
            assert_eq!(dir.parent(), Some(out), "{platform:?} escaped to {}", dir.display());
        }
    }

    #[test]
    fn test_parse_extension_list() {
        assert_eq!(
            parse_extension_list("gb, .GBC,,nes "),
            vec!["gb".to_string(), "gbc".to_string(), "nes".to_string()]
        );
    }
}
