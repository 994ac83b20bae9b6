/// Helper utilities for the dbdock CLI

use std::path::{Path, PathBuf};

/// Format bytes to human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Mask sensitive data (show only first and last N characters)
pub fn mask_sensitive(value: &str, visible_chars: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= visible_chars * 2 {
        "*".repeat(chars.len())
    } else {
        let start: String = chars[..visible_chars].iter().collect();
        let end: String = chars[chars.len() - visible_chars..].iter().collect();
        format!("{}...{}", start, end)
    }
}

/// Guess a media type for a local dump file from its extension
pub fn media_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("gz") => "application/gzip",
        Some(ext) if ext.eq_ignore_ascii_case("sql") => "application/sql",
        _ => "application/octet-stream",
    }
}

/// Default output path for a CLI backup, e.g. `app_20240101_120000.sql.gz`
pub fn default_backup_path(database: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("{}_{}.sql.gz", database, stamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_mask_sensitive() {
        assert_eq!(mask_sensitive("abcd", 2), "****");
        assert_eq!(mask_sensitive("abcdefghij", 2), "ab...ij");
    }

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for(Path::new("dump.sql.gz")), "application/gzip");
        assert_eq!(media_type_for(Path::new("dump.SQL")), "application/sql");
        assert_eq!(media_type_for(Path::new("dump")), "application/octet-stream");
    }

    #[test]
    fn test_default_backup_path() {
        let path = default_backup_path("app");
        let name = path.to_string_lossy();
        assert!(name.starts_with("app_"));
        assert!(name.ends_with(".sql.gz"));
    }
}
