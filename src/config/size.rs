//! Human-readable byte sizes
//!
//! Thresholds such as the minimum free space are configured as strings like
//! `"100MB"` or `"1.5 GiB"`. Units are binary (1 KB = 1024 bytes).

use crate::error::{VaultError, VaultResult};

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Parse a human-readable size into bytes
///
/// Accepts a bare number of bytes or a number followed by a unit
/// (`B`, `K`/`KB`/`KiB`, `M`/`MB`/`MiB`, `G`/`GB`/`GiB`, `T`/`TB`/`TiB`),
/// case-insensitive, with optional whitespace between number and unit.
pub fn parse_size(input: &str) -> VaultResult<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(VaultError::Validation("Size must not be empty".into()));
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| VaultError::Validation(format!("Invalid size '{}'", input)))?;

    let multiplier = match unit.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => KB,
        "m" | "mb" | "mib" => MB,
        "g" | "gb" | "gib" => GB,
        "t" | "tb" | "tib" => TB,
        other => {
            return Err(VaultError::Validation(format!(
                "Unknown size unit '{}' in '{}'",
                other, input
            )))
        }
    };

    Ok((value * multiplier as f64).round() as u64)
}

/// Format a byte count in human-readable form
pub fn format_size(bytes: u64) -> String {
    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_bytes() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size("100MB").unwrap(), 100 * MB);
        assert_eq!(parse_size("1.5 GiB").unwrap(), GB + GB / 2);
        assert_eq!(parse_size("10k").unwrap(), 10 * KB);
        assert_eq!(parse_size(" 2 TB ").unwrap(), 2 * TB);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
        assert!(parse_size("10 parsecs").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * MB), "5.0 MB");
    }
}
