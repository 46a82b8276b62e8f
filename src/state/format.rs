//! Display helpers for model metadata.

const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Human-readable size: the largest base-1024 unit with a scaled value of at
/// least 1, two decimals with trailing zeros trimmed.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0usize;
    while exponent + 1 < UNITS.len() && bytes >= 1024u64.pow(exponent as u32 + 1) {
        exponent += 1;
    }

    let scaled = bytes as f64 / 1024f64.powi(exponent as i32);
    let rendered = format!("{scaled:.2}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[exponent])
}
