/// Percentage saved going from `original` to `compressed` bytes, rounded to the nearest
/// whole percent. Negative when the output grew.
pub fn savings_percent(original: u64, compressed: u64) -> i64 {
    if original == 0 {
        return 0;
    }
    ((1.0 - compressed as f64 / original as f64) * 100.0).round() as i64
}

/// Bytes shown as megabytes with two decimals, e.g. `2.86 MB`.
pub fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}
