//! Millisecond timestamp rendering shared by every JSON record.

/// Render milliseconds as `HH:MM:SS.mmm`.
///
/// Hours are not wrapped, so recordings longer than a day render as `24:..`.
pub fn format_ms(ms: u64) -> String {
    let (secs, millis) = (ms / 1000, ms % 1000);
    let (mins, secs) = (secs / 60, secs % 60);
    let (hours, mins) = (mins / 60, mins % 60);
    format!("{hours:02}:{mins:02}:{secs:02}.{millis:03}")
}

/// Render fractional seconds as `HH:MM:SS.mmm` (used by file metadata).
pub fn format_secs(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return format_ms(0);
    }
    format_ms((seconds * 1000.0).round() as u64)
}

/// Current UTC time as `YYYY-MM-DD HH:MM:SS`, the `created_at` format of
/// every sidecar file.
pub fn utc_now_stamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Round to `decimals` places, for the rounded figures in reports.
/// Ties go to the even digit.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
