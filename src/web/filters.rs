use chrono::{DateTime, FixedOffset, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Display timezone for catalog timestamps (SAST, UTC+2).
static DISPLAY_TZ: Lazy<FixedOffset> =
    Lazy::new(|| FixedOffset::east_opt(2 * 3600).expect("fixed offset"));

static DOI_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"10\.\d{4,}(\.\d+)*/[-._;()/:a-zA-Z0-9]+").unwrap());

/// Pretty-print a JSON value with 4-space indentation.
pub fn format_json(value: &Value) -> String {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    match serde::Serialize::serialize(value, &mut serializer) {
        Ok(()) => String::from_utf8(out).unwrap_or_default(),
        Err(_) => value.to_string(),
    }
}

/// ISO instant → `02 Jan 2026, 14:05 SAST`. Unparseable input is returned
/// unchanged.
pub fn format_timestamp(value: &str) -> String {
    match parse_instant(value) {
        Some(instant) => instant
            .with_timezone(&*DISPLAY_TZ)
            .format("%d %b %Y, %H:%M SAST")
            .to_string(),
        None => value.to_string(),
    }
}

/// ISO instant or date → `02 Jan 2026`.
pub fn format_date(value: &str) -> String {
    if let Some(instant) = parse_instant(value) {
        return instant.with_timezone(&*DISPLAY_TZ).format("%d %b %Y").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.format("%d %b %Y").to_string();
    }
    value.to_string()
}

fn parse_instant(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok().or_else(|| {
        // timestamps without an offset are taken as UTC
        value
            .parse::<chrono::NaiveDateTime>()
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

/// Byte count → human-readable size with binary units.
pub fn format_bytes(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    if size < 1024 {
        return format!("{size} B");
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// First DOI found in arbitrary text, e.g. a citation string.
pub fn extract_doi(text: &str) -> Option<String> {
    DOI_IN_TEXT
        .find(text)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_is_indented_with_four_spaces() {
        let rendered = format_json(&json!({"doi": "10.1234/x"}));
        assert_eq!(rendered, "{\n    \"doi\": \"10.1234/x\"\n}");
    }

    #[test]
    fn timestamps_render_in_sast() {
        assert_eq!(
            format_timestamp("2026-01-02T12:05:00+00:00"),
            "02 Jan 2026, 14:05 SAST"
        );
        // offset-less timestamps are treated as UTC
        assert_eq!(
            format_timestamp("2026-01-02T12:05:00"),
            "02 Jan 2026, 14:05 SAST"
        );
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn dates_render_without_time() {
        assert_eq!(format_date("2026-01-02T23:30:00+00:00"), "03 Jan 2026");
        assert_eq!(format_date("2026-01-02"), "02 Jan 2026");
    }

    #[test]
    fn byte_sizes_use_binary_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn dois_are_extracted_from_citations() {
        let citation = "Dlamini, N. (2024). Mooring data. https://doi.org/10.15493/SARVA.1234.";
        assert_eq!(extract_doi(citation).as_deref(), Some("10.15493/SARVA.1234"));
        assert_eq!(extract_doi("no identifier here"), None);
    }
}
