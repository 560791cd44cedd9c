//! `Accept` header parsing and negotiation against a supported MIME set.

pub const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// Parses a comma-separated `Accept` header into ordered media ranges.
/// `q` parameters are ignored; ranges are returned in header order.
fn parse_media_ranges(accept: &str) -> Vec<String> {
    accept
        .split(',')
        .map(|range| range.split(';').next().unwrap_or("").trim().to_lowercase())
        .filter(|range| !range.is_empty())
        .collect()
}

/// Matches the `Accept` header against `supported`, returning the first
/// supported type that satisfies a media range, a wildcard match, or the
/// default when nothing matches.
pub fn negotiate(accept: Option<&str>, supported: &[&str]) -> String {
    let Some(accept) = accept else {
        return DEFAULT_MEDIA_TYPE.to_string();
    };

    for range in parse_media_ranges(accept) {
        if range == "*/*" {
            return supported.first().map(|s| s.to_string()).unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string());
        }
        if let Some(prefix) = range.strip_suffix("/*") {
            if let Some(found) = supported.iter().find(|s| s.starts_with(&format!("{prefix}/"))) {
                return found.to_string();
            }
            continue;
        }
        if supported.contains(&range.as_str()) {
            return range;
        }
    }

    DEFAULT_MEDIA_TYPE.to_string()
}
