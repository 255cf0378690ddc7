//! Hotel page data extraction
//!
//! The hotel's identity fields live in an embedded-script data block on its
//! canonical page. Extraction is regex-based with several known
//! object-literal shapes tried in order, followed by a lenient decode that
//! tolerates unquoted keys, single-quoted strings and trailing commas.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::entities::{HotelIdentity, HotelInfo};
use crate::domain::errors::{ScrapeError, ScrapeResult};

/// Known shapes of the embedded data assignment, most specific first.
static EMBEDDED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"window\.utag_data\s*=\s*(\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\})",
        r"utag_data\s*=\s*(\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\})",
        r"(?s)window\.utag_data\s*=\s*(\{.*?\})",
        r"(?s)utag_data\s*=\s*(\{.*?\})",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static UNQUOTED_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)\s*:"#).expect("valid regex"));
static SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'((?:[^'\\]|\\.)*)'").expect("valid regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

/// Extract the embedded data object from page HTML.
///
/// Returns `None` when no pattern matches or the matched literal cannot be
/// decoded; callers treat that as "page layout changed".
pub fn extract_embedded_object(html: &str) -> Option<Value> {
    for pattern in EMBEDDED_PATTERNS.iter() {
        let Some(captures) = pattern.captures(html) else {
            continue;
        };
        let literal = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if literal.is_empty() {
            continue;
        }
        if let Some(value) = decode_object_literal(literal) {
            debug!("Extracted embedded data object ({} bytes)", literal.len());
            return Some(value);
        }
    }
    warn!("Could not find embedded data object in page");
    None
}

/// Lenient JS-object-literal decode: strict JSON first, then a normalized
/// form with quoted keys, double quotes and no trailing commas.
fn decode_object_literal(literal: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(literal) {
        return value.is_object().then_some(value);
    }

    let quoted_keys = UNQUOTED_KEY.replace_all(literal, "$1\"$2\":");
    let double_quoted = SINGLE_QUOTED.replace_all(&quoted_keys, |caps: &regex::Captures<'_>| {
        format!("\"{}\"", caps[1].replace("\\'", "'").replace('"', "\\\""))
    });
    let normalized = TRAILING_COMMA.replace_all(&double_quoted, "$1");

    match serde_json::from_str::<Value>(&normalized) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Coerce a loosely typed field to an integer; strings are stripped down to
/// their digits, everything unusable becomes 0.
fn safe_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

fn string_or_unknown(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Parse hotel identity and display fields from the embedded data object.
pub fn parse_hotel_info(data: &Value, url: &str) -> ScrapeResult<HotelInfo> {
    let hotel_id = safe_int(data.get("hotel_id"));
    if hotel_id == 0 {
        return Err(ScrapeError::Validation(format!(
            "invalid hotel_id in embedded data: {:?}",
            data.get("hotel_id")
        )));
    }

    let ufi = match data.get("dest_ufi") {
        Some(v) => safe_int(Some(v)),
        None => safe_int(data.get("ufi")),
    };

    let country_code = extract_country_code(url)
        .or_else(|| {
            data.get("dest_cc")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
        })
        .ok_or_else(|| {
            ScrapeError::Validation(format!("could not determine country code for {url}"))
        })?;

    let score = data
        .get("utrs")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0.0);

    Ok(HotelInfo {
        identity: HotelIdentity {
            hotel_id,
            ufi,
            country_code,
        },
        name: string_or_unknown(data.get("hotel_name")),
        score,
        city_name: string_or_unknown(data.get("city_name")),
        country_name: string_or_unknown(data.get("country_name")),
        page_url: url.to_string(),
    })
}

/// Extract the two-letter country code from a hotel page URL
/// (`https://<host>/hotel/<cc>/<slug>.html`).
pub fn extract_country_code(raw_url: &str) -> Option<String> {
    let parsed = url::Url::parse(raw_url).ok()?;
    let mut segments = parsed.path_segments()?;
    if segments.next()? != "hotel" {
        return None;
    }
    let code = segments.next()?;
    (code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| code.to_lowercase())
}

/// Strip query parameters from a URL for display.
pub fn clear_url_query_params(raw_url: &str) -> String {
    match url::Url::parse(raw_url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => raw_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOTEL_URL: &str = "https://www.booking.com/hotel/eg/golden-oasis.html";

    #[test]
    fn extracts_window_prefixed_assignment() {
        let html = r#"<script>
            window.utag_data = {"hotel_id": 1377059, "dest_ufi": 900040497, "hotel_name": "Golden Oasis"};
        </script>"#;
        let data = extract_embedded_object(html).unwrap();
        assert_eq!(data["hotel_id"], 1377059);
        assert_eq!(data["hotel_name"], "Golden Oasis");
    }

    #[test]
    fn extracts_bare_assignment_with_unquoted_keys() {
        let html = "<script>var utag_data = {hotel_id: 42, dest_ufi: 7, city_name: 'Cairo',};</script>";
        let data = extract_embedded_object(html).unwrap();
        assert_eq!(data["hotel_id"], 42);
        assert_eq!(data["city_name"], "Cairo");
    }

    #[test]
    fn handles_nested_objects() {
        let html = r#"window.utag_data = {hotel_id: 5, extra: {a: 1, b: 2}, dest_cc: 'eg'}"#;
        let data = extract_embedded_object(html).unwrap();
        assert_eq!(data["extra"]["b"], 2);
    }

    #[test]
    fn returns_none_without_a_data_block() {
        assert!(extract_embedded_object("<html><body>no data here</body></html>").is_none());
    }

    #[test]
    fn parse_hotel_info_reads_identity_fields() {
        let data = serde_json::json!({
            "hotel_id": "1377059",
            "dest_ufi": 900040497,
            "hotel_name": " Golden Oasis ",
            "city_name": "Giza",
            "country_name": "Egypt",
            "utrs": 8.4
        });
        let info = parse_hotel_info(&data, HOTEL_URL).unwrap();
        assert_eq!(info.identity.hotel_id, 1377059);
        assert_eq!(info.identity.ufi, 900040497);
        assert_eq!(info.identity.country_code, "eg");
        assert_eq!(info.name, "Golden Oasis");
        assert!((info.score - 8.4).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_hotel_info_rejects_missing_hotel_id() {
        let data = serde_json::json!({ "dest_ufi": 1, "hotel_name": "x" });
        let err = parse_hotel_info(&data, HOTEL_URL).unwrap_err();
        assert!(matches!(err, ScrapeError::Validation(_)));
    }

    #[test]
    fn parse_hotel_info_defaults_missing_display_fields() {
        let data = serde_json::json!({ "hotel_id": 9, "dest_ufi": 1 });
        let info = parse_hotel_info(&data, HOTEL_URL).unwrap();
        assert_eq!(info.name, "unknown");
        assert_eq!(info.city_name, "unknown");
        assert_eq!(info.country_name, "unknown");
    }

    #[test]
    fn country_code_comes_from_the_url_path() {
        assert_eq!(extract_country_code(HOTEL_URL).as_deref(), Some("eg"));
        assert_eq!(
            extract_country_code("https://www.booking.com/hotel/US/some-hotel.html").as_deref(),
            Some("us")
        );
        assert_eq!(extract_country_code("https://www.booking.com/index.html"), None);
        assert_eq!(extract_country_code("https://www.booking.com/hotel/usa/x.html"), None);
    }

    #[test]
    fn query_params_are_stripped_for_display() {
        assert_eq!(
            clear_url_query_params("https://www.booking.com/hotel/eg/x.html?aid=1&label=foo"),
            "https://www.booking.com/hotel/eg/x.html"
        );
        assert_eq!(
            clear_url_query_params("https://www.booking.com/hotel/eg/x.html"),
            "https://www.booking.com/hotel/eg/x.html"
        );
    }
}
