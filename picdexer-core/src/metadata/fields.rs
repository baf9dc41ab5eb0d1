use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{PicdexerError, Result};

const SRC_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const DEFAULT_DATE: u64 = 0;

/// Heterogeneous field map returned by the inspector for one file.
///
/// Accessors are tolerant: a missing key yields `None`, a key of an
/// unexpected shape yields `None` with a warning. `get_date` is the one
/// exception and falls back to the `0` sentinel so that downstream queries
/// keep their positional semantics.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    file: String,
    fields: Map<String, Value>,
}

impl FieldMap {
    pub fn new(file: String, fields: Map<String, Value>) -> Self {
        Self { file, fields }
    }

    /// Every raw field, as returned by the inspector.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        let value = self.fields.get(key)?;
        match scalar_to_string(value) {
            Some(s) => Some(s),
            None => {
                warn!(
                    file = %self.file,
                    "error while extracting key {key} as string: not a scalar ({value})"
                );
                None
            }
        }
    }

    pub fn get_strings(&self, key: &str) -> Option<Vec<String>> {
        let value = self.fields.get(key)?;
        match value {
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|item| scalar_to_string(item).unwrap_or_else(|| item.to_string()))
                    .collect(),
            ),
            scalar => match scalar_to_string(scalar) {
                Some(s) => Some(vec![s]),
                None => {
                    warn!(
                        file = %self.file,
                        "error while extracting key {key} as string slice: unsupported value ({scalar})"
                    );
                    None
                }
            },
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        let value = self.fields.get(key)?;
        let parsed = match value {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
            Value::String(s) => s
                .parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as u64)),
            _ => None,
        };
        if parsed.is_none() {
            warn!(
                file = %self.file,
                "error while extracting key {key} as int: not a number ({value})"
            );
        }
        parsed
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        let value = self.fields.get(key)?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        };
        if parsed.is_none() {
            warn!(
                file = %self.file,
                "error while extracting key {key} as float: not a number ({value})"
            );
        }
        parsed
    }

    /// Capture date in UNIX milliseconds. Absence and parse failures both
    /// yield the `0` sentinel.
    pub fn get_date(&self, key: &str) -> u64 {
        let Some(raw) = self.get_string(key) else {
            return DEFAULT_DATE;
        };
        match NaiveDateTime::parse_from_str(&raw, SRC_DATE_FORMAT) {
            Ok(date) => date.and_utc().timestamp_millis() as u64,
            Err(e) => {
                warn!(
                    file = %self.file,
                    "error while parsing date from field {key} ({raw}): {e}"
                );
                DEFAULT_DATE
            }
        }
    }

    /// Decimal `"<lat>,<long>"` from the inspector's sexagesimal form.
    pub fn get_gps(&self, key: &str) -> Option<String> {
        let raw = self.get_string(key)?;
        match convert_gps_coordinates(&raw) {
            Ok((lat, long)) => Some(format!("{lat},{long}")),
            Err(e) => {
                warn!(
                    file = %self.file,
                    "error while parsing GPS coordinates from field {key} ({raw}): {e}"
                );
                None
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Converts `"<d> deg <m>' <s>" <hemi>, <d> deg <m>' <s>" <hemi>"` into
/// decimal latitude and longitude.
pub(crate) fn convert_gps_coordinates(lat_long: &str) -> Result<(f32, f32)> {
    let sub: Vec<&str> = lat_long.split(' ').collect();
    if sub.len() != 10 {
        return Err(PicdexerError::Inspector(format!(
            "parsing inconsistency ({lat_long}): {} elements parsed",
            sub.len()
        )));
    }
    let lat = deg_min_sec_to_decimal(
        sub[0],
        skip_last_char(sub[2])?,
        skip_last_char(sub[3])?,
        skip_last_char(sub[4])?,
    )?;
    let long = deg_min_sec_to_decimal(
        sub[5],
        skip_last_char(sub[7])?,
        skip_last_char(sub[8])?,
        sub[9],
    )?;
    Ok((lat, long))
}

fn deg_min_sec_to_decimal(deg: &str, min: &str, sec: &str, hemi: &str) -> Result<f32> {
    let deg: f32 = deg
        .parse()
        .map_err(|_| PicdexerError::Inspector(format!("error while parsing deg {deg} as float")))?;
    let min: f32 = min
        .parse()
        .map_err(|_| PicdexerError::Inspector(format!("error while parsing min {min} as float")))?;
    let sec: f32 = sec
        .parse()
        .map_err(|_| PicdexerError::Inspector(format!("error while parsing sec {sec} as float")))?;
    let mult: f64 = match hemi {
        "S" | "W" => -1.0,
        "N" | "E" => 1.0,
        _ => {
            return Err(PicdexerError::Inspector(format!(
                "unsupported letter ({hemi})"
            )))
        }
    };
    Ok(((deg as f64 + min as f64 / 60.0 + sec as f64 / 3600.0) * mult) as f32)
}

fn skip_last_char(src: &str) -> Result<&str> {
    let mut chars = src.char_indices();
    match chars.next_back() {
        Some((idx, _)) => Ok(&src[..idx]),
        None => Err(PicdexerError::Inspector(
            "empty coordinate component".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_map(fields: serde_json::Value) -> FieldMap {
        let Value::Object(map) = fields else {
            panic!("expected object");
        };
        FieldMap::new("aFile".to_string(), map)
    }

    #[test]
    fn get_string_stringifies_scalars() {
        let m = field_map(json!({
            "string": "stringVal",
            "float": 3.14,
            "int": 42,
            "list": ["a"],
        }));
        assert_eq!(m.get_string("string").as_deref(), Some("stringVal"));
        assert_eq!(m.get_string("float").as_deref(), Some("3.14"));
        assert_eq!(m.get_string("int").as_deref(), Some("42"));
        assert_eq!(m.get_string("list"), None);
        assert_eq!(m.get_string("nonExisting"), None);
    }

    #[test]
    fn get_strings_accepts_lists_and_scalars() {
        let m = field_map(json!({
            "list": ["a", "b", 3],
            "scalar": "alone",
        }));
        assert_eq!(
            m.get_strings("list"),
            Some(vec!["a".to_string(), "b".to_string(), "3".to_string()])
        );
        assert_eq!(m.get_strings("scalar"), Some(vec!["alone".to_string()]));
        assert_eq!(m.get_strings("nonExisting"), None);
    }

    #[test]
    fn get_u64_widens_and_floors() {
        let m = field_map(json!({
            "int": 42,
            "float": 3.99,
            "numericString": "7",
            "floatString": "7.5",
            "string": "bla",
        }));
        assert_eq!(m.get_u64("int"), Some(42));
        assert_eq!(m.get_u64("float"), Some(3));
        assert_eq!(m.get_u64("numericString"), Some(7));
        assert_eq!(m.get_u64("floatString"), Some(7));
        assert_eq!(m.get_u64("string"), None);
        assert_eq!(m.get_u64("nonExisting"), None);
    }

    #[test]
    fn get_f64_accepts_numbers_and_numeric_strings() {
        let m = field_map(json!({
            "float": 3.14,
            "int": 42,
            "numericString": "2.8",
            "string": "bla",
        }));
        assert_eq!(m.get_f64("float"), Some(3.14));
        assert_eq!(m.get_f64("int"), Some(42.0));
        assert_eq!(m.get_f64("numericString"), Some(2.8));
        assert_eq!(m.get_f64("string"), None);
        assert_eq!(m.get_f64("nonExisting"), None);
    }

    #[test]
    fn get_date_parses_source_format_to_unix_ms() {
        let m = field_map(json!({"CreateDate": "2019:10:24 12:29:05"}));
        assert_eq!(m.get_date("CreateDate"), 1_571_912_945_000);
    }

    #[test]
    fn get_date_falls_back_to_zero_sentinel() {
        let m = field_map(json!({"bad": "24/10/2019"}));
        assert_eq!(m.get_date("bad"), 0);
        assert_eq!(m.get_date("nonExisting"), 0);
    }

    #[test]
    fn get_gps_formats_decimal_pair() {
        let m = field_map(json!({"GPSPosition": r#"1 deg 11' 60" N, 1 deg 11' 60" W"#}));
        assert_eq!(m.get_gps("GPSPosition").as_deref(), Some("1.2,-1.2"));
    }

    #[test]
    fn get_gps_rejects_malformed_input() {
        let m = field_map(json!({"short": "a b", "badLat": r#"b deg 11' 60" N, 1 deg 11' 60" W"#}));
        assert_eq!(m.get_gps("short"), None);
        assert_eq!(m.get_gps("badLat"), None);
        assert_eq!(m.get_gps("nonExisting"), None);
    }

    #[test]
    fn deg_min_sec_conversion_covers_all_hemispheres() {
        let cases = [
            ("1.0", "11.0", "60.0", "N", Some(1.2)),
            ("1", "11", "60", "E", Some(1.2)),
            ("1", "11", "60", "S", Some(-1.2)),
            ("1", "11", "60", "W", Some(-1.2)),
            ("bla", "1.0", "1.0", "N", None),
            ("1.0", "bla", "1.0", "N", None),
            ("1.0", "1.0", "bla", "N", None),
            ("1.0", "1.0", "1.0", "Q", None),
        ];
        for (deg, min, sec, hemi, expected) in cases {
            let got = deg_min_sec_to_decimal(deg, min, sec, hemi);
            match expected {
                Some(v) => assert_eq!(got.expect("conversion"), v, "{deg} {min} {sec} {hemi}"),
                None => assert!(got.is_err(), "{deg} {min} {sec} {hemi}"),
            }
        }
    }

    #[test]
    fn convert_gps_requires_ten_tokens() {
        assert!(convert_gps_coordinates("a b").is_err());
        let (lat, long) =
            convert_gps_coordinates(r#"1 deg 11' 60" N, 1 deg 11' 60" W"#).expect("conversion");
        assert_eq!(lat, 1.2);
        assert_eq!(long, -1.2);
    }
}
