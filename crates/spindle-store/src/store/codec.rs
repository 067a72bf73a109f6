//! PayloadCodec - conversion between record fields and column text.
//!
//! Payloads are JSON text, timestamps are RFC 3339 UTC with microsecond
//! precision (fixed width, so text order is time order), statuses are their
//! snake_case names. Reading a malformed column is logged and surfaces as
//! `StoreError::Decode`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::error;

use crate::domain::RunStatus;
use crate::error::StoreError;

pub(crate) struct PayloadCodec;

impl PayloadCodec {
    pub(crate) fn encode_payload(value: Option<&Value>) -> Option<String> {
        value.map(Value::to_string)
    }

    pub(crate) fn decode_payload(
        field: &'static str,
        text: Option<String>,
    ) -> Result<Option<Value>, StoreError> {
        let Some(text) = text else {
            return Ok(None);
        };
        serde_json::from_str(&text).map(Some).map_err(|err| {
            error!(field, %err, "stored payload is not valid JSON");
            StoreError::decode(field, err)
        })
    }

    pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub(crate) fn decode_timestamp(
        field: &'static str,
        text: &str,
    ) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(text)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|err| {
                error!(field, %err, text, "stored timestamp is malformed");
                StoreError::decode(field, err)
            })
    }

    pub(crate) fn decode_optional_timestamp(
        field: &'static str,
        text: Option<String>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        text.map(|text| Self::decode_timestamp(field, &text))
            .transpose()
    }

    pub(crate) fn decode_status(text: &str) -> Result<RunStatus, StoreError> {
        text.parse().map_err(|err| {
            error!(text, "stored status is not a known run status");
            StoreError::decode("status", err)
        })
    }

    /// Keystore values are always written as JSON, strings included, so a
    /// read gives back exactly what was set.
    pub(crate) fn encode_setting(value: &Value) -> String {
        value.to_string()
    }

    /// Text that is not JSON (written by something other than this store)
    /// comes back as a plain string.
    pub(crate) fn decode_setting(text: String) -> Value {
        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => Value::String(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn payload_null_column_is_none() {
        assert_eq!(PayloadCodec::decode_payload("input", None).unwrap(), None);
    }

    #[test]
    fn payload_json_null_is_some_null() {
        let text = PayloadCodec::encode_payload(Some(&Value::Null));
        assert_eq!(text.as_deref(), Some("null"));
        assert_eq!(
            PayloadCodec::decode_payload("input", text).unwrap(),
            Some(Value::Null)
        );
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = PayloadCodec::decode_payload("result", Some("{oops".into())).unwrap_err();
        assert!(matches!(err, StoreError::Decode { field: "result", .. }));
    }

    #[test]
    fn timestamps_have_fixed_width_and_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        let (a, b) = (
            PayloadCodec::encode_timestamp(early),
            PayloadCodec::encode_timestamp(late),
        );
        assert_eq!(a, "2024-01-01T00:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(PayloadCodec::decode_timestamp("created_at", &b).unwrap(), late);
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        assert!(matches!(
            PayloadCodec::decode_status("paused"),
            Err(StoreError::Decode { field: "status", .. })
        ));
    }

    #[test]
    fn settings_round_trip_exactly() {
        for value in [
            json!("secret"),
            json!("42"),
            json!(42),
            json!(true),
            Value::Null,
            json!({"nested": {"deep": [1, 2, {"x": null}]}}),
        ] {
            let text = PayloadCodec::encode_setting(&value);
            assert_eq!(PayloadCodec::decode_setting(text), value);
        }
    }

    #[test]
    fn floats_survive_every_column_bit_for_bit() {
        let mut bits = 0x9E37_79B9_7F4A_7C15_u64;
        for _ in 0..20_000 {
            // xorshift over raw bit patterns reaches subnormals and extremes
            bits ^= bits << 13;
            bits ^= bits >> 7;
            bits ^= bits << 17;
            let x = f64::from_bits(bits);
            if !x.is_finite() {
                continue;
            }
            let value = json!({"x": x, "list": [x]});

            let text = PayloadCodec::encode_payload(Some(&value));
            assert_eq!(
                PayloadCodec::decode_payload("result", text).unwrap(),
                Some(value.clone()),
                "payload {x:e}"
            );
            let text = PayloadCodec::encode_setting(&value);
            assert_eq!(PayloadCodec::decode_setting(text), value, "setting {x:e}");
        }
    }

    #[test]
    fn raw_text_setting_reads_as_string() {
        assert_eq!(
            PayloadCodec::decode_setting("plain words".to_string()),
            json!("plain words")
        );
    }
}
