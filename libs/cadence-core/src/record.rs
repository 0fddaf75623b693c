use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One captured message. `payload` is opaque to the engine — it is stored
/// and replayed byte-for-byte (UTF-8 lossy at capture), never interpreted.
///
/// On disk this is one JSON line:
/// `{"topic":"a/b","payload":"1","timestamp":100.5}` plus optional
/// `qos`/`retain` keys when the broker exposed non-default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub topic: String,
    pub payload: String,
    /// Seconds since epoch, assigned at the moment of delivery by the
    /// capture path — not any timestamp embedded in the payload.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retain: Option<bool>,
}

impl MessageRecord {
    /// Build a record stamped with the current wall-clock time.
    ///
    /// Delivery hints are stored only when they differ from the defaults
    /// (qos 0, retain false) so recorded lines stay minimal.
    pub fn captured_now(topic: impl Into<String>, payload: &[u8], qos: u8, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            timestamp: unix_timestamp(),
            qos: (qos > 0).then_some(qos),
            retain: retain.then_some(true),
        }
    }
}

/// Current wall-clock time as fractional seconds since epoch.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_without_optional_hints() {
        let record = MessageRecord {
            topic: "a/b".into(),
            payload: "1".into(),
            timestamp: 100.5,
            qos: None,
            retain: None,
        };
        let line = serde_json::to_string(&record).unwrap();
        assert_eq!(line, r#"{"topic":"a/b","payload":"1","timestamp":100.5}"#);
    }

    #[test]
    fn round_trips_with_hints() {
        let record = MessageRecord {
            topic: "sensors/temp".into(),
            payload: "21.5".into(),
            timestamp: 1700000000.25,
            qos: Some(1),
            retain: Some(true),
        };
        let line = serde_json::to_string(&record).unwrap();
        let parsed: MessageRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn parses_lines_without_hints() {
        let parsed: MessageRecord =
            serde_json::from_str(r#"{"topic":"a/b","payload":"x","timestamp":1.0}"#).unwrap();
        assert_eq!(parsed.qos, None);
        assert_eq!(parsed.retain, None);
    }

    #[test]
    fn captured_now_stores_only_non_default_hints() {
        let plain = MessageRecord::captured_now("a", b"1", 0, false);
        assert_eq!(plain.qos, None);
        assert_eq!(plain.retain, None);

        let hinted = MessageRecord::captured_now("a", b"1", 2, true);
        assert_eq!(hinted.qos, Some(2));
        assert_eq!(hinted.retain, Some(true));
    }

    #[test]
    fn captured_now_decodes_payload_lossy() {
        let record = MessageRecord::captured_now("a", &[0xff, b'o', b'k'], 0, false);
        assert!(record.payload.ends_with("ok"));
        assert!(record.timestamp > 0.0);
    }
}
