//! Latest known metrics.

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::SystemTime;

/// Merged view of every metric update received so far.
///
/// Field values are opaque to the client. Updates overlay key-wise and
/// never remove keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub fields: Map<String, Value>,
    /// Local time of the last merge, independent of any server clock.
    pub last_update_time: Option<SystemTime>,
}

impl MetricsSnapshot {
    /// Return a new snapshot with `partial` laid over this one.
    pub fn overlay(&self, partial: Map<String, Value>, at: SystemTime) -> Self {
        let mut fields = self.fields.clone();
        for (key, value) in partial {
            fields.insert(key, value);
        }
        Self {
            fields,
            last_update_time: Some(at),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_overlay_is_additive() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let t1 = t0 + Duration::from_secs(1);

        let first = MetricsSnapshot::default().overlay(map(json!({"a": 1})), t0);
        let second = first.overlay(map(json!({"b": 2})), t1);

        assert_eq!(second.fields, map(json!({"a": 1, "b": 2})));
        assert_eq!(second.last_update_time, Some(t1));
        // The previous snapshot is untouched.
        assert_eq!(first.fields, map(json!({"a": 1})));
    }

    #[test]
    fn test_overlay_is_shallow() {
        let now = SystemTime::now();
        let snap = MetricsSnapshot::default()
            .overlay(map(json!({"latency": {"p50": 10, "p99": 80}, "errors": 1})), now)
            .overlay(map(json!({"latency": {"p50": 12}})), now);

        assert_eq!(snap.get("latency"), Some(&json!({"p50": 12})));
        assert_eq!(snap.get_f64("errors"), Some(1.0));
    }
}
