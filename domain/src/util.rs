//! Small shared helpers.

/// Serialize a [`std::time::Duration`] as fractional seconds.
///
/// Latencies cross the wire as plain numbers (`total_latency: 1.42`), matching
/// the analytics schema.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("negative or non-finite duration"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

/// `skip_serializing_if` helper for bool flags that default to false.
pub fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super::duration_secs")]
        latency: Duration,
    }

    #[test]
    fn duration_roundtrips_as_seconds() {
        let json = serde_json::to_string(&Wrapper {
            latency: Duration::from_millis(1500),
        })
        .unwrap();
        assert_eq!(json, "{\"latency\":1.5}");

        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.latency, Duration::from_millis(1500));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let result: Result<Wrapper, _> = serde_json::from_str("{\"latency\":-1.0}");
        assert!(result.is_err());
    }
}
