use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Serializes Duration as whole milliseconds
pub fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    (duration.as_millis() as u64).serialize(serializer)
}

/// Deserializes Duration from whole milliseconds
pub fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Serializes an optional Duration as milliseconds
pub fn serialize_opt_millis<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    duration.map(|d| d.as_millis() as u64).serialize(serializer)
}

/// Deserializes an optional Duration from milliseconds
pub fn deserialize_opt_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = Option::<u64>::deserialize(deserializer)?;
    Ok(millis.map(Duration::from_millis))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientBool {
    Bool(bool),
    Int(i64),
}

/// Accepts `true`/`false` as well as `1`/`0`, as sent by the dashboard
pub fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LenientBool::deserialize(deserializer)? {
        LenientBool::Bool(b) => b,
        LenientBool::Int(i) => i != 0,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Int(i64),
    Float(f64),
}

/// Reads a fixed-point integer, truncating fractional input toward zero
pub fn deserialize_fixed<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match LenientNumber::deserialize(deserializer)? {
        LenientNumber::Int(i) => i.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        LenientNumber::Float(f) => f.trunc() as i32,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[derive(Serialize, Deserialize)]
    struct Periods {
        #[serde(serialize_with = "serialize_millis")]
        #[serde(deserialize_with = "deserialize_millis")]
        period: Duration,
        #[serde(serialize_with = "serialize_opt_millis")]
        #[serde(deserialize_with = "deserialize_opt_millis")]
        timeout: Option<Duration>,
    }

    #[test]
    fn test_millis_serialization() {
        let original = Periods {
            period: Duration::from_millis(100),
            timeout: None,
        };

        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"period":100,"timeout":null}"#);

        let deserialized: Periods = serde_json::from_str(r#"{"period":5,"timeout":1500}"#).unwrap();
        assert_eq!(deserialized.period, Duration::from_millis(5));
        assert_eq!(deserialized.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_lenient_flag() {
        #[derive(Deserialize)]
        struct Flag {
            #[serde(deserialize_with = "deserialize_flag")]
            on: bool,
        }

        assert!(serde_json::from_str::<Flag>(r#"{"on":1}"#).unwrap().on);
        assert!(!serde_json::from_str::<Flag>(r#"{"on":0}"#).unwrap().on);
        assert!(serde_json::from_str::<Flag>(r#"{"on":true}"#).unwrap().on);
    }

    #[test]
    fn test_fixed_accepts_floats() {
        #[derive(Deserialize)]
        struct Gain {
            #[serde(deserialize_with = "deserialize_fixed")]
            eta: i32,
        }

        assert_eq!(serde_json::from_str::<Gain>(r#"{"eta":250}"#).unwrap().eta, 250);
        assert_eq!(serde_json::from_str::<Gain>(r#"{"eta":-7.9}"#).unwrap().eta, -7);
    }
}
