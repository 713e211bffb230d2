use chrono::{DateTime, SecondsFormat, Utc};
use core::fmt::{Display, Formatter};
use serde::{Serialize, Serializer};

/// A collected signal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
}

impl Value {
    /// Numeric view of the value, used by scoring.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "signal counts stay well within f64 precision")]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.parse().ok(),
            Self::Time(_) => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Time(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Time(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(v)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
        assert_eq!(Value::Text("abc".into()).to_string(), "abc");
        let t = Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(Value::Time(t).to_string(), "2020-05-06T07:08:09Z");
    }

    #[test]
    fn numeric_view() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Text("2.5".into()).as_f64(), Some(2.5));
        assert_eq!(Value::Text("nope".into()).as_f64(), None);
        assert_eq!(Value::Time(Utc::now()).as_f64(), None);
    }

    #[test]
    fn serializes_as_plain_json() {
        let values = vec![Value::Int(1), Value::Text("x".into())];
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[1,"x"]"#);
    }
}
