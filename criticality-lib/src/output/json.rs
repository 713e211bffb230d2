use super::{ExtraField, Output, SignalWriter};
use crate::Result;
use crate::signals::{SignalSet, output_namespace};
use ohno::IntoAppError;
use serde_json::{Map, Value as JsonValue};
use std::io::Write;
use std::sync::Mutex;

/// One JSON object per line, grouping fields by their output namespace.
pub struct JsonWriter {
    out: Mutex<Output>,
}

impl core::fmt::Debug for JsonWriter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JsonWriter").finish_non_exhaustive()
    }
}

impl JsonWriter {
    #[must_use]
    pub const fn new(out: Output) -> Self {
        Self { out: Mutex::new(out) }
    }
}

fn record(sets: &[Box<dyn SignalSet>], extra: &[ExtraField]) -> Result<Map<String, JsonValue>> {
    let mut record = Map::new();

    for set in sets {
        for (def, value) in set.schema().iter().zip(set.values()) {
            let Some(value) = value else {
                continue;
            };

            let namespace = output_namespace(set.as_ref(), def).to_string();
            let entry = record.entry(namespace).or_insert_with(|| JsonValue::Object(Map::new()));
            if let JsonValue::Object(fields) = entry {
                let _ = fields.insert(def.name.to_string(), serde_json::to_value(value).into_app_err("encoding signal value")?);
            }
        }
    }

    for (key, value) in extra {
        let _ = record.insert(key.clone(), JsonValue::String(value.clone()));
    }

    Ok(record)
}

impl SignalWriter for JsonWriter {
    fn write_signals(&self, sets: &[Box<dyn SignalSet>], extra: &[ExtraField]) -> Result<()> {
        let mut line = serde_json::to_vec(&record(sets, extra)?).into_app_err("encoding JSON record")?;
        line.push(b'\n');

        let mut out = self.out.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        out.write_all(&line).into_app_err("writing JSON record")?;
        out.flush().into_app_err("flushing JSON output")
    }
}
