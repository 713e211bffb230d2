use crate::Result;
use ohno::{IntoAppError, bail};
use serde::Deserialize;
use std::collections::HashMap;

/// Scoring algorithms understood by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    WeightedArithmeticMean,
}

/// Transform applied to a value before it is weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Distribution {
    #[default]
    Linear,

    /// `ln(1 + v)`
    Zipfian,
}

impl Distribution {
    #[must_use]
    pub fn normalize(self, v: f64) -> f64 {
        match self {
            Self::Linear => v,
            Self::Zipfian => v.ln_1p(),
        }
    }
}

/// Clamping range for an input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bounds {
    #[serde(default)]
    pub lower: f64,

    #[serde(default)]
    pub upper: f64,

    #[serde(default)]
    pub smaller_is_better: bool,
}

impl Bounds {
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.upper - self.lower
    }

    /// Clamp `v` into the range and measure it from `lower`, inverted when smaller is better.
    #[must_use]
    pub const fn apply(&self, v: f64) -> f64 {
        let clamped = if v < self.lower {
            self.lower
        } else if v > self.upper {
            self.upper
        } else {
            v
        };

        let from_lower = clamped - self.lower;
        if self.smaller_is_better {
            self.threshold() - from_lower
        } else {
            from_lower
        }
    }
}

/// Gate deciding whether an input takes part in a score.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    FieldExists(String),
    Not(Box<Self>),
}

impl Condition {
    #[must_use]
    pub fn holds(&self, record: &HashMap<String, f64>) -> bool {
        match self {
            Self::FieldExists(field) => record.contains_key(field),
            Self::Not(inner) => !inner.holds(record),
        }
    }
}

/// One weighted input of a score.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Input {
    pub field: String,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default)]
    pub distribution: Distribution,

    pub bounds: Option<Bounds>,

    pub condition: Option<Condition>,

    #[serde(default)]
    pub tags: Vec<String>,
}

const fn default_weight() -> f64 {
    1.0
}

impl Input {
    /// This input's contribution before weighting, or `None` when it does not apply.
    #[must_use]
    pub fn value(&self, record: &HashMap<String, f64>) -> Option<f64> {
        if let Some(condition) = &self.condition
            && !condition.holds(record)
        {
            return None;
        }

        let v = *record.get(&self.field)?;
        Some(match &self.bounds {
            Some(bounds) => self.distribution.normalize(bounds.apply(v)) / self.distribution.normalize(bounds.threshold()),
            None => self.distribution.normalize(v),
        })
    }
}

/// A scoring configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    #[serde(default)]
    pub algorithm: Algorithm,

    pub inputs: Vec<Input>,
}

impl ScoringConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).into_app_err("parsing scoring configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            bail!("scoring configuration declares no inputs");
        }

        for input in &self.inputs {
            if input.field.is_empty() {
                bail!("scoring input field must be set");
            }

            if input.weight.is_nan() || input.weight <= 0.0 {
                bail!("weight of scoring input '{}' must be greater than 0", input.field);
            }

            if let Some(bounds) = &input.bounds
                && bounds.upper < bounds.lower
            {
                bail!("bounds of scoring input '{}' have upper below lower", input.field);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn bounds(lower: f64, upper: f64, smaller_is_better: bool) -> Bounds {
        Bounds {
            lower,
            upper,
            smaller_is_better,
        }
    }

    fn record(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn bounds_apply() {
        for (b, v, want) in [
            (bounds(0.0, 10.0, false), 7.0, 7.0),
            (bounds(0.0, 10.0, true), 7.0, 3.0),
            (bounds(40.0, 80.0, false), 50.0, 10.0),
            (bounds(40.0, 40.0, false), 40.0, 0.0),
            (bounds(40.0, 40.0, true), 40.0, 0.0),
            (bounds(0.0, 10.0, false), -10.0, 0.0),
            (bounds(20.0, 30.0, true), 15.0, 10.0),
            (bounds(0.0, 10.0, true), 20.0, 0.0),
        ] {
            assert!((b.apply(v) - want).abs() < f64::EPSILON, "{b:?} applied to {v}");
        }
    }

    #[test]
    fn distributions() {
        assert!((Distribution::Linear.normalize(10.0) - 10.0).abs() < f64::EPSILON);
        assert!((Distribution::Zipfian.normalize(0.0)).abs() < f64::EPSILON);
        assert!((Distribution::Zipfian.normalize(core::f64::consts::E - 1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn conditions() {
        let exists = Condition::FieldExists("a".into());
        let not = Condition::Not(Box::new(exists.clone()));

        assert!(exists.holds(&record(&[("a", 1.0)])));
        assert!(!exists.holds(&record(&[("b", 1.0)])));
        assert!(not.holds(&record(&[("b", 1.0)])));
    }

    #[test]
    fn input_values() {
        let input = Input {
            field: "test".into(),
            weight: 1.0,
            distribution: Distribution::Linear,
            bounds: Some(bounds(0.0, 10.0, false)),
            condition: None,
            tags: Vec::new(),
        };
        assert_eq!(input.value(&record(&[("test", 5.0)])), Some(0.5));
        assert_eq!(input.value(&record(&[("other", 5.0)])), None);

        let gated = Input {
            condition: Some(Condition::FieldExists("gate".into())),
            bounds: None,
            ..input
        };
        assert_eq!(gated.value(&record(&[("test", 5.0)])), None);
        assert_eq!(gated.value(&record(&[("test", 5.0), ("gate", 0.0)])), Some(5.0));
    }

    #[test]
    fn parses_with_defaults() {
        let config = ScoringConfig::from_toml(
            r#"
            [[inputs]]
            field = "legacy.org_count"

            [[inputs]]
            field = "repo.star_count"
            weight = 2.5
            distribution = "zipfian"
            bounds = { upper = 100.0, smaller_is_better = true }
            condition = { not = { field_exists = "legacy.org_count" } }
            "#,
        )
        .unwrap();

        assert_eq!(config.algorithm, Algorithm::WeightedArithmeticMean);
        assert!((config.inputs[0].weight - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.inputs[0].distribution, Distribution::Linear);
        assert_eq!(
            config.inputs[1].condition,
            Some(Condition::Not(Box::new(Condition::FieldExists("legacy.org_count".into()))))
        );
    }

    #[test]
    fn rejects_invalid_inputs() {
        for text in [
            "inputs = []",
            "[[inputs]]\nfield = \"\"",
            "[[inputs]]\nfield = \"a\"\nweight = 0.0",
            "[[inputs]]\nfield = \"a\"\ndistribution = \"cubic\"",
            "[[inputs]]\nfield = \"a\"\nbounds = { lower = 5.0, upper = 1.0 }",
            "[[inputs]]\nfield = \"a\"\ncolour = \"blue\"",
            "algorithm = \"median\"\n[[inputs]]\nfield = \"a\"",
        ] {
            let _ = ScoringConfig::from_toml(text).unwrap_err();
        }
    }
}
