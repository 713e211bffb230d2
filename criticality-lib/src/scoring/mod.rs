//! Folds collected signals into a single criticality score.

mod config;

pub use config::{Algorithm, Bounds, Condition, Distribution, Input, ScoringConfig};

use crate::Result;
use crate::signals::{SignalSet, as_map};
use camino::Utf8Path;
use ohno::{EnrichableExt, IntoAppError};
use std::collections::HashMap;
use std::fs;

/// The scoring configuration used when none is supplied.
pub const DEFAULT_SCORER_TOML: &str = include_str!("../../default_scorer.toml");

/// Column name of the score produced by the embedded configuration.
pub const DEFAULT_SCORE_NAME: &str = "default_score";

/// Scores signal records with a weighted arithmetic mean.
#[derive(Debug, Clone)]
pub struct Scorer {
    name: String,
    config: ScoringConfig,
}

impl Scorer {
    #[must_use]
    pub fn new(name: impl Into<String>, config: ScoringConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// The scorer built from the embedded configuration.
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(DEFAULT_SCORE_NAME, ScoringConfig::from_toml(DEFAULT_SCORER_TOML)?))
    }

    /// Load a scoring configuration file, naming the score after the file.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let text = fs::read_to_string(path).into_app_err_with(|| format!("reading scoring configuration '{path}'"))?;
        let config = ScoringConfig::from_toml(&text).map_err(|e| e.enrich_with(|| format!("loading '{path}'")))?;
        Ok(Self::new(name_from_path(path), config))
    }

    /// Rename the score column.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name of the score column.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Score a collected repository; `None` when none of the inputs were collected.
    #[must_use]
    pub fn score(&self, sets: &[Box<dyn SignalSet>]) -> Option<f64> {
        let record: HashMap<String, f64> = sets
            .iter()
            .flat_map(|set| as_map(set.as_ref()))
            .filter_map(|(name, value)| Some((name, value?.as_f64()?)))
            .collect();
        self.score_record(&record)
    }

    /// Score a record of numeric signal values keyed by qualified field name.
    #[must_use]
    pub fn score_record(&self, record: &HashMap<String, f64>) -> Option<f64> {
        match self.config.algorithm {
            Algorithm::WeightedArithmeticMean => {
                let (weighted, total_weight) = self
                    .config
                    .inputs
                    .iter()
                    .filter_map(|input| Some((input.weight, input.value(record)?)))
                    .fold((0.0, 0.0), |(sum, weights), (weight, v)| (weight.mul_add(v, sum), weights + weight));

                (total_weight > 0.0).then(|| weighted / total_weight)
            }
        }
    }
}

/// Score column name derived from a configuration file name, e.g. `pike-v2.toml` gives `pike_v2_score`.
#[must_use]
pub fn name_from_path(path: &Utf8Path) -> String {
    let stem = path.file_stem().unwrap_or_default();
    let mut name: String = stem
        .chars()
        .flat_map(|c| {
            let c = if c.is_alphanumeric() { c } else { '_' };
            c.to_lowercase()
        })
        .collect();
    name.push_str("_score");
    name
}

/// Render a score the way it appears in output.
#[must_use]
pub fn format_score(score: f64) -> String {
    format!("{score:.5}")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::output::tests::sample_sets;
    use camino::Utf8PathBuf;

    fn record(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    fn scorer(text: &str) -> Scorer {
        Scorer::new("test_score", ScoringConfig::from_toml(text).unwrap())
    }

    #[test]
    fn weighted_mean_skips_missing_inputs() {
        let scorer = scorer(
            r#"
            [[inputs]]
            field = "a"
            weight = 1.0

            [[inputs]]
            field = "b"
            weight = 3.0

            [[inputs]]
            field = "c"
            weight = 100.0
            "#,
        );

        let score = scorer.score_record(&record(&[("a", 2.0), ("b", 6.0)])).unwrap();
        assert!((score - 5.0).abs() < 1e-12);
        assert_eq!(scorer.score_record(&record(&[("z", 1.0)])), None);
    }

    #[test]
    fn builtin_scorer_scores_sets() {
        let scorer = Scorer::builtin().unwrap();
        assert_eq!(scorer.name(), "default_score");

        // Only the contributor count (weight 2) and comment frequency (weight 1) take part.
        let score = scorer.score(&sample_sets("https://github.com/a/b", Some(5))).unwrap();
        let want = 2.0f64.mul_add(13.0_f64.ln() / 5001.0_f64.ln(), 2.5_f64.ln() / 16.0_f64.ln()) / 3.0;
        assert!((score - want).abs() < 1e-12, "{score} != {want}");
        assert_eq!(format_score(score), format!("{want:.5}"));
    }

    #[test]
    fn score_names() {
        assert_eq!(name_from_path(Utf8Path::new("/cfg/original_pike.toml")), "original_pike_score");
        assert_eq!(name_from_path(Utf8Path::new("Pike-V2.toml")), "pike_v2_score");
        assert_eq!(name_from_path(Utf8Path::new("weights")), "weights_score");
    }

    #[test]
    fn formats_five_decimals() {
        assert_eq!(format_score(0.5), "0.50000");
        assert_eq!(format_score(0.123_456_7), "0.12346");
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().join("my scorer.toml")).unwrap();
        fs::write(&path, "[[inputs]]\nfield = \"legacy.org_count\"\n").unwrap();

        let scorer = Scorer::load(&path).unwrap();
        assert_eq!(scorer.name(), "my_scorer_score");

        fs::write(&path, "[[inputs]]\nfield = \"\"\n").unwrap();
        let _ = Scorer::load(&path).unwrap_err();
    }
}
