//! WORLD aggregations.

use serde::{Deserialize, Serialize};

use crate::error::{HumdataError, Result};
use crate::schema::{FieldType, FieldValue};

/// How a field is combined across countries into the WORLD entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    /// Number of countries with a value.
    Count,
    Mean,
    /// Mean weighted by another field; countries missing either are left out.
    WeightedMean { weight: String },
    Min,
    Max,
}

impl Aggregation {
    pub fn name(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Count => "count",
            Aggregation::Mean => "mean",
            Aggregation::WeightedMean { .. } => "weighted_mean",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }

    /// Whether a field of type `ty` can be combined this way.
    pub fn accepts(&self, ty: FieldType) -> bool {
        matches!(self, Aggregation::Count) || ty.is_numeric()
    }

    /// Combine `values` (with matching `weights` for weighted means).
    ///
    /// Nulls are never treated as zero: they are left out and counted.
    pub fn apply(&self, field: &str, values: &[&FieldValue], weights: &[&FieldValue]) -> Result<AggregateOutcome> {
        let mut outcome = AggregateOutcome::default();

        match self {
            Aggregation::Count => {
                for value in values {
                    outcome.tally(value);
                }
                outcome.value = FieldValue::Integer(outcome.included as i64);
            }
            Aggregation::Sum => {
                let mut integer: Option<i64> = Some(0);
                let mut float = 0.0;
                for value in values {
                    if outcome.tally(value) {
                        if let FieldValue::Integer(v) = value {
                            integer = integer.and_then(|acc| acc.checked_add(*v));
                        } else {
                            integer = None;
                        }
                        float += numeric(self, field, value)?;
                    }
                }
                outcome.value = match (outcome.included, integer) {
                    (0, _) => FieldValue::Null,
                    (_, Some(total)) => FieldValue::Integer(total),
                    (_, None) => FieldValue::from(float),
                };
            }
            Aggregation::Mean => {
                let mut total = 0.0;
                for value in values {
                    if outcome.tally(value) {
                        total += numeric(self, field, value)?;
                    }
                }
                if outcome.included > 0 {
                    outcome.value = FieldValue::from(total / outcome.included as f64);
                }
            }
            Aggregation::WeightedMean { .. } => {
                let mut weighted = 0.0;
                let mut weight_total = 0.0;
                let missing = FieldValue::Null;
                for (index, value) in values.iter().enumerate() {
                    let weight = weights.get(index).copied().unwrap_or(&missing);
                    if value.is_null() || weight.is_null() {
                        outcome.excluded_nulls += 1;
                        continue;
                    }
                    let v = numeric(self, field, value)?;
                    let w = numeric(self, field, weight)?;
                    outcome.included += 1;
                    weighted += v * w;
                    weight_total += w;
                }
                if outcome.included > 0 && weight_total != 0.0 {
                    outcome.value = FieldValue::from(weighted / weight_total);
                }
            }
            Aggregation::Min | Aggregation::Max => {
                let mut best: Option<(&FieldValue, f64)> = None;
                for value in values {
                    if !outcome.tally(value) {
                        continue;
                    }
                    let v = numeric(self, field, value)?;
                    let better = match best {
                        None => true,
                        Some((_, current)) if *self == Aggregation::Min => v < current,
                        Some((_, current)) => v > current,
                    };
                    if better {
                        best = Some((*value, v));
                    }
                }
                if let Some((value, _)) = best {
                    outcome.value = value.clone();
                }
            }
        }

        Ok(outcome)
    }
}

/// Result of one WORLD aggregation with its null accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateOutcome {
    pub value: FieldValue,
    /// Countries whose value took part.
    pub included: usize,
    /// Countries left out because their value was null.
    pub excluded_nulls: usize,
}

impl AggregateOutcome {
    /// Count a value as included or excluded; returns whether it is included.
    fn tally(&mut self, value: &FieldValue) -> bool {
        if value.is_null() {
            self.excluded_nulls += 1;
            false
        } else {
            self.included += 1;
            true
        }
    }
}

fn numeric(aggregation: &Aggregation, field: &str, value: &FieldValue) -> Result<f64> {
    value.as_f64().ok_or_else(|| HumdataError::TypeMismatch {
        metric: format!("WORLD {}", aggregation.name()),
        field: field.to_string(),
        country: "WORLD".to_string(),
        found: format!("{} '{}'", value.kind(), value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_excludes_nulls() {
        let values = [FieldValue::Integer(5), FieldValue::Integer(0), FieldValue::Null];
        let refs: Vec<&FieldValue> = values.iter().collect();
        let outcome = Aggregation::Sum.apply("Idps", &refs, &[]).unwrap();

        assert_eq!(outcome.value, FieldValue::Integer(5));
        assert_eq!(outcome.included, 2);
        assert_eq!(outcome.excluded_nulls, 1);
    }

    #[test]
    fn test_all_null_sum_is_null() {
        let values = [FieldValue::Null, FieldValue::Null];
        let refs: Vec<&FieldValue> = values.iter().collect();
        let outcome = Aggregation::Sum.apply("Idps", &refs, &[]).unwrap();
        assert!(outcome.value.is_null());
        assert_eq!(outcome.excluded_nulls, 2);
    }

    #[test]
    fn test_mean_min_max_count() {
        let values = [FieldValue::Float(2.0), FieldValue::Null, FieldValue::Integer(4)];
        let refs: Vec<&FieldValue> = values.iter().collect();

        assert_eq!(Aggregation::Mean.apply("x", &refs, &[]).unwrap().value, FieldValue::Float(3.0));
        assert_eq!(Aggregation::Min.apply("x", &refs, &[]).unwrap().value, FieldValue::Float(2.0));
        assert_eq!(Aggregation::Max.apply("x", &refs, &[]).unwrap().value, FieldValue::Integer(4));
        assert_eq!(Aggregation::Count.apply("x", &refs, &[]).unwrap().value, FieldValue::Integer(2));
    }

    #[test]
    fn test_weighted_mean() {
        let values = [FieldValue::Float(1.0), FieldValue::Float(4.0), FieldValue::Float(9.0)];
        let weights = [FieldValue::Integer(3), FieldValue::Integer(1), FieldValue::Null];
        let v: Vec<&FieldValue> = values.iter().collect();
        let w: Vec<&FieldValue> = weights.iter().collect();

        let outcome = Aggregation::WeightedMean {
            weight: "Pop".into(),
        }
        .apply("Severity", &v, &w)
        .unwrap();
        assert_eq!(outcome.value, FieldValue::Float(1.75));
        assert_eq!(outcome.included, 2);
        assert_eq!(outcome.excluded_nulls, 1);
    }

    #[test]
    fn test_text_is_rejected() {
        let values = [FieldValue::from("lots")];
        let refs: Vec<&FieldValue> = values.iter().collect();
        assert!(matches!(
            Aggregation::Sum.apply("x", &refs, &[]),
            Err(HumdataError::TypeMismatch { .. })
        ));
    }
}
