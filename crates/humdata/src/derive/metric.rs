//! Derived metric definitions.

use serde::{Deserialize, Serialize};

/// How missing inputs affect a derived value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Any null input makes the output null.
    #[default]
    Propagate,
    /// Null inputs are left out; only valid for `sum`. The output is null
    /// only when every input is null.
    SkipMissing,
}

/// What a zero denominator produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDivision {
    #[default]
    Null,
    /// Abort the run with `DivisionByZero`.
    Error,
}

/// Direction of a ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    /// Largest value ranks first.
    #[default]
    Descending,
    Ascending,
}

/// How tied values are numbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMethod {
    /// Ties share the lowest rank and the next rank skips: 1, 2, 2, 4.
    #[default]
    Min,
    /// Ties share a rank and the next rank follows on: 1, 2, 2, 3.
    Dense,
}

/// Comparison operator for threshold metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Ne,
}

impl Comparison {
    pub fn holds(&self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

/// The computation behind a derived field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MetricRule {
    /// `numerator / denominator`.
    Ratio { numerator: String, denominator: String },

    /// `numerator / denominator * 100`.
    Percent { numerator: String, denominator: String },

    /// `minuend - subtrahend`.
    Difference { minuend: String, subtrahend: String },

    /// Sum of several fields.
    Sum { fields: Vec<String> },

    /// `field * factor`.
    Scale { field: String, factor: f64 },

    /// Position of the value among all countries.
    Rank {
        field: String,
        #[serde(default)]
        order: RankOrder,
        #[serde(default)]
        method: RankMethod,
    },

    /// English ordinal label of an integer ("1st", "22nd").
    Ordinal { field: String },

    /// Whether the field has a value.
    Present { field: String },

    /// Whether the field compares true against a constant.
    Threshold {
        field: String,
        op: Comparison,
        value: f64,
    },
}

impl MetricRule {
    /// Fields this rule reads, in argument order.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            MetricRule::Ratio {
                numerator,
                denominator,
            }
            | MetricRule::Percent {
                numerator,
                denominator,
            } => vec![numerator.as_str(), denominator.as_str()],
            MetricRule::Difference {
                minuend,
                subtrahend,
            } => vec![minuend.as_str(), subtrahend.as_str()],
            MetricRule::Sum { fields } => fields.iter().map(String::as_str).collect(),
            MetricRule::Scale { field, .. }
            | MetricRule::Rank { field, .. }
            | MetricRule::Ordinal { field }
            | MetricRule::Present { field }
            | MetricRule::Threshold { field, .. } => vec![field.as_str()],
        }
    }

    /// Rule name as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricRule::Ratio { .. } => "ratio",
            MetricRule::Percent { .. } => "percent",
            MetricRule::Difference { .. } => "difference",
            MetricRule::Sum { .. } => "sum",
            MetricRule::Scale { .. } => "scale",
            MetricRule::Rank { .. } => "rank",
            MetricRule::Ordinal { .. } => "ordinal",
            MetricRule::Present { .. } => "present",
            MetricRule::Threshold { .. } => "threshold",
        }
    }

    /// Human-readable description of the calculation.
    pub fn description(&self) -> String {
        match self {
            MetricRule::Ratio {
                numerator,
                denominator,
            } => format!("{} / {}", numerator, denominator),
            MetricRule::Percent {
                numerator,
                denominator,
            } => format!("{} / {} * 100", numerator, denominator),
            MetricRule::Difference {
                minuend,
                subtrahend,
            } => format!("{} - {}", minuend, subtrahend),
            MetricRule::Sum { fields } => fields.join(" + "),
            MetricRule::Scale { field, factor } => format!("{} * {}", field, factor),
            MetricRule::Rank {
                field,
                order,
                method,
            } => {
                let order = match order {
                    RankOrder::Descending => "descending",
                    RankOrder::Ascending => "ascending",
                };
                let method = match method {
                    RankMethod::Min => "min",
                    RankMethod::Dense => "dense",
                };
                format!("rank of {} ({}, {} ties)", field, order, method)
            }
            MetricRule::Ordinal { field } => format!("ordinal of {}", field),
            MetricRule::Present { field } => format!("{} is reported", field),
            MetricRule::Threshold { field, op, value } => {
                format!("{} {} {}", field, op.symbol(), value)
            }
        }
    }
}

/// A named field computed from joined (or other derived) fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    #[serde(flatten)]
    pub rule: MetricRule,
    #[serde(default)]
    pub null_policy: NullPolicy,
    #[serde(default)]
    pub zero_division: ZeroDivision,
    /// Overrides the generated calculation description in provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DerivedMetric {
    pub fn new(name: impl Into<String>, rule: MetricRule) -> Self {
        Self {
            name: name.into(),
            rule,
            null_policy: NullPolicy::default(),
            zero_division: ZeroDivision::default(),
            description: None,
        }
    }

    pub fn with_null_policy(mut self, policy: NullPolicy) -> Self {
        self.null_policy = policy;
        self
    }

    pub fn with_zero_division(mut self, policy: ZeroDivision) -> Self {
        self.zero_division = policy;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn inputs(&self) -> Vec<&str> {
        self.rule.inputs()
    }

    /// The calculation recorded in derived provenance.
    pub fn calculation(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.rule.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs() {
        let metric = DerivedMetric::new(
            "IDPShare",
            MetricRule::Percent {
                numerator: "IDPs".into(),
                denominator: "PopTotal".into(),
            },
        );
        assert_eq!(metric.inputs(), vec!["IDPs", "PopTotal"]);
        assert_eq!(metric.calculation(), "IDPs / PopTotal * 100");
    }

    #[test]
    fn test_deserialize_flattened_rule() {
        let metric: DerivedMetric = serde_json::from_str(
            r#"{"name": "HighRisk", "rule": "threshold", "field": "Risk", "op": ">=", "value": 7}"#,
        )
        .unwrap();
        assert_eq!(
            metric.rule,
            MetricRule::Threshold {
                field: "Risk".into(),
                op: Comparison::Ge,
                value: 7.0,
            }
        );
        assert_eq!(metric.null_policy, NullPolicy::Propagate);

        let rank: DerivedMetric =
            serde_json::from_str(r#"{"name": "RiskRank", "rule": "rank", "field": "Risk"}"#).unwrap();
        assert!(matches!(
            rank.rule,
            MetricRule::Rank {
                order: RankOrder::Descending,
                method: RankMethod::Min,
                ..
            }
        ));
    }
}
