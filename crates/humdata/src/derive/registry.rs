//! Metric registry: dependency ordering and evaluation over joined records.

use indexmap::IndexMap;

use super::metric::{DerivedMetric, MetricRule, NullPolicy, ZeroDivision};
use super::rank::{ordinal, rank_values};
use crate::error::{HumdataError, Result};
use crate::join::JoinedTable;
use crate::schema::{FieldType, FieldValue};

/// An ordered collection of derived metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    metrics: Vec<DerivedMetric>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Vec<DerivedMetric>) -> Self {
        Self { metrics }
    }

    pub fn register(&mut self, metric: DerivedMetric) {
        self.metrics.push(metric);
    }

    pub fn get(&self, name: &str) -> Option<&DerivedMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DerivedMetric> {
        self.metrics.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Check the metrics against the joined field names and return their
    /// evaluation order.
    ///
    /// Metrics are ordered so each comes after everything it depends on;
    /// among metrics that are ready together, registration order wins.
    pub fn evaluation_order(&self, joined_fields: &[String]) -> Result<Vec<usize>> {
        let mut positions: IndexMap<&str, usize> = IndexMap::new();
        for (index, metric) in self.metrics.iter().enumerate() {
            if joined_fields.iter().any(|f| f == &metric.name) {
                return Err(HumdataError::SchemaConflict {
                    field: metric.name.clone(),
                    sources: vec!["joined sources".to_string(), format!("metric '{}'", metric.name)],
                });
            }
            if positions.insert(metric.name.as_str(), index).is_some() {
                return Err(HumdataError::SchemaConflict {
                    field: metric.name.clone(),
                    sources: vec![format!("metric '{}'", metric.name); 2],
                });
            }
            if metric.null_policy == NullPolicy::SkipMissing
                && !matches!(metric.rule, MetricRule::Sum { .. })
            {
                return Err(HumdataError::Config(format!(
                    "metric '{}': skip_missing is only allowed for sum, not {}",
                    metric.name,
                    metric.rule.kind()
                )));
            }
        }

        // Dependencies on other metrics, by index.
        let mut depends_on: Vec<Vec<usize>> = Vec::with_capacity(self.metrics.len());
        for metric in &self.metrics {
            let mut deps = Vec::new();
            for input in metric.inputs() {
                if let Some(&dep) = positions.get(input) {
                    if !deps.contains(&dep) {
                        deps.push(dep);
                    }
                } else if !joined_fields.iter().any(|f| f == input) {
                    return Err(HumdataError::UnknownField {
                        field: input.to_string(),
                        referenced_by: format!("metric '{}'", metric.name),
                    });
                }
            }
            depends_on.push(deps);
        }

        let mut done = vec![false; self.metrics.len()];
        let mut order = Vec::with_capacity(self.metrics.len());
        while order.len() < self.metrics.len() {
            let ready = (0..self.metrics.len())
                .find(|&i| !done[i] && depends_on[i].iter().all(|&d| done[d]));
            match ready {
                Some(index) => {
                    done[index] = true;
                    order.push(index);
                }
                None => {
                    return Err(HumdataError::CyclicDependency {
                        cycle: self.find_cycle(&depends_on, &done),
                    });
                }
            }
        }
        Ok(order)
    }

    /// Follow unresolved dependencies from the first blocked metric until a
    /// name repeats.
    fn find_cycle(&self, depends_on: &[Vec<usize>], done: &[bool]) -> Vec<String> {
        let Some(start) = (0..done.len()).find(|&i| !done[i]) else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut current = start;
        loop {
            let Some(&next) = depends_on[current].iter().find(|&&d| !done[d]) else {
                break;
            };
            if let Some(position) = path.iter().position(|&p| p == next) {
                let mut cycle: Vec<String> = path[position..]
                    .iter()
                    .map(|&i| self.metrics[i].name.clone())
                    .collect();
                cycle.push(self.metrics[next].name.clone());
                return cycle;
            }
            path.push(next);
            current = next;
        }
        path.iter().map(|&i| self.metrics[i].name.clone()).collect()
    }

    /// Check each metric's inputs against their declared types and return
    /// the type of every field, derived ones appended in evaluation order.
    pub fn field_types(&self, declared: &IndexMap<String, FieldType>) -> Result<IndexMap<String, FieldType>> {
        let fields: Vec<String> = declared.keys().cloned().collect();
        let order = self.evaluation_order(&fields)?;

        let mut types = declared.clone();
        for index in order {
            let metric = &self.metrics[index];
            let inputs: Vec<(&str, FieldType)> = metric
                .inputs()
                .into_iter()
                .filter_map(|field| types.get(field).map(|ty| (field, *ty)))
                .collect();
            let output = output_type(metric, &inputs)?;
            types.insert(metric.name.clone(), output);
        }
        Ok(types)
    }

    /// Compute every metric and append it to each record, in evaluation
    /// order. Derived field names are appended to `table.fields`.
    pub fn apply(&self, table: &mut JoinedTable) -> Result<()> {
        let order = self.evaluation_order(&table.fields)?;
        for index in order {
            let metric = &self.metrics[index];
            let values = evaluate(metric, table)?;
            for (record, value) in table.records.values_mut().zip(values) {
                record.fields.insert(metric.name.clone(), value);
            }
            table.fields.push(metric.name.clone());
            log::debug!("derived '{}' ({})", metric.name, metric.rule.kind());
        }
        Ok(())
    }
}

/// Type a metric produces from inputs of the given types.
fn output_type(metric: &DerivedMetric, inputs: &[(&str, FieldType)]) -> Result<FieldType> {
    let require = |expected: &'static str, accepts: fn(FieldType) -> bool| -> Result<()> {
        match inputs.iter().find(|(_, ty)| !accepts(*ty)) {
            Some((field, ty)) => Err(HumdataError::IncompatibleField {
                field: field.to_string(),
                found: *ty,
                expected,
                referenced_by: format!("metric '{}' ({})", metric.name, metric.rule.kind()),
            }),
            None => Ok(()),
        }
    };
    let numeric = |ty: FieldType| ty.is_numeric();
    let all_integer = inputs.iter().all(|(_, ty)| *ty == FieldType::Integer);

    let output = match &metric.rule {
        MetricRule::Present { .. } => FieldType::Boolean,
        MetricRule::Ordinal { .. } => {
            require("integer", |ty| ty == FieldType::Integer)?;
            FieldType::Text
        }
        MetricRule::Rank { .. } => {
            require("numeric", numeric)?;
            FieldType::Integer
        }
        MetricRule::Threshold { .. } => {
            require("numeric", numeric)?;
            FieldType::Boolean
        }
        MetricRule::Difference { .. } | MetricRule::Sum { .. } => {
            require("numeric", numeric)?;
            if all_integer { FieldType::Integer } else { FieldType::Float }
        }
        MetricRule::Ratio { .. } | MetricRule::Percent { .. } | MetricRule::Scale { .. } => {
            require("numeric", numeric)?;
            FieldType::Float
        }
    };
    Ok(output)
}

/// Values of one metric for every record, in record order.
fn evaluate(metric: &DerivedMetric, table: &JoinedTable) -> Result<Vec<FieldValue>> {
    if let MetricRule::Rank {
        field,
        order,
        method,
    } = &metric.rule
    {
        let mut inputs = Vec::with_capacity(table.len());
        for record in table.iter() {
            inputs.push(number(metric, field, &record.code, record.get(field))?);
        }
        return Ok(rank_values(&inputs, *order, *method)
            .into_iter()
            .map(FieldValue::from)
            .collect());
    }

    table
        .iter()
        .map(|record| evaluate_row(metric, &record.code, |field: &str| record.get(field)))
        .collect()
}

fn evaluate_row<'a>(
    metric: &DerivedMetric,
    country: &str,
    lookup: impl Fn(&str) -> &'a FieldValue,
) -> Result<FieldValue> {
    let num = |field: &str| number(metric, field, country, lookup(field));

    let value = match &metric.rule {
        MetricRule::Ratio {
            numerator,
            denominator,
        } => divide(metric, country, num(numerator)?, num(denominator)?, 1.0)?,
        MetricRule::Percent {
            numerator,
            denominator,
        } => divide(metric, country, num(numerator)?, num(denominator)?, 100.0)?,
        MetricRule::Difference {
            minuend,
            subtrahend,
        } => match (lookup(minuend), lookup(subtrahend)) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => match a.checked_sub(*b) {
                Some(v) => FieldValue::Integer(v),
                None => FieldValue::from(*a as f64 - *b as f64),
            },
            _ => match (num(minuend)?, num(subtrahend)?) {
                (Some(a), Some(b)) => FieldValue::from(a - b),
                _ => FieldValue::Null,
            },
        },
        MetricRule::Sum { fields } => sum(metric, country, fields, &lookup)?,
        MetricRule::Scale { field, factor } => match num(field)? {
            Some(v) => FieldValue::from(v * factor),
            None => FieldValue::Null,
        },
        MetricRule::Ordinal { field } => match lookup(field) {
            FieldValue::Null => FieldValue::Null,
            FieldValue::Integer(v) => FieldValue::Text(ordinal(*v)),
            FieldValue::Float(v) if v.fract() == 0.0 => FieldValue::Text(ordinal(*v as i64)),
            other => return Err(mismatch(metric, field, country, other)),
        },
        MetricRule::Present { field } => FieldValue::Boolean(!lookup(field).is_null()),
        MetricRule::Threshold { field, op, value } => match num(field)? {
            Some(v) => FieldValue::Boolean(op.holds(v, *value)),
            None => FieldValue::Null,
        },
        MetricRule::Rank { .. } => FieldValue::Null,
    };
    Ok(value)
}

fn sum<'a>(
    metric: &DerivedMetric,
    country: &str,
    fields: &[String],
    lookup: &impl Fn(&str) -> &'a FieldValue,
) -> Result<FieldValue> {
    let mut integer: Option<i64> = Some(0);
    let mut float = 0.0;
    let mut seen = 0usize;

    for field in fields {
        let value = lookup(field);
        match value {
            FieldValue::Null => {
                if metric.null_policy == NullPolicy::Propagate {
                    return Ok(FieldValue::Null);
                }
            }
            FieldValue::Integer(v) => {
                integer = integer.and_then(|acc| acc.checked_add(*v));
                float += *v as f64;
                seen += 1;
            }
            FieldValue::Float(v) => {
                integer = None;
                float += v;
                seen += 1;
            }
            other => return Err(mismatch(metric, field, country, other)),
        }
    }

    Ok(match (seen, integer) {
        (0, _) => FieldValue::Null,
        (_, Some(total)) => FieldValue::Integer(total),
        (_, None) => FieldValue::from(float),
    })
}

fn divide(
    metric: &DerivedMetric,
    country: &str,
    numerator: Option<f64>,
    denominator: Option<f64>,
    factor: f64,
) -> Result<FieldValue> {
    let (Some(n), Some(d)) = (numerator, denominator) else {
        return Ok(FieldValue::Null);
    };
    if d == 0.0 {
        return match metric.zero_division {
            ZeroDivision::Null => Ok(FieldValue::Null),
            ZeroDivision::Error => Err(HumdataError::DivisionByZero {
                metric: metric.name.clone(),
                country: country.to_string(),
            }),
        };
    }
    Ok(FieldValue::from(n / d * factor))
}

/// Numeric view of an input; null stays `None`, anything else non-numeric is
/// a type mismatch.
fn number(metric: &DerivedMetric, field: &str, country: &str, value: &FieldValue) -> Result<Option<f64>> {
    match value {
        FieldValue::Null => Ok(None),
        FieldValue::Integer(_) | FieldValue::Float(_) => Ok(value.as_f64()),
        other => Err(mismatch(metric, field, country, other)),
    }
}

fn mismatch(metric: &DerivedMetric, field: &str, country: &str, found: &FieldValue) -> HumdataError {
    HumdataError::TypeMismatch {
        metric: metric.name.clone(),
        field: field.to_string(),
        country: country.to_string(),
        found: format!("{} '{}'", found.kind(), found),
    }
}
