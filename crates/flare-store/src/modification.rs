//! Declarative modification pipeline
//!
//! A version is derived from its base by applying a list of
//! [`Modification`]s to every partition independently. The same predicate
//! and aggregation machinery backs the query engine, where per-partition
//! [`GroupedPartial`]s are merged before being finished into rows.

use crate::error::{StoreError, StoreResult};
use crate::record::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Comparison operator used by [`Predicate::Compare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// Row predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// Compare a field against a constant; rows missing the field never match
    Compare {
        /// Field name
        field: String,
        /// Operator
        op: CmpOp,
        /// Right-hand constant
        value: FieldValue,
    },
    /// All sub-predicates hold
    And {
        /// Conjuncts
        all: Vec<Predicate>,
    },
    /// At least one sub-predicate holds
    Or {
        /// Disjuncts
        any: Vec<Predicate>,
    },
    /// Negation
    Not {
        /// Negated predicate
        predicate: Box<Predicate>,
    },
}

impl Predicate {
    /// Shorthand for a comparison predicate
    #[must_use]
    pub fn compare(field: impl Into<String>, op: CmpOp, value: impl Into<FieldValue>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluate against a record
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Compare { field, op, value } => record
                .get(field)
                .and_then(|v| v.compare(value))
                .is_some_and(|ord| op.holds(ord)),
            Self::And { all } => all.iter().all(|p| p.matches(record)),
            Self::Or { any } => any.iter().any(|p| p.matches(record)),
            Self::Not { predicate } => !predicate.matches(record),
        }
    }

    fn validate(&self) -> StoreResult<()> {
        match self {
            Self::Compare { field, .. } if field.is_empty() => {
                Err(StoreError::invalid("predicate field must not be empty"))
            }
            Self::Compare { .. } => Ok(()),
            Self::And { all: parts } | Self::Or { any: parts } => {
                parts.iter().try_for_each(Self::validate)
            }
            Self::Not { predicate } => predicate.validate(),
        }
    }
}

/// Arithmetic applied by [`Modification::ScalarTransform`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarOp {
    /// `field + factor`
    Add,
    /// `field - factor`
    Subtract,
    /// `field * factor`
    Multiply,
    /// `field / factor`
    Divide,
}

impl ScalarOp {
    fn apply(self, current: &FieldValue, factor: f64) -> Option<FieldValue> {
        if let FieldValue::Int(v) = current {
            if factor.fract() == 0.0 && factor.abs() < 9.0e15 {
                #[allow(clippy::cast_possible_truncation)]
                let f = factor as i64;
                let exact = match self {
                    Self::Add => v.checked_add(f),
                    Self::Subtract => v.checked_sub(f),
                    Self::Multiply => v.checked_mul(f),
                    Self::Divide => None,
                };
                if let Some(result) = exact {
                    return Some(FieldValue::Int(result));
                }
            }
        }
        let v = current.as_f64()?;
        let out = match self {
            Self::Add => v + factor,
            Self::Subtract => v - factor,
            Self::Multiply => v * factor,
            Self::Divide => v / factor,
        };
        Some(FieldValue::Float(out))
    }
}

/// Reduction applied to a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    /// Number of rows (or of numeric values when a field is given)
    Count,
    /// Sum of numeric values
    Sum,
    /// Arithmetic mean
    Mean,
    /// Minimum
    Min,
    /// Maximum
    Max,
}

impl ReduceOp {
    fn label(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// One output column of an aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reducer {
    /// Input field (`None` counts rows)
    #[serde(default)]
    pub field: Option<String>,
    /// Reduction
    pub op: ReduceOp,
    /// Output column name (defaults to `<op>_<field>` or `count`)
    #[serde(default)]
    pub alias: Option<String>,
}

impl Reducer {
    /// Reduce a field
    #[must_use]
    pub fn new(op: ReduceOp, field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            op,
            alias: None,
        }
    }

    /// Count rows
    #[must_use]
    pub fn count() -> Self {
        Self {
            field: None,
            op: ReduceOp::Count,
            alias: None,
        }
    }

    /// Rename the output column
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Output column name
    #[must_use]
    pub fn output_name(&self) -> String {
        match (&self.alias, &self.field) {
            (Some(alias), _) => alias.clone(),
            (None, Some(field)) => format!("{}_{field}", self.op.label()),
            (None, None) => self.op.label().to_string(),
        }
    }

    fn validate(&self) -> StoreResult<()> {
        match (&self.field, self.op) {
            (None, ReduceOp::Count) => Ok(()),
            (None, op) => Err(StoreError::invalid(format!(
                "reducer '{}' requires a field",
                op.label()
            ))),
            (Some(field), _) if field.is_empty() => {
                Err(StoreError::invalid("reducer field must not be empty"))
            }
            (Some(_), _) => Ok(()),
        }
    }
}

/// Mergeable running aggregate for one reducer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    fn finish(&self, op: ReduceOp) -> Option<FieldValue> {
        match op {
            #[allow(clippy::cast_possible_wrap)]
            ReduceOp::Count => Some(FieldValue::Int(self.count as i64)),
            ReduceOp::Sum => Some(FieldValue::Float(self.sum)),
            ReduceOp::Mean if self.count > 0 => Some(FieldValue::Float(self.sum / self.count as f64)),
            ReduceOp::Mean => None,
            ReduceOp::Min => self.min.map(FieldValue::Float),
            ReduceOp::Max => self.max.map(FieldValue::Float),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Group {
    key_values: Vec<Option<FieldValue>>,
    accumulators: Vec<Accumulator>,
}

/// Partial aggregation state for one or more partitions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedPartial {
    groups: BTreeMap<Vec<String>, Group>,
}

impl GroupedPartial {
    /// Aggregate a slice of records
    #[must_use]
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a Record>,
        group_by: &[String],
        reducers: &[Reducer],
    ) -> Self {
        let mut partial = Self::default();
        for record in records {
            let key_values: Vec<Option<FieldValue>> =
                group_by.iter().map(|f| record.get(f).cloned()).collect();
            let key: Vec<String> = key_values
                .iter()
                .map(|v| v.as_ref().map_or_else(|| "null".to_string(), FieldValue::group_key))
                .collect();
            let group = partial.groups.entry(key).or_insert_with(|| Group {
                key_values,
                accumulators: vec![Accumulator::default(); reducers.len()],
            });
            for (acc, reducer) in group.accumulators.iter_mut().zip(reducers) {
                match &reducer.field {
                    None => acc.observe(0.0),
                    Some(field) => {
                        if let Some(v) = record.get(field).and_then(FieldValue::as_f64) {
                            acc.observe(v);
                        }
                    }
                }
            }
        }
        partial
    }

    /// Fold another partial into this one
    pub fn merge(&mut self, other: Self) {
        for (key, group) in other.groups {
            match self.groups.get_mut(&key) {
                Some(existing) => {
                    for (a, b) in existing.accumulators.iter_mut().zip(&group.accumulators) {
                        a.merge(b);
                    }
                }
                None => {
                    self.groups.insert(key, group);
                }
            }
        }
    }

    /// Number of distinct groups
    #[inline]
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Produce one output row per group, ordered by group key
    #[must_use]
    pub fn finish(&self, group_by: &[String], reducers: &[Reducer]) -> Vec<Record> {
        self.groups
            .values()
            .map(|group| {
                let mut row = Record::new();
                for (field, value) in group_by.iter().zip(&group.key_values) {
                    if let Some(value) = value {
                        row.set(field.clone(), value.clone());
                    }
                }
                for (reducer, acc) in reducers.iter().zip(&group.accumulators) {
                    if let Some(value) = acc.finish(reducer.op) {
                        row.set(reducer.output_name(), value);
                    }
                }
                row
            })
            .collect()
    }
}

/// One step of a version's modification pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Modification {
    /// Keep only rows matching the predicate
    Filter {
        /// Row predicate
        predicate: Predicate,
    },
    /// Rewrite a numeric field in place; rows without a numeric value are kept as-is
    ScalarTransform {
        /// Target field
        field: String,
        /// Operation
        op: ScalarOp,
        /// Right-hand operand
        factor: f64,
    },
    /// Replace the partition's rows with per-group aggregates
    Aggregate {
        /// Grouping fields
        group_by: Vec<String>,
        /// Output columns
        reducers: Vec<Reducer>,
    },
}

impl Modification {
    /// Reject malformed steps before any partition is read
    ///
    /// # Errors
    /// Returns `StoreError::InvalidInput` describing the first problem found
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            Self::Filter { predicate } => predicate.validate(),
            Self::ScalarTransform { field, op, factor } => {
                if field.is_empty() {
                    return Err(StoreError::invalid("scalar transform field must not be empty"));
                }
                if !factor.is_finite() {
                    return Err(StoreError::invalid("scalar transform factor must be finite"));
                }
                if *op == ScalarOp::Divide && *factor == 0.0 {
                    return Err(StoreError::invalid("division by zero in scalar transform"));
                }
                Ok(())
            }
            Self::Aggregate { group_by, reducers } => {
                if reducers.is_empty() {
                    return Err(StoreError::invalid("aggregate requires at least one reducer"));
                }
                if group_by.iter().any(String::is_empty) {
                    return Err(StoreError::invalid("group_by field must not be empty"));
                }
                reducers.iter().try_for_each(Reducer::validate)
            }
        }
    }

    fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        match self {
            Self::Filter { predicate } => records.into_iter().filter(|r| predicate.matches(r)).collect(),
            Self::ScalarTransform { field, op, factor } => records
                .into_iter()
                .map(|mut record| {
                    if let Some(next) = record.get(field).and_then(|v| op.apply(v, *factor)) {
                        record.set(field.clone(), next);
                    }
                    record
                })
                .collect(),
            Self::Aggregate { group_by, reducers } => {
                GroupedPartial::from_records(&records, group_by, reducers).finish(group_by, reducers)
            }
        }
    }
}

/// Validate every step of a pipeline
///
/// # Errors
/// Returns the first step's validation error
pub fn validate_pipeline(modifications: &[Modification]) -> StoreResult<()> {
    modifications.iter().try_for_each(Modification::validate)
}

/// Apply a validated pipeline to one partition's records
#[must_use]
pub fn apply_pipeline(modifications: &[Modification], records: &[Record]) -> Vec<Record> {
    modifications
        .iter()
        .fold(records.to_vec(), |rows, modification| modification.apply(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rows() -> Vec<Record> {
        vec![
            Record::new().with("category", "a").with("value", 10.0).with("quantity", 2_i64),
            Record::new().with("category", "b").with("value", 20.0).with("quantity", -1_i64),
            Record::new().with("category", "a").with("value", 30.0).with("quantity", 5_i64),
        ]
    }

    #[test]
    fn filter_drops_non_matching_rows() {
        let pipeline = [Modification::Filter {
            predicate: Predicate::compare("quantity", CmpOp::Gt, 0_i64),
        }];
        let out = apply_pipeline(&pipeline, &rows());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn missing_field_never_matches() {
        let p = Predicate::compare("absent", CmpOp::Ne, 1_i64);
        assert!(!p.matches(&rows()[0]));
        let negated = Predicate::Not {
            predicate: Box::new(p),
        };
        assert!(negated.matches(&rows()[0]));
    }

    #[test]
    fn scalar_transform_keeps_integers_integral() {
        let pipeline = [Modification::ScalarTransform {
            field: "quantity".into(),
            op: ScalarOp::Multiply,
            factor: 3.0,
        }];
        let out = apply_pipeline(&pipeline, &rows());
        assert_eq!(out[0].get("quantity"), Some(&FieldValue::Int(6)));
    }

    #[test]
    fn scalar_transform_fractional_factor_promotes_to_float() {
        let pipeline = [Modification::ScalarTransform {
            field: "quantity".into(),
            op: ScalarOp::Multiply,
            factor: 1.5,
        }];
        let out = apply_pipeline(&pipeline, &rows());
        assert_eq!(out[0].get("quantity"), Some(&FieldValue::Float(3.0)));
    }

    #[test]
    fn aggregate_groups_and_reduces() {
        let pipeline = [Modification::Aggregate {
            group_by: vec!["category".into()],
            reducers: vec![Reducer::count(), Reducer::new(ReduceOp::Sum, "value")],
        }];
        let out = apply_pipeline(&pipeline, &rows());
        assert_eq!(out.len(), 2);
        let a = &out[0];
        assert_eq!(a.get("category"), Some(&FieldValue::from("a")));
        assert_eq!(a.get("count"), Some(&FieldValue::Int(2)));
        assert_eq!(a.get("sum_value"), Some(&FieldValue::Float(40.0)));
    }

    #[test]
    fn validation_rejects_bad_steps() {
        let divide = Modification::ScalarTransform {
            field: "value".into(),
            op: ScalarOp::Divide,
            factor: 0.0,
        };
        assert!(divide.validate().is_err());

        let empty = Modification::Aggregate {
            group_by: vec![],
            reducers: vec![],
        };
        assert!(empty.validate().is_err());

        let fieldless = Modification::Aggregate {
            group_by: vec![],
            reducers: vec![Reducer {
                field: None,
                op: ReduceOp::Sum,
                alias: None,
            }],
        };
        assert!(fieldless.validate().is_err());
    }

    #[test]
    fn modification_json_shape() {
        let json = r#"{"kind":"filter","predicate":{"type":"compare","field":"quantity","op":"gt","value":0}}"#;
        let parsed: Modification = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            Modification::Filter {
                predicate: Predicate::compare("quantity", CmpOp::Gt, 0_i64)
            }
        );
    }

    proptest! {
        #[test]
        fn prop_merged_partials_equal_whole(values in proptest::collection::vec(0i64..50, 0..60), split in 0usize..60) {
            let records: Vec<Record> = values
                .iter()
                .map(|v| Record::new().with("k", v % 3).with("v", *v))
                .collect();
            let split = split.min(records.len());
            let group_by = vec!["k".to_string()];
            let reducers = vec![Reducer::count(), Reducer::new(ReduceOp::Sum, "v"), Reducer::new(ReduceOp::Max, "v")];

            let whole = GroupedPartial::from_records(&records, &group_by, &reducers);
            let mut left = GroupedPartial::from_records(&records[..split], &group_by, &reducers);
            left.merge(GroupedPartial::from_records(&records[split..], &group_by, &reducers));

            prop_assert_eq!(whole.finish(&group_by, &reducers), left.finish(&group_by, &reducers));
        }
    }
}
