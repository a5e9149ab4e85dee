//! Splitting labelled vector results across several display columns.

use super::column::ColumnSpecification;
use super::lookup::TargetLookup;
use crate::services::ResultsCache;
use crate::types::{MissingValue, Value, ValueType};
use std::collections::BTreeMap;

/// Labels found for each inlinable column, in first-seen order.
pub type InlineMeta = BTreeMap<ColumnSpecification, Vec<String>>;

pub fn is_inlinable(value_type: ValueType) -> bool {
    value_type == ValueType::LabelledVector
}

/// Union of the labels of every cached value in each inlinable column.
/// Columns with no labelled values yet are left out.
pub fn inline_meta<'a>(
    specs: impl IntoIterator<Item = (&'a ColumnSpecification, ValueType)>,
    lookup: &TargetLookup,
    cache: &ResultsCache,
) -> InlineMeta {
    let mut meta = InlineMeta::new();
    for (spec, value_type) in specs {
        if !is_inlinable(value_type) {
            continue;
        }
        let mut labels: Vec<String> = Vec::new();
        for (calc_config, value_spec) in lookup.targets_for_column(spec) {
            if let Value::Labelled(vector) = cache.result(&calc_config, &value_spec, value_type).value {
                for label in vector.labels {
                    if !labels.contains(&label) {
                        labels.push(label);
                    }
                }
            }
        }
        if !labels.is_empty() {
            meta.insert(spec.clone(), labels);
        }
    }
    meta
}

/// Element of a vector value for one inlined column.
pub fn inline_value(value: &Value, label: &str) -> Value {
    match value {
        Value::Labelled(vector) => vector
            .get(label)
            .map(Value::Double)
            .unwrap_or(Value::Missing(MissingValue::NotAvailable)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LabelledVector;

    #[test]
    fn test_inline_value_picks_label() {
        let value = Value::Labelled(LabelledVector::new(
            vec!["1Y".into(), "2Y".into()],
            vec![1.0, 2.0],
        ));
        assert_eq!(inline_value(&value, "2Y"), Value::Double(2.0));
        assert_eq!(inline_value(&value, "5Y"), Value::not_available());
        assert_eq!(inline_value(&Value::pending(), "1Y"), Value::pending());
    }
}
