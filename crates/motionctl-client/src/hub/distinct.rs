//! Consecutive-duplicate detection for parameter snapshots.

use motionctl_core::ParameterSet;

use super::HubError;

/// Whether `next` carries the same values as `previous`.
///
/// Values are compared position by position on their int, uint, float and
/// string fields; names are not compared. Floats must match exactly. Two
/// snapshots that cannot be compared element-wise (either empty, or of
/// different lengths) are an error rather than equal or different.
pub fn same_values(previous: &ParameterSet, next: &ParameterSet) -> Result<bool, HubError> {
    let (a, b) = (&previous.values, &next.values);
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return Err(HubError::MalformedComparison {
            previous: a.len(),
            next: b.len(),
        });
    }
    #[allow(clippy::float_cmp)]
    let same = a.iter().zip(b).all(|(x, y)| {
        x.int_value == y.int_value
            && x.uint_value == y.uint_value
            && x.float_value == y.float_value
            && x.string_value == y.string_value
    });
    Ok(same)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use motionctl_core::ParameterValue;

    fn set(values: Vec<ParameterValue>) -> ParameterSet {
        ParameterSet::new(values)
    }

    #[test]
    fn identical_values_are_same() {
        let a = set(vec![
            ParameterValue::float("speed", 1.5),
            ParameterValue::string("mode", "jog"),
        ]);
        assert!(same_values(&a, &a.clone()).unwrap());
    }

    #[test]
    fn each_field_participates() {
        let base = ParameterValue {
            name: "p".into(),
            int_value: -1,
            uint_value: 2,
            float_value: 3.0,
            string_value: "s".into(),
        };
        let variants = [
            ParameterValue {
                int_value: -2,
                ..base.clone()
            },
            ParameterValue {
                uint_value: 3,
                ..base.clone()
            },
            ParameterValue {
                float_value: 3.5,
                ..base.clone()
            },
            ParameterValue {
                string_value: "t".into(),
                ..base.clone()
            },
        ];
        for changed in variants {
            assert!(!same_values(&set(vec![base.clone()]), &set(vec![changed])).unwrap());
        }
    }

    #[test]
    fn names_are_ignored() {
        let a = set(vec![ParameterValue::int("a", 1)]);
        let b = set(vec![ParameterValue::int("b", 1)]);
        assert!(same_values(&a, &b).unwrap());
    }

    #[test]
    fn empty_arrays_are_an_error() {
        let empty = ParameterSet::default();
        let one = set(vec![ParameterValue::int("a", 1)]);
        assert_matches!(
            same_values(&empty, &empty),
            Err(HubError::MalformedComparison { previous: 0, next: 0 })
        );
        assert!(same_values(&one, &empty).is_err());
        assert!(same_values(&empty, &one).is_err());
    }

    #[test]
    fn mismatched_lengths_are_an_error() {
        let one = set(vec![ParameterValue::int("a", 1)]);
        let two = set(vec![ParameterValue::int("a", 1), ParameterValue::int("b", 2)]);
        assert_matches!(
            same_values(&one, &two),
            Err(HubError::MalformedComparison { previous: 1, next: 2 })
        );
    }
}
