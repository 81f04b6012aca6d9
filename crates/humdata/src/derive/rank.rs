//! Ranking and ordinal labels.

use std::cmp::Ordering;

use super::metric::{RankMethod, RankOrder};

/// Rank `values`, leaving nulls unranked.
///
/// Null entries get `None` and do not consume rank numbers. Ties are numbered
/// by `method`.
pub fn rank_values(values: &[Option<f64>], order: RankOrder, method: RankMethod) -> Vec<Option<i64>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(index, value)| value.map(|v| (index, v)))
        .collect();

    present.sort_by(|a, b| {
        let ordering = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        match order {
            RankOrder::Descending => ordering.reverse(),
            RankOrder::Ascending => ordering,
        }
    });

    let mut ranks = vec![None; values.len()];
    let mut previous: Option<f64> = None;
    let mut current = 0i64;
    let mut dense = 0i64;
    for (position, (index, value)) in present.into_iter().enumerate() {
        if previous != Some(value) {
            current = position as i64 + 1;
            dense += 1;
            previous = Some(value);
        }
        ranks[index] = Some(match method {
            RankMethod::Min => current,
            RankMethod::Dense => dense,
        });
    }
    ranks
}

/// English ordinal label: 1st, 2nd, 3rd, 4th, 11th, 12th, 13th, 21st.
pub fn ordinal(n: i64) -> String {
    let last_two = (n % 100).abs();
    let suffix = if (11..=13).contains(&last_two) {
        "th"
    } else {
        match last_two % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{}{}", n, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_min_ranking_descending() {
        let ranks = rank_values(&some(&[30.0, 20.0, 20.0, 10.0]), RankOrder::Descending, RankMethod::Min);
        assert_eq!(ranks, vec![Some(1), Some(2), Some(2), Some(4)]);
    }

    #[test]
    fn test_dense_ranking() {
        let ranks = rank_values(&some(&[30.0, 20.0, 20.0, 10.0]), RankOrder::Descending, RankMethod::Dense);
        assert_eq!(ranks, vec![Some(1), Some(2), Some(2), Some(3)]);
    }

    #[test]
    fn test_unsorted_and_tied_inputs() {
        let ranks = rank_values(&some(&[10.0, 30.0, 20.0]), RankOrder::Descending, RankMethod::Min);
        assert_eq!(ranks, vec![Some(3), Some(1), Some(2)]);

        let ranks = rank_values(&some(&[10.0, 10.0, 20.0]), RankOrder::Descending, RankMethod::Min);
        assert_eq!(ranks, vec![Some(2), Some(2), Some(1)]);
    }

    #[test]
    fn test_ascending_with_nulls() {
        let values = vec![Some(5.0), None, Some(1.0), Some(5.0)];
        let ranks = rank_values(&values, RankOrder::Ascending, RankMethod::Min);
        assert_eq!(ranks, vec![Some(2), None, Some(1), Some(2)]);
    }

    #[test]
    fn test_ordinal_table() {
        let cases = [
            (1, "1st"),
            (2, "2nd"),
            (3, "3rd"),
            (4, "4th"),
            (11, "11th"),
            (12, "12th"),
            (13, "13th"),
            (21, "21st"),
            (22, "22nd"),
            (23, "23rd"),
            (111, "111th"),
            (112, "112th"),
            (101, "101st"),
        ];
        for (n, expected) in cases {
            assert_eq!(ordinal(n), expected, "ordinal({})", n);
        }
    }
}
