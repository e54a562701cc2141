//! Seeded train/test splits over tabular records.
//!
//! Both helpers group records by the value of one column and sample test rows
//! per group. Outputs keep the input order, are disjoint and together contain
//! every input record.

use crate::record::{Record, group_label};
use crate::utils::SplitMix64;
use std::collections::{BTreeMap, BTreeSet};

fn groups(records: &[Record], column: &str) -> BTreeMap<String, Vec<usize>> {
    let mut out: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        out.entry(group_label(r, column)).or_default().push(i);
    }
    out
}

fn partition(records: Vec<Record>, test: &BTreeSet<usize>) -> (Vec<Record>, Vec<Record>) {
    let (test_rows, train_rows): (Vec<_>, Vec<_>) = records
        .into_iter()
        .enumerate()
        .partition(|(i, _)| test.contains(i));
    (
        train_rows.into_iter().map(|(_, r)| r).collect(),
        test_rows.into_iter().map(|(_, r)| r).collect(),
    )
}

fn sample_groups<F>(records: &[Record], column: &str, seed: u64, per_group: F) -> BTreeSet<usize>
where
    F: Fn(usize) -> usize,
{
    let mut rng = SplitMix64::new(seed);
    let mut test = BTreeSet::new();
    for (_, mut idx) in groups(records, column) {
        let n = per_group(idx.len()).min(idx.len());
        rng.shuffle(&mut idx);
        test.extend(idx.into_iter().take(n));
    }
    test
}

/// Put `fraction` of every class of `column` (rounded) into the test split.
///
/// Returns `(train, test)`.
#[must_use]
pub fn proportionate_split(
    records: Vec<Record>,
    column: &str,
    fraction: f64,
    seed: u64,
) -> (Vec<Record>, Vec<Record>) {
    let fraction = fraction.clamp(0.0, 1.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let test = sample_groups(&records, column, seed, |n| (n as f64 * fraction).round() as usize);
    partition(records, &test)
}

/// Put the same number of records of every class into the test split:
/// `n_per_class`, capped by the size of the smallest class.
///
/// Returns `(train, test)`.
#[must_use]
pub fn stratified_split(
    records: Vec<Record>,
    column: &str,
    n_per_class: usize,
    seed: u64,
) -> (Vec<Record>, Vec<Record>) {
    let smallest = groups(&records, column).values().map(Vec::len).min().unwrap_or(0);
    let n = n_per_class.min(smallest);
    let test = sample_groups(&records, column, seed, |_| n);
    partition(records, &test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::record_from;

    fn labelled(counts: &[(&str, usize)]) -> Vec<Record> {
        let mut id = 0;
        let mut out = Vec::new();
        for (label, n) in counts {
            for _ in 0..*n {
                out.push(record_from([("id", id.into()), ("class", (*label).into())]));
                id += 1;
            }
        }
        out
    }

    fn ids(rows: &[Record]) -> Vec<i64> {
        rows.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    #[test]
    fn proportionate_split_samples_each_class() {
        let rows = labelled(&[("<=50K", 50), (">50K", 10)]);
        let (train, test) = proportionate_split(rows, "class", 0.2, 42);
        assert_eq!(test.len(), 12);
        assert_eq!(train.len(), 48);
        let rich = test.iter().filter(|r| r["class"] == ">50K").count();
        assert_eq!(rich, 2);
        let mut all: Vec<_> = ids(&train).into_iter().chain(ids(&test)).collect();
        all.sort_unstable();
        assert_eq!(all, (0..60).collect::<Vec<_>>());
    }

    #[test]
    fn proportionate_split_is_seeded() {
        let a = proportionate_split(labelled(&[("a", 30), ("b", 30)]), "class", 0.3, 7);
        let b = proportionate_split(labelled(&[("a", 30), ("b", 30)]), "class", 0.3, 7);
        assert_eq!(ids(&a.1), ids(&b.1));
    }

    #[test]
    fn stratified_split_caps_at_smallest_class() {
        let (train, test) = stratified_split(labelled(&[("a", 8), ("b", 3)]), "class", 5, 1);
        assert_eq!(test.len(), 6);
        assert_eq!(train.len(), 5);
        assert_eq!(test.iter().filter(|r| r["class"] == "a").count(), 3);
    }
}
