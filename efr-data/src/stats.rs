//! Missing-aware aggregates.
//!
//! Every aggregate skips `None` and NaN samples and returns `None` when
//! nothing is left, so "no data" never turns into a zero.

fn present(values: &[Option<f64>]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| v.filter(|x| !x.is_nan()))
        .collect()
}

/// Arithmetic mean of the present samples.
pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let present = present(values);
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

/// Median of the present samples; the two middle values are averaged for
/// even counts.
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present = present(values);
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

/// Largest present sample.
pub fn max(values: &[Option<f64>]) -> Option<f64> {
    present(values).into_iter().max_by(f64::total_cmp)
}

/// Most frequent value; ties go to the value seen first.
pub fn mode<'a, T: PartialEq + 'a>(values: impl IntoIterator<Item = &'a T>) -> Option<&'a T> {
    let mut counts: Vec<(&T, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    let best = counts.iter().map(|(_, n)| *n).max()?;
    counts
        .into_iter()
        .find(|(_, n)| *n == best)
        .map(|(value, _)| value)
}
