use num::Integer;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};

/// Upper bound on the number of synchronized steps `sequence_array` will take before giving up.
/// Every seed below 10^10 settles in well under a thousand fused steps.
pub const DEFAULT_MAX_STEPS: usize = 10_000;

/// A single unfused Collatz step: n/2 for even n, 3n+1 for odd n.
pub fn step(n: u64) -> Result<u64> {
    if n.is_even() {
        return Ok(n / 2);
    }
    n.checked_mul(3)
        .and_then(|t| t.checked_add(1))
        .ok_or(Error::Overflow { value: n })
}

/// The step the batch engine takes. Odd values go straight to (3n+1)/2, skipping the even value
/// in between, and 1 is a fixed point.
pub fn fused_step(n: u64) -> Result<u64> {
    if n == 1 {
        return Ok(1);
    }
    if n.is_even() {
        return Ok(n / 2);
    }
    let tripled = step(n)?;
    debug_assert!(tripled.is_even(), "3n+1 must be even for odd n = {}", n);
    Ok(tripled / 2)
}

/// The full Collatz sequence starting at `n`, ending with a single 1.
pub fn sequence(n: u64) -> Result<Vec<u64>> {
    if n == 0 {
        return Err(Error::InvalidStart(n));
    }
    let mut seq = vec![n];
    let mut cur = n;
    while cur != 1 {
        cur = step(cur)?;
        seq.push(cur);
    }
    Ok(seq)
}

/// One row per synchronized step, one column per seed. Row 0 holds the seeds 1..=width and every
/// column holds 1 from the step it first reaches 1 onward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMatrix {
    width: usize,
    height: usize,
    data: Vec<u64>,
}

impl BatchMatrix {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row(&self, i: usize) -> &[u64] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    /// Column `j` top to bottom, padding included.
    pub fn column(&self, j: usize) -> Vec<u64> {
        (0..self.height)
            .map(|i| self.data[i * self.width + j])
            .collect()
    }

    /// The largest value column `j` ever holds.
    pub fn peak(&self, j: usize) -> u64 {
        (0..self.height)
            .map(|i| self.data[i * self.width + j])
            .max()
            .unwrap_or(1)
    }

    /// Trims every column, in column order.
    pub fn trimmed_columns(&self) -> Result<Vec<TrimmedColumn>> {
        (0..self.width)
            .into_par_iter()
            .map(|j| trim(&self.column(j)))
            .collect()
    }
}

/// Computes the trajectories of 1..=n side by side. Each step advances every column that has not
/// yet reached 1 with `fused_step` and appends the new state as a row; stepping stops once every
/// column is 1.
pub fn sequence_array(n: usize, max_steps: usize) -> Result<BatchMatrix> {
    if n == 0 {
        return Err(Error::InvalidBatchSize);
    }
    let mut current: Vec<u64> = (1..=n as u64).collect();
    let mut data = current.clone();
    let mut unfinished = current.iter().filter(|&&v| v != 1).count();
    let mut steps = 0;

    while unfinished > 0 {
        if steps == max_steps {
            return Err(Error::IterationLimit {
                limit: max_steps,
                unfinished,
            });
        }
        unfinished = current
            .par_iter_mut()
            .map(|v| -> Result<usize> {
                *v = fused_step(*v)?;
                Ok((*v != 1) as usize)
            })
            .try_reduce(|| 0, |a, b| Ok(a + b))?;
        data.extend_from_slice(&current);
        steps += 1;
    }
    debug!(width = n, height = steps + 1, "batch settled");

    Ok(BatchMatrix {
        width: n,
        height: steps + 1,
        data,
    })
}

/// A trajectory running from 1 up to its seed, with the padding gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimmedColumn(Vec<u64>);

impl TrimmedColumn {
    pub fn values(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value the trajectory started from.
    pub fn seed(&self) -> u64 {
        self.0.last().cloned().unwrap_or(1)
    }

    pub fn peak(&self) -> u64 {
        self.0.iter().cloned().max().unwrap_or(1)
    }
}

/// Cuts `column` just after its first 1 and reverses it, so the result starts at 1 and ends at the
/// seed. A column that already starts at 1 and never comes back to it is returned as is.
pub fn trim(column: &[u64]) -> Result<TrimmedColumn> {
    if column.first() == Some(&1) && !column[1..].contains(&1) {
        return Ok(TrimmedColumn(column.to_vec()));
    }
    let index = column
        .iter()
        .position(|&v| v == 1)
        .ok_or(Error::MissingTerminal { len: column.len() })?;
    Ok(TrimmedColumn(column[..=index].iter().rev().cloned().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Collapses every odd step of an unfused sequence into (3n+1)/2.
    fn fuse(seq: &[u64]) -> Vec<u64> {
        let mut out = vec![];
        let mut i = 0;
        while i < seq.len() {
            out.push(seq[i]);
            i += if seq[i] != 1 && seq[i].is_odd() { 2 } else { 1 };
        }
        out
    }

    #[test]
    fn scalar_six() {
        assert_eq!(sequence(6).unwrap(), vec![6, 3, 10, 5, 16, 8, 4, 2, 1]);
        assert_eq!(sequence(1).unwrap(), vec![1]);
    }

    #[test]
    fn scalar_rejects_zero() {
        match sequence(0) {
            Err(Error::InvalidStart(0)) => (),
            other => panic!("expected InvalidStart, got {:?}", other),
        }
    }

    #[test]
    fn scalar_obeys_rule() {
        for n in 1..500 {
            let seq = sequence(n).unwrap();
            assert_eq!(seq[0], n);
            assert_eq!(seq.iter().filter(|&&v| v == 1).count(), 1);
            assert_eq!(*seq.last().unwrap(), 1);
            for pair in seq.windows(2) {
                let expected = if pair[0] % 2 == 0 {
                    pair[0] / 2
                } else {
                    3 * pair[0] + 1
                };
                assert_eq!(pair[1], expected);
            }
        }
    }

    #[test]
    fn overflow_is_reported() {
        match sequence(u64::MAX) {
            Err(Error::Overflow { value }) => assert_eq!(value, u64::MAX),
            other => panic!("expected Overflow, got {:?}", other),
        }
        assert!(fused_step(u64::MAX / 3).is_err());
    }

    #[test]
    fn fused_step_is_exact_past_f64_mantissa() {
        // 2^53 + 1 is the first integer an f64 cannot hold.
        let n: u64 = 9_007_199_254_740_993;
        assert_ne!(n as f64 as u64, n);
        assert_eq!(fused_step(n).unwrap(), 13_510_798_882_111_490);
        assert_eq!(fused_step(n + 1).unwrap(), 4_503_599_627_370_497);
    }

    #[test]
    fn fused_step_holds_one() {
        assert_eq!(fused_step(1).unwrap(), 1);
        assert_eq!(fused_step(2).unwrap(), 1);
        assert_eq!(fused_step(3).unwrap(), 5);
    }

    #[test]
    fn batch_of_one() {
        let batch = sequence_array(1, DEFAULT_MAX_STEPS).unwrap();
        assert_eq!(batch.width(), 1);
        assert_eq!(batch.height(), 1);
        assert_eq!(batch.row(0), &[1]);
        assert_eq!(trim(&batch.column(0)).unwrap().values(), &[1]);
    }

    #[test]
    fn batch_of_six() {
        let batch = sequence_array(6, DEFAULT_MAX_STEPS).unwrap();
        assert_eq!(batch.width(), 6);
        assert_eq!(batch.height(), 7);
        assert_eq!(batch.row(0), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(batch.row(1), &[1, 1, 5, 2, 8, 3]);
        assert_eq!(batch.column(5), vec![6, 3, 5, 8, 4, 2, 1]);
        assert_eq!(batch.column(1), vec![2, 1, 1, 1, 1, 1, 1]);
        assert_eq!(batch.peak(2), 8);
        assert_eq!(batch.row(6), &[1; 6]);
    }

    #[test]
    fn batch_columns_are_fused_scalar_sequences() {
        let batch = sequence_array(300, DEFAULT_MAX_STEPS).unwrap();
        for j in 0..batch.width() {
            let seed = j as u64 + 1;
            let col = batch.column(j);
            let fused = fuse(&sequence(seed).unwrap());
            assert_eq!(col[0], seed);
            assert_eq!(*col.last().unwrap(), 1);
            assert_eq!(&col[..fused.len()], &fused[..], "seed {}", seed);
            assert!(col[fused.len()..].iter().all(|&v| v == 1));
        }
    }

    #[test]
    fn batch_rejects_zero_width() {
        match sequence_array(0, DEFAULT_MAX_STEPS) {
            Err(Error::InvalidBatchSize) => (),
            other => panic!("expected InvalidBatchSize, got {:?}", other),
        }
    }

    #[test]
    fn batch_reports_iteration_limit() {
        // 27 needs 70 fused steps.
        match sequence_array(27, 10) {
            Err(Error::IterationLimit { limit, unfinished }) => {
                assert_eq!(limit, 10);
                assert!(unfinished > 0);
            }
            other => panic!("expected IterationLimit, got {:?}", other),
        }
    }

    #[test]
    fn trim_cuts_and_reverses() {
        let trimmed = trim(&[6, 3, 5, 8, 4, 2, 1, 1, 1]).unwrap();
        assert_eq!(trimmed.values(), &[1, 2, 4, 8, 5, 3, 6]);
        assert_eq!(trimmed.seed(), 6);
        assert_eq!(trimmed.peak(), 8);
        assert_eq!(trim(&[1, 1, 1]).unwrap().values(), &[1]);
    }

    #[test]
    fn trim_is_idempotent() {
        let batch = sequence_array(100, DEFAULT_MAX_STEPS).unwrap();
        for trimmed in batch.trimmed_columns().unwrap() {
            assert_eq!(trim(trimmed.values()).unwrap(), trimmed);
        }
    }

    #[test]
    fn trim_without_terminal_fails() {
        match trim(&[6, 3, 5]) {
            Err(Error::MissingTerminal { len }) => assert_eq!(len, 3),
            other => panic!("expected MissingTerminal, got {:?}", other),
        }
        assert!(trim(&[]).is_err());
    }
}
