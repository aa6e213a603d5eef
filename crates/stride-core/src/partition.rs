//! Contiguous block partitioning of matrix rows across workers.
//!
//! With `R` rows and `P` workers every rank receives `R / P` rows and the
//! first `R mod P` ranks receive one more. Offsets are the prefix sum of the
//! counts in rank order, so the blocks tile `0..R` without gaps or overlap.
//! When `R < P` the trailing ranks own zero rows.

use std::ops::Range;

use serde::Serialize;

use crate::error::CoreError;

/// One rank's share of the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub rank: usize,
    /// Number of rows owned by this rank.
    pub count: usize,
    /// Index of the first owned row.
    pub offset: usize,
}

impl Assignment {
    pub fn rows(&self) -> Range<usize> {
        self.offset..self.offset + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Per-rank row counts and offsets for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    rows: usize,
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl PartitionPlan {
    pub fn new(rows: usize, workers: usize) -> Result<Self, CoreError> {
        if workers == 0 {
            return Err(CoreError::InvalidWorkerCount(workers));
        }
        if rows == 0 {
            return Err(CoreError::InvalidDimensions { rows, cols: 0 });
        }

        let base = rows / workers;
        let remainder = rows % workers;

        let counts: Vec<usize> = (0..workers)
            .map(|rank| if rank < remainder { base + 1 } else { base })
            .collect();

        let mut offsets = Vec::with_capacity(workers);
        let mut next = 0;
        for &count in &counts {
            offsets.push(next);
            next += count;
        }

        if rows < workers {
            log::warn!(
                "{} of {} workers receive no rows ({} rows)",
                workers - rows,
                workers,
                rows
            );
        }
        log::debug!("partition plan: rows={rows} workers={workers} counts={counts:?}");

        Ok(Self {
            rows,
            counts,
            offsets,
        })
    }

    /// Total number of rows covered.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn workers(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    pub fn offset(&self, rank: usize) -> usize {
        self.offsets[rank]
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn assignment(&self, rank: usize) -> Assignment {
        Assignment {
            rank,
            count: self.counts[rank],
            offset: self.offsets[rank],
        }
    }

    /// Row range owned by `rank`.
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.assignment(rank).rows()
    }

    /// Assignments in rank order.
    pub fn iter(&self) -> impl Iterator<Item = Assignment> + '_ {
        (0..self.workers()).map(move |rank| self.assignment(rank))
    }

    /// Scatter send counts in elements (`count * cols`).
    pub fn element_counts(&self, cols: usize) -> Vec<usize> {
        self.counts.iter().map(|&c| c * cols).collect()
    }

    /// Scatter displacements in elements (`offset * cols`).
    pub fn element_offsets(&self, cols: usize) -> Vec<usize> {
        self.offsets.iter().map(|&o| o * cols).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let plan = PartitionPlan::new(8, 4).unwrap();
        assert_eq!(plan.counts(), &[2, 2, 2, 2]);
        assert_eq!(plan.offsets(), &[0, 2, 4, 6]);
    }

    #[test]
    fn test_remainder_goes_to_lowest_ranks() {
        let plan = PartitionPlan::new(10, 4).unwrap();
        assert_eq!(plan.counts(), &[3, 3, 2, 2]);
        assert_eq!(plan.offsets(), &[0, 3, 6, 8]);
        assert_eq!(plan.range(2), 6..8);
    }

    #[test]
    fn test_more_workers_than_rows() {
        let plan = PartitionPlan::new(2, 5).unwrap();
        assert_eq!(plan.counts(), &[1, 1, 0, 0, 0]);
        assert_eq!(plan.offsets(), &[0, 1, 2, 2, 2]);
        assert!(plan.assignment(4).is_empty());
        assert_eq!(plan.range(4), 2..2);
    }

    #[test]
    fn test_element_counts() {
        let plan = PartitionPlan::new(3, 2).unwrap();
        assert_eq!(plan.element_counts(4), vec![8, 4]);
        assert_eq!(plan.element_offsets(4), vec![0, 8]);
    }

    #[test]
    fn test_rejects_bad_config() {
        assert_eq!(
            PartitionPlan::new(4, 0),
            Err(CoreError::InvalidWorkerCount(0))
        );
        assert!(matches!(
            PartitionPlan::new(0, 3),
            Err(CoreError::InvalidDimensions { .. })
        ));
    }
}
