// Index Allocator
//
// Finds the lowest free number in a set of already assigned indices. Used for
// global module identity and for per-category slots; the callers decide which
// generations contribute to the assigned set.

use std::collections::HashSet;

/// Result of scanning an assigned set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexScan {
    /// Smallest value `>= floor` that is not assigned
    pub lowest_unused: usize,
    /// Largest assigned value seen, regardless of `floor`
    pub max_assigned: Option<usize>,
}

/// Scan `assigned` once, reporting the lowest free value from `floor` upward
/// and the largest assigned value
pub fn scan<I>(assigned: I, floor: usize) -> IndexScan
where
    I: IntoIterator<Item = usize>,
{
    let mut max_assigned = None;
    let taken: HashSet<usize> = assigned
        .into_iter()
        .inspect(|&index| max_assigned = max_assigned.max(Some(index)))
        .collect();

    let mut lowest_unused = floor;
    while taken.contains(&lowest_unused) {
        lowest_unused += 1;
    }

    IndexScan {
        lowest_unused,
        max_assigned,
    }
}

/// Smallest value `>= floor` not present in `assigned`
pub fn lowest_unused<I>(assigned: I, floor: usize) -> usize
where
    I: IntoIterator<Item = usize>,
{
    scan(assigned, floor).lowest_unused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set() {
        assert_eq!(lowest_unused(std::iter::empty(), 0), 0);
        assert_eq!(lowest_unused(std::iter::empty(), 7), 7);
    }

    #[test]
    fn test_fills_gaps() {
        assert_eq!(lowest_unused([0, 1, 3, 4], 0), 2);
        assert_eq!(lowest_unused([4, 3, 1, 0], 0), 2);
    }

    #[test]
    fn test_floor_skips_lower_gaps() {
        assert_eq!(lowest_unused([0, 2, 3], 2), 4);
        assert_eq!(lowest_unused([0, 2, 3], 1), 1);
    }

    #[test]
    fn test_duplicates_are_harmless() {
        assert_eq!(lowest_unused([0, 0, 1, 1], 0), 2);
    }

    #[test]
    fn test_scan_reports_max_independently() {
        let result = scan([0, 1, 9], 0);
        assert_eq!(
            result,
            IndexScan {
                lowest_unused: 2,
                max_assigned: Some(9),
            }
        );

        let result = scan(std::iter::empty(), 3);
        assert_eq!(result.max_assigned, None);
        assert_eq!(result.lowest_unused, 3);
    }

    #[test]
    fn test_result_never_collides() {
        let assigned: Vec<usize> = (0..50).filter(|i| i % 3 != 2).collect();
        for floor in 0..60 {
            let index = lowest_unused(assigned.iter().copied(), floor);
            assert!(index >= floor);
            assert!(!assigned.contains(&index));
            assert!((floor..index).all(|i| assigned.contains(&i)));
        }
    }
}
