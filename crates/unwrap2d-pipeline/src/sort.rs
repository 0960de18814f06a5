//! In-place quicksort of edges by ascending combined reliability.
//!
//! Pivot selection is median-of-three. When the three samples are equal
//! (common on plateaus of identical sentinel sums), the slice is scanned
//! for any key that differs from the first; the larger of the two becomes
//! the pivot. A slice with no differing key is already sorted.
//!
//! Partitioning puts keys strictly below the pivot on the left and the
//! rest on the right. The pivot is always strictly greater than some key
//! in the slice, so both sides are non-empty and every step makes
//! progress. Recursion goes into the smaller side only, bounding stack
//! depth by `log2(len)`.
//!
//! Equal keys end up in unspecified relative order.

use crate::edge::Edge;

/// Sort `edges` ascending by [`Edge::combined_reliability`].
pub fn sort_edges(edges: &mut [Edge]) {
    quicksort(edges);
}

fn quicksort(mut edges: &mut [Edge]) {
    while edges.len() > 1 {
        let Some(pivot) = find_pivot(edges) else {
            return;
        };
        let split = partition(edges, pivot);
        let (left, right) = std::mem::take(&mut edges).split_at_mut(split);
        if left.len() < right.len() {
            quicksort(left);
            edges = right;
        } else {
            quicksort(right);
            edges = left;
        }
    }
}

fn key(edges: &[Edge], index: usize) -> f64 {
    edges[index].combined_reliability
}

/// Order the first, middle and last keys, then pick a pivot value that
/// is strictly greater than at least one key in the slice.
#[allow(clippy::float_cmp)]
fn find_pivot(edges: &mut [Edge]) -> Option<f64> {
    let last = edges.len() - 1;
    let mid = last / 2;
    if key(edges, mid) < key(edges, 0) {
        edges.swap(mid, 0);
    }
    if key(edges, last) < key(edges, mid) {
        edges.swap(last, mid);
        if key(edges, mid) < key(edges, 0) {
            edges.swap(mid, 0);
        }
    }

    let (low, median, high) = (key(edges, 0), key(edges, mid), key(edges, last));
    if low < median {
        return Some(median);
    }
    if median < high {
        return Some(high);
    }

    let first = key(edges, 0);
    edges
        .iter()
        .map(|e| e.combined_reliability)
        .find(|&k| k != first)
        .map(|k| k.max(first))
}

/// Move keys `< pivot` to the front; returns the count moved.
fn partition(edges: &mut [Edge], pivot: f64) -> usize {
    let mut left = 0;
    let mut right = edges.len();
    loop {
        while left < right && key(edges, left) < pivot {
            left += 1;
        }
        while left < right && key(edges, right - 1) >= pivot {
            right -= 1;
        }
        if left >= right {
            debug_assert!(left > 0 && left < edges.len(), "degenerate partition");
            return left;
        }
        edges.swap(left, right - 1);
        left += 1;
        right -= 1;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn edges(keys: &[f64]) -> Vec<Edge> {
        keys.iter()
            .enumerate()
            .map(|(i, &k)| Edge {
                a: i,
                b: i + 1,
                combined_reliability: k,
                required_jump: 0,
            })
            .collect()
    }

    fn assert_sorted(edges: &[Edge]) {
        for pair in edges.windows(2) {
            assert!(
                pair[0].combined_reliability <= pair[1].combined_reliability,
                "{} > {}",
                pair[0].combined_reliability,
                pair[1].combined_reliability
            );
        }
    }

    fn sorted_keys(edges: &[Edge]) -> Vec<u64> {
        let mut keys: Vec<u64> = edges.iter().map(|e| e.combined_reliability.to_bits()).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn empty_and_single() {
        let mut none = edges(&[]);
        sort_edges(&mut none);
        let mut one = edges(&[4.0]);
        sort_edges(&mut one);
        assert!((one[0].combined_reliability - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn small_arrays() {
        for keys in [
            vec![2.0, 1.0],
            vec![1.0, 2.0],
            vec![3.0, 1.0, 2.0],
            vec![1.0, 1.0, 0.0],
            vec![0.0, 1.0, 1.0],
            vec![5.0, 4.0, 3.0, 2.0, 1.0],
        ] {
            let mut e = edges(&keys);
            sort_edges(&mut e);
            assert_sorted(&e);
        }
    }

    #[test]
    fn random_keys_sort_and_keep_elements() {
        let mut rng = StdRng::seed_from_u64(7);
        for len in [10, 100, 1000, 5000] {
            let keys: Vec<f64> = (0..len).map(|_| rng.random_range(0.0..100.0)).collect();
            let mut e = edges(&keys);
            let before = sorted_keys(&e);
            sort_edges(&mut e);
            assert_sorted(&e);
            assert_eq!(sorted_keys(&e), before);
        }
    }

    #[test]
    fn large_plateau_with_outliers() {
        let mut keys = vec![2.0e7; 20_000];
        keys[137] = 1.0;
        keys[19_000] = 3.0e7;
        let mut e = edges(&keys);
        sort_edges(&mut e);
        assert_sorted(&e);
        assert!((e[0].combined_reliability - 1.0).abs() < f64::EPSILON);
        assert!((e[e.len() - 1].combined_reliability - 3.0e7).abs() < f64::EPSILON);
    }

    #[test]
    fn all_equal_keys() {
        let mut e = edges(&vec![0.5; 10_000]);
        sort_edges(&mut e);
        assert_sorted(&e);
    }

    #[test]
    fn few_distinct_values() {
        let mut rng = StdRng::seed_from_u64(11);
        let keys: Vec<f64> = (0..10_000).map(|_| f64::from(rng.random_range(0..3_u8))).collect();
        let mut e = edges(&keys);
        sort_edges(&mut e);
        assert_sorted(&e);
    }

    #[test]
    fn already_sorted_and_reversed() {
        let ascending: Vec<f64> = (0..4096).map(f64::from).collect();
        let mut e = edges(&ascending);
        sort_edges(&mut e);
        assert_sorted(&e);

        let descending: Vec<f64> = ascending.iter().rev().copied().collect();
        let mut e = edges(&descending);
        sort_edges(&mut e);
        assert_sorted(&e);
    }
}
