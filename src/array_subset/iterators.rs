//! Array subset iterators.
//!
//! The iterators are:
//!  - [`IndicesIterator`]: iterate over the multidimensional indices of the elements in the subset.
//!  - [`ChunksIterator`]: iterate over regular sized chunks overlapping the array subset.
//!
//! These can be created with the appropriate [`ArraySubset`](super::ArraySubset) methods including
//! [`iter_indices`](super::ArraySubset::iter_indices) and
//! [`iter_chunks`](super::ArraySubset::iter_chunks).

mod chunks_iterator;
mod indices_iterator;

pub use chunks_iterator::ChunksIterator;
pub use indices_iterator::IndicesIterator;

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use crate::array_subset::ArraySubset;

    #[test]
    fn array_subset_iter_indices() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..3]);
        let mut iter = subset.iter_indices();
        assert_eq!(iter.size_hint(), (4, Some(4)));
        assert_eq!(iter.next(), Some(vec![1, 1]));
        assert_eq!(iter.next(), Some(vec![1, 2]));
        assert_eq!(iter.next(), Some(vec![2, 1]));
        assert_eq!(iter.next(), Some(vec![2, 2]));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn array_subset_iter_indices_empty() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..1]);
        let mut iter = subset.iter_indices();
        assert_eq!(iter.size_hint(), (0, Some(0)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    #[rustfmt::skip]
    fn array_subset_iter_chunks1() {
        let subset = ArraySubset::new_with_ranges(&[1..5, 1..5]);
        let chunk_shape_invalid = [NonZeroU64::new(2).unwrap()];
        assert!(subset.iter_chunks(&chunk_shape_invalid).is_err());
        let chunk_shape = [NonZeroU64::new(2).unwrap(), NonZeroU64::new(2).unwrap()];
        let mut iter = subset.iter_chunks(&chunk_shape).unwrap();
        assert_eq!(iter.size_hint(), (9, Some(9)));
        assert_eq!(iter.next(), Some((vec![0, 0], ArraySubset::new_with_ranges(&[0..2, 0..2]))));
        assert_eq!(iter.next(), Some((vec![0, 1], ArraySubset::new_with_ranges(&[0..2, 2..4]))));
        assert_eq!(iter.next(), Some((vec![0, 2], ArraySubset::new_with_ranges(&[0..2, 4..6]))));
        assert_eq!(iter.next(), Some((vec![1, 0], ArraySubset::new_with_ranges(&[2..4, 0..2]))));
        assert_eq!(iter.next(), Some((vec![1, 1], ArraySubset::new_with_ranges(&[2..4, 2..4]))));
        assert_eq!(iter.next(), Some((vec![1, 2], ArraySubset::new_with_ranges(&[2..4, 4..6]))));
        assert_eq!(iter.next(), Some((vec![2, 0], ArraySubset::new_with_ranges(&[4..6, 0..2]))));
        assert_eq!(iter.next(), Some((vec![2, 1], ArraySubset::new_with_ranges(&[4..6, 2..4]))));
        assert_eq!(iter.next(), Some((vec![2, 2], ArraySubset::new_with_ranges(&[4..6, 4..6]))));
        assert_eq!(iter.next(), None);
    }

    #[test]
    #[rustfmt::skip]
    fn array_subset_iter_chunks2() {
        let subset = ArraySubset::new_with_ranges(&[2..5, 2..6]);
        let chunk_shape = [NonZeroU64::new(2).unwrap(), NonZeroU64::new(3).unwrap()];
        let mut iter = subset.iter_chunks(&chunk_shape).unwrap();
        assert_eq!(iter.size_hint(), (4, Some(4)));
        assert_eq!(iter.next(), Some((vec![1, 0], ArraySubset::new_with_ranges(&[2..4, 0..3]))));
        assert_eq!(iter.next(), Some((vec![1, 1], ArraySubset::new_with_ranges(&[2..4, 3..6]))));
        assert_eq!(iter.next(), Some((vec![2, 0], ArraySubset::new_with_ranges(&[4..6, 0..3]))));
        assert_eq!(iter.next(), Some((vec![2, 1], ArraySubset::new_with_ranges(&[4..6, 3..6]))));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn array_subset_iter_chunks_empty() {
        let subset = ArraySubset::new_with_ranges(&[2..2, 2..6]);
        let chunk_shape = [NonZeroU64::new(2).unwrap(), NonZeroU64::new(3).unwrap()];
        let mut iter = subset.iter_chunks(&chunk_shape).unwrap();
        assert_eq!(iter.size_hint(), (0, Some(0)));
        assert_eq!(iter.next(), None);
    }
}
