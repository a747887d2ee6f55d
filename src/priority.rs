//! The priority policies of spec.md §4.3: the order in which an alt posts
//! its candidates, before the Offer Arbiter decides who actually wins.
use rand::seq::SliceRandom;

/// Selection policy across an alt's candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Post in caller-supplied order. A channel already satisfiable at
    /// post time wins over later channels — a preference, not a guarantee,
    /// under contention.
    #[default]
    First,
    /// Identical posting order to `First`. The library makes no effort to
    /// rebalance; the distinction from `First` is advisory for callers
    /// (spec.md §9 Open Question: treated as a synonym, no reordering).
    Any,
    /// Candidates are permuted with a uniform Fisher-Yates shuffle before
    /// posting; otherwise identical to `First`.
    Random,
    /// Only available through an explicit [`ChannelSet`](crate::set::ChannelSet):
    /// posting starts at the set's persistent fairness cursor and wraps
    /// around. Requesting `Fair` via the ad-hoc overload is an
    /// `InvalidOperation`.
    Fair,
}

/// Produces the posting order for `len` candidates under `priority`,
/// starting at `cursor` when `priority == Fair` (ignored otherwise).
/// Returns the permutation as indices into the original candidate list.
pub(crate) fn posting_order(len: usize, priority: Priority, cursor: usize) -> Vec<usize> {
    match priority {
        Priority::First | Priority::Any => (0..len).collect(),
        Priority::Random => {
            let mut order: Vec<usize> = (0..len).collect();
            order.shuffle(&mut rand::rng());
            order
        }
        Priority::Fair => (0..len).map(|i| (cursor + i) % len.max(1)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_and_any_preserve_order() {
        assert_eq!(posting_order(4, Priority::First, 0), vec![0, 1, 2, 3]);
        assert_eq!(posting_order(4, Priority::Any, 0), vec![0, 1, 2, 3]);
    }

    #[test]
    fn fair_wraps_from_cursor() {
        assert_eq!(posting_order(4, Priority::Fair, 2), vec![2, 3, 0, 1]);
        assert_eq!(posting_order(4, Priority::Fair, 0), vec![0, 1, 2, 3]);
    }

    #[test]
    fn random_is_a_permutation() {
        let order = posting_order(6, Priority::Random, 0);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4, 5]);
    }
}
