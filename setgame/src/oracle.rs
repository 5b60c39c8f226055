use itertools::Itertools;

use crate::Card;

/// Decides which card triples form a set.
///
/// Implementations must be pure: the dealer calls them from its own thread
/// while players keep mutating the table.
pub trait SetOracle: Send + Sync {
    /// Whether the three cards form a valid set.
    fn is_valid_set(&self, cards: [Card; 3]) -> bool;

    /// Up to `limit` valid sets among `cards`, in lexicographic order of their
    /// positions in `cards`.
    fn find_sets(&self, cards: &[Card], limit: usize) -> Vec<[Card; 3]> {
        cards
            .iter()
            .copied()
            .tuple_combinations()
            .map(|(a, b, c)| [a, b, c])
            .filter(|&triple| self.is_valid_set(triple))
            .take(limit)
            .collect()
    }

    /// Whether at least one valid set exists among `cards`.
    fn any_set(&self, cards: &[Card]) -> bool {
        !self.find_sets(cards, 1).is_empty()
    }
}

/// The classic oracle: every card is a vector of `feature_count` features with
/// `feature_size` possible values each, and three cards form a set iff every
/// feature is either the same on all three or different on all three.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureOracle {
    pub feature_size: u8,
    pub feature_count: u8,
}

impl FeatureOracle {
    pub fn new(feature_size: u8, feature_count: u8) -> Self {
        Self {
            feature_size,
            feature_count,
        }
    }

    /// Number of distinct cards this encoding can express.
    pub fn max_deck_size(&self) -> usize {
        usize::from(self.feature_size)
            .checked_pow(u32::from(self.feature_count))
            .unwrap_or(usize::MAX)
    }

    /// Decomposes a card id into its features, least significant first.
    pub fn features(&self, card: Card) -> Vec<u8> {
        let mut rest = card.0;
        (0..self.feature_count)
            .map(|_| {
                let digit = rest % self.feature_size;
                rest /= self.feature_size;
                digit
            })
            .collect()
    }
}

impl Default for FeatureOracle {
    fn default() -> Self {
        Self::new(3, 4)
    }
}

impl SetOracle for FeatureOracle {
    fn is_valid_set(&self, [a, b, c]: [Card; 3]) -> bool {
        if a == b || b == c || a == c {
            return false;
        }
        let (fa, fb, fc) = (self.features(a), self.features(b), self.features(c));
        fa.iter().zip(&fb).zip(&fc).all(|((x, y), z)| {
            let all_same = x == y && y == z;
            let all_different = x != y && y != z && x != z;
            all_same || all_different
        })
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use super::*;
    use crate::arbitrary::ClassicCard;
    use crate::full_deck;

    #[test]
    fn features_are_base_feature_size_digits() {
        let oracle = FeatureOracle::default();
        assert_eq!(oracle.features(Card(0)), vec![0, 0, 0, 0]);
        // 1 + 2*3 + 0*9 + 2*27 = 61
        assert_eq!(oracle.features(Card(61)), vec![1, 2, 0, 2]);
        assert_eq!(oracle.max_deck_size(), 81);
    }

    #[test]
    fn classic_triples() {
        let oracle = FeatureOracle::default();
        // Features differ in the first digit only, all distinct: a set.
        assert!(oracle.is_valid_set([Card(0), Card(1), Card(2)]));
        // First feature all distinct, second all equal to 1.
        assert!(oracle.is_valid_set([Card(3), Card(4), Card(5)]));
        // First feature is 0, 1, 0: two equal and one different.
        assert!(!oracle.is_valid_set([Card(0), Card(1), Card(3)]));
        // Repeated cards are never a set.
        assert!(!oracle.is_valid_set([Card(0), Card(0), Card(0)]));
    }

    #[test]
    fn full_classic_deck_has_1080_sets() {
        let oracle = FeatureOracle::default();
        let deck = full_deck(81);
        assert_eq!(oracle.find_sets(&deck, usize::MAX).len(), 1080);
        assert_eq!(oracle.find_sets(&deck, 5).len(), 5);
        assert!(oracle.any_set(&deck));
    }

    #[test]
    fn cards_without_a_set() {
        let oracle = FeatureOracle::default();
        // 0 and 1 differ in one feature; the only completion would be 2.
        assert!(!oracle.any_set(&[Card(0), Card(1), Card(3), Card(4)]));
        assert!(!oracle.any_set(&[Card(0), Card(1)]));
        assert!(oracle.find_sets(&[], 10).is_empty());
    }

    quickcheck! {
        // With three values per feature, any two distinct cards are completed
        // to a set by exactly one third card.
        fn two_cards_have_exactly_one_completion(a: ClassicCard, b: ClassicCard) -> bool {
            let oracle = FeatureOracle::default();
            if a.0 == b.0 {
                return true;
            }
            let completions = full_deck(81)
                .into_iter()
                .filter(|&c| oracle.is_valid_set([a.0, b.0, c]))
                .count();
            completions == 1
        }

        fn validity_ignores_order(a: ClassicCard, b: ClassicCard, c: ClassicCard) -> bool {
            let oracle = FeatureOracle::default();
            let valid = oracle.is_valid_set([a.0, b.0, c.0]);
            valid == oracle.is_valid_set([c.0, a.0, b.0])
                && valid == oracle.is_valid_set([b.0, c.0, a.0])
        }
    }
}
