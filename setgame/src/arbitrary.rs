use crate::Card;

/// A card of the classic 81-card deck.
#[derive(Clone, Copy, Debug)]
pub struct ClassicCard(pub Card);

impl quickcheck::Arbitrary for ClassicCard {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        ClassicCard(Card(u8::arbitrary(g) % 81))
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.0 .0.shrink().map(|id| ClassicCard(Card(id))))
    }
}
