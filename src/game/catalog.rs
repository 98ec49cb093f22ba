use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::{CardKind, CardTemplate};

static SAMPLE_CARDS: Lazy<CardCatalog> = Lazy::new(|| {
    CardCatalog {
        cards: vec![
            CardTemplate::minion("flame_imp", "Flame Imp", 1, 3, 2)
                .with_description("Deal 3 damage to your hero."),
            CardTemplate::spell("fireball", "Fireball", 4)
                .with_description("Deal 6 damage to any target."),
            CardTemplate::minion("water_elemental", "Water Elemental", 4, 3, 6)
                .with_description("Freeze any character damaged by this minion."),
            CardTemplate::spell("arcane_missiles", "Arcane Missiles", 1)
                .with_description("Deal 3 damage randomly split among all enemies."),
            CardTemplate::minion("chillwind_yeti", "Chillwind Yeti", 4, 4, 5)
                .with_description("A sturdy minion with balanced stats."),
            CardTemplate::spell("lightning_bolt", "Lightning Bolt", 1)
                .with_description("Deal 3 damage. Overload: (1)"),
            CardTemplate::minion("ogre_magi", "Ogre Magi", 4, 4, 4)
                .with_description("Spell Damage +1"),
            CardTemplate::spell("polymorph", "Polymorph", 4)
                .with_description("Transform a minion into a 1/1 Sheep."),
            CardTemplate::minion("stormwind_champion", "Stormwind Champion", 7, 6, 6)
                .with_description("Your other minions have +1/+1."),
            CardTemplate::spell("healing_potion", "Healing Potion", 1)
                .with_description("Restore 5 Health to your hero."),
            CardTemplate::minion("boulderfist_ogre", "Boulderfist Ogre", 6, 6, 7)
                .with_description("A powerful late-game minion."),
            CardTemplate::spell("frost_bolt", "Frost Bolt", 2)
                .with_description("Deal 3 damage to a character and freeze it."),
        ],
    }
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CatalogError {
    Malformed { message: String },
    Empty,
    DuplicateId { card_id: String },
    InvalidMinionStats { card_id: String, attack: i16, health: i16 },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Malformed { message } => write!(f, "malformed catalog: {message}"),
            CatalogError::Empty => write!(f, "catalog contains no cards"),
            CatalogError::DuplicateId { card_id } => write!(f, "duplicate card id `{card_id}`"),
            CatalogError::InvalidMinionStats {
                card_id,
                attack,
                health,
            } => write!(f, "minion `{card_id}` has invalid stats {attack}/{health}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// 只读的卡牌目录，构建卡组时读取一次。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CardCatalog {
    cards: Vec<CardTemplate>,
}

impl CardCatalog {
    pub fn new(cards: Vec<CardTemplate>) -> Result<Self, CatalogError> {
        let catalog = Self { cards };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let cards: Vec<CardTemplate> =
            serde_json::from_str(json).map_err(|error| CatalogError::Malformed {
                message: error.to_string(),
            })?;
        Self::new(cards)
    }

    pub fn sample() -> &'static CardCatalog {
        &SAMPLE_CARDS
    }

    pub fn cards(&self) -> &[CardTemplate] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.cards.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for card in &self.cards {
            if !seen.insert(card.id.as_str()) {
                return Err(CatalogError::DuplicateId {
                    card_id: card.id.clone(),
                });
            }
            if let CardKind::Minion { attack, health } = card.kind {
                if attack < 0 || health < 1 {
                    return Err(CatalogError::InvalidMinionStats {
                        card_id: card.id.clone(),
                        attack,
                        health,
                    });
                }
            }
        }
        Ok(())
    }

    /// 将目录复制 `copies` 份后洗牌，得到一副新卡组。
    pub fn build_deck<R: Rng + ?Sized>(&self, copies: usize, rng: &mut R) -> Vec<CardTemplate> {
        let mut deck: Vec<CardTemplate> = std::iter::repeat(self.cards.iter())
            .take(copies)
            .flatten()
            .cloned()
            .collect();
        deck.shuffle(rng);
        deck
    }
}

impl Default for CardCatalog {
    fn default() -> Self {
        Self::sample().clone()
    }
}
