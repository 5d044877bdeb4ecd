use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Card rarity tier, ordered from most to least common.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }

    /// Epic and legendary draws clear the pity counter.
    pub fn is_high(&self) -> bool {
        matches!(self, Rarity::Epic | Rarity::Legendary)
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rarity::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown rarity '{}'", s))
    }
}

/// Static tier → probability table.
#[derive(Debug, Clone, Copy)]
pub struct RarityTable {
    entries: &'static [(Rarity, f64)],
}

/// Regular draw rates.
pub const STANDARD_RATES: RarityTable = RarityTable {
    entries: &[
        (Rarity::Common, 0.60),
        (Rarity::Uncommon, 0.20),
        (Rarity::Rare, 0.12),
        (Rarity::Epic, 0.06),
        (Rarity::Legendary, 0.02),
    ],
};

/// Rates used once the pity threshold is reached.
pub const PITY_RATES: RarityTable = RarityTable {
    entries: &[(Rarity::Epic, 0.7), (Rarity::Legendary, 0.3)],
};

impl RarityTable {
    /// Probability of `tier`; 0.0 for tiers the table does not contain.
    pub fn weight_of(&self, tier: Rarity) -> f64 {
        self.entries
            .iter()
            .find(|(r, _)| *r == tier)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    pub fn tiers(&self) -> impl Iterator<Item = Rarity> + '_ {
        self.entries.iter().map(|(r, _)| *r)
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|(_, w)| *w).sum()
    }

    /// Weighted choice over the declared weights.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Rarity {
        let pick = rng.gen::<f64>() * self.total_weight();
        let mut acc = 0.0;
        for (tier, weight) in self.entries {
            acc += weight;
            if pick < acc {
                return *tier;
            }
        }
        // float accumulation can land exactly on the total
        self.entries.last().map(|(r, _)| *r).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn standard_rates_sum_to_one() {
        assert!((STANDARD_RATES.total_weight() - 1.0).abs() < 1e-9);
        assert!((PITY_RATES.total_weight() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weight_lookup() {
        assert_eq!(STANDARD_RATES.weight_of(Rarity::Legendary), 0.02);
        assert_eq!(PITY_RATES.weight_of(Rarity::Epic), 0.7);
        assert_eq!(PITY_RATES.weight_of(Rarity::Common), 0.0);
    }

    #[test]
    fn pity_table_only_yields_high_tiers() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            assert!(PITY_RATES.choose(&mut rng).is_high());
        }
    }

    #[test]
    fn standard_distribution_is_roughly_right() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<Rarity, u32> = HashMap::new();
        let n = 100_000;
        for _ in 0..n {
            *counts.entry(STANDARD_RATES.choose(&mut rng)).or_default() += 1;
        }
        for tier in Rarity::ALL {
            let observed = counts.get(&tier).copied().unwrap_or(0) as f64 / n as f64;
            let expected = STANDARD_RATES.weight_of(tier);
            assert!((observed - expected).abs() < 0.01, "{tier}: observed {observed}, expected {expected}");
        }
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("Epic".parse::<Rarity>().unwrap(), Rarity::Epic);
        assert_eq!(Rarity::Uncommon.to_string(), "uncommon");
        assert!("mythic".parse::<Rarity>().is_err());
    }
}
