// src/rank.rs

use std::fmt;

use crate::errors::K2rError;

/// Ordinal taxonomic-depth marker for species-and-below rank codes.
///
/// Textually "S", "S1", "S2", ...; numerically "S" = 0, "S{n}" = n. Ordering,
/// arithmetic and the exclusive range all operate on the numeric depth.
/// Subtracting below zero saturates at "S".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rank(u8);

impl Rank {
    /// Species rank ("S", depth 0).
    pub const SPECIES: Rank = Rank(0);

    /// Parses a rank code. Accepts "S" optionally followed by a decimal depth.
    pub fn parse(text: &str) -> Result<Self, K2rError> {
        let rest = text
            .strip_prefix('S')
            .ok_or_else(|| K2rError::InvalidRank(text.to_string()))?;
        if rest.is_empty() {
            return Ok(Rank(0));
        }
        rest.parse::<u8>()
            .map(Rank)
            .map_err(|_| K2rError::InvalidRank(text.to_string()))
    }

    /// Numeric depth below species.
    pub fn depth(self) -> u8 {
        self.0
    }

    pub fn add(self, n: u8) -> Rank {
        Rank(self.0.saturating_add(n))
    }

    /// Saturates at "S" instead of going above species level.
    pub fn sub(self, n: u8) -> Rank {
        Rank(self.0.saturating_sub(n))
    }

    /// Ranks strictly between `a` and `b`, shallow to deep. Empty when
    /// `b <= a + 1`.
    pub fn range_exclusive(a: Rank, b: Rank) -> Vec<Rank> {
        if b.0 <= a.0.saturating_add(1) {
            return Vec::new();
        }
        (a.0 + 1..b.0).map(Rank).collect()
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            write!(f, "S")
        } else {
            write!(f, "S{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_codes() {
        assert_eq!(Rank::parse("S").unwrap(), Rank::SPECIES);
        assert_eq!(Rank::parse("S1").unwrap().depth(), 1);
        assert_eq!(Rank::parse("S12").unwrap().depth(), 12);
    }

    #[test]
    fn parse_rejects_other_codes() {
        for bad in ["G", "G1", "", "S-1", "Sx", "s1", "U"] {
            assert!(Rank::parse(bad).is_err(), "expected rejection of {bad:?}");
        }
    }

    #[test]
    fn ordering_follows_depth() {
        let s1 = Rank::parse("S1").unwrap();
        let s3 = Rank::parse("S3").unwrap();
        assert!(Rank::SPECIES < s1);
        assert!(s1 < s3);
        assert!(s3 >= s3);
        // Depth 10 sorts after depth 2, unlike the textual codes.
        assert!(Rank::parse("S2").unwrap() < Rank::parse("S10").unwrap());
    }

    #[test]
    fn arithmetic_saturates_at_species() {
        let s2 = Rank::parse("S2").unwrap();
        assert_eq!(s2.add(5), Rank::parse("S7").unwrap());
        assert_eq!(s2.sub(1), Rank::parse("S1").unwrap());
        assert_eq!(s2.sub(2), Rank::SPECIES);
        assert_eq!(s2.sub(10), Rank::SPECIES);
    }

    #[test]
    fn range_exclusive_is_open_on_both_ends() {
        let s2 = Rank::parse("S2").unwrap();
        let s6 = Rank::parse("S6").unwrap();
        let between: Vec<String> = Rank::range_exclusive(s2, s6)
            .into_iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(between, ["S3", "S4", "S5"]);
        assert!(Rank::range_exclusive(s2, Rank::parse("S3").unwrap()).is_empty());
        assert!(Rank::range_exclusive(s6, s2).is_empty());
    }

    #[test]
    fn display_round_trips() {
        for code in ["S", "S1", "S4"] {
            assert_eq!(Rank::parse(code).unwrap().to_string(), code);
        }
    }
}
