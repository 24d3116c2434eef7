use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinError {
    #[error("malformed popularity bin label \"{0}\" (expected \"<lower>-<upper>\")")]
    Malformed(String),
    #[error("unknown popularity bin \"{0}\" (expected one of 0-25, 25-50, 50-75, 75-100)")]
    Unknown(String),
}

/// One of the four fixed popularity ranges over the 0–100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PopularityBin {
    Low,
    MidLow,
    MidHigh,
    High,
}

impl PopularityBin {
    /// All bins in ascending popularity order (the summary table's row order).
    pub const ALL: [PopularityBin; 4] = [Self::Low, Self::MidLow, Self::MidHigh, Self::High];

    /// Bin holding the most popular tracks.
    pub const TOP: PopularityBin = Self::High;
    /// Bin holding the least popular tracks.
    pub const BOTTOM: PopularityBin = Self::Low;

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "0-25",
            Self::MidLow => "25-50",
            Self::MidHigh => "50-75",
            Self::High => "75-100",
        }
    }

    /// Numeric code stored in the summary table (`popularity_bin_code`).
    pub fn code(&self) -> i64 {
        match self {
            Self::Low => 0,
            Self::MidLow => 1,
            Self::MidHigh => 2,
            Self::High => 3,
        }
    }

    /// Inclusive bounds used when filtering the live track table.
    ///
    /// Both ends are inclusive, so a track with popularity 50 falls into
    /// both "25-50" and "50-75" here, unlike [`PopularityBin::assign`].
    pub fn bounds(&self) -> (i64, i64) {
        // Labels are static and always well formed.
        parse_bounds(self.label()).unwrap_or((0, 100))
    }

    /// Offline bin assignment: half-open `[lo, hi)` except the last bin,
    /// which also takes 100. Scores outside 0–100 have no bin.
    pub fn assign(popularity: i64) -> Option<PopularityBin> {
        match popularity {
            0..=24 => Some(Self::Low),
            25..=49 => Some(Self::MidLow),
            50..=74 => Some(Self::MidHigh),
            75..=100 => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for PopularityBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PopularityBin {
    type Err = BinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bounds = parse_bounds(s)?;
        Self::ALL
            .into_iter()
            .find(|bin| parse_bounds(bin.label()).ok() == Some(bounds))
            .ok_or_else(|| BinError::Unknown(s.to_string()))
    }
}

impl Serialize for PopularityBin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Parse a `"<lower>-<upper>"` label into its two integer bounds.
pub fn parse_bounds(label: &str) -> Result<(i64, i64), BinError> {
    let malformed = || BinError::Malformed(label.to_string());
    let (lower, upper) = label.trim().split_once('-').ok_or_else(malformed)?;
    let lower: i64 = lower.trim().parse().map_err(|_| malformed())?;
    let upper: i64 = upper.trim().parse().map_err(|_| malformed())?;
    if lower > upper {
        return Err(malformed());
    }
    Ok((lower, upper))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bounds() {
        assert_eq!(parse_bounds("25-50"), Ok((25, 50)));
        assert_eq!(parse_bounds("75-100"), Ok((75, 100)));
        assert_eq!(parse_bounds(" 0 - 25 "), Ok((0, 25)));
    }

    #[test]
    fn test_parse_bounds_malformed() {
        for label in ["", "25", "25-", "-50", "a-b", "25-50-75", "50-25"] {
            assert!(
                matches!(parse_bounds(label), Err(BinError::Malformed(_))),
                "expected malformed: {label:?}"
            );
        }
    }

    #[test]
    fn test_from_str_known_and_unknown() {
        assert_eq!("50-75".parse::<PopularityBin>(), Ok(PopularityBin::MidHigh));
        assert_eq!(
            "10-20".parse::<PopularityBin>(),
            Err(BinError::Unknown("10-20".into()))
        );
        assert!(matches!(
            "high".parse::<PopularityBin>(),
            Err(BinError::Malformed(_))
        ));
    }

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for bin in PopularityBin::ALL {
            assert_eq!(bin.label().parse::<PopularityBin>(), Ok(bin));
        }
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert_eq!(PopularityBin::MidLow.bounds(), (25, 50));
        assert_eq!(PopularityBin::High.bounds(), (75, 100));
    }

    #[test]
    fn test_assign_half_open() {
        assert_eq!(PopularityBin::assign(0), Some(PopularityBin::Low));
        assert_eq!(PopularityBin::assign(24), Some(PopularityBin::Low));
        assert_eq!(PopularityBin::assign(25), Some(PopularityBin::MidLow));
        assert_eq!(PopularityBin::assign(50), Some(PopularityBin::MidHigh));
        assert_eq!(PopularityBin::assign(74), Some(PopularityBin::MidHigh));
        assert_eq!(PopularityBin::assign(100), Some(PopularityBin::High));
        assert_eq!(PopularityBin::assign(101), None);
        assert_eq!(PopularityBin::assign(-1), None);
    }

    #[test]
    fn test_codes_follow_order() {
        let codes: Vec<i64> = PopularityBin::ALL.iter().map(|b| b.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3]);
    }
}
