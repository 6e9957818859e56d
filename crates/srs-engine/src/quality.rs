//! Review quality ratings.
//!
//! The UI offers three buttons. On the wire they travel as the integers
//! 1 (Hard), 3 (Good) and 5 (Easy); any other value is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schedule::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Quality {
    /// Recall failed or needed the answer. Counts as a lapse.
    Hard,
    Good,
    Easy,
}

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::Hard, Quality::Good, Quality::Easy];

    pub fn from_wire(value: i64) -> Result<Self, SchedulerError> {
        match value {
            1 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            5 => Ok(Self::Easy),
            other => Err(SchedulerError::InvalidQuality(other)),
        }
    }

    pub fn wire_value(self) -> i64 {
        match self {
            Self::Hard => 1,
            Self::Good => 3,
            Self::Easy => 5,
        }
    }

    /// Good and Easy keep the repetition streak alive; Hard resets it.
    pub fn is_acceptable(self) -> bool {
        !matches!(self, Self::Hard)
    }

    /// Position on the 0-5 grade scale the ease formula is defined over.
    pub(crate) fn sm2_grade(self) -> i64 {
        match self {
            Self::Hard => 1,
            Self::Good => 3,
            Self::Easy => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }
}

impl TryFrom<i64> for Quality {
    type Error = SchedulerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_wire(value)
    }
}

impl From<Quality> for i64 {
    fn from(value: Quality) -> Self {
        value.wire_value()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_map_to_grades() {
        assert_eq!(Quality::from_wire(1).unwrap(), Quality::Hard);
        assert_eq!(Quality::from_wire(3).unwrap(), Quality::Good);
        assert_eq!(Quality::from_wire(5).unwrap(), Quality::Easy);
        for quality in Quality::ALL {
            assert_eq!(Quality::from_wire(quality.wire_value()).unwrap(), quality);
        }
    }

    #[test]
    fn unknown_wire_values_are_rejected() {
        for value in [-1, 0, 2, 4, 6, 100] {
            assert_eq!(
                Quality::from_wire(value),
                Err(SchedulerError::InvalidQuality(value))
            );
        }
    }

    #[test]
    fn only_hard_is_a_lapse() {
        assert!(!Quality::Hard.is_acceptable());
        assert!(Quality::Good.is_acceptable());
        assert!(Quality::Easy.is_acceptable());
    }

    #[test]
    fn conversions_follow_wire_contract() {
        assert_eq!(i64::from(Quality::Easy), 5);
        assert!(Quality::try_from(2).is_err());
        assert_eq!(Quality::Good.to_string(), "good");
    }
}
