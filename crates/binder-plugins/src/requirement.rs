//! Authorization requirement bitmask attached to every verb.
//!
//! The mask packs two independent concerns into one byte:
//!
//! | bits | meaning |
//! |------|---------|
//! | 0 | `CREATE`: establishes a session |
//! | 1 | `CLOSE`: terminates the session after the callback |
//! | 2 | `RENEW`: refreshes the session expiry after the callback |
//! | 3 | `CHECK`: the session must exist and be unexpired |
//! | 4–5 | level-of-assurance operator: `00` none, `01` GE, `10` LE, `11` EQ |
//! | 6–7 | level-of-assurance threshold, 0–3 |
//!
//! A mask with no lifecycle bit and no operator is [`Requirement::NONE`].

use std::fmt;
use std::ops::BitOr;

/// Highest level of assurance a session can hold.
pub const MAX_LEVEL_OF_ASSURANCE: u8 = 3;

const CREATE_BIT: u8 = 1;
const CLOSE_BIT: u8 = 1 << 1;
const RENEW_BIT: u8 = 1 << 2;
const CHECK_BIT: u8 = 1 << 3;
const OPERATOR_SHIFT: u8 = 4;
const OPERATOR_MASK: u8 = 0b11 << OPERATOR_SHIFT;
const THRESHOLD_SHIFT: u8 = 6;
const LEVEL_MASK: u8 = 0b11;

/// Comparison applied between a session's level of assurance and a verb's
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaOperator {
    /// Level must be greater than or equal to the threshold.
    AtLeast,
    /// Level must be less than or equal to the threshold.
    AtMost,
    /// Level must equal the threshold.
    Exactly,
}

impl LoaOperator {
    const fn bits(self) -> u8 {
        match self {
            Self::AtLeast => 0b01,
            Self::AtMost => 0b10,
            Self::Exactly => 0b11,
        }
    }

    const fn from_bits(bits: u8) -> Option<Self> {
        match bits & LEVEL_MASK {
            0b01 => Some(Self::AtLeast),
            0b10 => Some(Self::AtMost),
            0b11 => Some(Self::Exactly),
            _ => None,
        }
    }

    /// Evaluates `level <op> threshold`.
    #[must_use]
    pub const fn admits(self, level: u8, threshold: u8) -> bool {
        match self {
            Self::AtLeast => level >= threshold,
            Self::AtMost => level <= threshold,
            Self::Exactly => level == threshold,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::AtLeast => ">=",
            Self::AtMost => "<=",
            Self::Exactly => "==",
        }
    }
}

/// Authorization requirement of a verb.
///
/// # Example
///
/// ```
/// use binder_plugins::Requirement;
///
/// let logout = Requirement::CLOSE | Requirement::loa_at_least(1);
/// assert!(logout.closes());
/// assert!(logout.needs_session());
/// assert!(!logout.admits(0));
/// assert!(logout.admits(2));
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Requirement(u8);

impl Requirement {
    /// No session interaction.
    pub const NONE: Self = Self(0);
    /// Establishes a new session.
    pub const CREATE: Self = Self(CREATE_BIT);
    /// Terminates the session once the callback returns.
    pub const CLOSE: Self = Self(CLOSE_BIT);
    /// Refreshes the session expiry once the callback returns.
    pub const RENEW: Self = Self(RENEW_BIT);
    /// Requires an existing, unexpired session.
    pub const CHECK: Self = Self(CHECK_BIT);

    /// Reinterprets a raw mask.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw mask.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Combines two requirements.
    ///
    /// When both carry a level-of-assurance comparison, `other` wins.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        let lifecycle = (self.0 | other.0) & !(OPERATOR_MASK | (LEVEL_MASK << THRESHOLD_SHIFT));
        let loa_source = if other.0 & OPERATOR_MASK == 0 {
            self.0
        } else {
            other.0
        };
        let loa = loa_source & (OPERATOR_MASK | (LEVEL_MASK << THRESHOLD_SHIFT));
        Self(lifecycle | loa)
    }

    /// Requirement comparing the session level with `operator` and
    /// `threshold`. Thresholds above [`MAX_LEVEL_OF_ASSURANCE`] keep only
    /// their two low bits.
    #[must_use]
    pub const fn loa(operator: LoaOperator, threshold: u8) -> Self {
        Self(
            (operator.bits() << OPERATOR_SHIFT) | ((threshold & LEVEL_MASK) << THRESHOLD_SHIFT),
        )
    }

    /// Session level must be at least `threshold`.
    #[must_use]
    pub const fn loa_at_least(threshold: u8) -> Self {
        Self::loa(LoaOperator::AtLeast, threshold)
    }

    /// Session level must be at most `threshold`.
    #[must_use]
    pub const fn loa_at_most(threshold: u8) -> Self {
        Self::loa(LoaOperator::AtMost, threshold)
    }

    /// Session level must equal `threshold`.
    #[must_use]
    pub const fn loa_exactly(threshold: u8) -> Self {
        Self::loa(LoaOperator::Exactly, threshold)
    }

    /// Whether the verb establishes a session.
    #[must_use]
    pub const fn creates(self) -> bool {
        self.0 & CREATE_BIT != 0
    }

    /// Whether the verb terminates its session.
    #[must_use]
    pub const fn closes(self) -> bool {
        self.0 & CLOSE_BIT != 0
    }

    /// Whether the verb refreshes its session expiry.
    #[must_use]
    pub const fn renews(self) -> bool {
        self.0 & RENEW_BIT != 0
    }

    /// Whether the verb demands a live session.
    #[must_use]
    pub const fn checks(self) -> bool {
        self.0 & CHECK_BIT != 0
    }

    /// The level-of-assurance comparison, if any.
    #[must_use]
    pub const fn loa_comparison(self) -> Option<(LoaOperator, u8)> {
        match LoaOperator::from_bits(self.0 >> OPERATOR_SHIFT) {
            Some(operator) => Some((operator, (self.0 >> THRESHOLD_SHIFT) & LEVEL_MASK)),
            None => None,
        }
    }

    /// Whether dispatch must resolve an existing session before the
    /// callback runs.
    #[must_use]
    pub const fn needs_session(self) -> bool {
        !self.creates()
            && (self.checks() || self.renews() || self.closes() || self.loa_comparison().is_some())
    }

    /// Whether the mask touches sessions at all.
    #[must_use]
    pub const fn is_none(self) -> bool {
        !self.creates() && !self.needs_session()
    }

    /// Whether a session at `level` satisfies the level-of-assurance
    /// comparison. Always true when the mask carries none.
    #[must_use]
    pub const fn admits(self, level: u8) -> bool {
        match self.loa_comparison() {
            Some((operator, threshold)) => operator.admits(level, threshold),
            None => true,
        }
    }
}

impl BitOr for Requirement {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (flag, label) in [
            (self.creates(), "CREATE"),
            (self.closes(), "CLOSE"),
            (self.renews(), "RENEW"),
            (self.checks(), "CHECK"),
        ] {
            if flag {
                parts.push(label.to_owned());
            }
        }
        if let Some((operator, threshold)) = self.loa_comparison() {
            parts.push(format!("LOA {} {threshold}", operator.symbol()));
        }
        if parts.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&parts.join(" | "))
        }
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Requirement({self})")
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::none(Requirement::NONE, 0b0000_0000)]
    #[case::create(Requirement::CREATE, 0b0000_0001)]
    #[case::close(Requirement::CLOSE, 0b0000_0010)]
    #[case::renew(Requirement::RENEW, 0b0000_0100)]
    #[case::check(Requirement::CHECK, 0b0000_1000)]
    #[case::at_least_two(Requirement::loa_at_least(2), 0b1001_0000)]
    #[case::at_most_one(Requirement::loa_at_most(1), 0b0110_0000)]
    #[case::exactly_three(Requirement::loa_exactly(3), 0b1111_0000)]
    fn bit_layout_is_fixed(#[case] requirement: Requirement, #[case] bits: u8) {
        assert_eq!(requirement.bits(), bits);
        assert_eq!(Requirement::from_bits(bits), requirement);
    }

    #[rstest]
    #[case::none(Requirement::NONE, false)]
    #[case::create(Requirement::CREATE, false)]
    #[case::create_with_loa(Requirement::CREATE | Requirement::loa_exactly(0), false)]
    #[case::check(Requirement::CHECK, true)]
    #[case::renew(Requirement::RENEW, true)]
    #[case::close(Requirement::CLOSE, true)]
    #[case::loa_only(Requirement::loa_at_least(1), true)]
    fn session_resolution(#[case] requirement: Requirement, #[case] expected: bool) {
        assert_eq!(requirement.needs_session(), expected);
    }

    #[rstest]
    #[case(Requirement::loa_at_least(1), 0, false)]
    #[case(Requirement::loa_at_least(1), 1, true)]
    #[case(Requirement::loa_at_most(1), 2, false)]
    #[case(Requirement::loa_at_most(1), 0, true)]
    #[case(Requirement::loa_exactly(2), 2, true)]
    #[case(Requirement::loa_exactly(2), 3, false)]
    #[case(Requirement::CHECK, 0, true)]
    fn level_comparison(#[case] requirement: Requirement, #[case] level: u8, #[case] admitted: bool) {
        assert_eq!(requirement.admits(level), admitted);
    }

    #[test]
    fn union_keeps_lifecycle_bits_and_latest_comparison() {
        let combined = Requirement::RENEW | Requirement::loa_at_least(1) | Requirement::loa_exactly(0);
        assert!(combined.renews());
        assert_eq!(combined.loa_comparison(), Some((LoaOperator::Exactly, 0)));
    }

    #[test]
    fn display_lists_flags() {
        let requirement = Requirement::CLOSE | Requirement::loa_at_least(1);
        assert_eq!(requirement.to_string(), "CLOSE | LOA >= 1");
        assert_eq!(Requirement::NONE.to_string(), "NONE");
    }
}
