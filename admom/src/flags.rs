//! Status bits attached to every [`ShapeEstimate`](crate::ShapeEstimate).

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bitset of measurement status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeFlags(u32);

impl ShapeFlags {
    /// The reported moments are unweighted (the adaptive loop gave up).
    pub const UNWEIGHTED: Self = Self(1 << 0);
    /// Even the unweighted moments failed; the moments are a single-pixel default or NaN.
    pub const UNWEIGHTED_BAD: Self = Self(1 << 1);
    /// The adaptive loop ran out of iterations.
    pub const MAXITER: Self = Self(1 << 2);
    /// The measured centroid moved further than `shiftmax` from the guess.
    pub const SHIFT: Self = Self(1 << 3);
    /// No usable centroid could be measured.
    pub const BAD_CENTROID: Self = Self(1 << 4);

    const NAMED: [(Self, &'static str); 5] = [
        (Self::UNWEIGHTED, "UNWEIGHTED"),
        (Self::UNWEIGHTED_BAD, "UNWEIGHTED_BAD"),
        (Self::MAXITER, "MAXITER"),
        (Self::SHIFT, "SHIFT"),
        (Self::BAD_CENTROID, "BAD_CENTROID"),
    ];

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Names of the set flags, in bit order.
    pub fn iter_names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMED
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl BitOr for ShapeFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ShapeFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ShapeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("OK");
        }
        for (i, name) in self.iter_names().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}
