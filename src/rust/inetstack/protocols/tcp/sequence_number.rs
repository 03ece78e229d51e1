// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

// TCP sequence numbers live in a circular space of 2^32 values (RFC 793, Section 3.3). Two numbers are ordered by the
// sign of their wrapping difference, so the relation only holds for numbers less than 2^31 apart and it is not
// transitive over the whole space. We never compare raw u32 values for ordering.

use ::std::{
    cmp::Ordering,
    convert::From,
    fmt,
    ops::{
        Add,
        AddAssign,
        Sub,
    },
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct SeqNumber {
    value: u32,
}

impl SeqNumber {
    /// Signed distance from `other` to `self`.
    #[inline]
    fn delta(&self, other: &Self) -> i32 {
        self.value.wrapping_sub(other.value) as i32
    }

    /// Returns true if the target number lies in the closed interval `[lo, hi]`.
    #[inline]
    pub fn between(&self, lo: SeqNumber, hi: SeqNumber) -> bool {
        *self >= lo && *self <= hi
    }

    /// Number of sequence numbers from `earlier` up to the target number.
    #[inline]
    pub fn distance_from(&self, earlier: SeqNumber) -> u32 {
        self.value.wrapping_sub(earlier.value)
    }
}

impl From<SeqNumber> for u32 {
    #[inline]
    fn from(item: SeqNumber) -> u32 {
        item.value
    }
}

impl From<u32> for SeqNumber {
    #[inline]
    fn from(item: u32) -> Self {
        SeqNumber { value: item }
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl Add for SeqNumber {
    type Output = SeqNumber;

    #[inline]
    fn add(self, other: SeqNumber) -> SeqNumber {
        (self.value.wrapping_add(other.value)).into()
    }
}

impl Add<u32> for SeqNumber {
    type Output = SeqNumber;

    #[inline]
    fn add(self, other: u32) -> SeqNumber {
        (self.value.wrapping_add(other)).into()
    }
}

impl AddAssign<u32> for SeqNumber {
    #[inline]
    fn add_assign(&mut self, other: u32) {
        self.value = self.value.wrapping_add(other);
    }
}

impl Sub for SeqNumber {
    type Output = SeqNumber;

    #[inline]
    fn sub(self, other: SeqNumber) -> SeqNumber {
        (self.value.wrapping_sub(other.value)).into()
    }
}

impl Sub<u32> for SeqNumber {
    type Output = SeqNumber;

    #[inline]
    fn sub(self, other: u32) -> SeqNumber {
        (self.value.wrapping_sub(other)).into()
    }
}

// There is deliberately no Ord implementation: sorting a set of sequence numbers has no unique answer. The comparison
// operators below are only meaningful for numbers within half the space of each other.
impl PartialOrd for SeqNumber {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.delta(other).cmp(&0))
    }

    #[inline]
    fn lt(&self, other: &Self) -> bool {
        self.delta(other) < 0
    }

    #[inline]
    fn le(&self, other: &Self) -> bool {
        self.delta(other) <= 0
    }

    #[inline]
    fn gt(&self, other: &Self) -> bool {
        self.delta(other) > 0
    }

    #[inline]
    fn ge(&self, other: &Self) -> bool {
        self.delta(other) >= 0
    }
}
