// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! This module represents the time during a simulation.
//!
//! Time is an integer number of picoseconds so that event ordering is exact.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

const PS_PER_NS: u64 = 1_000;
const PS_PER_US: u64 = 1_000_000;
const PS_PER_MS: u64 = 1_000_000_000;
const PS_PER_SEC: u64 = 1_000_000_000_000;

/// A point in (or span of) simulated time with picosecond resolution.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    #[must_use]
    pub const fn from_ps(ps: u64) -> Self {
        Self(ps)
    }

    #[must_use]
    pub const fn from_ns(ns: u64) -> Self {
        Self(ns * PS_PER_NS)
    }

    #[must_use]
    pub const fn from_us(us: u64) -> Self {
        Self(us * PS_PER_US)
    }

    #[must_use]
    pub const fn from_ms(ms: u64) -> Self {
        Self(ms * PS_PER_MS)
    }

    /// Convert from fractional microseconds, rounding to the nearest
    /// picosecond. Negative values clamp to zero.
    #[must_use]
    pub fn from_us_f64(us: f64) -> Self {
        Self((us * PS_PER_US as f64).round().max(0.0) as u64)
    }

    /// Convert from fractional seconds, rounding to the nearest picosecond.
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * PS_PER_SEC as f64).round().max(0.0) as u64)
    }

    /// The time taken to serialize `num_bytes` onto a link of `bits_per_sec`.
    ///
    /// Rounds up so that a non-empty packet never takes zero time.
    #[must_use]
    pub fn serialization(num_bytes: u64, bits_per_sec: u64) -> Self {
        if bits_per_sec == 0 {
            return Self::MAX;
        }
        let bits = u128::from(num_bytes) * 8 * u128::from(PS_PER_SEC);
        let ps = bits.div_ceil(u128::from(bits_per_sec));
        Self(u64::try_from(ps).unwrap_or(u64::MAX))
    }

    #[must_use]
    pub const fn as_ps(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn as_ns_f64(&self) -> f64 {
        self.0 as f64 / PS_PER_NS as f64
    }

    #[must_use]
    pub fn as_us_f64(&self) -> f64 {
        self.0 as f64 / PS_PER_US as f64
    }

    #[must_use]
    pub fn as_ms_f64(&self) -> f64 {
        self.0 as f64 / PS_PER_MS as f64
    }

    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / PS_PER_SEC as f64
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn saturating_sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }

    #[must_use]
    pub const fn saturating_add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;
    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;
    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl Mul<u64> for SimTime {
    type Output = SimTime;
    fn mul(self, rhs: u64) -> SimTime {
        SimTime(self.0 * rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.3}us", self.as_us_f64())
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ps", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversions() {
        assert_eq!(SimTime::from_ns(3).as_ps(), 3_000);
        assert_eq!(SimTime::from_us(2), SimTime::from_ns(2_000));
        assert_eq!(SimTime::from_ms(1), SimTime::from_us(1_000));
        assert_eq!(SimTime::from_us_f64(1.5), SimTime::from_ns(1_500));
        assert_eq!(SimTime::from_secs_f64(1e-6), SimTime::from_us(1));
        assert_eq!(SimTime::from_us_f64(-3.0), SimTime::ZERO);
    }

    #[test]
    fn serialization_rounds_up() {
        // 4000 bytes at 100Gbps is 320ns
        assert_eq!(
            SimTime::serialization(4000, 100_000_000_000),
            SimTime::from_ns(320)
        );
        // 1 byte at 3bps is 2.666..s
        assert_eq!(
            SimTime::serialization(1, 3),
            SimTime::from_ps(2_666_666_666_667)
        );
        assert_eq!(SimTime::serialization(1, 0), SimTime::MAX);
    }

    #[test]
    fn arithmetic() {
        let a = SimTime::from_us(10);
        let b = SimTime::from_us(4);
        assert_eq!(a - b, SimTime::from_us(6));
        assert_eq!(b.saturating_sub(a), SimTime::ZERO);
        assert_eq!(a + b, SimTime::from_us(14));
        assert_eq!(b * 3, SimTime::from_us(12));
        assert_eq!(format!("{}", SimTime::from_ns(1500)), "1.500us");
    }
}
