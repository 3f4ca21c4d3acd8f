/*!
Values for working with a simulated duration. Use [`EmulatedTime`](crate::emulated_time::EmulatedTime)
to represent an instant in time and `SimulationTime` to represent a time interval.
*/

use std::time::Duration;

/// A duration of simulated time with nanosecond granularity.
#[derive(Copy, Clone, Eq, PartialEq, Debug, PartialOrd, Ord, Hash, Default, serde::Serialize)]
#[serde(transparent)]
pub struct SimulationTime(u64);

const ONE_NANOSECOND: u64 = 1;
const ONE_MICROSECOND: u64 = 1_000;
const ONE_MILLISECOND: u64 = 1_000_000;
const ONE_SECOND: u64 = 1_000_000_000;
const ONE_MINUTE: u64 = 60 * ONE_SECOND;

impl SimulationTime {
    /// Maximum value. Leaves room so that `EmulatedTime::SIMULATION_START + MAX` is representable.
    pub const MAX: SimulationTime = SimulationTime(u64::MAX - 1);
    pub const ZERO: SimulationTime = SimulationTime(0);
    pub const MINUTE: SimulationTime = SimulationTime(ONE_MINUTE);
    pub const SECOND: SimulationTime = SimulationTime(ONE_SECOND);
    pub const MILLISECOND: SimulationTime = SimulationTime(ONE_MILLISECOND);
    pub const MICROSECOND: SimulationTime = SimulationTime(ONE_MICROSECOND);
    pub const NANOSECOND: SimulationTime = SimulationTime(ONE_NANOSECOND);

    /// Convert a [`Duration`] to a [`SimulationTime`]. This function exists as a `const`
    /// alternative to `SimulationTime::try_from(duration)`. Panics if the duration is too large.
    pub const fn from_duration(val: Duration) -> Self {
        let val = val.as_nanos();
        if val > Self::MAX.0 as u128 {
            panic!("Duration is larger than SimulationTime::MAX");
        }
        Self(val as u64)
    }

    fn from_raw(nanos: u64) -> Option<Self> {
        (nanos <= Self::MAX.0).then_some(Self(nanos))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn as_secs(&self) -> u64 {
        self.0 / ONE_SECOND
    }

    pub fn as_millis(&self) -> u64 {
        self.0 / ONE_MILLISECOND
    }

    pub fn as_micros(&self) -> u64 {
        self.0 / ONE_MICROSECOND
    }

    pub fn as_nanos(&self) -> u128 {
        self.0.into()
    }

    /// Seconds as a float, for kinematics. Loses precision past ~104 days.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / ONE_SECOND as f64
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        Self::from_raw(self.0.checked_add(other.0)?)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        Self::from_raw(self.0.checked_sub(other.0)?)
    }

    pub fn checked_mul(self, other: u64) -> Option<Self> {
        Self::from_raw(self.0.checked_mul(other)?)
    }

    pub fn checked_div(self, other: u64) -> Option<Self> {
        Self::from_raw(self.0.checked_div(other)?)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        self.checked_add(other).unwrap_or(Self::MAX)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        self.checked_sub(other).unwrap_or(Self::ZERO)
    }

    pub fn saturating_mul(self, other: u64) -> Self {
        self.checked_mul(other).unwrap_or(Self::MAX)
    }

    pub fn try_from_secs(s: u64) -> Option<Self> {
        Self::SECOND.checked_mul(s)
    }

    pub fn from_secs(s: u64) -> Self {
        Self::try_from_secs(s).unwrap()
    }

    pub fn try_from_millis(s: u64) -> Option<Self> {
        Self::MILLISECOND.checked_mul(s)
    }

    pub fn from_millis(s: u64) -> Self {
        Self::try_from_millis(s).unwrap()
    }

    pub fn try_from_micros(s: u64) -> Option<Self> {
        Self::MICROSECOND.checked_mul(s)
    }

    pub fn from_micros(s: u64) -> Self {
        Self::try_from_micros(s).unwrap()
    }

    pub fn try_from_nanos(s: u64) -> Option<Self> {
        Self::from_raw(s)
    }

    pub fn from_nanos(s: u64) -> Self {
        Self::try_from_nanos(s).unwrap()
    }

    /// Rounds to the nearest nanosecond. Returns `None` for negative, non-finite or too-large
    /// values.
    pub fn try_from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        let nanos = (secs * ONE_SECOND as f64).round();
        if nanos > Self::MAX.0 as f64 {
            return None;
        }
        Some(Self(nanos as u64))
    }

    pub fn subsec_millis(&self) -> u32 {
        (self.as_millis() % 1_000).try_into().unwrap()
    }

    pub fn subsec_nanos(&self) -> u32 {
        (self.0 % ONE_SECOND).try_into().unwrap()
    }
}

impl std::ops::Add<SimulationTime> for SimulationTime {
    type Output = SimulationTime;

    fn add(self, other: Self) -> Self::Output {
        self.checked_add(other).unwrap()
    }
}

impl std::ops::AddAssign<SimulationTime> for SimulationTime {
    fn add_assign(&mut self, rhs: SimulationTime) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub<SimulationTime> for SimulationTime {
    type Output = SimulationTime;

    fn sub(self, other: Self) -> Self::Output {
        self.checked_sub(other).unwrap()
    }
}

impl std::ops::Mul<u32> for SimulationTime {
    type Output = SimulationTime;

    fn mul(self, other: u32) -> Self::Output {
        self.checked_mul(other.into()).unwrap()
    }
}

impl std::ops::Div<u32> for SimulationTime {
    type Output = SimulationTime;

    fn div(self, other: u32) -> Self::Output {
        self.checked_div(other.into()).unwrap()
    }
}

impl std::convert::TryFrom<Duration> for SimulationTime {
    type Error = ();

    fn try_from(val: Duration) -> Result<Self, Self::Error> {
        let nanos = u64::try_from(val.as_nanos()).map_err(|_| ())?;
        Self::from_raw(nanos).ok_or(())
    }
}

impl From<SimulationTime> for Duration {
    fn from(val: SimulationTime) -> Duration {
        Duration::from_nanos(val.0)
    }
}

impl std::fmt::Display for SimulationTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", Duration::from(*self))
    }
}
