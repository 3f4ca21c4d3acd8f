/*!
Types for parsing/deserializing unit values in the configuration.

```
# use slp_sim::utility::units::*;
# use std::str::FromStr;
let window = Time::from_str("10 min").unwrap();
assert_eq!(window, Time::new(10, TimePrefix::Min));
assert_eq!(window.convert(TimePrefix::Sec).unwrap(), Time::new(600, TimePrefix::Sec));

let size = Bytes::<SiPrefix>::from_str("64 B").unwrap();
assert_eq!(size.value(), 64);
```
*/

use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::{Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};
use sim_helper::simulation_time::SimulationTime;

/// The prefix of a unit value denoting magnitude.
pub trait Prefix: Clone + Copy + Default + PartialEq + FromStr + Display + Debug {
    /// The magnitude of this prefix relative to other prefixes of this type.
    fn relative_magnitude(&self) -> u128;

    /// An integer conversion factor, or an error if converting would lose precision.
    fn conversion_factor(&self, to: Self) -> Result<u128, String> {
        let from_mag = self.relative_magnitude();
        let to_mag = to.relative_magnitude();
        if from_mag % to_mag != 0 {
            return Err(format!("Converting from {} to {} would lose precision", self, to));
        }
        Ok(from_mag / to_mag)
    }
}

/// Decimal SI prefixes, used for byte counts and bit rates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SiPrefix {
    #[default]
    Base,
    Kilo,
    Mega,
    Giga,
}

impl FromStr for SiPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::Base),
            "K" | "kilo" => Ok(Self::Kilo),
            "M" | "mega" => Ok(Self::Mega),
            "G" | "giga" => Ok(Self::Giga),
            _ => Err(format!("Unit prefix '{s}' was not one of (K|kilo|M|mega|G|giga)")),
        }
    }
}

impl Display for SiPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Base => "",
            Self::Kilo => "K",
            Self::Mega => "M",
            Self::Giga => "G",
        };
        f.write_str(s)
    }
}

impl Prefix for SiPrefix {
    fn relative_magnitude(&self) -> u128 {
        match self {
            Self::Base => 1,
            Self::Kilo => 1_000,
            Self::Mega => 1_000_000,
            Self::Giga => 1_000_000_000,
        }
    }
}

/// Time units, which we pretend are prefixes for implementation simplicity. They hold the whole
/// unit ("ms", "sec", "min") and should be used with [`Time`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TimePrefix {
    Nano,
    Micro,
    Milli,
    #[default]
    Sec,
    Min,
    Hour,
}

impl FromStr for TimePrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ns" | "nanosecond" | "nanoseconds" => Ok(Self::Nano),
            "us" | "μs" | "microsecond" | "microseconds" => Ok(Self::Micro),
            "ms" | "millisecond" | "milliseconds" => Ok(Self::Milli),
            "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Self::Sec),
            "m" | "min" | "mins" | "minute" | "minutes" => Ok(Self::Min),
            "h" | "hr" | "hrs" | "hour" | "hours" => Ok(Self::Hour),
            _ => Err(format!(
                "Time unit '{s}' was not one of (ns|us|μs|ms|s|sec|secs|second|seconds\
                 |m|min|mins|minute|minutes|h|hr|hrs|hour|hours)"
            )),
        }
    }
}

impl Display for TimePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Nano => "ns",
            Self::Micro => "μs",
            Self::Milli => "ms",
            Self::Sec => "sec",
            Self::Min => "min",
            Self::Hour => "hour",
        };
        f.write_str(s)
    }
}

impl Prefix for TimePrefix {
    fn relative_magnitude(&self) -> u128 {
        const NANOS_PER_SEC: u128 = 1_000_000_000;
        match self {
            Self::Nano => 1,
            Self::Micro => 1_000,
            Self::Milli => 1_000_000,
            Self::Sec => NANOS_PER_SEC,
            Self::Min => 60 * NANOS_PER_SEC,
            Self::Hour => 3600 * NANOS_PER_SEC,
        }
    }
}

/// A unit containing an integer value, a prefix, and allowed constant suffix strings.
pub trait Unit: Sized {
    type T: Prefix;

    /// The value of the unit in the size of its current prefix.
    fn value(&self) -> u64;

    /// The current prefix.
    fn prefix(&self) -> Self::T;

    /// Suffixes accepted when parsing; the first one is used when displaying.
    fn suffixes() -> &'static [&'static str];

    /// Convert to a different prefix, failing if precision would be lost or the value would
    /// overflow.
    fn convert(&self, prefix: Self::T) -> Result<Self, String>;
}

static UNIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([0-9]+)\s*(\S*)\s*$").unwrap());

/// Split "10 KB" into (10, "K") after stripping one of `suffixes`.
fn parse_parts<'a>(s: &'a str, suffixes: &[&str]) -> Result<(u64, &'a str), String> {
    let captures = UNIT_RE
        .captures(s)
        .ok_or_else(|| format!("'{s}' is not a non-negative integer with an optional unit"))?;
    let value = &captures[1];
    let unit = captures.get(2).map_or("", |m| m.as_str());

    let value = value
        .parse::<u64>()
        .map_err(|e| format!("Invalid value '{value}': {e}"))?;

    // longest suffix first so that "bytes" wins over "B"
    let mut sorted: Vec<&str> = suffixes.iter().copied().filter(|x| !x.is_empty()).collect();
    sorted.sort_by_key(|x| std::cmp::Reverse(x.len()));
    let prefix = sorted
        .iter()
        .find_map(|suffix| unit.strip_suffix(suffix))
        .unwrap_or(unit);

    Ok((value, prefix))
}

macro_rules! unit_impl {
    ($name:ident, $suffixes:expr) => {
        impl<T: Prefix> $name<T> {
            pub fn new(value: u64, prefix: T) -> Self {
                Self { value, prefix }
            }
        }

        impl<T: Prefix> Unit for $name<T> {
            type T = T;

            fn value(&self) -> u64 {
                self.value
            }

            fn prefix(&self) -> T {
                self.prefix
            }

            fn suffixes() -> &'static [&'static str] {
                &$suffixes
            }

            fn convert(&self, prefix: T) -> Result<Self, String> {
                let factor = self.prefix.conversion_factor(prefix)?;
                let value = u128::from(self.value)
                    .checked_mul(factor)
                    .and_then(|x| u64::try_from(x).ok())
                    .ok_or_else(|| format!("{} is too large to convert to {}", self, prefix))?;
                Ok(Self::new(value, prefix))
            }
        }

        impl<T: Prefix> Display for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}{}", self.value, self.prefix, Self::suffixes()[0])
            }
        }

        impl<T: Prefix> FromStr for $name<T>
        where
            <T as FromStr>::Err: Display,
        {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (value, prefix) = parse_parts(s, Self::suffixes())?;
                let prefix = T::from_str(prefix).map_err(|e| e.to_string())?;
                Ok(Self::new(value, prefix))
            }
        }

        impl<'de, T: Prefix> Deserialize<'de> for $name<T>
        where
            <T as FromStr>::Err: Display,
        {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct ValueVisitor<T>(std::marker::PhantomData<T>);

                impl<'de, T: Prefix> Visitor<'de> for ValueVisitor<T>
                where
                    <T as FromStr>::Err: Display,
                {
                    type Value = $name<T>;

                    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                        write!(f, "an integer or a string like \"10 {}\"", T::default())
                    }

                    fn visit_str<E: serde::de::Error>(self, s: &str) -> Result<Self::Value, E> {
                        Self::Value::from_str(s).map_err(E::custom)
                    }

                    fn visit_u64<E: serde::de::Error>(self, x: u64) -> Result<Self::Value, E> {
                        Ok(Self::Value::new(x, T::default()))
                    }

                    fn visit_i64<E: serde::de::Error>(self, x: i64) -> Result<Self::Value, E> {
                        let x = u64::try_from(x).map_err(E::custom)?;
                        Ok(Self::Value::new(x, T::default()))
                    }
                }

                deserializer.deserialize_any(ValueVisitor(std::marker::PhantomData))
            }
        }

        impl<T: Prefix> Serialize for $name<T> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<T: Prefix> JsonSchema for $name<T> {
            fn is_referenceable() -> bool {
                false
            }

            fn schema_name() -> String {
                stringify!($name).to_owned()
            }

            fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
                schemars::schema::SchemaObject {
                    instance_type: Some(schemars::schema::InstanceType::String.into()),
                    format: Some(stringify!($name).to_owned()),
                    ..Default::default()
                }
                .into()
            }
        }
    };
}

/// An amount of time. Time "prefixes" are the whole unit, so there is no suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time<T: Prefix> {
    value: u64,
    prefix: T,
}

unit_impl!(Time, [""]);

impl Time<TimePrefix> {
    /// Fails if the time doesn't fit in a [`SimulationTime`].
    pub fn to_simtime(&self) -> Result<SimulationTime, String> {
        let nanos = self.convert(TimePrefix::Nano)?.value();
        SimulationTime::try_from_nanos(nanos).ok_or_else(|| format!("{self} is too large"))
    }
}

/// A number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bytes<T: Prefix> {
    value: u64,
    prefix: T,
}

unit_impl!(Bytes, ["B", "byte", "bytes"]);

/// A throughput in bits-per-second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitsPerSec<T: Prefix> {
    value: u64,
    prefix: T,
}

unit_impl!(BitsPerSec, ["bit", "bits", "bps"]);
