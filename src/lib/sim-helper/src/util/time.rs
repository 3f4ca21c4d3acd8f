/// A time split into wall-clock style components, for log lines and progress output.
#[derive(Debug, Eq, PartialEq)]
pub struct TimeParts {
    pub hours: u64,
    pub mins: u64,
    pub secs: u64,
    pub nanos: u64,
}

impl TimeParts {
    pub fn from_nanos(total_nanos: u128) -> Self {
        const NANOS_PER_SEC: u128 = 1_000_000_000;

        let whole_secs = total_nanos / NANOS_PER_SEC;
        let nanos = total_nanos % NANOS_PER_SEC;

        // saturates instead of wrapping
        let clamp = |x: u128| u64::try_from(x).unwrap_or(u64::MAX);

        Self {
            hours: clamp(whole_secs / 3600),
            mins: clamp((whole_secs / 60) % 60),
            secs: clamp(whole_secs % 60),
            nanos: clamp(nanos),
        }
    }

    /// Format as HH:MM:SS.
    pub fn fmt_hr_min_sec(&self) -> impl std::fmt::Display + '_ {
        Fmt {
            time: self,
            precision: Precision::Secs,
        }
    }

    /// Format as HH:MM:SS.mmm.
    pub fn fmt_hr_min_sec_milli(&self) -> impl std::fmt::Display + '_ {
        Fmt {
            time: self,
            precision: Precision::Millis,
        }
    }

    /// Format as HH:MM:SS.nnnnnnnnn.
    pub fn fmt_hr_min_sec_nano(&self) -> impl std::fmt::Display + '_ {
        Fmt {
            time: self,
            precision: Precision::Nanos,
        }
    }
}

#[derive(Copy, Clone)]
enum Precision {
    Secs,
    Millis,
    Nanos,
}

struct Fmt<'a> {
    time: &'a TimeParts,
    precision: Precision,
}

impl std::fmt::Display for Fmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.time;
        write!(f, "{:02}:{:02}:{:02}", t.hours, t.mins, t.secs)?;
        match self.precision {
            Precision::Secs => Ok(()),
            Precision::Millis => write!(f, ".{:03}", t.nanos / 1_000_000),
            Precision::Nanos => write!(f, ".{:09}", t.nanos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_nanos() {
        let parts = TimeParts::from_nanos(3_723_004_005_006);
        assert_eq!(
            parts,
            TimeParts {
                hours: 1,
                mins: 2,
                secs: 3,
                nanos: 4_005_006,
            }
        );
    }

    #[test]
    fn test_formatting() {
        let parts = TimeParts::from_nanos(3_723_004_005_006);
        assert_eq!(parts.fmt_hr_min_sec().to_string(), "01:02:03");
        assert_eq!(parts.fmt_hr_min_sec_milli().to_string(), "01:02:03.004");
        assert_eq!(parts.fmt_hr_min_sec_nano().to_string(), "01:02:03.004005006");
    }

    #[test]
    fn test_hours_do_not_wrap_at_a_day() {
        let parts = TimeParts::from_nanos(30 * 3600 * 1_000_000_000);
        assert_eq!(parts.hours, 30);
        assert_eq!(parts.mins, 0);
    }
}
