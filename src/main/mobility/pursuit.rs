//! A model that moves in a straight line toward a target it is given, arriving exactly at the
//! requested time, then stands still until given a new target.

use sim_helper::emulated_time::EmulatedTime;

use super::{CourseChangeSource, Vector};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PursuitState {
    Idle,
    Pursuing,
}

/// A straight-line movement toward `target`. Positions are interpolated from the start of the
/// leg so that repeated queries never accumulate rounding error.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Leg {
    start_time: EmulatedTime,
    start: Vector,
    arrival: EmulatedTime,
    target: Vector,
}

impl Leg {
    fn velocity(&self) -> Vector {
        let secs = self.arrival.duration_since(&self.start_time).as_secs_f64();
        (self.target - self.start) / secs
    }

    fn position_at(&self, now: EmulatedTime) -> Vector {
        if now >= self.arrival {
            return self.target;
        }
        let total = self.arrival.duration_since(&self.start_time).as_secs_f64();
        let elapsed = now.saturating_duration_since(&self.start_time).as_secs_f64();
        self.start + (self.target - self.start) * (elapsed / total)
    }
}

#[derive(Debug)]
pub struct PursuitMobilityModel {
    position: Vector,
    leg: Option<Leg>,
    last_update: EmulatedTime,
    course_changes: CourseChangeSource,
}

impl PursuitMobilityModel {
    pub fn new(now: EmulatedTime, position: Vector) -> Self {
        Self {
            position,
            leg: None,
            last_update: now,
            course_changes: CourseChangeSource::default(),
        }
    }

    pub(crate) fn course_changes_mut(&mut self) -> &mut CourseChangeSource {
        &mut self.course_changes
    }

    pub fn state(&self) -> PursuitState {
        if self.leg.is_some() {
            PursuitState::Pursuing
        } else {
            PursuitState::Idle
        }
    }

    /// Where the current pursuit ends, if any.
    pub fn target(&self) -> Option<Vector> {
        self.leg.map(|leg| leg.target)
    }

    /// Move along the current leg up to `now`. Arriving ends the pursuit.
    pub fn advance(&mut self, now: EmulatedTime) {
        if now < self.last_update {
            return;
        }
        self.last_update = now;

        let Some(leg) = self.leg else {
            return;
        };
        self.position = leg.position_at(now);
        if now >= leg.arrival {
            self.leg = None;
        }
    }

    pub fn position(&mut self, now: EmulatedTime) -> Vector {
        self.advance(now);
        self.position
    }

    pub fn velocity(&mut self, now: EmulatedTime) -> Vector {
        self.advance(now);
        self.leg.map(|leg| leg.velocity()).unwrap_or(Vector::ZERO)
    }

    /// Head for `target`, arriving at `arrival`. An arrival time that is not in the future snaps
    /// the model onto the target immediately. Listeners are only told about the new course when
    /// it replaces a pursuit that was still in progress.
    pub fn set_target(&mut self, now: EmulatedTime, arrival: EmulatedTime, target: Vector) {
        self.advance(now);
        let had_leg = self.leg.is_some();

        if arrival <= now || self.position == target {
            self.position = target;
            self.leg = None;
        } else {
            self.leg = Some(Leg {
                start_time: now,
                start: self.position,
                arrival,
                target,
            });
        }

        if had_leg {
            let velocity = self.leg.map(|leg| leg.velocity()).unwrap_or(Vector::ZERO);
            self.course_changes.notify(now, self.position, velocity);
        }
    }

    /// Teleport to `position`, abandoning any pursuit.
    pub fn set_position(&mut self, now: EmulatedTime, position: Vector) {
        self.advance(now);
        let was_moving = self
            .leg
            .map(|leg| leg.velocity() != Vector::ZERO)
            .unwrap_or(false);

        self.position = position;
        self.leg = None;

        if was_moving {
            self.course_changes.notify(now, self.position, Vector::ZERO);
        }
    }

    /// Stop where we are.
    pub fn end_mobility(&mut self, now: EmulatedTime) {
        self.advance(now);
        self.leg = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use sim_helper::simulation_time::SimulationTime;

    use super::*;

    fn at(secs: f64) -> EmulatedTime {
        EmulatedTime::SIMULATION_START + SimulationTime::try_from_secs_f64(secs).unwrap()
    }

    fn close(a: Vector, b: Vector) -> bool {
        a.distance(&b) < 1e-9
    }

    #[test]
    fn test_arrival_law() {
        let mut m = PursuitMobilityModel::new(at(0.0), Vector::ZERO);
        m.set_target(at(0.0), at(10.0), Vector::new(10.0, 0.0, 0.0));

        assert_eq!(m.state(), PursuitState::Pursuing);
        assert!(close(m.velocity(at(0.0)), Vector::new(1.0, 0.0, 0.0)));
        assert!(close(m.position(at(2.5)), Vector::new(2.5, 0.0, 0.0)));
        assert!(close(m.position(at(5.0)), Vector::new(5.0, 0.0, 0.0)));
        assert_eq!(m.position(at(10.0)), Vector::new(10.0, 0.0, 0.0));
        assert_eq!(m.state(), PursuitState::Idle);
        assert_eq!(m.velocity(at(11.0)), Vector::ZERO);
        assert_eq!(m.position(at(20.0)), Vector::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_many_queries_do_not_drift() {
        let mut m = PursuitMobilityModel::new(at(0.0), Vector::new(1.0, 1.0, 0.0));
        let target = Vector::new(-7.0, 13.0, 2.0);
        m.set_target(at(0.0), at(3.0), target);
        for i in 0..3000 {
            m.position(at(i as f64 / 1000.0));
        }
        assert_eq!(m.position(at(3.0)), target);
        assert_eq!(m.state(), PursuitState::Idle);
    }

    #[test]
    fn test_repeated_queries_at_same_time() {
        let mut m = PursuitMobilityModel::new(at(0.0), Vector::new(1.0, 2.0, 0.0));
        m.set_target(at(0.3), at(7.3), Vector::new(-5.0, 11.0, 3.0));

        let first = m.position(at(4.123));
        let velocity = m.velocity(at(4.123));
        let second = m.position(at(4.123));
        assert_eq!(first, second);
        assert_eq!(velocity, m.velocity(at(4.123)));
        assert_eq!(m.state(), PursuitState::Pursuing);
    }

    #[test]
    fn test_retarget_midway() {
        let mut m = PursuitMobilityModel::new(at(0.0), Vector::ZERO);
        m.set_target(at(0.0), at(10.0), Vector::new(10.0, 0.0, 0.0));
        m.set_target(at(5.0), at(10.0), Vector::new(5.0, 5.0, 0.0));

        assert!(close(m.velocity(at(5.0)), Vector::new(0.0, 1.0, 0.0)));
        assert!(close(m.position(at(7.5)), Vector::new(5.0, 2.5, 0.0)));
        assert_eq!(m.position(at(10.0)), Vector::new(5.0, 5.0, 0.0));
    }

    #[test]
    fn test_past_arrival_snaps() {
        let mut m = PursuitMobilityModel::new(at(0.0), Vector::ZERO);
        m.set_target(at(4.0), at(4.0), Vector::new(3.0, 4.0, 0.0));
        assert_eq!(m.state(), PursuitState::Idle);
        assert_eq!(m.position(at(4.0)), Vector::new(3.0, 4.0, 0.0));
        assert_eq!(m.velocity(at(4.0)), Vector::ZERO);
    }

    #[test]
    fn test_target_at_current_position_is_idle() {
        let mut m = PursuitMobilityModel::new(at(0.0), Vector::new(1.0, 2.0, 0.0));
        m.set_target(at(0.0), at(5.0), Vector::new(1.0, 2.0, 0.0));
        assert_eq!(m.state(), PursuitState::Idle);
    }

    #[test]
    fn test_course_change_notifications() {
        let count = Arc::new(AtomicU32::new(0));
        let mut m = PursuitMobilityModel::new(at(0.0), Vector::ZERO);
        let count_clone = Arc::clone(&count);
        let _handle = m.course_changes_mut().add_listener(move |_, _| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // starting from idle
        m.set_target(at(0.0), at(10.0), Vector::new(10.0, 0.0, 0.0));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // replacing a pursuit in progress
        m.set_target(at(1.0), at(10.0), Vector::new(0.0, 10.0, 0.0));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // teleporting while moving
        m.set_position(at(2.0), Vector::new(50.0, 50.0, 0.0));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(m.state(), PursuitState::Idle);

        // teleporting while idle
        m.set_position(at(3.0), Vector::ZERO);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_end_mobility() {
        let mut m = PursuitMobilityModel::new(at(0.0), Vector::ZERO);
        m.set_target(at(0.0), at(10.0), Vector::new(10.0, 0.0, 0.0));
        m.end_mobility(at(4.0));
        assert_eq!(m.state(), PursuitState::Idle);
        assert!(close(m.position(at(8.0)), Vector::new(4.0, 0.0, 0.0)));
    }
}
