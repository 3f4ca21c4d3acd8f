//! Random waypoint movement: pick a uniformly random destination inside a rectangle, travel
//! there in a straight line at a uniformly random speed, pause, repeat.

use rand::Rng;
use rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use sim_helper::emulated_time::EmulatedTime;
use sim_helper::simulation_time::SimulationTime;

use super::{CourseChangeSource, Vector};

/// An axis-aligned area in the z = 0 plane.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rectangle {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Rectangle {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        assert!(min_x <= max_x && min_y <= max_y, "Empty rectangle");
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn contains(&self, p: &Vector) -> bool {
        (self.min_x..=self.max_x).contains(&p.x) && (self.min_y..=self.max_y).contains(&p.y)
    }

    fn sample(&self, rng: &mut impl Rng) -> Vector {
        let x = if self.min_x < self.max_x {
            rng.gen_range(self.min_x..self.max_x)
        } else {
            self.min_x
        };
        let y = if self.min_y < self.max_y {
            rng.gen_range(self.min_y..self.max_y)
        } else {
            self.min_y
        };
        Vector::new(x, y, 0.0)
    }
}

#[derive(Copy, Clone, Debug)]
enum Phase {
    Paused {
        until: EmulatedTime,
    },
    Moving {
        start_time: EmulatedTime,
        start: Vector,
        arrival: EmulatedTime,
        target: Vector,
    },
}

#[derive(Debug)]
pub struct RandomWaypointMobilityModel {
    bounds: Rectangle,
    max_speed: f64,
    pause: SimulationTime,
    rng: Xoshiro256PlusPlus,
    position: Vector,
    phase: Phase,
    course_changes: CourseChangeSource,
}

impl RandomWaypointMobilityModel {
    /// Starts at `position` and begins its first leg at `now`. A `max_speed` of zero keeps the
    /// node where it is forever.
    pub fn new(
        now: EmulatedTime,
        position: Vector,
        bounds: Rectangle,
        max_speed: f64,
        pause: SimulationTime,
        seed: u64,
    ) -> Self {
        let until = if max_speed > 0.0 {
            now
        } else {
            EmulatedTime::MAX
        };
        Self {
            bounds,
            max_speed,
            pause,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            position,
            phase: Phase::Paused { until },
            course_changes: CourseChangeSource::default(),
        }
    }

    pub(crate) fn course_changes_mut(&mut self) -> &mut CourseChangeSource {
        &mut self.course_changes
    }

    fn begin_leg(&mut self, start_time: EmulatedTime) {
        let target = self.bounds.sample(&mut self.rng);
        // (0, max_speed]
        let speed = self.max_speed * (1.0 - self.rng.gen::<f64>());
        let travel = self.position.distance(&target) / speed;
        let arrival = SimulationTime::try_from_secs_f64(travel)
            .map(|d| start_time.saturating_add(d))
            .unwrap_or(EmulatedTime::MAX);

        self.phase = Phase::Moving {
            start_time,
            start: self.position,
            arrival,
            target,
        };
        let velocity = self.leg_velocity();
        self.course_changes
            .notify(start_time, self.position, velocity);
    }

    fn leg_velocity(&self) -> Vector {
        match self.phase {
            Phase::Moving {
                start_time,
                start,
                arrival,
                target,
            } => {
                let secs = arrival.duration_since(&start_time).as_secs_f64();
                if secs > 0.0 {
                    (target - start) / secs
                } else {
                    Vector::ZERO
                }
            }
            Phase::Paused { .. } => Vector::ZERO,
        }
    }

    pub fn advance(&mut self, now: EmulatedTime) {
        loop {
            match self.phase {
                Phase::Paused { until } => {
                    if now < until {
                        return;
                    }
                    self.begin_leg(until);
                }
                Phase::Moving {
                    start_time,
                    start,
                    arrival,
                    target,
                } => {
                    if now < arrival {
                        let total = arrival.duration_since(&start_time).as_secs_f64();
                        let elapsed = now.saturating_duration_since(&start_time).as_secs_f64();
                        self.position = start + (target - start) * (elapsed / total);
                        return;
                    }
                    self.position = target;
                    self.phase = Phase::Paused {
                        until: arrival.saturating_add(self.pause),
                    };
                    self.course_changes.notify(arrival, target, Vector::ZERO);
                }
            }
        }
    }

    pub fn position(&mut self, now: EmulatedTime) -> Vector {
        self.advance(now);
        self.position
    }

    pub fn velocity(&mut self, now: EmulatedTime) -> Vector {
        self.advance(now);
        self.leg_velocity()
    }

    /// Teleport to `position` and pause there before choosing a new destination.
    pub fn set_position(&mut self, now: EmulatedTime, position: Vector) {
        self.advance(now);
        self.position = position;
        let until = if self.max_speed > 0.0 {
            now.saturating_add(self.pause)
        } else {
            EmulatedTime::MAX
        };
        self.phase = Phase::Paused { until };
        self.course_changes.notify(now, position, Vector::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> EmulatedTime {
        EmulatedTime::SIMULATION_START + SimulationTime::from_secs(secs)
    }

    fn bounds() -> Rectangle {
        Rectangle::new(0.0, 72.0, 0.0, 72.0)
    }

    #[test]
    fn test_stays_in_bounds_and_respects_speed() {
        let mut m = RandomWaypointMobilityModel::new(
            at(0),
            Vector::new(10.0, 10.0, 0.0),
            bounds(),
            0.5,
            SimulationTime::from_secs(2),
            1,
        );

        let mut last = m.position(at(0));
        for t in 1..2000 {
            let p = m.position(at(t));
            assert!(bounds().contains(&p), "{p} out of bounds");
            assert!(last.distance(&p) <= 0.5 + 1e-9);
            assert!(m.velocity(at(t)).length() <= 0.5 + 1e-9);
            last = p;
        }
    }

    #[test]
    fn test_zero_speed_never_moves() {
        let start = Vector::new(3.0, 4.0, 0.0);
        let mut m =
            RandomWaypointMobilityModel::new(at(0), start, bounds(), 0.0, SimulationTime::ZERO, 1);
        assert_eq!(m.position(at(1000)), start);
        assert_eq!(m.velocity(at(1000)), Vector::ZERO);
    }

    #[test]
    fn test_same_seed_same_path() {
        let make = || {
            RandomWaypointMobilityModel::new(
                at(0),
                Vector::ZERO,
                bounds(),
                1.0,
                SimulationTime::ZERO,
                42,
            )
        };
        let (mut a, mut b) = (make(), make());
        for t in (0..500).step_by(7) {
            assert_eq!(a.position(at(t)), b.position(at(t)));
        }
    }
}
