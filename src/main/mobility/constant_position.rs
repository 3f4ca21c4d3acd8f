use sim_helper::emulated_time::EmulatedTime;

use super::{CourseChangeSource, Vector};

/// A node that never moves unless explicitly placed somewhere else.
#[derive(Debug)]
pub struct ConstantPositionMobilityModel {
    position: Vector,
    course_changes: CourseChangeSource,
}

impl ConstantPositionMobilityModel {
    pub fn new(position: Vector) -> Self {
        Self {
            position,
            course_changes: CourseChangeSource::default(),
        }
    }

    pub(crate) fn course_changes_mut(&mut self) -> &mut CourseChangeSource {
        &mut self.course_changes
    }

    pub fn position(&self) -> Vector {
        self.position
    }

    pub fn set_position(&mut self, now: EmulatedTime, position: Vector) {
        self.position = position;
        self.course_changes.notify(now, position, Vector::ZERO);
    }
}
