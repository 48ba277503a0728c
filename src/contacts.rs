//! Contact points and support phase.
//!
//! `ContactPoint` mirrors the data model's lifecycle note verbatim: created
//! per tick by the tactile reader or synthesised as a subtree default,
//! consumed by the contact-wrench solve, dropped at tick end. Grounded
//! structurally on [`crate::config::Subtree`], which already names each
//! subtree's default-contact link.

use nalgebra::Vector3;

use crate::joint::BodyPart;

/// A single contact: linear force + moment, expressed at `application_point`
/// in the world frame.
#[derive(Debug, Clone, Copy)]
pub struct Wrench {
    pub force: Vector3<f64>,
    pub moment: Vector3<f64>,
}

impl Wrench {
    pub fn zero() -> Self {
        Self {
            force: Vector3::zeros(),
            moment: Vector3::zeros(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContactPoint {
    pub body_part: BodyPart,
    pub link_index: usize,
    pub application_point: Vector3<f64>,
    pub wrench: Wrench,
    pub active_taxel_count: u32,
    pub pressure: f64,
}

impl ContactPoint {
    pub fn from_tactile(
        body_part: BodyPart,
        link_index: usize,
        application_point: Vector3<f64>,
        wrench: Wrench,
        active_taxel_count: u32,
        pressure: f64,
    ) -> Self {
        Self {
            body_part,
            link_index,
            application_point,
            wrench,
            active_taxel_count,
            pressure,
        }
    }

    /// A subtree-default contact with unknown wrench, to be solved from FT
    /// measurements.
    pub fn default_for_subtree(body_part: BodyPart, link_index: usize, application_point: Vector3<f64>) -> Self {
        Self {
            body_part,
            link_index,
            application_point,
            wrench: Wrench::zero(),
            active_taxel_count: 0,
            pressure: 0.0,
        }
    }

    /// Zeroes the moment on a low-confidence contact, keeping force and
    /// position: contacts with fewer than 10 active taxels have their
    /// moment fixed to zero rather than being dropped.
    pub fn fix_moment_to_zero(&mut self) {
        self.wrench.moment = Vector3::zeros();
    }
}

/// Which feet are bearing the robot's weight, determining the locomotion
/// controller's constraint set and free (swing) foot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportPhase {
    Double,
    Left,
    Right,
}

impl SupportPhase {
    /// The subtree name of the foot currently free to swing, or `None` in
    /// double support.
    pub fn swing_subtree(self) -> Option<&'static str> {
        match self {
            SupportPhase::Double => None,
            SupportPhase::Left => Some("right_leg"),
            SupportPhase::Right => Some("left_leg"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixing_moment_preserves_force() {
        let mut c = ContactPoint::from_tactile(
            "left_foot".to_string(),
            3,
            Vector3::new(0.1, 0.0, 0.0),
            Wrench {
                force: Vector3::new(0.0, 0.0, 50.0),
                moment: Vector3::new(1.0, 2.0, 3.0),
            },
            4,
            0.8,
        );
        c.fix_moment_to_zero();
        assert_eq!(c.wrench.moment, Vector3::zeros());
        assert_eq!(c.wrench.force, Vector3::new(0.0, 0.0, 50.0));
    }

    #[test]
    fn double_support_has_no_swing_subtree() {
        assert_eq!(SupportPhase::Double.swing_subtree(), None);
        assert_eq!(SupportPhase::Left.swing_subtree(), Some("right_leg"));
    }
}
