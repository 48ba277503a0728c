//! Per-joint actuator control mode and reference commands.
//!
//! Grounded on `controller/mod.rs` (one `Vec<f64>` of
//! per-joint actuation state, indexed the same way as the joint order) for
//! the "dense per-joint array keyed by canonical order" shape, generalised
//! to a [`JointId`]-keyed map since this core's joint set is mutable.

use std::collections::HashMap;

use crate::error::ActuatorError;
use crate::joint::JointId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Position,
    Velocity,
    Torque,
    ImpedancePosition,
    OpenLoop,
    MotorPwm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlParamId {
    PidP,
    PidI,
    PidD,
    RefSpeed,
    CtrlOffset,
}

/// Commands the underlying driver for one joint's control mode. Returning
/// `Err` means the re-arm failed and the gateway keeps the previous mode —
/// failure to re-arm is fatal for that joint, so the previous mode is
/// retained rather than left in an unknown state.
pub trait ActuatorDriver: Send {
    fn rearm(&mut self, joint: &JointId, mode: ControlMode) -> Result<(), String>;
    fn set_reference(&mut self, joint: &JointId, mode: ControlMode, value: f64) -> Result<(), String>;
    fn set_param(&mut self, joint: &JointId, param: ControlParamId, value: f64) -> Result<(), String>;
}

struct JointActuatorState {
    mode: ControlMode,
}

pub struct ActuatorGateway {
    state: HashMap<JointId, JointActuatorState>,
    /// When set, torque references are forwarded to an external
    /// torque-control module instead of the low-level driver.
    external_torque_module: bool,
}

fn reference_is_valid_for_mode(mode: ControlMode, value: f64) -> bool {
    match mode {
        ControlMode::MotorPwm => (-100.0..=100.0).contains(&value),
        ControlMode::Position | ControlMode::ImpedancePosition => value.is_finite(),
        _ => value.is_finite(),
    }
}

impl ActuatorGateway {
    pub fn new(use_external_torque_module: bool) -> Self {
        Self {
            state: HashMap::new(),
            external_torque_module: use_external_torque_module,
        }
    }

    pub fn register_joint(&mut self, joint: JointId, initial_mode: ControlMode) {
        self.state.insert(joint, JointActuatorState { mode: initial_mode });
    }

    pub fn unregister_joint(&mut self, joint: &JointId) {
        self.state.remove(joint);
    }

    pub fn mode_of(&self, joint: &JointId) -> Result<ControlMode, ActuatorError> {
        self.state
            .get(joint)
            .map(|s| s.mode)
            .ok_or_else(|| ActuatorError::UnknownJoint(joint.clone()))
    }

    fn joints_for(&self, joint: Option<&JointId>) -> Vec<JointId> {
        match joint {
            Some(j) => vec![j.clone()],
            None => self.state.keys().cloned().collect(),
        }
    }

    pub fn set_control_mode(
        &mut self,
        driver: &mut dyn ActuatorDriver,
        mode: ControlMode,
        reference: Option<f64>,
        joint: Option<&JointId>,
    ) -> Result<(), ActuatorError> {
        for j in self.joints_for(joint) {
            let previous = self
                .state
                .get(&j)
                .map(|s| s.mode)
                .ok_or_else(|| ActuatorError::UnknownJoint(j.clone()))?;
            if driver.rearm(&j, mode).is_err() {
                return Err(ActuatorError::ReArmFailed(j, mode));
            }
            self.state.get_mut(&j).unwrap().mode = mode;
            if let Some(r) = reference {
                if let Err(e) = self.set_control_reference(driver, r, Some(&j)) {
                    self.state.get_mut(&j).unwrap().mode = previous;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    pub fn set_control_reference(
        &mut self,
        driver: &mut dyn ActuatorDriver,
        value: f64,
        joint: Option<&JointId>,
    ) -> Result<(), ActuatorError> {
        for j in self.joints_for(joint) {
            let mode = self
                .state
                .get(&j)
                .map(|s| s.mode)
                .ok_or_else(|| ActuatorError::UnknownJoint(j.clone()))?;
            if !reference_is_valid_for_mode(mode, value) {
                return Err(ActuatorError::InvalidReference(j, mode));
            }
            if mode == ControlMode::Torque && self.external_torque_module {
                // Forwarded out-of-band; the low-level driver is not
                // touched for torque references under this configuration.
                continue;
            }
            let _ = driver.set_reference(&j, mode, value);
        }
        Ok(())
    }

    pub fn set_control_param(
        &mut self,
        driver: &mut dyn ActuatorDriver,
        param: ControlParamId,
        value: f64,
        joint: Option<&JointId>,
    ) -> Result<(), ActuatorError> {
        for j in self.joints_for(joint) {
            if !self.state.contains_key(&j) {
                return Err(ActuatorError::UnknownJoint(j));
            }
            let _ = driver.set_param(&j, param, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOkDriver;
    impl ActuatorDriver for AlwaysOkDriver {
        fn rearm(&mut self, _joint: &JointId, _mode: ControlMode) -> Result<(), String> {
            Ok(())
        }
        fn set_reference(&mut self, _joint: &JointId, _mode: ControlMode, _value: f64) -> Result<(), String> {
            Ok(())
        }
        fn set_param(&mut self, _joint: &JointId, _param: ControlParamId, _value: f64) -> Result<(), String> {
            Ok(())
        }
    }

    struct RefusingDriver;
    impl ActuatorDriver for RefusingDriver {
        fn rearm(&mut self, _joint: &JointId, mode: ControlMode) -> Result<(), String> {
            if mode == ControlMode::Torque {
                Err("refused".to_string())
            } else {
                Ok(())
            }
        }
        fn set_reference(&mut self, _joint: &JointId, _mode: ControlMode, _value: f64) -> Result<(), String> {
            Ok(())
        }
        fn set_param(&mut self, _joint: &JointId, _param: ControlParamId, _value: f64) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn failed_rearm_retains_previous_mode() {
        let mut gw = ActuatorGateway::new(false);
        let j = JointId::new("arm", 0);
        gw.register_joint(j.clone(), ControlMode::Position);
        let mut driver = RefusingDriver;

        let result = gw.set_control_mode(&mut driver, ControlMode::Torque, None, Some(&j));
        assert!(matches!(result, Err(ActuatorError::ReArmFailed(_, ControlMode::Torque))));
        assert_eq!(gw.mode_of(&j).unwrap(), ControlMode::Position);
    }

    #[test]
    fn pwm_reference_out_of_range_is_rejected() {
        let mut gw = ActuatorGateway::new(false);
        let j = JointId::new("arm", 0);
        gw.register_joint(j.clone(), ControlMode::MotorPwm);
        let mut driver = AlwaysOkDriver;

        assert!(matches!(
            gw.set_control_reference(&mut driver, 150.0, Some(&j)),
            Err(ActuatorError::InvalidReference(_, ControlMode::MotorPwm))
        ));
    }

    #[test]
    fn unknown_joint_is_rejected() {
        let mut gw = ActuatorGateway::new(false);
        let mut driver = AlwaysOkDriver;
        let j = JointId::new("ghost", 0);
        assert!(matches!(
            gw.set_control_reference(&mut driver, 1.0, Some(&j)),
            Err(ActuatorError::UnknownJoint(_))
        ));
    }
}
