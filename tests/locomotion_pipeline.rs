use std::sync::{Arc, Mutex};

use nalgebra::{Isometry3, Matrix3, Vector3};

use wbc_core::actuator::{ActuatorDriver, ActuatorGateway, ControlMode, ControlParamId};
use wbc_core::config::{
    Configuration, DisplayQuirks, EstimationDefaults, FixedBase, SkinDynLibMap, Subtree, SubtreeTable,
};
use wbc_core::contacts::SupportPhase;
use wbc_core::estimator::StateEstimator;
use wbc_core::joint::JointId;
use wbc_core::locomotion::LocomotionController;
use wbc_core::model::{JointSpec, LinkSpec, RigidBodyModel, RigidBodyTree};
use wbc_core::sensors::{SensorDriver, SensorKind};

struct EncoderDriver {
    l_hip: f64,
    r_hip: f64,
}

impl SensorDriver for EncoderDriver {
    fn poll(&mut self, kind: SensorKind, id: &str) -> Option<(f64, Vec<f64>)> {
        match (kind, id) {
            (SensorKind::Encoder, "l_hip_encoder") => Some((1.0, vec![self.l_hip])),
            (SensorKind::Encoder, "r_hip_encoder") => Some((1.0, vec![self.r_hip])),
            _ => None,
        }
    }
}

/// Records every command handed to it; always succeeds.
#[derive(Default)]
struct RecordingDriver {
    references: Vec<(JointId, f64)>,
}

impl ActuatorDriver for RecordingDriver {
    fn rearm(&mut self, _joint: &JointId, _mode: ControlMode) -> Result<(), String> {
        Ok(())
    }
    fn set_reference(&mut self, joint: &JointId, _mode: ControlMode, value: f64) -> Result<(), String> {
        self.references.push((joint.clone(), value));
        Ok(())
    }
    fn set_param(&mut self, _joint: &JointId, _param: ControlParamId, _value: f64) -> Result<(), String> {
        Ok(())
    }
}

/// A minimal biped: a floating base with one hip joint per leg, each
/// terminating directly in a foot link.
fn biped_model() -> Arc<Mutex<RigidBodyModel>> {
    let links = vec![
        LinkSpec::new("base_link", 10.0, Vector3::zeros(), Matrix3::identity() * 0.1),
        LinkSpec::new("l_foot", 1.0, Vector3::new(0.0, 0.0, -0.05), Matrix3::identity() * 0.01),
        LinkSpec::new("r_foot", 1.0, Vector3::new(0.0, 0.0, -0.05), Matrix3::identity() * 0.01),
    ];
    let joints = vec![
        JointSpec {
            id: JointId::new("l_leg", 0),
            name: "l_hip".to_string(),
            parent_link: 0,
            child_link: 1,
            origin: Isometry3::translation(0.0, 0.1, -0.8),
            axis_local: Some(Vector3::y()),
            limits: (-1.5, 1.5),
        },
        JointSpec {
            id: JointId::new("r_leg", 0),
            name: "r_hip".to_string(),
            parent_link: 0,
            child_link: 2,
            origin: Isometry3::translation(0.0, -0.1, -0.8),
            axis_local: Some(Vector3::y()),
            limits: (-1.5, 1.5),
        },
    ];
    let tree = RigidBodyTree::new(links, joints, 0);
    let mut model = RigidBodyModel::new(tree);
    model.add_joint(JointId::new("l_leg", 0)).unwrap();
    model.add_joint(JointId::new("r_leg", 0)).unwrap();
    Arc::new(Mutex::new(model))
}

fn biped_config() -> Configuration {
    Configuration {
        robot_name: "biped".to_string(),
        local_name: "test".to_string(),
        urdf_path: String::new(),
        fixed_base: FixedBase::LSole,
        skin_dyn_lib_links: SkinDynLibMap::default(),
        subtrees: SubtreeTable::new(vec![
            Subtree {
                name: "l_leg".to_string(),
                member_links: vec!["base_link".to_string(), "l_foot".to_string()],
                default_contact_link: "l_foot".to_string(),
            },
            Subtree {
                name: "r_leg".to_string(),
                member_links: vec!["r_foot".to_string()],
                default_contact_link: "r_foot".to_string(),
            },
        ]),
        torque_module_connection: None,
        use_external_torque: false,
        estimation: EstimationDefaults::default(),
        display: DisplayQuirks::default(),
        ft_offsets: Default::default(),
        control_period_s: 0.01,
    }
}

#[test]
fn single_support_tick_commands_every_active_joint() {
    let model = biped_model();
    let config = biped_config();
    let estimator = Arc::new(Mutex::new(StateEstimator::new(Arc::clone(&model), &config, 0.01)));
    {
        let mut est = estimator.lock().unwrap();
        est.register_joint_sensor(JointId::new("l_leg", 0), "l_hip_encoder");
        est.register_joint_sensor(JointId::new("r_leg", 0), "r_hip_encoder");
    }
    let mut sensor_driver = EncoderDriver { l_hip: 0.0, r_hip: 0.1 };
    estimator.lock().unwrap().tick(&mut sensor_driver, 0.01);

    let mut controller = LocomotionController::new(Arc::clone(&model), Arc::clone(&estimator));
    controller.set_support_phase(SupportPhase::Left);

    let mut actuators = ActuatorGateway::new(false);
    actuators.register_joint(JointId::new("l_leg", 0), ControlMode::Position);
    actuators.register_joint(JointId::new("r_leg", 0), ControlMode::Position);
    let mut driver = RecordingDriver::default();

    controller.start(
        &mut driver,
        &mut actuators,
        [0.0, 0.0],
        [0.0, -0.2, -0.8, 0.0, 0.0, 0.0, 1.0],
        &[0.0, 0.1],
        1.0,
    );
    assert!(controller.is_running());

    let (support, other, swing) = controller.support_feet("l_foot", "r_foot");
    assert_eq!(support, "l_foot");
    assert_eq!(other, None);
    assert_eq!(swing, "r_foot");

    let result = controller.tick(&mut driver, &mut actuators, support, other, swing, 0.01);
    let dq = result.expect("tick should produce a solved velocity vector for a well-formed biped model");
    assert_eq!(dq.len(), 8); // 6 base DOF + 2 active joints
    assert!(dq.iter().all(|v| v.is_finite()));

    // Every active joint must receive exactly one velocity command this tick.
    let commanded: std::collections::HashSet<_> = driver.references.iter().map(|(j, _)| j.clone()).collect();
    assert!(commanded.contains(&JointId::new("l_leg", 0)));
    assert!(commanded.contains(&JointId::new("r_leg", 0)));
}

#[test]
fn tick_resizes_solver_after_joint_removed_mid_run() {
    let model = biped_model();
    let config = biped_config();
    let estimator = Arc::new(Mutex::new(StateEstimator::new(Arc::clone(&model), &config, 0.01)));
    {
        let mut est = estimator.lock().unwrap();
        est.register_joint_sensor(JointId::new("l_leg", 0), "l_hip_encoder");
        est.register_joint_sensor(JointId::new("r_leg", 0), "r_hip_encoder");
    }
    let mut sensor_driver = EncoderDriver { l_hip: 0.0, r_hip: 0.1 };
    estimator.lock().unwrap().tick(&mut sensor_driver, 0.01);

    let mut controller = LocomotionController::new(Arc::clone(&model), Arc::clone(&estimator));
    controller.set_support_phase(SupportPhase::Left);

    let mut actuators = ActuatorGateway::new(false);
    actuators.register_joint(JointId::new("l_leg", 0), ControlMode::Position);
    actuators.register_joint(JointId::new("r_leg", 0), ControlMode::Position);
    let mut driver = RecordingDriver::default();

    controller.start(
        &mut driver,
        &mut actuators,
        [0.0, 0.0],
        [0.0, -0.2, -0.8, 0.0, 0.0, 0.0, 1.0],
        &[0.0, 0.1],
        1.0,
    );

    let (support, other, swing) = controller.support_feet("l_foot", "r_foot");
    let first = controller.tick(&mut driver, &mut actuators, support, other, swing, 0.01);
    assert_eq!(first.expect("first tick should solve with both legs active").len(), 8);

    // Remove a joint without an intervening `set_support_phase` call — the
    // solver must still resize itself on the next `tick`, not keep
    // validating against the stale two-joint size.
    model.lock().unwrap().remove_joint(&JointId::new("r_leg", 0)).unwrap();
    estimator.lock().unwrap().tick(&mut sensor_driver, 0.02);

    let second = controller.tick(&mut driver, &mut actuators, support, other, swing, 0.01);
    let dq = second.expect("tick must resize the solver itself after a mid-run joint removal");
    assert_eq!(dq.len(), 7); // 6 base DOF + 1 remaining active joint
    assert!(dq.iter().all(|v| v.is_finite()));
}

#[test]
fn stopped_controller_returns_no_tick_result() {
    let model = biped_model();
    let config = biped_config();
    let estimator = Arc::new(Mutex::new(StateEstimator::new(Arc::clone(&model), &config, 0.01)));
    let mut controller = LocomotionController::new(Arc::clone(&model), Arc::clone(&estimator));
    let mut actuators = ActuatorGateway::new(false);
    let mut driver = RecordingDriver::default();

    let result = controller.tick(&mut driver, &mut actuators, "l_foot", None, "r_foot", 0.01);
    assert!(result.is_none());
}
