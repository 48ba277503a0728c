//! Fixed-period locomotion controller.
//!
//! Grounded on `controller/mod.rs`, which turns a fixed-size
//! observation into a fixed-size action once per tick through a small
//! sequence of named stages; here the stages are minimum-jerk trajectory
//! generation, task assembly and a [`crate::solver::TaskSolver`] solve
//! rather than a learned policy's forward pass.

use std::sync::{Arc, Mutex};

use nalgebra::{DMatrix, DVector, Isometry3, UnitQuaternion, Vector3};

use crate::actuator::{ActuatorDriver, ActuatorGateway, ControlMode};
use crate::contacts::SupportPhase;
use crate::estimator::StateEstimator;
use crate::model::{RigidBodyModel, COM_LINK};
use crate::solver::{TaskKind, TaskSolver};

/// Minimum-jerk single-axis trajectory from a start state to a goal state
/// over a fixed duration: `s(t) = s0 + (sf-s0)*(10τ^3 - 15τ^4 + 6τ^5)`,
/// `τ = t/T` clamped to `[0,1]`.
#[derive(Debug, Clone)]
struct MinJerkAxis {
    start: f64,
    goal: f64,
    duration_s: f64,
    elapsed_s: f64,
}

impl MinJerkAxis {
    fn new(start: f64, goal: f64, duration_s: f64) -> Self {
        Self {
            start,
            goal,
            duration_s: duration_s.max(1e-6),
            elapsed_s: 0.0,
        }
    }

    fn reseed(&mut self, start: f64, goal: f64, duration_s: f64) {
        *self = Self::new(start, goal, duration_s);
    }

    /// Advances by `dt` and returns `(position, velocity)`.
    fn step(&mut self, dt: f64) -> (f64, f64) {
        self.elapsed_s = (self.elapsed_s + dt).min(self.duration_s);
        let tau = self.elapsed_s / self.duration_s;
        let tau2 = tau * tau;
        let tau3 = tau2 * tau;
        let tau4 = tau3 * tau;
        let tau5 = tau4 * tau;
        let poly = 10.0 * tau3 - 15.0 * tau4 + 6.0 * tau5;
        let dpoly_dtau = 30.0 * tau2 - 60.0 * tau3 + 30.0 * tau4;
        let span = self.goal - self.start;
        let pos = self.start + span * poly;
        let vel = span * dpoly_dtau / self.duration_s;
        (pos, vel)
    }
}

/// A vector-valued minimum-jerk generator: one [`MinJerkAxis`] per element.
struct MinJerkVector {
    axes: Vec<MinJerkAxis>,
}

impl MinJerkVector {
    fn seeded(start: &[f64], goal: &[f64], duration_s: f64) -> Self {
        Self {
            axes: start
                .iter()
                .zip(goal.iter())
                .map(|(&s, &g)| MinJerkAxis::new(s, g, duration_s))
                .collect(),
        }
    }

    fn reseed(&mut self, start: &[f64], goal: &[f64], duration_s: f64) {
        for (axis, (&s, &g)) in self.axes.iter_mut().zip(start.iter().zip(goal.iter())) {
            axis.reseed(s, g, duration_s);
        }
    }

    fn step(&mut self, dt: f64) -> (Vec<f64>, Vec<f64>) {
        let mut pos = Vec::with_capacity(self.axes.len());
        let mut vel = Vec::with_capacity(self.axes.len());
        for axis in &mut self.axes {
            let (p, v) = axis.step(dt);
            pos.push(p);
            vel.push(v);
        }
        (pos, vel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Off,
    On,
}

pub struct LocomotionGains {
    pub kp_com: f64,
    pub kp_foot: f64,
    pub kp_posture: f64,
}

impl Default for LocomotionGains {
    fn default() -> Self {
        Self {
            kp_com: 2.0,
            kp_foot: 4.0,
            kp_posture: 1.0,
        }
    }
}

pub struct LocomotionController {
    model: Arc<Mutex<RigidBodyModel>>,
    estimator: Arc<Mutex<StateEstimator>>,
    gains: LocomotionGains,
    solver: TaskSolver,
    run_state: RunState,
    support_phase: SupportPhase,
    com_traj: Option<MinJerkVector>,
    foot_traj: Option<MinJerkVector>,
    posture_traj: Option<MinJerkVector>,
    trajectory_duration_s: f64,
    /// `active_dof()` as of the last solver (re)initialisation, so `tick`
    /// can detect an add/remove-joint change that happened without an
    /// intervening [`Self::set_support_phase`] call.
    last_active_dof: usize,
}

impl LocomotionController {
    pub fn new(model: Arc<Mutex<RigidBodyModel>>, estimator: Arc<Mutex<StateEstimator>>) -> Self {
        let active_dof = model.lock().unwrap().active_dof();
        Self {
            model,
            estimator,
            gains: LocomotionGains::default(),
            solver: TaskSolver::new(6, active_dof + 6),
            run_state: RunState::Off,
            support_phase: SupportPhase::Double,
            com_traj: None,
            foot_traj: None,
            posture_traj: None,
            trajectory_duration_s: 1.0,
            last_active_dof: active_dof,
        }
    }

    pub fn set_support_phase(&mut self, phase: SupportPhase) {
        self.support_phase = phase;
        self.reinitialize_solver();
    }

    fn reinitialize_solver(&mut self) {
        let model = self.model.lock().unwrap();
        let active_dof = model.active_dof();
        let m = active_dof + 6;
        let k = match self.support_phase {
            SupportPhase::Double => 12,
            SupportPhase::Left | SupportPhase::Right => 6,
        };
        self.solver.resize(k, m);
        self.last_active_dof = active_dof;
    }

    /// Re-initialises the solver if the active-joint count changed since it
    /// was last sized, without requiring a [`Self::set_support_phase`] call
    /// in between — otherwise a joint add/remove mid-run leaves the solver
    /// validating against a stale `m` and every `tick` silently returns
    /// `None`.
    fn resize_solver_if_active_dof_changed(&mut self) {
        let active_dof = self.model.lock().unwrap().active_dof();
        if active_dof != self.last_active_dof {
            self.reinitialize_solver();
        }
    }

    /// Reseeds all trajectory generators with the current measurement,
    /// commands VELOCITY control on every active joint, and marks the
    /// controller running.
    pub fn start(
        &mut self,
        driver: &mut dyn ActuatorDriver,
        actuators: &mut ActuatorGateway,
        com_goal: [f64; 2],
        foot_goal: [f64; 7],
        posture_goal: &[f64],
        duration_s: f64,
    ) {
        self.trajectory_duration_s = duration_s;
        let snap = self.estimator.lock().unwrap().snapshot();
        let com_now = [snap.q[0], snap.q.get(1).copied().unwrap_or(0.0)];
        self.com_traj = Some(MinJerkVector::seeded(&com_now, &com_goal, duration_s));

        let foot_now = [0.0; 7];
        self.foot_traj = Some(MinJerkVector::seeded(&foot_now, &foot_goal, duration_s));

        let posture_now: Vec<f64> = snap.q.iter().copied().collect();
        self.posture_traj = Some(MinJerkVector::seeded(&posture_now, posture_goal, duration_s));

        self.run_state = RunState::On;
        let _ = actuators.set_control_mode(driver, ControlMode::Velocity, None, None);
    }

    /// Zeroes velocities and returns active joints to POSITION control.
    pub fn stop(&mut self, driver: &mut dyn ActuatorDriver, actuators: &mut ActuatorGateway) {
        self.run_state = RunState::Off;
        let _ = actuators.set_control_reference(driver, 0.0, None);
        let _ = actuators.set_control_mode(driver, ControlMode::Position, None, None);
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::On
    }

    pub fn support_phase(&self) -> SupportPhase {
        self.support_phase
    }

    /// Resolves `(support_foot_link, other_support_foot_link, swing_foot_link)`
    /// for the current support phase, given the left and right foot link
    /// names. In double support both feet bear weight and there is no
    /// swing foot to track, so `left` stands in as the (unused) swing
    /// target passed to [`LocomotionController::tick`].
    pub fn support_feet<'a>(&self, left: &'a str, right: &'a str) -> (&'a str, Option<&'a str>, &'a str) {
        match self.support_phase {
            SupportPhase::Double => (left, Some(right), left),
            SupportPhase::Left => (left, None, right),
            SupportPhase::Right => (right, None, left),
        }
    }

    /// One tick. Returns `None` if the controller is stopped or the
    /// trajectory generators have not been seeded yet.
    /// `other_support_foot_link` is the second foot's link name, required
    /// in [`SupportPhase::Double`] so both support-foot Jacobians stack
    /// into the 12-row constraint block; ignored otherwise.
    pub fn tick(
        &mut self,
        driver: &mut dyn ActuatorDriver,
        actuators: &mut ActuatorGateway,
        support_foot_link: &str,
        other_support_foot_link: Option<&str>,
        swing_foot_link: &str,
        dt: f64,
    ) -> Option<DVector<f64>> {
        if self.run_state != RunState::On {
            return None;
        }
        self.resize_solver_if_active_dof_changed();
        let (com_traj, foot_traj, posture_traj) = match (
            self.com_traj.as_mut(),
            self.foot_traj.as_mut(),
            self.posture_traj.as_mut(),
        ) {
            (Some(c), Some(f), Some(p)) => (c, f, p),
            _ => return None,
        };

        let snap = self.estimator.lock().unwrap().snapshot();
        let model = self.model.lock().unwrap();
        let n_active = model.active_dof();
        let m = n_active + 6;

        // Step 1: recompute H_wb from the support-foot forward kinematics.
        let q_full = match model.compose_full_q(&snap.q) {
            Ok(q) => q,
            Err(_) => return None,
        };
        let support_pose_local = match model.compute_h(&q_full, &Isometry3::identity(), support_foot_link) {
            Ok(p) => p,
            Err(_) => return None,
        };
        let foot_z_world = support_pose_local.rotation * Vector3::z();
        let align = UnitQuaternion::rotation_between(&foot_z_world, &Vector3::z())
            .unwrap_or_else(UnitQuaternion::identity);
        let translation = -(align * support_pose_local.translation.vector);
        let h_wb = Isometry3::from_parts(translation.into(), align);

        // Step 2: trajectory generators.
        let (com_r, com_vr) = com_traj.step(dt);
        let (foot_r, foot_vr) = foot_traj.step(dt);
        let (posture_r, posture_vr) = posture_traj.step(dt);

        // Step 3: task-space velocity commands (proportional tracking).
        let com_now = com_world_xy(&model, &q_full, &h_wb);
        let dx_com = DVector::from_vec(vec![
            com_vr[0] + self.gains.kp_com * (com_r[0] - com_now[0]),
            com_vr[1] + self.gains.kp_com * (com_r[1] - com_now[1]),
        ]);

        let foot_pose = model.forward_kinematics(&q_full, &h_wb, swing_foot_link).ok()?;
        let err_lin = Vector3::new(foot_r[0] - foot_pose[0], foot_r[1] - foot_pose[1], foot_r[2] - foot_pose[2]);
        let err_ang = Vector3::new(foot_r[4] - foot_pose[4], foot_r[5] - foot_pose[5], foot_r[6] - foot_pose[6]);
        let dx_foot = DVector::from_vec(
            (0..3)
                .map(|i| self.gains.kp_foot * err_lin[i])
                .chain((0..3).map(|i| self.gains.kp_foot * err_ang[i]))
                .collect(),
        );
        let _ = foot_vr;

        let dq_posture = DVector::from_iterator(
            n_active,
            (0..n_active).map(|i| posture_vr[i] + self.gains.kp_posture * (posture_r[i] - snap.q[i])),
        );

        // Step 4: populate task matrices.
        let com_jac = model.compute_jacobian(&q_full, &h_wb, COM_LINK, None).ok()?;
        let com_rows = com_jac.rows(0, 2).into_owned();

        let foot_jac = model.compute_jacobian(&q_full, &h_wb, swing_foot_link, None).ok()?;

        let mut posture_a = DMatrix::<f64>::zeros(n_active, m);
        posture_a.view_mut((0, 6), (n_active, n_active)).fill_diagonal(1.0);

        let constraint_rows = if self.support_phase == SupportPhase::Double { 12 } else { 6 };
        let mut constraint_a = DMatrix::<f64>::zeros(constraint_rows, m);
        let support_jac = model.compute_jacobian(&q_full, &h_wb, support_foot_link, None).ok()?;
        constraint_a.view_mut((0, 0), (6, m)).copy_from(&support_jac);
        if self.support_phase == SupportPhase::Double {
            let other_link = other_support_foot_link?;
            let other_jac = model.compute_jacobian(&q_full, &h_wb, other_link, None).ok()?;
            constraint_a.view_mut((6, 0), (6, m)).copy_from(&other_jac);
        }
        let constraint_b = DVector::<f64>::zeros(constraint_a.nrows());

        self.solver.set_constraint(constraint_a, constraint_b).ok()?;
        self.solver.set_task(TaskKind::Com, com_rows, dx_com, 1.0).ok()?;
        self.solver.set_task(TaskKind::Foot, foot_jac, dx_foot, 1.0).ok()?;
        self.solver.set_task(TaskKind::Posture, posture_a, dq_posture, 0.3).ok()?;

        let dq_full = self.solver.solve();

        // Step 5: forward joint-velocity components to the actuator gateway.
        for (k, joint) in model.active_joints().enumerate() {
            let _ = actuators.set_control_reference(driver, dq_full[6 + k], Some(&joint));
        }

        Some(dq_full)
    }
}

fn com_world_xy(model: &RigidBodyModel, q_full: &DVector<f64>, h_wb: &Isometry3<f64>) -> [f64; 2] {
    let com = model.compute_com_position(q_full, h_wb).unwrap_or_else(|_| Vector3::zeros());
    [com.x, com.y]
}
