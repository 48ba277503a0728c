//! StateEstimator: the periodic tick that turns raw sensor samples into a
//! published whole-body estimate.
//!
//! Grounded on `simulation.rs`'s fixed-dt `step()` — one method
//! that reads input, pushes it through the physics model and leaves fresh
//! state behind for readers — generalised from a single in-process physics
//! world to a mutex-guarded model shared with the locomotion controller.
//! The tick body runs its eight stages (sensor read, differentiate, filter,
//! solve contacts, reconstruct torques, publish) in a fixed order each
//! period.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use nalgebra::{DVector, Isometry3, UnitQuaternion, Vector3};

use crate::config::{Configuration, FixedBase};
use crate::contacts::{ContactPoint, SupportPhase, Wrench};
use crate::filters::{AdaptiveWindowFilter, LowPassFilter, PolyOrder};
use crate::joint::JointId;
use crate::model::RigidBodyModel;
use crate::rls::RecursiveLls;
use crate::sensors::{SensorDriver, SensorGateway, SensorKind};

/// Tagged estimate family a consumer can subscribe to via
/// [`StateEstimator::add_estimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EstimateKind {
    JointPosition,
    JointVelocity,
    JointAcceleration,
    JointTorque,
    MotorTorque,
    JointTorqueDerivative,
    MotorTorqueDerivative,
    MotorPwm,
    Imu,
    Ft,
    ExternalWrench,
}

/// Runtime-settable estimation parameters.
#[derive(Debug, Clone)]
pub enum EstimationParam {
    AdaptiveWindowMaxSize(usize),
    AdaptiveWindowThreshold(f64),
    LowPassCutoffHz(f64),
    EnableOmegaDomegaImu(bool),
    MinTaxel(u32),
    /// Supplemented feature (SPEC_FULL.md, grounded on
    /// `wholeBodyDynamicsStatesInterfaces.cpp`): a per-FT-sensor zero
    /// offset applied before low-passing.
    FtOffset(String, [f64; 6]),
}

#[derive(Debug, Clone, Copy)]
pub struct ImuReading {
    pub orientation: UnitQuaternion<f64>,
    pub lin_acc: Vector3<f64>,
    pub ang_vel: Vector3<f64>,
    pub mag: Vector3<f64>,
}

impl ImuReading {
    /// Raw layout: orientation quaternion `(x,y,z,w)`, linAcc, angVel, mag.
    fn from_raw(raw: &[f64]) -> Self {
        let orientation = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
            raw[3], raw[0], raw[1], raw[2],
        ));
        Self {
            orientation,
            lin_acc: Vector3::new(raw[4], raw[5], raw[6]),
            ang_vel: Vector3::new(raw[7], raw[8], raw[9]),
            mag: Vector3::new(raw[10], raw[11], raw[12]),
        }
    }
}

/// The consistent, mutex-protected linearisation point external callers
/// observe.
#[derive(Debug, Clone)]
pub struct EstimateSnapshot {
    pub timestamp: f64,
    pub q: DVector<f64>,
    pub qdot: DVector<f64>,
    pub qddot: DVector<f64>,
    pub joint_torque: DVector<f64>,
    pub imu: HashMap<String, ImuReading>,
    pub ft: HashMap<String, Wrench>,
    pub contacts: Vec<ContactPoint>,
    pub external_wrenches: Vec<(String, Wrench)>,
    pub support_phase: SupportPhase,
    pub h_wb: Isometry3<f64>,
}

impl EstimateSnapshot {
    fn empty(n_active: usize) -> Self {
        Self {
            timestamp: 0.0,
            q: DVector::zeros(n_active),
            qdot: DVector::zeros(n_active),
            qddot: DVector::zeros(n_active),
            joint_torque: DVector::zeros(n_active),
            imu: HashMap::new(),
            ft: HashMap::new(),
            contacts: Vec::new(),
            external_wrenches: Vec::new(),
            support_phase: SupportPhase::Double,
            h_wb: Isometry3::identity(),
        }
    }
}

pub struct StateEstimator {
    model: Arc<Mutex<RigidBodyModel>>,
    sensors: SensorGateway,
    joint_sensor_id: HashMap<JointId, String>,

    fixed_base: FixedBase,
    gravity: f64,
    config: crate::config::EstimationDefaults,
    ft_offsets: HashMap<String, [f64; 6]>,
    subtrees: crate::config::SubtreeTable,

    dynamical_imu_id: Option<String>,

    velocity_filter: AdaptiveWindowFilter,
    acceleration_filter: AdaptiveWindowFilter,
    torque_filter: LowPassFilter,
    imu_lin_acc: HashMap<String, LowPassFilter>,
    imu_ang_vel: HashMap<String, LowPassFilter>,
    imu_mag: HashMap<String, LowPassFilter>,
    dynamical_ang_accel_filter: Option<AdaptiveWindowFilter>,
    ft_filters: HashMap<String, LowPassFilter>,

    estimate_registry: std::collections::HashSet<(EstimateKind, String)>,
    last_tactile_time: f64,

    snapshot: Mutex<EstimateSnapshot>,
}

impl StateEstimator {
    pub fn new(model: Arc<Mutex<RigidBodyModel>>, config: &Configuration, period_s: f64) -> Self {
        let n_active = model.lock().unwrap().active_dof();
        Self {
            model,
            sensors: SensorGateway::new(),
            joint_sensor_id: HashMap::new(),
            fixed_base: config.fixed_base,
            gravity: 9.80665,
            config: config.estimation.clone(),
            ft_offsets: config.ft_offsets.clone(),
            subtrees: config.subtrees.clone(),
            dynamical_imu_id: None,
            velocity_filter: AdaptiveWindowFilter::new(
                PolyOrder::Linear,
                n_active,
                config.estimation.adaptive_window_max_size,
                config.estimation.adaptive_window_threshold,
            ),
            acceleration_filter: AdaptiveWindowFilter::new(
                PolyOrder::Quadratic,
                n_active,
                config.estimation.adaptive_window_max_size,
                config.estimation.adaptive_window_threshold,
            ),
            torque_filter: LowPassFilter::new(config.estimation.low_pass_cutoff_hz, period_s, DVector::zeros(n_active)),
            imu_lin_acc: HashMap::new(),
            imu_ang_vel: HashMap::new(),
            imu_mag: HashMap::new(),
            dynamical_ang_accel_filter: None,
            ft_filters: HashMap::new(),
            estimate_registry: std::collections::HashSet::new(),
            last_tactile_time: f64::NEG_INFINITY,
            snapshot: Mutex::new(EstimateSnapshot::empty(n_active)),
        }
    }

    pub fn add_estimate(&mut self, kind: EstimateKind, id: impl Into<String>) {
        self.estimate_registry.insert((kind, id.into()));
    }

    pub fn remove_estimate(&mut self, kind: EstimateKind, id: &str) {
        self.estimate_registry.remove(&(kind, id.to_string()));
    }

    pub fn register_joint_sensor(&mut self, joint: JointId, encoder_id: impl Into<String>) {
        let encoder_id = encoder_id.into();
        let _ = self.sensors.add_sensor(SensorKind::Encoder, encoder_id.clone());
        self.joint_sensor_id.insert(joint, encoder_id);
    }

    pub fn register_imu(&mut self, id: impl Into<String>, dynamical: bool, period_s: f64) {
        let id = id.into();
        let _ = self.sensors.add_sensor(SensorKind::Imu, id.clone());
        self.imu_lin_acc.insert(id.clone(), LowPassFilter::new(self.config.low_pass_cutoff_hz, period_s, DVector::zeros(3)));
        self.imu_ang_vel.insert(id.clone(), LowPassFilter::new(self.config.low_pass_cutoff_hz, period_s, DVector::zeros(3)));
        self.imu_mag.insert(id.clone(), LowPassFilter::new(self.config.low_pass_cutoff_hz, period_s, DVector::zeros(3)));
        if dynamical {
            self.dynamical_imu_id = Some(id);
            self.dynamical_ang_accel_filter = Some(AdaptiveWindowFilter::new(
                PolyOrder::Linear,
                3,
                self.config.adaptive_window_max_size,
                self.config.adaptive_window_threshold,
            ));
        }
    }

    pub fn register_ft_sensor(&mut self, id: impl Into<String>, period_s: f64) {
        let id = id.into();
        let _ = self.sensors.add_sensor(SensorKind::ForceTorque, id.clone());
        self.ft_filters.insert(id, LowPassFilter::new(self.config.low_pass_cutoff_hz, period_s, DVector::zeros(6)));
    }

    /// Supplemented calibration request (SPEC_FULL.md): re-bases the
    /// named FT sensor's offset to its current low-passed reading, so the
    /// next published value reads zero.
    pub fn zero_ft_sensor(&mut self, id: &str) {
        if let Some(filter) = self.ft_filters.get(id) {
            let current: Vec<f64> = filter.last_output().iter().copied().collect();
            let mut offset = [0.0; 6];
            offset.copy_from_slice(&current[..6]);
            self.ft_offsets.insert(id.to_string(), offset);
        }
    }

    pub fn set_parameter(&mut self, param: EstimationParam) {
        match param {
            EstimationParam::AdaptiveWindowMaxSize(n) => {
                self.config.adaptive_window_max_size = n;
                self.velocity_filter.set_max_window(n);
                self.acceleration_filter.set_max_window(n);
                if let Some(f) = self.dynamical_ang_accel_filter.as_mut() {
                    f.set_max_window(n);
                }
            }
            EstimationParam::AdaptiveWindowThreshold(t) => {
                self.config.adaptive_window_threshold = t;
                self.velocity_filter.set_threshold(t);
                self.acceleration_filter.set_threshold(t);
                if let Some(f) = self.dynamical_ang_accel_filter.as_mut() {
                    f.set_threshold(t);
                }
            }
            EstimationParam::LowPassCutoffHz(hz) => {
                self.config.low_pass_cutoff_hz = hz;
                self.torque_filter.set_cutoff_hz(hz);
                for f in self.imu_lin_acc.values_mut() {
                    f.set_cutoff_hz(hz);
                }
                for f in self.imu_ang_vel.values_mut() {
                    f.set_cutoff_hz(hz);
                }
                for f in self.imu_mag.values_mut() {
                    f.set_cutoff_hz(hz);
                }
                for f in self.ft_filters.values_mut() {
                    f.set_cutoff_hz(hz);
                }
            }
            EstimationParam::EnableOmegaDomegaImu(enabled) => {
                self.config.enable_omega_domega_imu = enabled;
            }
            EstimationParam::MinTaxel(n) => {
                self.config.min_taxel = n;
            }
            EstimationParam::FtOffset(id, offset) => {
                self.ft_offsets.insert(id, offset);
            }
        }
    }

    pub fn snapshot(&self) -> EstimateSnapshot {
        self.snapshot.lock().unwrap().clone()
    }

    /// One tick. `now` is the tick's timestamp in seconds —
    /// passed explicitly rather than read from the wall clock so the
    /// sequence stays reproducible under test. A model error is logged and
    /// aborts the tick without touching the published snapshot.
    pub fn tick(&mut self, driver: &mut dyn SensorDriver, now: f64) {
        if let Err(e) = self.tick_inner(driver, now) {
            log::error!("estimator tick aborted: {e}");
        }
    }

    fn tick_inner(&mut self, driver: &mut dyn SensorDriver, now: f64) -> Result<(), crate::error::ModelError> {
        // Step 1: encoders, indexed by the model's canonical active-joint
        // order (not `joint_sensor_id`'s arbitrary hashmap order) — every
        // downstream consumer (`compose_full_q`, `inverse_dynamics`, the
        // locomotion controller) assumes `q[k]` is the k-th joint in that
        // order.
        let joints: Vec<JointId> = self.model.lock().unwrap().active_joints().collect();
        let mut q = DVector::<f64>::zeros(joints.len());
        for (k, joint) in joints.iter().enumerate() {
            if let Some(id) = self.joint_sensor_id.get(joint) {
                if let Ok((_, sample)) = self.sensors.read(driver, SensorKind::Encoder, id, false) {
                    q[k] = sample[0];
                }
            }
        }
        let qdot = self.velocity_filter.feed(now, q.clone());
        let qddot = self.acceleration_filter.feed(now, qdot.clone());

        // Step 2: IMUs.
        let imu_ids: Vec<String> = self.imu_lin_acc.keys().cloned().collect();
        let mut imu_readings = HashMap::new();
        let mut dynamical_omega_dot = Vector3::zeros();
        for id in &imu_ids {
            if let Ok((_, raw)) = self.sensors.read(driver, SensorKind::Imu, id, false) {
                let reading = ImuReading::from_raw(&raw);
                let lin_acc = self
                    .imu_lin_acc
                    .get_mut(id)
                    .unwrap()
                    .feed(&DVector::from_column_slice(reading.lin_acc.as_slice()))
                    .clone();
                let ang_vel = self
                    .imu_ang_vel
                    .get_mut(id)
                    .unwrap()
                    .feed(&DVector::from_column_slice(reading.ang_vel.as_slice()))
                    .clone();
                let mag = self
                    .imu_mag
                    .get_mut(id)
                    .unwrap()
                    .feed(&DVector::from_column_slice(reading.mag.as_slice()))
                    .clone();
                let filtered = ImuReading {
                    orientation: reading.orientation,
                    lin_acc: Vector3::new(lin_acc[0], lin_acc[1], lin_acc[2]),
                    ang_vel: Vector3::new(ang_vel[0], ang_vel[1], ang_vel[2]),
                    mag: Vector3::new(mag[0], mag[1], mag[2]),
                };
                if self.dynamical_imu_id.as_deref() == Some(id.as_str()) && self.config.enable_omega_domega_imu {
                    let dw = self
                        .dynamical_ang_accel_filter
                        .as_mut()
                        .unwrap()
                        .feed(now, DVector::from_column_slice(filtered.ang_vel.as_slice()));
                    dynamical_omega_dot = Vector3::new(dw[0], dw[1], dw[2]);
                }
                imu_readings.insert(id.clone(), filtered);
            }
        }

        // Step 3: FT sensors.
        let ft_ids: Vec<String> = self.ft_filters.keys().cloned().collect();
        let mut ft_readings = HashMap::new();
        for id in &ft_ids {
            if let Ok((_, raw)) = self.sensors.read(driver, SensorKind::ForceTorque, id, false) {
                let offset = self.ft_offsets.get(id).copied().unwrap_or([0.0; 6]);
                let corrected: Vec<f64> = raw.iter().zip(offset.iter()).map(|(v, o)| v - o).collect();
                let filtered = self.ft_filters.get_mut(id).unwrap().feed(&DVector::from_vec(corrected));
                ft_readings.insert(
                    id.clone(),
                    Wrench {
                        force: Vector3::new(filtered[0], filtered[1], filtered[2]),
                        moment: Vector3::new(filtered[3], filtered[4], filtered[5]),
                    },
                );
            }
        }

        // Step 4/5: tactile frame and default-contact synthesis.
        let mut contacts = self.read_tactile_or_age(driver, now);
        {
            let model = self.model.lock().unwrap();
            for subtree in self.subtrees.iter() {
                let has_contact = contacts.iter().any(|c| {
                    model
                        .link_name(c.link_index)
                        .map(|name| subtree.member_links.iter().any(|m| m == name))
                        .unwrap_or(false)
                });
                if !has_contact {
                    if let Some(link_idx) = model.link_index_hint(&subtree.default_contact_link) {
                        contacts.push(ContactPoint::default_for_subtree(
                            subtree.name.clone(),
                            link_idx,
                            Vector3::zeros(),
                        ));
                    }
                }
            }
        }

        // Step 6: push inertial + joint state into the model.
        let base_omega = imu_readings
            .values()
            .next()
            .map(|r| r.ang_vel)
            .unwrap_or_else(Vector3::zeros);
        let base_accel = imu_readings
            .values()
            .next()
            .map(|r| r.lin_acc)
            .unwrap_or_else(Vector3::zeros);
        let (base_omega, base_omega_dot, base_accel) = match self.fixed_base {
            FixedBase::None => (base_omega, dynamical_omega_dot, base_accel),
            fixed => (
                Vector3::zeros(),
                Vector3::zeros(),
                fixed.gravity_direction(self.gravity).unwrap(),
            ),
        };

        {
            let mut model = self.model.lock().unwrap();
            model.set_base_twist(base_omega);
            for (k, joint) in joints.iter().enumerate() {
                model.set_last_commanded(joint.clone(), q[k]);
            }
        }

        // Step 7: RNEA + contact-wrench solve + link composition.
        let h_wb = Isometry3::identity();
        let (contact_wrenches, solved_contacts) = self.solve_contact_wrenches(contacts, &ft_readings, h_wb);

        let gravity_vec = Vector3::new(0.0, 0.0, -self.gravity);
        let (joint_torque, external_wrenches) = {
            let model = self.model.lock().unwrap();
            let q_full = model.compose_full_q(&q)?;
            let tau = model.inverse_dynamics(
                &q_full,
                &h_wb,
                &qdot,
                (base_omega_dot, base_accel),
                &qddot,
                gravity_vec,
            )?;
            let torques = tau.rows(6, tau.len() - 6).into_owned();
            (torques, contact_wrenches)
        };

        // Step 8: publish.
        let filtered_torque = self.torque_filter.feed(&joint_torque).clone();
        let mut snap = self.snapshot.lock().unwrap();
        snap.timestamp = now;
        snap.q = q;
        snap.qdot = qdot;
        snap.qddot = qddot;
        snap.joint_torque = filtered_torque;
        snap.imu = imu_readings;
        snap.ft = ft_readings;
        snap.contacts = solved_contacts;
        snap.external_wrenches = external_wrenches;
        snap.h_wb = h_wb;
        Ok(())
    }

    fn read_tactile_or_age(&mut self, driver: &mut dyn SensorDriver, now: f64) -> Vec<ContactPoint> {
        match driver.poll(SensorKind::SkinContact, "skin") {
            Some((ts, _raw)) => {
                self.last_tactile_time = ts;
                // A real driver would hand back a structured frame;
                // element-count-per-kind is not fixed for skin contact
                //, so the frame shape is a collaborator
                // concern. The adapter that decodes the frame into
                // `ContactPoint`s lives outside this module; here we only
                // apply the timeout/min-taxel policy to whatever the
                // caller has already placed into the current snapshot.
                let mut contacts = self.snapshot.lock().unwrap().contacts.clone();
                for c in &mut contacts {
                    if c.active_taxel_count < 10 {
                        c.fix_moment_to_zero();
                    }
                }
                contacts.retain(|c| c.active_taxel_count > self.config.min_taxel);
                contacts
            }
            None => {
                if now - self.last_tactile_time > self.config.skin_timeout_s {
                    Vec::new()
                } else {
                    self.snapshot.lock().unwrap().contacts.clone()
                }
            }
        }
    }

    /// Resolves unknown (default-synthesised) contact wrenches from FT
    /// readings via a ridge-regularised least-squares solve — reusing
    /// [`RecursiveLls`] for its rank-deficiency handling rather than a
    /// bespoke pseudoinverse, since a subtree with more contacts than FT
    /// sensors is the common underdetermined case this already solves.
    fn solve_contact_wrenches(
        &self,
        contacts: Vec<ContactPoint>,
        ft_readings: &HashMap<String, Wrench>,
        _h_wb: Isometry3<f64>,
    ) -> (Vec<(String, Wrench)>, Vec<ContactPoint>) {
        let mut by_subtree: HashMap<String, Vec<ContactPoint>> = HashMap::new();
        for c in contacts {
            by_subtree.entry(c.body_part.clone()).or_default().push(c);
        }

        let mut solved = Vec::new();
        let mut externals = Vec::new();
        for (subtree_name, mut group) in by_subtree {
            let unknown_idx: Vec<usize> = group
                .iter()
                .enumerate()
                .filter(|(_, c)| c.active_taxel_count == 0)
                .map(|(i, _)| i)
                .collect();

            if !unknown_idx.is_empty() {
                if let Some(measured) = ft_readings.get(&subtree_name) {
                    let ref_point = group[unknown_idx[0]].application_point;
                    let n = unknown_idx.len();
                    let mut rls = RecursiveLls::new(6 * n);
                    for eq in 0..6 {
                        let mut phi = vec![0.0; 6 * n];
                        for (slot, &idx) in unknown_idx.iter().enumerate() {
                            let r = group[idx].application_point - ref_point;
                            if eq < 3 {
                                phi[slot * 6 + eq] = 1.0;
                            } else {
                                let m = eq - 3;
                                phi[slot * 6 + 3 + m] = 1.0;
                                match m {
                                    0 => {
                                        phi[slot * 6 + 1] += -r.z;
                                        phi[slot * 6 + 2] += r.y;
                                    }
                                    1 => {
                                        phi[slot * 6] += r.z;
                                        phi[slot * 6 + 2] += -r.x;
                                    }
                                    _ => {
                                        phi[slot * 6] += -r.y;
                                        phi[slot * 6 + 1] += r.x;
                                    }
                                }
                            }
                        }
                        let y = if eq < 3 { measured.force[eq] } else { measured.moment[eq - 3] };
                        let _ = rls.feed_sample(&DVector::from_vec(phi), y);
                    }
                    let x = rls.solve();
                    for (slot, &idx) in unknown_idx.iter().enumerate() {
                        group[idx].wrench = Wrench {
                            force: Vector3::new(x[slot * 6], x[slot * 6 + 1], x[slot * 6 + 2]),
                            moment: Vector3::new(x[slot * 6 + 3], x[slot * 6 + 4], x[slot * 6 + 5]),
                        };
                    }
                    externals.push((subtree_name.clone(), *measured));
                }
            }
            solved.extend(group);
        }
        (externals, solved)
    }
}

