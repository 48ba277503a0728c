//! Floating-base kinematics/dynamics façade.
//!
//! Grounded on `physics.rs`/`physics/mod.rs`: a single owning
//! struct (`PhysicsWorld` there, `RigidBodyModel` here) holding the world
//! state plus name-keyed maps (`link_map`, `joint_map`), with a `new()` and
//! one hot method invoked per tick (`step()` there, the `compute_*` queries
//! here). Active/inactive joint bookkeeping follows a state machine per
//! joint: `addJoint`/`removeJoint` toggle membership in [`JointIdSet`]
//! without touching the cached last-commanded position, so re-activation
//! is continuous.

mod rnea;
mod tree;

pub use tree::{JointSpec, LinkSpec, RigidBodyTree, RigidBodyTreeSource};

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector, Isometry3, Matrix3, UnitQuaternion, Vector3};

use crate::error::ModelError;
use crate::joint::{JointId, JointIdSet};

/// A base acceleration split into its angular and linear halves,
/// `(angular, linear)` — the order `inverse_dynamics`'s RNEA pass consumes
/// them in. 6-vectors this module *returns* (Jacobians, DJdq, wrenches) use
/// the opposite convention, `[linear(3); angular(3))]`, matching
/// `concat6`.
pub type Twist6 = (Vector3<f64>, Vector3<f64>);

/// The virtual link id addressing the whole-body centre of mass, for
/// `compute_jacobian`/`compute_djdq`.
pub const COM_LINK: &str = "__com__";

pub struct RigidBodyModel {
    tree: RigidBodyTree,
    /// Joints currently in the active (estimated + commanded) subset.
    active: JointIdSet,
    /// Last-commanded position for every joint in the tree, keyed by
    /// `JointId`, kept across add/remove so re-activation is continuous.
    last_commanded_q: HashMap<JointId, f64>,
    /// Base angular velocity pushed in by the estimator: `inverse_dynamics`
    /// needs it for the Coriolis/centrifugal terms but does not carry it as
    /// an explicit argument. Defaults to zero (a momentarily-static or
    /// explicitly fixed base) until set.
    cached_base_omega: Option<Vector3<f64>>,
}

impl RigidBodyModel {
    pub fn new(tree: RigidBodyTree) -> Self {
        Self {
            tree,
            active: JointIdSet::new(),
            last_commanded_q: HashMap::new(),
            cached_base_omega: None,
        }
    }

    pub fn full_dof(&self) -> usize {
        self.tree.full_dof()
    }

    pub fn active_dof(&self) -> usize {
        self.active.size()
    }

    pub fn active_joints(&self) -> impl Iterator<Item = JointId> + '_ {
        self.active.iter()
    }

    /// Activates `joint`. A joint never commanded before starts at angle 0.
    pub fn add_joint(&mut self, joint: JointId) -> Result<(), ModelError> {
        if self.tree.full_index_of(&joint).is_none() {
            return Err(ModelError::UnknownJoint(joint));
        }
        self.active.add(joint.clone());
        self.last_commanded_q.entry(joint).or_insert(0.0);
        Ok(())
    }

    /// Deactivates `joint`. Its last commanded value is retained and will
    /// be used (pinned) by subsequent dynamics queries.
    pub fn remove_joint(&mut self, joint: &JointId) -> Result<(), ModelError> {
        if self.tree.full_index_of(joint).is_none() {
            return Err(ModelError::UnknownJoint(joint.clone()));
        }
        self.active.remove(joint);
        Ok(())
    }

    /// Caches `joint`'s last commanded position, used to pin its angle in
    /// future queries once/if the joint becomes inactive. Called by the
    /// estimator's `set_ang` step.
    pub fn set_last_commanded(&mut self, joint: JointId, q: f64) {
        self.last_commanded_q.insert(joint, q);
    }

    pub fn get_joint_limits(&self, joint: &JointId) -> Result<(f64, f64), ModelError> {
        let idx = self
            .tree
            .full_index_of(joint)
            .ok_or_else(|| ModelError::UnknownJoint(joint.clone()))?;
        Ok(self.tree.movable_joint(idx).limits)
    }

    pub fn get_all_joint_limits(&self) -> Vec<(JointId, f64, f64)> {
        (0..self.tree.full_dof())
            .map(|k| {
                let j = self.tree.movable_joint(k);
                (j.id.clone(), j.limits.0, j.limits.1)
            })
            .collect()
    }

    fn link_index(&self, link: &str) -> Result<usize, ModelError> {
        self.tree.link_index(link)
    }

    /// Non-failing variant of link lookup, for callers (e.g. the estimator's
    /// default-contact synthesis) that treat an unknown link name as "skip"
    /// rather than an error.
    pub fn link_index_hint(&self, link: &str) -> Option<usize> {
        self.tree.link_index(link).ok()
    }

    pub fn link_name(&self, index: usize) -> Option<&str> {
        self.tree.links.get(index).map(|l| l.name.as_str())
    }

    /// World-frame centre-of-mass position, for callers that need only
    /// the point (not the virtual COM link's full pose/Jacobian).
    pub fn compute_com_position(&self, q_full: &DVector<f64>, h_wb: &Isometry3<f64>) -> Result<Vector3<f64>, ModelError> {
        let q = self.expand_q(q_full)?;
        let poses = rnea::forward_kinematics_tree(&self.tree, &q, h_wb);
        Ok(self.com_world(&poses).0)
    }

    /// Combines an active-sized position slice with the cached last
    /// commanded value of every inactive joint into a full-tree position
    /// vector, for callers of the `compute_*` API that only track active
    /// joints directly ("removed joints are pinned to their
    /// last commanded value").
    pub fn compose_full_q(&self, q_active: &DVector<f64>) -> Result<DVector<f64>, ModelError> {
        if q_active.len() != self.active_dof() {
            return Err(ModelError::DimensionMismatch {
                expected: self.active_dof(),
                got: q_active.len(),
            });
        }
        let mut full = DVector::zeros(self.tree.full_dof());
        for k in 0..self.tree.full_dof() {
            let joint = self.tree.movable_joint(k).id.clone();
            full[k] = if let Some(g) = self.active.local_to_global(&joint) {
                q_active[g]
            } else {
                self.last_commanded_q.get(&joint).copied().unwrap_or(0.0)
            };
        }
        Ok(full)
    }

    /// Expands a full-tree position vector (size `full_dof()`) into a
    /// per-joint array sized `tree.joints.len()` (fixed joints get 0,
    /// unused).
    fn expand_q(&self, q_full: &DVector<f64>) -> Result<Vec<f64>, ModelError> {
        if q_full.len() != self.tree.full_dof() {
            return Err(ModelError::DimensionMismatch {
                expected: self.tree.full_dof(),
                got: q_full.len(),
            });
        }
        let mut out = vec![0.0; self.tree.joints.len()];
        for k in 0..self.tree.full_dof() {
            let joint_idx = self
                .tree
                .joints
                .iter()
                .position(|j| j.is_movable() && self.tree.full_index_of(&j.id) == Some(k))
                .unwrap();
            out[joint_idx] = q_full[k];
        }
        Ok(out)
    }

    /// Expands an active-sized velocity/acceleration vector (size
    /// `active_dof()`) into a per-joint array, zero for every non-active
    /// joint — the "pinned joints have zero velocity" contract.
    fn expand_active(&self, v_active: &DVector<f64>) -> Result<Vec<f64>, ModelError> {
        if v_active.len() != self.active_dof() {
            return Err(ModelError::DimensionMismatch {
                expected: self.active_dof(),
                got: v_active.len(),
            });
        }
        let mut out = vec![0.0; self.tree.joints.len()];
        for (g, joint) in self.active.iter().enumerate() {
            if let Some(full_idx) = self.tree.full_index_of(&joint) {
                let joint_tree_idx = self
                    .tree
                    .joints
                    .iter()
                    .position(|j| j.is_movable() && self.tree.full_index_of(&j.id) == Some(full_idx))
                    .unwrap();
                out[joint_tree_idx] = v_active[g];
            }
        }
        Ok(out)
    }

    pub fn compute_h(&self, q_full: &DVector<f64>, h_wb: &Isometry3<f64>, link: &str) -> Result<Isometry3<f64>, ModelError> {
        let link_idx = self.link_index(link)?;
        let q = self.expand_q(q_full)?;
        let poses = rnea::forward_kinematics_tree(&self.tree, &q, h_wb);
        Ok(poses[link_idx])
    }

    /// `[x, y, z, qx, qy, qz, qw]`.
    pub fn forward_kinematics(&self, q_full: &DVector<f64>, h_wb: &Isometry3<f64>, link: &str) -> Result<[f64; 7], ModelError> {
        let h = self.compute_h(q_full, h_wb, link)?;
        let t = h.translation.vector;
        let q: UnitQuaternion<f64> = h.rotation;
        Ok([t.x, t.y, t.z, q.i, q.j, q.k, q.w])
    }

    fn com_world(&self, poses: &[Isometry3<f64>]) -> (Vector3<f64>, f64) {
        let mut total_mass = 0.0;
        let mut weighted = Vector3::zeros();
        for (i, link) in self.tree.links.iter().enumerate() {
            let c = poses[i] * link.com_local;
            weighted += link.mass * c;
            total_mass += link.mass;
        }
        (weighted / total_mass, total_mass)
    }

    /// Velocity field (per-link angular/linear-at-origin) produced by a
    /// unit value on exactly one of the `N+6` generalized velocity
    /// coordinates (columns 0..6 are base linear/angular, 6.. are active
    /// joints in canonical order).
    fn unit_velocity_field(&self, poses: &[Isometry3<f64>], col: usize) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
        let n_active = self.active_dof();
        let mut base_v = Vector3::zeros();
        let mut base_omega = Vector3::zeros();
        let mut qdot = vec![0.0; self.tree.joints.len()];

        if col < 3 {
            base_v[col] = 1.0;
        } else if col < 6 {
            base_omega[col - 3] = 1.0;
        } else {
            let active_k = col - 6;
            if active_k < n_active {
                let joint_id = self.active.iter().nth(active_k).unwrap();
                if let Some(full_idx) = self.tree.full_index_of(&joint_id) {
                    let joint_tree_idx = self
                        .tree
                        .joints
                        .iter()
                        .position(|j| j.is_movable() && self.tree.full_index_of(&j.id) == Some(full_idx))
                        .unwrap();
                    qdot[joint_tree_idx] = 1.0;
                }
            }
        }

        let kin = rnea::propagate_kinematics(
            &self.tree,
            poses,
            base_omega,
            base_v,
            Vector3::zeros(),
            Vector3::zeros(),
            &qdot,
            &vec![0.0; self.tree.joints.len()],
        );
        (kin.omega, kin.v)
    }

    /// 6×(N+6) Jacobian mapping `(ẋ_base, q̇)` to the twist of `offset`
    /// (default: link origin) in `link`. `link` may be [`COM_LINK`].
    pub fn compute_jacobian(
        &self,
        q_full: &DVector<f64>,
        h_wb: &Isometry3<f64>,
        link: &str,
        offset: Option<Vector3<f64>>,
    ) -> Result<DMatrix<f64>, ModelError> {
        let q = self.expand_q(q_full)?;
        let poses = rnea::forward_kinematics_tree(&self.tree, &q, h_wb);
        let ncols = 6 + self.active_dof();

        if link == COM_LINK {
            let (com, _total_mass) = self.com_world(&poses);
            let composite_inertia = self.composite_inertia_about(&poses, com);
            let composite_inv = composite_inertia
                .try_inverse()
                .unwrap_or_else(Matrix3::identity);

            let (_, total_mass) = self.com_world(&poses);
            let mut jac = DMatrix::<f64>::zeros(6, ncols);
            for col in 0..ncols {
                let (omega, v) = self.unit_velocity_field(&poses, col);
                let mut linear = Vector3::zeros();
                let mut angular_momentum = Vector3::zeros();
                for (i, link_spec) in self.tree.links.iter().enumerate() {
                    let r_com = poses[i].rotation * link_spec.com_local;
                    let c_i = poses[i].translation.vector + r_com;
                    let v_ci = v[i] + omega[i].cross(&r_com);
                    linear += link_spec.mass * v_ci;
                    let inertia_world = poses[i].rotation.to_rotation_matrix() * link_spec.inertia_local
                        * poses[i].rotation.to_rotation_matrix().transpose();
                    angular_momentum += inertia_world * omega[i] + link_spec.mass * (c_i - com).cross(&v_ci);
                }
                let com_linear = linear / total_mass;
                let com_angular = composite_inv * angular_momentum;
                jac.set_column(col, &concat6(com_linear, com_angular));
            }
            return Ok(jac);
        }

        let link_idx = self.link_index(link)?;
        let point = poses[link_idx].translation.vector + poses[link_idx].rotation * offset.unwrap_or_else(Vector3::zeros);
        let ancestors = self.tree.ancestor_joints(link_idx);

        let mut jac = DMatrix::<f64>::zeros(6, ncols);
        for col in 0..ncols {
            let (omega, v) = self.unit_velocity_field(&poses, col);
            // Base columns always contribute; joint columns only if the
            // joint is an ancestor of `link`.
            let contributes = col < 6 || {
                let active_k = col - 6;
                let joint_id = self.active.iter().nth(active_k);
                joint_id
                    .and_then(|j| self.tree.full_index_of(&j))
                    .map(|full_idx| {
                        ancestors.iter().any(|&aj| {
                            self.tree.joints[aj].is_movable()
                                && self.tree.full_index_of(&self.tree.joints[aj].id) == Some(full_idx)
                        })
                    })
                    .unwrap_or(false)
            };
            if !contributes {
                continue;
            }
            let r = point - poses[link_idx].translation.vector;
            let linear = v[link_idx] + omega[link_idx].cross(&r);
            let angular = omega[link_idx];
            jac.set_column(col, &concat6(linear, angular));
        }
        Ok(jac)
    }

    /// Composite (system) rotational inertia about `about`, summed over all
    /// links via the parallel-axis theorem.
    fn composite_inertia_about(&self, poses: &[Isometry3<f64>], about: Vector3<f64>) -> Matrix3<f64> {
        let mut total = Matrix3::zeros();
        for (i, link) in self.tree.links.iter().enumerate() {
            let r_com = poses[i].rotation * link.com_local;
            let c = poses[i].translation.vector + r_com;
            let inertia_world = poses[i].rotation.to_rotation_matrix() * link.inertia_local
                * poses[i].rotation.to_rotation_matrix().transpose();
            let d = c - about;
            let parallel_axis = (d.dot(&d)) * Matrix3::identity() - d * d.transpose();
            total += inertia_world + link.mass * parallel_axis;
        }
        total
    }

    /// 6-vector Ḋq̇ (bias acceleration) of `offset` in `link` given the
    /// current base twist and joint velocities.
    pub fn compute_djdq(
        &self,
        q_full: &DVector<f64>,
        h_wb: &Isometry3<f64>,
        qdot_active: &DVector<f64>,
        base_omega: Vector3<f64>,
        link: &str,
        offset: Option<Vector3<f64>>,
    ) -> Result<DVector<f64>, ModelError> {
        let q = self.expand_q(q_full)?;
        let qdot = self.expand_active(qdot_active)?;
        let poses = rnea::forward_kinematics_tree(&self.tree, &q, h_wb);

        let kin = rnea::propagate_kinematics(
            &self.tree,
            &poses,
            base_omega,
            Vector3::zeros(),
            Vector3::zeros(),
            Vector3::zeros(),
            &qdot,
            &vec![0.0; self.tree.joints.len()],
        );

        let link_idx = self.link_index(link)?;
        let point = poses[link_idx].translation.vector + poses[link_idx].rotation * offset.unwrap_or_else(Vector3::zeros);
        let r = point - poses[link_idx].translation.vector;
        let linear = kin.alpha[link_idx].cross(&r) + kin.omega[link_idx].cross(&kin.omega[link_idx].cross(&r));
        let angular = kin.alpha[link_idx];
        Ok(concat6(linear, angular))
    }

    /// `(N+6)` vector: 6 base wrench components first, then joint torques.
    pub fn inverse_dynamics(
        &self,
        q_full: &DVector<f64>,
        h_wb: &Isometry3<f64>,
        qdot_active: &DVector<f64>,
        base_accel: Twist6,
        qddot_active: &DVector<f64>,
        gravity: Vector3<f64>,
    ) -> Result<DVector<f64>, ModelError> {
        let q = self.expand_q(q_full)?;
        let qdot = self.expand_active(qdot_active)?;
        let qddot = self.expand_active(qddot_active)?;
        let poses = rnea::forward_kinematics_tree(&self.tree, &q, h_wb);

        // RNEA gravity trick: fold -g into the base's linear acceleration.
        let (base_alpha, base_a) = base_accel;
        let kin = rnea::propagate_kinematics(
            &self.tree,
            &poses,
            self.base_omega_from(qdot_active),
            Vector3::zeros(),
            base_alpha,
            base_a - gravity,
            &qdot,
            &qddot,
        );

        let ((base_moment, base_force), joint_torques) = rnea::inverse_dynamics_tree(&self.tree, &poses, &kin, None);

        let mut out = DVector::zeros(6 + self.active_dof());
        out.fixed_rows_mut::<3>(0).copy_from(&base_force);
        out.fixed_rows_mut::<3>(3).copy_from(&base_moment);
        for (k, t) in joint_torques.iter().enumerate() {
            out[6 + k] = *t;
        }
        Ok(out)
    }

    /// The base angular velocity is not itself an argument to
    /// `inverse_dynamics`; it is supplied out-of-band by the estimator
    /// through [`Self::set_base_twist`]. Until that lands, zero is used
    /// (an explicitly fixed or momentarily-static base).
    fn base_omega_from(&self, _qdot_active: &DVector<f64>) -> Vector3<f64> {
        self.cached_base_omega.unwrap_or_else(Vector3::zeros)
    }

    pub fn set_base_twist(&mut self, omega: Vector3<f64>) {
        self.cached_base_omega = Some(omega);
    }

    /// `(N+6)×(N+6)` symmetric positive-definite mass matrix, computed via
    /// unit-acceleration RNEA calls (composite rigid body method by
    /// differencing): `M e_j = ID(q, 0, e_j, 0) - ID(q, 0, 0, 0)`.
    pub fn compute_mass_matrix(&self, q_full: &DVector<f64>, h_wb: &Isometry3<f64>) -> Result<DMatrix<f64>, ModelError> {
        let n = 6 + self.active_dof();
        let zero_active = DVector::zeros(self.active_dof());
        let bias = self.inverse_dynamics(
            q_full,
            h_wb,
            &zero_active,
            (Vector3::zeros(), Vector3::zeros()),
            &zero_active,
            Vector3::zeros(),
        )?;

        let mut m = DMatrix::<f64>::zeros(n, n);
        for j in 0..n {
            let (base_alpha, base_a) = if j < 3 {
                let mut a = Vector3::zeros();
                a[j] = 1.0;
                (Vector3::zeros(), a)
            } else if j < 6 {
                let mut a = Vector3::zeros();
                a[j - 3] = 1.0;
                (a, Vector3::zeros())
            } else {
                (Vector3::zeros(), Vector3::zeros())
            };
            let mut qddot = zero_active.clone();
            if j >= 6 {
                qddot[j - 6] = 1.0;
            }
            let id_j = self.inverse_dynamics(q_full, h_wb, &zero_active, (base_alpha, base_a), &qddot, Vector3::zeros())?;
            m.set_column(j, &(id_j - &bias));
        }
        Ok(m)
    }

    /// `(N+6)` generalized bias forces (gravity + Coriolis + centrifugal):
    /// `inverse_dynamics` evaluated at zero acceleration.
    pub fn compute_generalized_bias_forces(
        &self,
        q_full: &DVector<f64>,
        h_wb: &Isometry3<f64>,
        qdot_active: &DVector<f64>,
        gravity: Vector3<f64>,
    ) -> Result<DVector<f64>, ModelError> {
        self.inverse_dynamics(
            q_full,
            h_wb,
            qdot_active,
            (Vector3::zeros(), Vector3::zeros()),
            &DVector::zeros(self.active_dof()),
            gravity,
        )
    }
}

fn concat6(linear: Vector3<f64>, angular: Vector3<f64>) -> DVector<f64> {
    DVector::from_vec(vec![
        linear.x, linear.y, linear.z, angular.x, angular.y, angular.z,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree::{JointSpec, LinkSpec};

    fn two_link_arm() -> RigidBodyModel {
        let links = vec![
            LinkSpec::new("base_link", 1.0, Vector3::zeros(), Matrix3::identity() * 0.01),
            LinkSpec::new("link1", 2.0, Vector3::new(0.0, 0.0, -0.25), Matrix3::identity() * 0.02),
            LinkSpec::new("link2", 1.5, Vector3::new(0.0, 0.0, -0.2), Matrix3::identity() * 0.015),
        ];
        let joints = vec![
            JointSpec {
                id: JointId::new("arm", 0),
                name: "shoulder".to_string(),
                parent_link: 0,
                child_link: 1,
                origin: Isometry3::identity(),
                axis_local: Some(Vector3::y()),
                limits: (-3.14, 3.14),
            },
            JointSpec {
                id: JointId::new("arm", 1),
                name: "elbow".to_string(),
                parent_link: 1,
                child_link: 2,
                origin: Isometry3::translation(0.0, 0.0, -0.5),
                axis_local: Some(Vector3::y()),
                limits: (-2.5, 2.5),
            },
        ];
        let tree = RigidBodyTree::new(links, joints, 0);
        let mut model = RigidBodyModel::new(tree);
        model.add_joint(JointId::new("arm", 0)).unwrap();
        model.add_joint(JointId::new("arm", 1)).unwrap();
        model
    }

    #[test]
    fn add_and_remove_joint_preserve_last_commanded() {
        let mut model = two_link_arm();
        model.set_last_commanded(JointId::new("arm", 1), 0.3);
        model.remove_joint(&JointId::new("arm", 1)).unwrap();
        assert_eq!(model.active_dof(), 1);

        let q_active = DVector::from_vec(vec![0.1]);
        let full = model.compose_full_q(&q_active).unwrap();
        assert_eq!(full.len(), 2);
        assert!((full[0] - 0.1).abs() < 1e-12);
        assert!((full[1] - 0.3).abs() < 1e-12);

        model.add_joint(JointId::new("arm", 1)).unwrap();
        assert_eq!(model.active_dof(), 2);
    }

    #[test]
    fn compose_full_q_rejects_wrong_size() {
        let model = two_link_arm();
        let wrong = DVector::from_vec(vec![0.0]);
        assert!(matches!(
            model.compose_full_q(&wrong),
            Err(ModelError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn forward_kinematics_matches_compute_h() {
        let model = two_link_arm();
        let q_full = DVector::from_vec(vec![0.0, 0.0]);
        let h_wb = Isometry3::identity();
        let h = model.compute_h(&q_full, &h_wb, "link2").unwrap();
        let fk = model.forward_kinematics(&q_full, &h_wb, "link2").unwrap();
        assert!((h.translation.vector.x - fk[0]).abs() < 1e-12);
        assert!((h.translation.vector.y - fk[1]).abs() < 1e-12);
        assert!((h.translation.vector.z - fk[2]).abs() < 1e-12);
    }

    #[test]
    fn mass_matrix_is_symmetric_and_positive_definite() {
        use approx::assert_relative_eq;

        let model = two_link_arm();
        let q_full = DVector::from_vec(vec![0.3, -0.4]);
        let h_wb = Isometry3::identity();
        let m = model.compute_mass_matrix(&q_full, &h_wb).unwrap();

        let n = m.nrows();
        for i in 0..n {
            for j in 0..n {
                assert_relative_eq!(m[(i, j)], m[(j, i)], epsilon = 1e-6);
            }
        }

        let chol = m.clone().cholesky();
        assert!(chol.is_some(), "mass matrix is not positive definite");
    }

    #[test]
    fn unknown_joint_add_is_rejected() {
        let mut model = two_link_arm();
        assert!(matches!(
            model.add_joint(JointId::new("arm", 99)),
            Err(ModelError::UnknownJoint(_))
        ));
    }

    #[test]
    fn inverse_dynamics_matches_bias_forces_for_static_config() {
        use approx::assert_relative_eq;
        let model = two_link_arm();
        let q_full = DVector::from_vec(vec![0.2, -0.6]);
        let h_wb = Isometry3::identity();
        let qdot_active = DVector::zeros(model.active_dof());
        let qddot_active = DVector::zeros(model.active_dof());
        let gravity = Vector3::new(0.0, 0.0, -9.8);

        let tau = model
            .inverse_dynamics(
                &q_full,
                &h_wb,
                &qdot_active,
                (Vector3::zeros(), Vector3::zeros()),
                &qddot_active,
                gravity,
            )
            .unwrap();
        let bias = model
            .compute_generalized_bias_forces(&q_full, &h_wb, &qdot_active, gravity)
            .unwrap();

        assert_eq!(tau.len(), bias.len());
        for i in 0..tau.len() {
            assert_relative_eq!(tau[i], bias[i], epsilon = 1e-9);
        }
    }
}
