//! Kinematic/dynamic recursive Newton-Euler pass over a [`RigidBodyTree`].
//!
//! Operates on plain per-joint arrays (position/velocity/acceleration,
//! indexed the same way as `tree.joints`) so that the active/full-tree
//! bookkeeping stays entirely in [`super::RigidBodyModel`]; this module is
//! the numerical core and knows nothing about which joints are "active".
//!
//! Neither this crate's starting point nor the rest of the retrieved pack implements RNEA —
//! this is written from the classical Newton-Euler formulation ("kinematic
//! RNEA" = downward velocity/acceleration sweep, "dynamic RNEA" = upward
//! force sweep), using `nalgebra` the way `physics.rs`/`urdf.rs`
//! already do for poses and vectors.

use nalgebra::{Isometry3, Matrix3, UnitQuaternion, Vector3};

use super::tree::RigidBodyTree;

/// World-frame pose of every link, indexed by link index.
pub fn forward_kinematics_tree(
    tree: &RigidBodyTree,
    q_per_joint: &[f64],
    h_wb: &Isometry3<f64>,
) -> Vec<Isometry3<f64>> {
    let mut poses = vec![*h_wb; tree.links.len()];
    poses[tree.root_link] = *h_wb;

    // `tree.joints` is topologically sorted (parent before child), so a
    // single forward pass suffices.
    for (idx, joint) in tree.joints.iter().enumerate() {
        let parent_pose = poses[joint.parent_link];
        let rotation = match joint.axis_local {
            Some(axis) => UnitQuaternion::from_axis_angle(
                &nalgebra::Unit::new_normalize(axis),
                q_per_joint[idx],
            ),
            None => UnitQuaternion::identity(),
        };
        let child_pose = parent_pose * joint.origin * Isometry3::from_parts(Vector3::zeros().into(), rotation);
        poses[joint.child_link] = child_pose;
    }
    poses
}

/// Per-link world-frame velocity (angular, linear-at-origin) and
/// acceleration (angular, linear-at-origin, already including gravity via
/// the standard RNEA trick of injecting `a_base = base_accel - gravity`).
pub struct TreeKinematics {
    pub omega: Vec<Vector3<f64>>,
    pub v: Vec<Vector3<f64>>,
    pub alpha: Vec<Vector3<f64>>,
    pub a: Vec<Vector3<f64>>,
}

#[allow(clippy::too_many_arguments)]
pub fn propagate_kinematics(
    tree: &RigidBodyTree,
    poses: &[Isometry3<f64>],
    base_omega: Vector3<f64>,
    base_v: Vector3<f64>,
    base_alpha: Vector3<f64>,
    base_a_minus_gravity: Vector3<f64>,
    qdot_per_joint: &[f64],
    qddot_per_joint: &[f64],
) -> TreeKinematics {
    let n = tree.links.len();
    let mut omega = vec![base_omega; n];
    let mut v = vec![base_v; n];
    let mut alpha = vec![base_alpha; n];
    let mut a = vec![base_a_minus_gravity; n];

    omega[tree.root_link] = base_omega;
    v[tree.root_link] = base_v;
    alpha[tree.root_link] = base_alpha;
    a[tree.root_link] = base_a_minus_gravity;

    for (idx, joint) in tree.joints.iter().enumerate() {
        let p = joint.parent_link;
        let c = joint.child_link;
        let r = poses[c].translation.vector - poses[p].translation.vector;

        let (axis_world, qdot, qddot) = match joint.axis_local {
            Some(axis_local) => (
                poses[p].rotation * axis_local.normalize(),
                qdot_per_joint[idx],
                qddot_per_joint[idx],
            ),
            None => (Vector3::zeros(), 0.0, 0.0),
        };

        omega[c] = omega[p] + axis_world * qdot;
        v[c] = v[p] + omega[p].cross(&r);
        alpha[c] = alpha[p] + axis_world * qddot + omega[p].cross(&(axis_world * qdot));
        a[c] = a[p] + alpha[p].cross(&r) + omega[p].cross(&omega[p].cross(&r));
    }

    TreeKinematics { omega, v, alpha, a }
}

/// Net wrench (moment, force), expressed about a link's origin, required to
/// sustain the given kinematics for that link's own mass/inertia alone
/// (i.e. before accounting for children).
fn link_required_wrench(
    pose: &Isometry3<f64>,
    omega: Vector3<f64>,
    alpha: Vector3<f64>,
    a_origin: Vector3<f64>,
    mass: f64,
    com_local: Vector3<f64>,
    inertia_local: Matrix3<f64>,
) -> (Vector3<f64>, Vector3<f64>) {
    let r_com = pose.rotation * com_local;
    let a_com = a_origin + alpha.cross(&r_com) + omega.cross(&omega.cross(&r_com));
    let force = mass * a_com;

    let inertia_world = pose.rotation.to_rotation_matrix() * inertia_local * pose.rotation.to_rotation_matrix().transpose();
    let moment_about_com = inertia_world * alpha + omega.cross(&(inertia_world * omega));
    // Shift reference point from COM to link origin: M_origin = M_com + r_com × F.
    let moment_about_origin = moment_about_com + r_com.cross(&force);

    (moment_about_origin, force)
}

/// Upward dynamic sweep: returns `(base_wrench, joint_torques)` where
/// `base_wrench = (moment, force)` about the base origin expressed in the
/// world frame, and `joint_torques[k]` is the generalized torque for the
/// `k`-th movable joint (tree traversal order).
pub fn inverse_dynamics_tree(
    tree: &RigidBodyTree,
    poses: &[Isometry3<f64>],
    kin: &TreeKinematics,
    masses_override: Option<&[f64]>,
) -> ((Vector3<f64>, Vector3<f64>), Vec<f64>) {
    let n = tree.links.len();
    let mut wrench_at_origin: Vec<(Vector3<f64>, Vector3<f64>)> = (0..n)
        .map(|i| {
            let mass = masses_override.map(|m| m[i]).unwrap_or(tree.links[i].mass);
            link_required_wrench(
                &poses[i],
                kin.omega[i],
                kin.alpha[i],
                kin.a[i],
                mass,
                tree.links[i].com_local,
                tree.links[i].inertia_local,
            )
        })
        .collect();

    // Accumulate children's transmitted wrench into each parent, processing
    // in reverse topological order (children after parents in `joints`, so
    // reverse iteration visits children before parents).
    let mut joint_torques = vec![0.0; tree.full_dof()];
    let mut movable_slot = vec![None; tree.joints.len()];
    {
        let mut k = 0;
        for (i, j) in tree.joints.iter().enumerate() {
            if j.is_movable() {
                movable_slot[i] = Some(k);
                k += 1;
            }
        }
    }

    for (idx, joint) in tree.joints.iter().enumerate().rev() {
        let p = joint.parent_link;
        let c = joint.child_link;

        let (moment_c, force_c) = wrench_at_origin[c];

        if let Some(axis_local) = joint.axis_local {
            let axis_world = poses[p].rotation * axis_local.normalize();
            joint_torques[movable_slot[idx].unwrap()] = moment_c.dot(&axis_world);
        }

        // Translate child's wrench to the parent's origin and accumulate.
        let r = poses[c].translation.vector - poses[p].translation.vector;
        let moment_shifted = moment_c + r.cross(&force_c);
        wrench_at_origin[p].0 += moment_shifted;
        wrench_at_origin[p].1 += force_c;
    }

    (wrench_at_origin[tree.root_link], joint_torques)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::{JointSpec, LinkSpec, RigidBodyTree};
    use crate::joint::JointId;

    fn two_link_pendulum() -> RigidBodyTree {
        let links = vec![
            LinkSpec::new("base_link", 1.0, Vector3::zeros(), Matrix3::identity() * 0.01),
            LinkSpec::new("link1", 2.0, Vector3::new(0.0, 0.0, -0.25), Matrix3::identity() * 0.02),
        ];
        let joints = vec![JointSpec {
            id: JointId::new("arm", 0),
            name: "joint1".to_string(),
            parent_link: 0,
            child_link: 1,
            origin: Isometry3::identity(),
            axis_local: Some(Vector3::y()),
            limits: (-3.14, 3.14),
        }];
        RigidBodyTree::new(links, joints, 0)
    }

    #[test]
    fn zero_velocity_static_case_matches_gravity_only() {
        let tree = two_link_pendulum();
        let h_wb = Isometry3::identity();
        let q = vec![0.0];
        let poses = forward_kinematics_tree(&tree, &q, &h_wb);

        let gravity = Vector3::new(0.0, 0.0, -9.81);
        let kin = propagate_kinematics(
            &tree,
            &poses,
            Vector3::zeros(),
            Vector3::zeros(),
            Vector3::zeros(),
            -gravity,
            &[0.0],
            &[0.0],
        );
        let (base_wrench, torques) = inverse_dynamics_tree(&tree, &poses, &kin, None);

        // Static torque at the single joint must balance the weight of
        // link1 acting at its COM offset (0.25m along -z from the joint).
        let expected_torque = 2.0 * 9.81 * 0.25;
        assert!((torques[0].abs() - expected_torque).abs() < 1e-6);
        // Base must support the weight of both links.
        assert!((base_wrench.1.z - (1.0 + 2.0) * 9.81).abs() < 1e-6);
    }
}
