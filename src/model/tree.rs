//! The rigid-body tree itself: links, joints and the canonical joint order.
//!
//! The URDF text parser is an explicit external collaborator. This module
//! only defines the in-memory tree shape a parser (or a test) must
//! produce — grounded on the *traversal* logic in
//! `urdf.rs` (breadth-first pose composition from a root
//! link, `adjacency: HashMap<parent, Vec<(child, origin, joint_name, axis)>>`)
//! without its `roxmltree`-based text parsing.

use std::collections::HashMap;

use nalgebra::{Isometry3, Matrix3, Vector3};

use crate::error::ModelError;
use crate::joint::JointId;

#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub name: String,
    pub mass: f64,
    /// Centre of mass, expressed in the link's own origin frame.
    pub com_local: Vector3<f64>,
    /// Rotational inertia about the centre of mass, in the link's frame.
    pub inertia_local: Matrix3<f64>,
}

impl LinkSpec {
    pub fn new(name: impl Into<String>, mass: f64, com_local: Vector3<f64>, inertia_local: Matrix3<f64>) -> Self {
        Self {
            name: name.into(),
            mass,
            com_local,
            inertia_local,
        }
    }
}

/// A joint connecting `parent_link` to `child_link`. `axis_local` is `None`
/// for a fixed joint; otherwise the joint is revolute about that axis,
/// expressed in the joint frame (`origin` maps parent-link frame to joint
/// frame, coincident with the child-link origin).
#[derive(Debug, Clone)]
pub struct JointSpec {
    pub id: JointId,
    pub name: String,
    pub parent_link: usize,
    pub child_link: usize,
    pub origin: Isometry3<f64>,
    pub axis_local: Option<Vector3<f64>>,
    pub limits: (f64, f64),
}

impl JointSpec {
    pub fn is_movable(&self) -> bool {
        self.axis_local.is_some()
    }
}

/// The loaded kinematic tree: links with inertial parameters, joints in
/// parent-before-child (topological) order, and the canonical mapping from
/// [`JointId`] to a dense index among movable joints (the full tree).
#[derive(Debug, Clone)]
pub struct RigidBodyTree {
    pub links: Vec<LinkSpec>,
    pub joints: Vec<JointSpec>,
    pub root_link: usize,
    pub name_to_link: HashMap<String, usize>,
    movable_joint_indices: Vec<usize>,
    id_to_full_index: HashMap<JointId, usize>,
    /// Index into `joints` of the joint connecting a link to its parent;
    /// `None` for the root link.
    link_parent_joint: Vec<Option<usize>>,
}

impl RigidBodyTree {
    /// Builds the derived indices from a topologically-sorted link/joint
    /// list. `joints` must list each joint after its parent link has
    /// appeared (i.e. no joint references a child before its parent is
    /// known) — the invariant the out-of-scope URDF parser is responsible
    /// for upholding.
    pub fn new(links: Vec<LinkSpec>, joints: Vec<JointSpec>, root_link: usize) -> Self {
        let mut name_to_link = HashMap::new();
        for (i, l) in links.iter().enumerate() {
            name_to_link.insert(l.name.clone(), i);
        }

        let mut movable_joint_indices = Vec::new();
        let mut id_to_full_index = HashMap::new();
        for (i, j) in joints.iter().enumerate() {
            if j.is_movable() {
                id_to_full_index.insert(j.id.clone(), movable_joint_indices.len());
                movable_joint_indices.push(i);
            }
        }

        let mut link_parent_joint = vec![None; links.len()];
        for (i, j) in joints.iter().enumerate() {
            link_parent_joint[j.child_link] = Some(i);
        }

        Self {
            links,
            joints,
            root_link,
            name_to_link,
            movable_joint_indices,
            id_to_full_index,
            link_parent_joint,
        }
    }

    /// Ancestor joint indices of `link`, root-most first, ending at the
    /// joint directly connecting to `link`.
    pub fn ancestor_joints(&self, link: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut cur = link;
        while let Some(j) = self.link_parent_joint[cur] {
            chain.push(j);
            cur = self.joints[j].parent_link;
        }
        chain.reverse();
        chain
    }

    pub fn full_dof(&self) -> usize {
        self.movable_joint_indices.len()
    }

    /// Index into `self.joints` for the `k`-th movable joint (`k` in
    /// canonical full-tree order).
    pub fn movable_joint(&self, k: usize) -> &JointSpec {
        &self.joints[self.movable_joint_indices[k]]
    }

    pub fn full_index_of(&self, id: &JointId) -> Option<usize> {
        self.id_to_full_index.get(id).copied()
    }

    pub fn link_index(&self, name: &str) -> Result<usize, ModelError> {
        self.name_to_link
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::UnknownLink(name.to_string()))
    }

    /// Children joints of a link (indices into `self.joints`), in the
    /// order they appear in the topological listing.
    pub fn children_of(&self, link: usize) -> impl Iterator<Item = usize> + '_ {
        self.joints
            .iter()
            .enumerate()
            .filter(move |(_, j)| j.parent_link == link)
            .map(|(i, _)| i)
    }

    pub fn all_link_names(&self) -> Vec<String> {
        self.links.iter().map(|l| l.name.clone()).collect()
    }
}

/// External collaborator interface: anything that can produce a
/// [`RigidBodyTree`] (a URDF parser, a test fixture, ...) implements this.
/// The core never parses robot-description text itself.
pub trait RigidBodyTreeSource {
    fn build_tree(&self) -> Result<RigidBodyTree, ModelError>;
}
