//! Joint identity and the active-joint set.
//!
//! Grounded on `controller/mod.rs::finalize_joint_order`,
//! which hand-maintains a fixed `Vec<String>` mapping logical joint names to
//! a dense observation/action index. [`JointIdSet`] generalises that single
//! fixed list into an insertion-ordered, per-body-part table, keeping the
//! same "order is the contract" spirit.

use std::collections::HashMap;

/// Named partition of the kinematic tree a joint belongs to (e.g. `"left_leg"`).
pub type BodyPart = String;

/// A joint, addressed by the body part that owns it and its index within
/// that part's ordered joint list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointId {
    pub body_part: BodyPart,
    pub local_index: usize,
}

impl JointId {
    pub fn new(body_part: impl Into<BodyPart>, local_index: usize) -> Self {
        Self {
            body_part: body_part.into(),
            local_index,
        }
    }
}

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.body_part, self.local_index)
    }
}

/// Ordered mapping from body part to a sequence of local joint indices,
/// with a stable global (dense) index derived from insertion order across
/// body parts.
///
/// Invariant: no duplicate `(body_part, local_index)` pair is ever present.
/// Global indices are stable as long as the set is not mutated; any
/// `add`/`remove` invalidates previously cached global indices for joints
/// that moved.
#[derive(Debug, Clone, Default)]
pub struct JointIdSet {
    /// Body parts in insertion order; each part's joints in insertion order.
    parts: Vec<BodyPart>,
    joints_by_part: HashMap<BodyPart, Vec<usize>>,
}

impl JointIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `joint` to the set. Returns `false` if it was already present.
    pub fn add(&mut self, joint: JointId) -> bool {
        let entry = self.joints_by_part.entry(joint.body_part.clone());
        let list = entry.or_insert_with(|| {
            self.parts.push(joint.body_part.clone());
            Vec::new()
        });
        if list.contains(&joint.local_index) {
            return false;
        }
        list.push(joint.local_index);
        true
    }

    /// Removes `joint` from the set. Returns `false` if it was not present.
    /// The joint's body part is kept in `parts` (possibly now empty) so
    /// that ordering among remaining body parts never shifts.
    pub fn remove(&mut self, joint: &JointId) -> bool {
        if let Some(list) = self.joints_by_part.get_mut(&joint.body_part) {
            if let Some(pos) = list.iter().position(|&i| i == joint.local_index) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn contains(&self, joint: &JointId) -> bool {
        self.joints_by_part
            .get(&joint.body_part)
            .map(|l| l.contains(&joint.local_index))
            .unwrap_or(false)
    }

    pub fn size(&self) -> usize {
        self.joints_by_part.values().map(|l| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Iterates all joints in canonical (global-index) order.
    pub fn iter(&self) -> impl Iterator<Item = JointId> + '_ {
        self.parts.iter().flat_map(move |part| {
            self.joints_by_part
                .get(part)
                .into_iter()
                .flatten()
                .map(move |&local_index| JointId::new(part.clone(), local_index))
        })
    }

    /// Converts a `JointId` to its dense global index, if present.
    pub fn local_to_global(&self, joint: &JointId) -> Option<usize> {
        let mut global = 0usize;
        for part in &self.parts {
            let list = self.joints_by_part.get(part)?;
            if part == &joint.body_part {
                return list
                    .iter()
                    .position(|&i| i == joint.local_index)
                    .map(|pos| global + pos);
            }
            global += list.len();
        }
        None
    }

    /// Converts a dense global index back to a `JointId`, if in range.
    pub fn global_to_local(&self, mut global: usize) -> Option<JointId> {
        for part in &self.parts {
            let list = self.joints_by_part.get(part)?;
            if global < list.len() {
                return Some(JointId::new(part.clone(), list[global]));
            }
            global -= list.len();
        }
        None
    }
}
