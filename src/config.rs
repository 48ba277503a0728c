//! Runtime configuration, loaded once at init and never partially applied.
//!
//! Generalises `config.rs::SpotConfig` — a struct of plain
//! consts plus a `default_angles()` lookup table — into the configuration
//! surface a multi-robot core needs. Where `SpotConfig` hard-codes a single
//! robot (`SpotConfig::DENSITY`, `SpotConfig::STIFFNESS_HIP`, ...), this
//! crate reads the equivalent knobs from a deserialisable `Configuration`,
//! because the core is meant to serve more than one robot body-part layout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::joint::{BodyPart, JointId};

/// How the floating base is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixedBase {
    /// Base pose comes from IMU + contact kinematics, as usual.
    None,
    /// Base is rigidly fixed to the named link; gravity is injected along
    /// that link's axis instead of read from an IMU.
    RootLink,
    LSole,
    RSole,
}

impl FixedBase {
    /// Gravity direction to inject when the base is fixed: `(0,0,g)` or
    /// `(g,0,0)` depending on which link the base is pinned to.
    pub fn gravity_direction(self, g: f64) -> Option<nalgebra::Vector3<f64>> {
        match self {
            FixedBase::None => None,
            FixedBase::RootLink => Some(nalgebra::Vector3::new(0.0, 0.0, g)),
            FixedBase::LSole | FixedBase::RSole => Some(nalgebra::Vector3::new(g, 0.0, 0.0)),
        }
    }
}

/// A named partition of the kinematic tree (torso, arms, legs, feet), with
/// one designated default-contact link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtree {
    pub name: String,
    pub member_links: Vec<String>,
    pub default_contact_link: String,
}

/// `WBD_SUBTREES`: a named partition of the tree, keyed by subtree name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtreeTable {
    subtrees: Vec<Subtree>,
}

impl SubtreeTable {
    pub fn new(subtrees: Vec<Subtree>) -> Self {
        Self { subtrees }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subtree> {
        self.subtrees.iter()
    }

    pub fn subtree_for_link(&self, link: &str) -> Option<&Subtree> {
        self.subtrees
            .iter()
            .find(|s| s.member_links.iter().any(|l| l == link))
    }

    /// Validates the invariant that the default-contact link is a member of
    /// its own subtree, and that subtrees cover every link named in
    /// `all_links`.
    pub fn validate(&self, all_links: &[String]) -> Result<(), ConfigError> {
        for s in &self.subtrees {
            if s.member_links.is_empty() {
                return Err(ConfigError::EmptySubtree(s.name.clone()));
            }
            if !s.member_links.contains(&s.default_contact_link) {
                return Err(ConfigError::DefaultContactNotMember {
                    subtree: s.name.clone(),
                    link: s.default_contact_link.clone(),
                });
            }
        }
        for link in all_links {
            if self.subtree_for_link(link).is_none() {
                return Err(ConfigError::UncoveredLink(link.clone()));
            }
        }
        Ok(())
    }
}

/// `IDYNTREE_SKINDYNLIB_LINKS`: bijection between tactile `(bodyPart,
/// localIndex)` ids and model `(link, skinFrame)` ids, loaded once at init.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkinDynLibMap {
    taxel_to_link: HashMap<(BodyPart, usize), (String, String)>,
    link_to_taxel: HashMap<(String, String), (BodyPart, usize)>,
}

impl SkinDynLibMap {
    pub fn insert(&mut self, taxel: JointId, link: String, skin_frame: String) {
        let key = (taxel.body_part.clone(), taxel.local_index);
        self.link_to_taxel
            .insert((link.clone(), skin_frame.clone()), key.clone());
        self.taxel_to_link.insert(key, (link, skin_frame));
    }

    pub fn link_for_taxel(&self, taxel: &JointId) -> Option<&(String, String)> {
        self.taxel_to_link
            .get(&(taxel.body_part.clone(), taxel.local_index))
    }

    pub fn taxel_for_link(&self, link: &str, skin_frame: &str) -> Option<JointId> {
        self.link_to_taxel
            .get(&(link.to_string(), skin_frame.to_string()))
            .map(|(bp, idx)| JointId::new(bp.clone(), *idx))
    }
}

/// Display-only corrections that must never leak into physics: the torso-2
/// y-sign flip "for iCubGui" is a presentation quirk, kept opt-in and
/// isolated to the rendering/telemetry boundary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DisplayQuirks {
    pub flip_torso_y_for_gui: bool,
}

/// Defaults for the estimation filters, settable at runtime via
/// `setEstimationParameter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationDefaults {
    pub adaptive_window_max_size: usize,
    pub adaptive_window_threshold: f64,
    pub low_pass_cutoff_hz: f64,
    pub enable_omega_domega_imu: bool,
    pub min_taxel: u32,
    /// Seconds of no tactile frame before all contacts are discarded.
    pub skin_timeout_s: f64,
}

impl Default for EstimationDefaults {
    fn default() -> Self {
        Self {
            adaptive_window_max_size: 16,
            adaptive_window_threshold: 1.0,
            low_pass_cutoff_hz: 5.0,
            enable_omega_domega_imu: true,
            min_taxel: 1,
            skin_timeout_s: 0.5,
        }
    }
}

/// Optional redirect of torque commands to an external torque-control
/// module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorqueModuleConnection {
    pub remote_port: String,
}

/// Everything read at init. Loading is all-or-nothing: on any
/// `ConfigError` the caller keeps whatever configuration it already had —
/// no partial initialisation is ever published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub robot_name: String,
    pub local_name: String,
    pub urdf_path: String,
    pub fixed_base: FixedBase,
    pub skin_dyn_lib_links: SkinDynLibMap,
    pub subtrees: SubtreeTable,
    pub torque_module_connection: Option<TorqueModuleConnection>,
    pub use_external_torque: bool,
    pub estimation: EstimationDefaults,
    pub display: DisplayQuirks,
    /// Per-FT-sensor zero offset applied before low-passing.
    pub ft_offsets: HashMap<String, [f64; 6]>,
    /// Control-loop period in seconds, shared by the estimator and the
    /// locomotion controller (design default 10ms).
    pub control_period_s: f64,
}

impl Configuration {
    pub fn validate(&self, all_links: &[String]) -> Result<(), ConfigError> {
        self.subtrees.validate(all_links)
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
