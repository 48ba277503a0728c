//! Signal filters: adaptive-window polynomial differentiators
//! and first-order low-pass filters.
//!
//! Nothing upstream owns signal-processing code of its own — the closest
//! analogue is `controller/mod.rs`'s `JointState` which differentiates joint
//! targets by finite difference (`(target - prev_target) / dt`) every tick.
//! These filters generalise that idea into a proper adaptive differentiator
//! and a first-order IIR, in the same house style as a small owning
//! struct with an explicit `new`/reset and a single hot-path method called
//! once per tick.

mod adaptive_window;
mod low_pass;

pub use adaptive_window::{AdaptiveWindowFilter, PolyOrder};
pub use low_pass::LowPassFilter;
