//! Fixed-period thread runner for the estimator and locomotion-controller
//! loops.
//!
//! Neither periodic thread exists upstream: `simulation.rs::physics_step`
//! is driven by the bevy scheduler instead of an owned OS thread. Two
//! periodic real-time threads (estimator, locomotion controller) each run a
//! single-threaded cooperative loop and honour a stop signal checked at tick
//! boundaries; this is built from `std::thread` and `std::sync::atomic`,
//! the idiomatic stdlib primitives for exactly this pattern, since nothing
//! in the dependency stack supplies a scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::actuator::ActuatorGateway;
use crate::estimator::StateEstimator;
use crate::locomotion::LocomotionController;
use crate::sensors::SensorDriver;

/// A cooperative stop flag shared between a spawned loop and its owner.
/// Checked once per tick boundary; an in-progress tick always runs to
/// completion.
#[derive(Clone)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `tick` at a fixed period until `stop` is raised, sleeping out the
/// remainder of each period and logging (rather than panicking on) an
/// overrun — the period itself is the latency bound, not a per-tick
/// deadline failure: there is no per-operation timeout, since the
/// estimator period itself bounds latency.
fn run_periodic<F: FnMut()>(name: &str, period: Duration, stop: &StopSignal, mut tick: F) {
    loop {
        if stop.is_stopped() {
            log::info!("{name}: stop signal observed, exiting");
            return;
        }
        let start = Instant::now();
        tick();
        let elapsed = start.elapsed();
        if elapsed > period {
            log::warn!("{name}: tick overran period ({elapsed:?} > {period:?})");
        } else {
            thread::sleep(period - elapsed);
        }
    }
}

/// Handle to a spawned periodic thread plus the signal that stops it.
/// Dropping this without calling [`PeriodicHandle::join`] leaves the
/// thread running — callers that care about clean shutdown should always
/// `stop()` then `join()`.
pub struct PeriodicHandle {
    stop: StopSignal,
    join: Option<JoinHandle<()>>,
}

impl PeriodicHandle {
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Signals the thread to stop and blocks until it exits.
    pub fn join(mut self) {
        self.stop.stop();
        if let Some(h) = self.join.take() {
            let _ = h.join();
        }
    }
}

/// The estimator's period 10 ms default.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

/// Spawns the periodic estimator thread: each tick reads sensors (via
/// `driver`), rebuilds the state snapshot, and publishes it under the
/// estimator mutex.
pub fn spawn_estimator_thread(
    estimator: Arc<Mutex<StateEstimator>>,
    mut driver: Box<dyn SensorDriver>,
    period: Duration,
    clock: impl Fn() -> f64 + Send + 'static,
) -> PeriodicHandle {
    let stop = StopSignal::new();
    let stop_inner = stop.clone();
    let join = thread::Builder::new()
        .name("wbc-estimator".to_string())
        .spawn(move || {
            run_periodic("estimator", period, &stop_inner, || {
                let now = clock();
                let mut est = estimator.lock().unwrap();
                est.tick(driver.as_mut(), now);
            });
        })
        .expect("failed to spawn estimator thread");
    PeriodicHandle {
        stop,
        join: Some(join),
    }
}

/// The fixed pair of foot links a [`LocomotionController`] tick needs each
/// period; resolved once at spawn time since the body-part naming doesn't
/// change while the controller is running.
pub struct FootLinks {
    pub left: String,
    pub right: String,
}

/// Spawns the periodic locomotion-controller thread: each tick reads the
/// current support phase from `controller`, assembles and solves the task
/// stack, and emits joint commands via `actuators`/`driver`.
pub fn spawn_locomotion_thread(
    controller: Arc<Mutex<LocomotionController>>,
    actuators: Arc<Mutex<ActuatorGateway>>,
    mut driver: Box<dyn crate::actuator::ActuatorDriver>,
    feet: FootLinks,
    period: Duration,
) -> PeriodicHandle {
    let stop = StopSignal::new();
    let stop_inner = stop.clone();
    let join = thread::Builder::new()
        .name("wbc-locomotion".to_string())
        .spawn(move || {
            run_periodic("locomotion", period, &stop_inner, || {
                let dt = period.as_secs_f64();
                let mut ctrl = controller.lock().unwrap();
                if !ctrl.is_running() {
                    return;
                }
                let mut acts = actuators.lock().unwrap();
                let (support, other, swing) = ctrl.support_feet(&feet.left, &feet.right);
                let _ = ctrl.tick(driver.as_mut(), &mut acts, support, other, swing, dt);
            });
        })
        .expect("failed to spawn locomotion thread");
    PeriodicHandle {
        stop,
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn stop_signal_halts_loop_promptly() {
        let stop = StopSignal::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_inner = count.clone();
        let stop_inner = stop.clone();
        let handle = thread::spawn(move || {
            run_periodic("test", Duration::from_millis(1), &stop_inner, || {
                count_inner.fetch_add(1, Ordering::SeqCst);
            });
        });
        thread::sleep(Duration::from_millis(20));
        stop.stop();
        handle.join().unwrap();
        assert!(count.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn periodic_handle_join_stops_thread() {
        let stop = StopSignal::new();
        let stop_inner = stop.clone();
        let join = thread::spawn(move || {
            run_periodic("test", Duration::from_millis(1), &stop_inner, || {});
        });
        let handle = PeriodicHandle {
            stop,
            join: Some(join),
        };
        handle.join();
    }
}
