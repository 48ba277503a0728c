//! Unified sensor registry.
//!
//! Grounded on the same "external collaborator" shape as
//! [`crate::model::RigidBodyTreeSource`]: the gateway owns the bookkeeping
//! (canonical kind/id registry, last-value cache, unit bookkeeping) and
//! defers the actual I/O to a [`SensorDriver`] the caller supplies — a port
//! subscription, a simulator, a test fixture. Nothing in this module talks
//! to a network port directly; driver fan-out stays an external concern.

use std::collections::HashMap;

use crate::error::SensorError;

/// Tagged sensor family. Each has a fixed per-sample element count:
/// encoder 1, torque 1, PWM 1, IMU 13 (orientation
/// quaternion 4 + linear acceleration 3 + angular velocity 3 +
/// magnetometer 3), force/torque 6, skin contact is frame-shaped and
/// handled separately by [`crate::contacts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Encoder,
    Torque,
    Pwm,
    Imu,
    ForceTorque,
    SkinContact,
}

impl SensorKind {
    /// Canonical per-sample element count; `None` for kinds whose sample
    /// shape is not fixed (skin contact frames vary with taxel count).
    pub fn sample_len(self) -> Option<usize> {
        match self {
            SensorKind::Encoder => Some(1),
            SensorKind::Torque => Some(1),
            SensorKind::Pwm => Some(1),
            SensorKind::Imu => Some(13),
            SensorKind::ForceTorque => Some(6),
            SensorKind::SkinContact => None,
        }
    }
}

/// A source of fresh samples for one `(kind, id)` pair. Implemented by
/// whatever talks to the real driver (YARP-style port, simulator, fixture);
/// the gateway only knows how to cache and stale-check what this returns.
pub trait SensorDriver: Send {
    /// Returns `Some((timestamp, sample))` if a fresh sample is available,
    /// `None` if the driver has nothing new. Must not block regardless of
    /// the gateway's `blocking` flag — blocking is implemented by the
    /// gateway via repeated polling (see [`SensorGateway::read`]).
    fn poll(&mut self, kind: SensorKind, id: &str) -> Option<(f64, Vec<f64>)>;
}

struct CachedSample {
    timestamp: f64,
    value: Vec<f64>,
}

/// Registry of sensors keyed by `(kind, id)`. Every successful read also
/// updates an internal `(id → timestamp, last-value)` cache.
pub struct SensorGateway {
    registered: HashMap<(SensorKindKey, String), ()>,
    by_kind: HashMap<SensorKindKey, Vec<String>>,
    cache: HashMap<(SensorKindKey, String), CachedSample>,
    /// Upper bound on poll attempts for a blocking read before giving up
    /// with [`SensorError::Timeout`] — the core never literally blocks a
    /// real-time thread, so blocking reads are bounded retries instead.
    max_blocking_polls: usize,
}

// SensorKind isn't Hash/Eq-friendly for HashMap keys without deriving them
// on the public enum itself; it already derives both, so this wrapper only
// exists to keep field types readable.
type SensorKindKey = SensorKind;

impl Default for SensorGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorGateway {
    pub fn new() -> Self {
        Self {
            registered: HashMap::new(),
            by_kind: HashMap::new(),
            cache: HashMap::new(),
            max_blocking_polls: 64,
        }
    }

    pub fn set_max_blocking_polls(&mut self, n: usize) {
        self.max_blocking_polls = n;
    }

    pub fn add_sensor(&mut self, kind: SensorKind, id: impl Into<String>) -> Result<(), SensorError> {
        let id = id.into();
        let key = (kind, id.clone());
        if self.registered.contains_key(&key) {
            return Err(SensorError::AlreadyRegistered { kind, id });
        }
        self.registered.insert(key, ());
        self.by_kind.entry(kind).or_default().push(id);
        Ok(())
    }

    pub fn remove_sensor(&mut self, kind: SensorKind, id: &str) -> Result<(), SensorError> {
        let key = (kind, id.to_string());
        if self.registered.remove(&key).is_none() {
            return Err(SensorError::UnknownSensor {
                kind,
                id: id.to_string(),
            });
        }
        if let Some(list) = self.by_kind.get_mut(&kind) {
            list.retain(|existing| existing != id);
        }
        self.cache.remove(&key);
        Ok(())
    }

    pub fn get_sensor_list(&self, kind: SensorKind) -> &[String] {
        self.by_kind
            .get(&kind)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Reads one sensor. With `blocking = false`, returns the cached value
    /// immediately (even if stale — the caller compares timestamps to
    /// detect staleness). With `blocking = true`, polls the driver up to
    /// `max_blocking_polls` times for a fresh sample, failing with
    /// [`SensorError::Timeout`] if none arrives.
    pub fn read(
        &mut self,
        driver: &mut dyn SensorDriver,
        kind: SensorKind,
        id: &str,
        blocking: bool,
    ) -> Result<(f64, Vec<f64>), SensorError> {
        let key = (kind, id.to_string());
        if !self.registered.contains_key(&key) {
            return Err(SensorError::UnknownSensor {
                kind,
                id: id.to_string(),
            });
        }

        let attempts = if blocking { self.max_blocking_polls } else { 1 };
        for attempt in 0..attempts {
            if let Some((ts, value)) = driver.poll(kind, id) {
                if let Some(expected) = kind.sample_len() {
                    if value.len() != expected {
                        return Err(SensorError::WrongSampleLen {
                            kind,
                            id: id.to_string(),
                            expected,
                            got: value.len(),
                        });
                    }
                }
                self.cache.insert(
                    key,
                    CachedSample {
                        timestamp: ts,
                        value: value.clone(),
                    },
                );
                return Ok((ts, value));
            }
            if !blocking || attempt + 1 == attempts {
                break;
            }
        }

        match self.cache.get(&key) {
            Some(c) if !blocking => Ok((c.timestamp, c.value.clone())),
            _ => Err(SensorError::Timeout { id: id.to_string() }),
        }
    }

    /// Reads every sensor of `kind`. A missing sample for one sensor does
    /// not fail the aggregate read — its stale cached value (timestamp
    /// unchanged) is substituted instead.
    pub fn read_all(
        &mut self,
        driver: &mut dyn SensorDriver,
        kind: SensorKind,
        blocking: bool,
    ) -> Vec<(String, f64, Vec<f64>)> {
        let ids = self.get_sensor_list(kind).to_vec();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read(driver, kind, &id, blocking) {
                Ok((ts, v)) => out.push((id, ts, v)),
                Err(_) => {
                    let key = (kind, id.clone());
                    if let Some(c) = self.cache.get(&key) {
                        out.push((id, c.timestamp, c.value.clone()));
                    }
                    // No sample has ever arrived: nothing to report for
                    // this sensor (matches "most recent cached value" —
                    // there is none yet).
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixtureDriver {
        samples: HashMap<(SensorKind, String), Vec<(f64, Vec<f64>)>>,
    }

    impl FixtureDriver {
        fn new() -> Self {
            Self {
                samples: HashMap::new(),
            }
        }

        fn push(&mut self, kind: SensorKind, id: &str, ts: f64, value: Vec<f64>) {
            self.samples
                .entry((kind, id.to_string()))
                .or_default()
                .push((ts, value));
        }
    }

    impl SensorDriver for FixtureDriver {
        fn poll(&mut self, kind: SensorKind, id: &str) -> Option<(f64, Vec<f64>)> {
            self.samples.get_mut(&(kind, id.to_string()))?.pop()
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut gw = SensorGateway::new();
        gw.add_sensor(SensorKind::Encoder, "hip_pitch").unwrap();
        assert!(matches!(
            gw.add_sensor(SensorKind::Encoder, "hip_pitch"),
            Err(SensorError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn nonblocking_read_returns_stale_cache_on_miss() {
        let mut gw = SensorGateway::new();
        gw.add_sensor(SensorKind::Encoder, "hip_pitch").unwrap();
        let mut driver = FixtureDriver::new();
        driver.push(SensorKind::Encoder, "hip_pitch", 1.0, vec![0.5]);

        let (ts1, v1) = gw
            .read(&mut driver, SensorKind::Encoder, "hip_pitch", false)
            .unwrap();
        assert_eq!((ts1, v1), (1.0, vec![0.5]));

        // No new sample queued: a non-blocking read should return the
        // same cached value and timestamp.
        let (ts2, v2) = gw
            .read(&mut driver, SensorKind::Encoder, "hip_pitch", false)
            .unwrap();
        assert_eq!((ts2, v2), (1.0, vec![0.5]));
    }

    #[test]
    fn blocking_read_times_out_with_no_driver_data() {
        let mut gw = SensorGateway::new();
        gw.add_sensor(SensorKind::Imu, "head_imu").unwrap();
        gw.set_max_blocking_polls(3);
        let mut driver = FixtureDriver::new();

        assert!(matches!(
            gw.read(&mut driver, SensorKind::Imu, "head_imu", true),
            Err(SensorError::Timeout { .. })
        ));
    }

    #[test]
    fn wrong_sample_length_is_rejected() {
        let mut gw = SensorGateway::new();
        gw.add_sensor(SensorKind::ForceTorque, "l_ankle_ft").unwrap();
        let mut driver = FixtureDriver::new();
        driver.push(SensorKind::ForceTorque, "l_ankle_ft", 0.1, vec![1.0, 2.0]);

        assert!(matches!(
            gw.read(&mut driver, SensorKind::ForceTorque, "l_ankle_ft", false),
            Err(SensorError::WrongSampleLen { expected: 6, got: 2, .. })
        ));
    }

    #[test]
    fn read_all_falls_back_to_cached_value_per_sensor() {
        let mut gw = SensorGateway::new();
        gw.add_sensor(SensorKind::Encoder, "a").unwrap();
        gw.add_sensor(SensorKind::Encoder, "b").unwrap();
        let mut driver = FixtureDriver::new();
        driver.push(SensorKind::Encoder, "a", 1.0, vec![0.1]);
        driver.push(SensorKind::Encoder, "b", 1.0, vec![0.2]);
        gw.read_all(&mut driver, SensorKind::Encoder, false);

        // Only "a" gets a fresh sample on the second round.
        driver.push(SensorKind::Encoder, "a", 2.0, vec![0.3]);
        let out = gw.read_all(&mut driver, SensorKind::Encoder, false);
        let map: HashMap<_, _> = out.into_iter().map(|(id, ts, v)| (id, (ts, v))).collect();
        assert_eq!(map["a"], (2.0, vec![0.3]));
        assert_eq!(map["b"], (1.0, vec![0.2]));
    }
}
