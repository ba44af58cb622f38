use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::DeviceError;
use crate::hal::traits::{ArmConnector, ArmDriver};
use crate::hal::types::{ArmAddress, ArmSoftwareInfo, ArmState, GripperState, Pose};

/// Driver status returned by injected read failures
pub const SIMULATED_FAULT_CODE: i32 = -1;

const JOINT_COUNT: usize = 7;

/// Shared fault-injection switches for one simulated arm
#[derive(Debug, Default)]
pub struct ArmFaults {
    fail_next_reads: AtomicUsize,
    fail_always: AtomicBool,
    no_gripper: AtomicBool,
    fail_software_info: AtomicBool,
    read_delay_us: AtomicU64,
    reads: AtomicU64,
    in_flight: AtomicBool,
    overlapping_reads: AtomicU64,
    moves: Mutex<Vec<(Vec<f64>, u32, bool)>>,
}

impl ArmFaults {
    /// Fail the next `n` state reads
    pub fn fail_next_reads(&self, n: usize) {
        self.fail_next_reads.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Make gripper reads fail as if no gripper were fitted
    pub fn set_no_gripper(&self, missing: bool) {
        self.no_gripper.store(missing, Ordering::SeqCst);
    }

    /// Make software info queries fail with [`SIMULATED_FAULT_CODE`]
    pub fn set_fail_software_info(&self, fail: bool) {
        self.fail_software_info.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_us.store(delay.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of reads that started while another read on the same handle was running
    pub fn overlapping_reads(&self) -> u64 {
        self.overlapping_reads.load(Ordering::SeqCst)
    }

    /// Commands received through `move_to`: (joints, speed, blocking)
    pub fn moves(&self) -> Vec<(Vec<f64>, u32, bool)> {
        self.moves.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn take_failure(&self) -> bool {
        if self.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn read_delay(&self) -> Duration {
        Duration::from_micros(self.read_delay_us.load(Ordering::SeqCst))
    }
}

/// Simulated arm controller.
///
/// Joints oscillate around the last commanded position so recordings show
/// motion without hardware.
pub struct SimulatedArm {
    id: String,
    faults: Arc<ArmFaults>,
    home: Vec<f64>,
    amplitude_deg: f64,
    frequency_hz: f64,
    started: Instant,
    connected: bool,
}

impl SimulatedArm {
    pub fn new(id: impl Into<String>, faults: Arc<ArmFaults>) -> Self {
        Self {
            id: id.into(),
            faults,
            home: vec![0.0; JOINT_COUNT],
            amplitude_deg: 5.0,
            frequency_hz: 0.5,
            started: Instant::now(),
            connected: true,
        }
    }

    pub fn with_amplitude(mut self, amplitude_deg: f64) -> Self {
        self.amplitude_deg = amplitude_deg;
        self
    }

    fn check_connected(&self) -> Result<(), DeviceError> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::Disconnected(self.id.clone()))
        }
    }

    fn phase(&self) -> f64 {
        2.0 * PI * self.frequency_hz * self.started.elapsed().as_secs_f64()
    }
}

#[async_trait]
impl ArmDriver for SimulatedArm {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_state(&mut self) -> Result<ArmState, DeviceError> {
        self.check_connected()?;

        if self.faults.in_flight.swap(true, Ordering::SeqCst) {
            self.faults.overlapping_reads.fetch_add(1, Ordering::SeqCst);
        }
        let delay = self.faults.read_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.faults.in_flight.store(false, Ordering::SeqCst);
        self.faults.reads.fetch_add(1, Ordering::SeqCst);

        if self.faults.take_failure() {
            return Err(DeviceError::driver("read_state", SIMULATED_FAULT_CODE));
        }

        let phase = self.phase();
        let joint = self
            .home
            .iter()
            .enumerate()
            .map(|(i, home)| home + self.amplitude_deg * (phase + i as f64 * 0.3).sin())
            .collect();

        let pose = Pose {
            position: [0.3 + 0.05 * phase.sin(), 0.05 * phase.cos(), 0.4],
            euler: [PI, 0.0, 0.1 * phase.sin()],
        };

        Ok(ArmState { joint, pose })
    }

    async fn read_gripper(&mut self) -> Result<GripperState, DeviceError> {
        self.check_connected()?;
        if self.faults.no_gripper.load(Ordering::SeqCst) {
            return Err(DeviceError::driver("read_gripper", SIMULATED_FAULT_CODE));
        }
        // Realman grippers report 1..=1000
        let position = 500.0 + 499.0 * self.phase().cos();
        Ok(GripperState { position })
    }

    async fn software_info(&mut self) -> Result<ArmSoftwareInfo, DeviceError> {
        self.check_connected()?;
        if self.faults.fail_software_info.load(Ordering::SeqCst) {
            return Err(DeviceError::driver("software_info", SIMULATED_FAULT_CODE));
        }
        Ok(ArmSoftwareInfo {
            product_version: "SIM-75-B".to_string(),
            algorithm_version: "sim-algo 1.0.0".to_string(),
            control_version: "sim-ctrl 1.0.0".to_string(),
            dynamics_version: "sim-dyn 1".to_string(),
            planning_version: "sim-plan 1.0.0".to_string(),
        })
    }

    async fn move_to(&mut self, joints: &[f64], speed: u32, blocking: bool) -> Result<(), DeviceError> {
        self.check_connected()?;
        if let Ok(mut moves) = self.faults.moves.lock() {
            moves.push((joints.to_vec(), speed, blocking));
        }
        self.home = joints.to_vec();
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.connected = false;
        Ok(())
    }
}

/// Hands out [`SimulatedArm`] sessions
#[derive(Default)]
pub struct SimulatedArmConnector {
    unreachable: HashSet<String>,
    faults: Mutex<HashMap<String, Arc<ArmFaults>>>,
    amplitude_deg: Option<f64>,
}

impl SimulatedArmConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections to this host fail
    pub fn with_unreachable(mut self, host: impl Into<String>) -> Self {
        self.unreachable.insert(host.into());
        self
    }

    pub fn with_amplitude(mut self, amplitude_deg: f64) -> Self {
        self.amplitude_deg = Some(amplitude_deg);
        self
    }

    /// Fault switches for the arm at `host`, shared with any session opened later
    pub fn faults_for(&self, host: &str) -> Arc<ArmFaults> {
        let mut faults = match self.faults.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        faults.entry(host.to_string()).or_default().clone()
    }
}

#[async_trait]
impl ArmConnector for SimulatedArmConnector {
    async fn connect(&self, address: &ArmAddress) -> Result<Box<dyn ArmDriver>, DeviceError> {
        address.ip()?;

        if self.unreachable.contains(&address.host) {
            return Err(DeviceError::Connection {
                address: address.to_string(),
                reason: "controller unreachable".to_string(),
            });
        }

        let mut arm = SimulatedArm::new(address.to_string(), self.faults_for(&address.host));
        if let Some(amplitude) = self.amplitude_deg {
            arm = arm.with_amplitude(amplitude);
        }
        Ok(Box::new(arm))
    }
}
