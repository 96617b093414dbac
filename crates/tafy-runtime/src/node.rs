//! [`RobotNode`] – composition root wiring drive, sensing, routing and
//! transport into one cooperative control loop.
//!
//! The node owns every component outright; nothing is global. One call to
//! [`RobotNode::step`] is one pass of the loop:
//!
//! 1. throttled broker reconnection;
//! 2. drain inbound messages through the bridge into the router, which hands
//!    payloads to the drive or the range pipeline;
//! 3. sensor acquisition (when due), the proximity interlock and
//!    event-driven sensor telemetry;
//! 4. drive tick (watchdog, ramp, odometry, output);
//! 5. periodic motor telemetry, sensor telemetry and heartbeat.
//!
//! No step blocks and no error escapes it: failures are logged, counted and
//! surfaced in the heartbeat.
//!
//! # Example
//!
//! ```rust
//! use tafy_hal::sim::SimHardware;
//! use tafy_middleware::LoopbackBroker;
//! use tafy_runtime::{NodeConfig, RobotNode};
//!
//! let broker = LoopbackBroker::default();
//! let rig = SimHardware::new().with_obstacle_at(800).build();
//! let config = NodeConfig {
//!     broker_url: Some("nats://loopback".into()),
//!     ..NodeConfig::default()
//! };
//! let mut node = RobotNode::new(config, rig.wheels, rig.ranging, Box::new(broker.transport()))
//!     .expect("default config is valid");
//! node.begin(0);
//! node.step(0);
//! assert!(node.is_connected());
//! ```

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use tafy_hal::{DriveController, RangeSensingPipeline, RangingElement, WheelDriver};
use tafy_kernel::{ProximityInterlock, StopReason};
use tafy_middleware::bridge::BridgeStats;
use tafy_middleware::{ProtocolRouter, RouterStats, Transport, TransportBridge};
use tafy_types::motor::MOTOR_TELEMETRY_SCHEMA;
use tafy_types::sensor::RANGE_SCHEMA;
use tafy_types::subjects::{self, Domain};
use tafy_types::system::HEARTBEAT_SCHEMA;
use tafy_types::{
    Capability, DriveStatus, HealthReport, Heartbeat, LinkStatus, NodeError, NodeStatus,
    RangeStatus,
};

use crate::config::NodeConfig;
use crate::scheduler::{NodeTask, Scheduler};

/// State reachable from capability handlers.
struct Devices {
    drive: DriveController,
    range: RangeSensingPipeline,
    /// Time of the step currently dispatching.
    now_ms: u64,
    heartbeat_requested: bool,
}

/// Router plus the devices it dispatches to; the context of bridge handlers.
struct NodeCore {
    router: ProtocolRouter<Devices>,
    devices: Devices,
}

impl NodeCore {
    fn route(&mut self, doc: &Value) {
        // The router logs and counts every failure.
        let _ = self.router.dispatch(doc, &mut self.devices);
    }
}

pub struct RobotNode {
    config: NodeConfig,
    bridge: TransportBridge<NodeCore>,
    core: NodeCore,
    scheduler: Scheduler,
    interlock: ProximityInterlock,
    started_ms: Option<u64>,
    hardware_faults: u64,
}

impl RobotNode {
    /// Assemble a node. The broker address, when configured, is parsed here
    /// but no connection is attempted until [`begin`][Self::begin].
    pub fn new(
        config: NodeConfig,
        wheels: Box<dyn WheelDriver>,
        ranging: Box<dyn RangingElement>,
        transport: Box<dyn Transport>,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let devices = Devices {
            drive: DriveController::new(wheels, config.drive.clone()),
            range: RangeSensingPipeline::new(ranging, config.range.clone()),
            now_ms: 0,
            heartbeat_requested: false,
        };

        let mut router = ProtocolRouter::new(&config.device_id, Capability::ALL.to_vec());
        router.register(Capability::MotorDifferential, |d: &mut Devices, payload| {
            d.drive.handle_command(payload, d.now_ms)
        });
        router.register(Capability::SensorRangeTof, |d: &mut Devices, payload| {
            d.range.handle_command(payload)
        });
        router.register(Capability::SystemHeartbeat, |d: &mut Devices, _| {
            d.heartbeat_requested = true;
            Ok(())
        });

        let mut bridge = TransportBridge::new(transport, config.device_id.clone())
            .with_backoff_ms(config.timing.reconnect_backoff_ms);
        if let Some(url) = &config.broker_url {
            bridge
                .configure(url)
                .map_err(|e| NodeError::InvalidConfig(format!("broker_url: {e}")))?;
        }
        for domain in [Domain::Motor, Domain::Sensor, Domain::System] {
            for subject in [
                subjects::command(domain),
                subjects::device_command(domain, &config.device_id),
            ] {
                bridge.subscribe(&subject, |core: &mut NodeCore, doc: Value| core.route(&doc));
            }
        }

        let timing = &config.timing;
        let scheduler = Scheduler::new()
            .every(NodeTask::SensorAcquisition, timing.sensor_interval_ms)
            .every(NodeTask::MotorTelemetry, timing.motor_telemetry_interval_ms)
            .every(NodeTask::SensorTelemetry, timing.sensor_telemetry_interval_ms)
            .every(NodeTask::Heartbeat, timing.heartbeat_interval_ms);

        let mut interlock = ProximityInterlock::new(config.safety.emergency_stop_distance_mm);
        interlock.set_enabled(config.safety.proximity_interlock);

        Ok(Self {
            config,
            bridge,
            core: NodeCore { router, devices },
            scheduler,
            interlock,
            started_ms: None,
            hardware_faults: 0,
        })
    }

    /// Start the range sensor and make the first broker connection attempt.
    /// Neither failure is fatal: the sensor reports unavailable and the
    /// connection is retried from [`step`][Self::step].
    pub fn begin(&mut self, now_ms: u64) {
        self.started_ms = Some(now_ms);
        if let Err(e) = self.core.devices.range.begin() {
            warn!(error = %e, "continuing without range sensing");
        }
        if self.bridge.endpoint().is_some() {
            self.bridge.connect(now_ms);
        }
        info!(
            device_id = %self.config.device_id,
            wheels = self.core.devices.drive.driver_id(),
            sensor = %self.config.range.sensor_id,
            "node started"
        );
    }

    /// One pass of the control loop.
    pub fn step(&mut self, now_ms: u64) {
        if self.bridge.endpoint().is_some() {
            self.bridge.reconnect(now_ms);
        }

        self.core.devices.now_ms = now_ms;
        let handled = self.bridge.pump(&mut self.core);
        if handled > 0 {
            trace!(handled, "inbound messages dispatched");
        }

        let due = self.scheduler.due(now_ms);
        let mut sensor_published = false;
        if due.contains(&NodeTask::SensorAcquisition) {
            sensor_published = self.acquire(now_ms);
        }

        if let Err(e) = self.core.devices.drive.tick(now_ms) {
            self.hardware_faults += 1;
            warn!(error = %e, "drive tick failed");
        }

        if due.contains(&NodeTask::MotorTelemetry) {
            self.publish_motor_telemetry(now_ms);
        }
        if due.contains(&NodeTask::SensorTelemetry) && !sensor_published {
            self.publish_sensor_telemetry(now_ms);
        }
        if due.contains(&NodeTask::Heartbeat) || self.core.devices.heartbeat_requested {
            self.core.devices.heartbeat_requested = false;
            self.publish_heartbeat(now_ms);
        }
    }

    /// Latch the drive off, e.g. on operator request or shutdown.
    pub fn emergency_stop(&mut self, reason: StopReason) -> Result<(), NodeError> {
        self.core.devices.drive.emergency_stop_trigger(reason)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn drive(&self) -> &DriveController {
        &self.core.devices.drive
    }

    pub fn range(&self) -> &RangeSensingPipeline {
        &self.core.devices.range
    }

    pub fn router_stats(&self) -> RouterStats {
        self.core.router.stats()
    }

    pub fn bridge_stats(&self) -> BridgeStats {
        self.bridge.stats()
    }

    pub fn is_connected(&self) -> bool {
        self.bridge.connected()
    }

    /// Milliseconds until the next step has work to do: the earliest
    /// scheduled task, capped at the drive step interval so ramping and the
    /// command watchdog keep their cadence.
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        let step = self.config.drive.step_interval_ms;
        self.scheduler
            .next_deadline()
            .map_or(step, |due| due.saturating_sub(now_ms).min(step))
    }

    /// Current heartbeat document payload.
    pub fn heartbeat(&self, now_ms: u64) -> Heartbeat {
        let devices = &self.core.devices;
        let drive = devices.drive.status();
        let sensor = devices.range.status();
        let transport = if self.bridge.connected() {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        };

        let mut warnings = Vec::new();
        match sensor {
            RangeStatus::Unavailable => warnings.push("range sensor unavailable".to_string()),
            RangeStatus::Timeout | RangeStatus::Recovering => {
                warnings.push("range sensor recovering from failed read".to_string())
            }
            _ => {}
        }
        if self.bridge.endpoint().is_some() && transport == LinkStatus::Disconnected {
            warnings.push("broker disconnected".to_string());
        }
        if self.hardware_faults > 0 {
            warnings.push(format!("{} drive hardware faults", self.hardware_faults));
        }
        if let Some(reason) = devices.drive.stop_reason() {
            warnings.push(format!("emergency stop: {reason}"));
        }

        let status = if drive == DriveStatus::EmergencyStop {
            NodeStatus::EmergencyStop
        } else if warnings.is_empty() {
            NodeStatus::Ok
        } else {
            NodeStatus::Degraded
        };

        let router = self.core.router.stats();
        Heartbeat {
            uptime_seconds: now_ms.saturating_sub(self.started_ms.unwrap_or(now_ms)) / 1000,
            status,
            health: HealthReport {
                drive,
                sensor,
                transport,
            },
            active_capabilities: self.core.router.advertised_capabilities(),
            error_count: router.rejected
                + router.handler_errors
                + devices.range.statistics().timeouts
                + devices.range.read_faults()
                + self.hardware_faults,
            emergency_stops: devices.drive.emergency_trip_count(),
            warnings,
        }
    }

    // ── internals ──────────────────────────────────────────────────────────

    /// Sensor tick plus the proximity interlock. Returns whether sensor
    /// telemetry went out because of a significant change.
    fn acquire(&mut self, now_ms: u64) -> bool {
        let devices = &mut self.core.devices;
        match devices.range.tick(now_ms) {
            Ok(()) => {}
            Err(NodeError::SensorTimeout { .. }) => return false,
            Err(NodeError::SensorUnavailable { .. }) => {
                trace!("range sensor unavailable, acquisition skipped");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "range acquisition failed");
                return false;
            }
        }

        if !devices.drive.is_emergency_stopped()
            && let Some(reason) = self
                .interlock
                .evaluate(devices.range.quality(), devices.range.filtered_distance())
        {
            error!(%reason, "proximity interlock tripped");
            if let Err(e) = devices.drive.emergency_stop_trigger(reason) {
                self.hardware_faults += 1;
                warn!(error = %e, "failed to zero wheels on proximity stop");
            }
        }

        if devices.range.has_significant_change() {
            debug!(
                filtered_mm = devices.range.filtered_distance(),
                "significant range change"
            );
            return self.publish_sensor_telemetry(now_ms);
        }
        false
    }

    fn publish_motor_telemetry(&mut self, now_ms: u64) -> bool {
        let payload = self.core.devices.drive.produce_telemetry();
        let subject = subjects::motor_telemetry(&self.config.device_id);
        self.publish(&subject, MOTOR_TELEMETRY_SCHEMA, &payload, now_ms)
    }

    fn publish_sensor_telemetry(&mut self, now_ms: u64) -> bool {
        let payload = self.core.devices.range.produce_telemetry();
        let subject = subjects::sensor_telemetry(&self.config.device_id);
        self.publish(&subject, RANGE_SCHEMA, &payload, now_ms)
    }

    fn publish_heartbeat(&mut self, now_ms: u64) -> bool {
        let payload = self.heartbeat(now_ms);
        let subject = subjects::heartbeat(&self.config.device_id);
        self.publish(&subject, HEARTBEAT_SCHEMA, &payload, now_ms)
    }

    fn publish<T: Serialize>(&mut self, subject: &str, schema: &str, payload: &T, now_ms: u64) -> bool {
        let doc = self
            .core
            .router
            .build_envelope(schema, now_ms)
            .with_payload(payload)
            .and_then(|envelope| envelope.to_document());
        match doc {
            Ok(doc) => self.bridge.publish(subject, &doc),
            Err(e) => {
                warn!(subject, error = %e, "failed to build envelope");
                false
            }
        }
    }
}
