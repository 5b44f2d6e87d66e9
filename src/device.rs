//! Built-in opcode handling layered on a port.
//!
//! A [`Device`] answers the protocol's built-in requests without involving
//! the application: discovery (`DISR`), heartbeat toggling (`HRTR`) and
//! logging toggling (`LOGR`). Everything else is passed through by
//! [`Device::check_for_msgs`]. On top of the toggles it carries the thin
//! glue those features need: heartbeat pacing and status reporting, and
//! `LOG` frames gated by the logging switch.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::port::Port;
use crate::protocol::args::ArgParser;
use crate::protocol::message::Msg;
use crate::transport::Transport;

/// Hardware id reported when none was configured.
const FALLBACK_HARDWARE_ID: &str = "UNDEF_ID";

/// Identity reported in discovery acks.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceConfig {
    /// Name for the behaviour of this endpoint, e.g. `"ValveCluster"`.
    pub role: String,
    /// Index telling apart endpoints that share a role.
    pub instance_idx: u32,
    /// String uniquely identifying the hardware. Falls back to a
    /// compile-time literal when absent.
    pub hardware_id: Option<String>,
    /// Version of the running software. Falls back to this crate's version
    /// when absent.
    pub version: Option<String>,
}

impl DeviceConfig {
    /// Config with the given role and defaults for everything else.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            instance_idx: 0,
            hardware_id: None,
            version: None,
        }
    }
}

/// One protocol endpoint: a [`Port`] plus built-in request handling.
pub struct Device<T> {
    port: Port<T>,
    config: DeviceConfig,
    logging_on: bool,
    heartbeats_on: bool,
    heartbeat_period: Duration,
    last_heartbeat: Option<Instant>,
    started_at: Instant,
}

impl<T: Transport> Device<T> {
    /// Create a device speaking over `transport`.
    pub fn new(transport: T, config: DeviceConfig) -> Self {
        Self {
            port: Port::new(transport),
            config,
            logging_on: false,
            heartbeats_on: true,
            heartbeat_period: Duration::ZERO,
            last_heartbeat: None,
            started_at: Instant::now(),
        }
    }

    /// The underlying port.
    pub fn port(&self) -> &Port<T> {
        &self.port
    }

    /// Mutable access to the underlying port.
    pub fn port_mut(&mut self) -> &mut Port<T> {
        &mut self.port
    }

    /// The configured identity.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The hardware id reported in discovery acks.
    pub fn hardware_id(&self) -> &str {
        self.config.hardware_id.as_deref().unwrap_or(FALLBACK_HARDWARE_ID)
    }

    /// The version string reported in discovery acks.
    pub fn version(&self) -> &str {
        self.config
            .version
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"))
    }

    /// Read messages, answering built-in requests transparently.
    ///
    /// Built-ins (`DISR`, `HRTR`, `LOGR`) are handled and consumed; the
    /// first message that is not a built-in is returned to the caller.
    /// Non-blocking.
    pub fn check_for_msgs(&mut self) -> Option<Msg> {
        while let Some(msg) = self.port.recv_owned() {
            if !self.handle_msg(&msg) {
                return Some(msg);
            }
        }
        None
    }

    /// Handle a built-in message if it is one.
    ///
    /// Returns whether the message was consumed. Recognized built-ins are
    /// consumed even when their arguments fail to parse; they are simply
    /// not acknowledged in that case.
    pub fn handle_msg(&mut self, msg: &Msg) -> bool {
        if msg.is_opcode("DISR") {
            debug!("answering discovery request");
            self.send_discovery_ack(msg);
            true
        } else if msg.is_opcode("HRTR") {
            match Self::parse_toggle(msg) {
                Some(on) => {
                    self.set_heartbeats_on(on);
                    self.ack(msg);
                }
                None => debug!("dropping heartbeat toggle with malformed args"),
            }
            true
        } else if msg.is_opcode("LOGR") {
            match Self::parse_toggle(msg) {
                Some(on) => {
                    self.set_logging_on(on);
                    self.ack(msg);
                }
                None => debug!("dropping logging toggle with malformed args"),
            }
            true
        } else {
            false
        }
    }

    /// Parse the single boolean argument of a toggle request.
    fn parse_toggle(msg: &Msg) -> Option<bool> {
        let mut parser = ArgParser::new(msg.args());
        let on = parser.parse_arg::<bool>()?;
        parser.finished().then_some(on)
    }

    fn ack(&mut self, msg: &Msg) {
        if let Err(err) = self.port.send_ack(&msg.as_view()) {
            warn!(%err, "failed to send ack");
        }
    }

    /// Answer a discovery request with `role, instance_idx, hardware_id,
    /// version`. Discovery is always acknowledged.
    fn send_discovery_ack(&mut self, msg: &Msg) {
        let mut ack = Msg::new();
        ack.start_bytes(b"DIS", b'A', msg.token());
        ack.append(self.config.role.as_str());
        ack.append(self.config.instance_idx);
        ack.append(self.hardware_id());
        ack.append(self.version());
        ack.finish();
        if let Err(err) = self.port.send(&ack.as_view()) {
            warn!(%err, "failed to send discovery ack");
        }
    }

    /* ---------- Logging ---------- */

    /// Turn outgoing log messages on or off.
    pub fn set_logging_on(&mut self, on: bool) {
        self.logging_on = on;
    }

    /// Whether outgoing log messages are enabled.
    pub fn logging_on(&self) -> bool {
        self.logging_on
    }

    /// Send a `LOG` broadcast with the given level and text.
    ///
    /// Does nothing while logging is off.
    pub fn log(&mut self, level: &str, text: &str) {
        if !self.logging_on {
            return;
        }
        let mut msg = Msg::new();
        {
            let token = self.port.next_token();
            msg.start("LOG", b'B', token);
        }
        msg.append(level);
        msg.append(text);
        msg.finish();
        if let Err(err) = self.port.send(&msg.as_view()) {
            warn!(%err, "failed to send log message");
        }
    }

    /// Send a log message with level `DEBUG`.
    pub fn log_debug(&mut self, text: &str) {
        self.log("DEBUG", text);
    }

    /// Send a log message with level `INFO`.
    pub fn log_info(&mut self, text: &str) {
        self.log("INFO", text);
    }

    /// Send a log message with level `WARNING`.
    pub fn log_warning(&mut self, text: &str) {
        self.log("WARNING", text);
    }

    /// Send a log message with level `ERROR`.
    pub fn log_error(&mut self, text: &str) {
        self.log("ERROR", text);
    }

    /* ---------- Heartbeats ---------- */

    /// Turn heartbeat sending on or off.
    pub fn set_heartbeats_on(&mut self, on: bool) {
        self.heartbeats_on = on;
    }

    /// Whether heartbeats are enabled.
    pub fn heartbeats_on(&self) -> bool {
        self.heartbeats_on
    }

    /// Set the minimum time between heartbeat messages.
    pub fn set_heartbeat_period(&mut self, period: Duration) {
        self.heartbeat_period = period;
    }

    /// Whether the caller should send a heartbeat now.
    ///
    /// False while heartbeats are off, or while the configured period has
    /// not yet passed since this method last returned true.
    pub fn send_heartbeat_now(&mut self) -> bool {
        if !self.heartbeats_on {
            return false;
        }
        let now = Instant::now();
        if let Some(last) = self.last_heartbeat {
            if now.duration_since(last) < self.heartbeat_period {
                return false;
            }
        }
        self.last_heartbeat = Some(now);
        true
    }

    /// Build a heartbeat message carrying general diagnostics.
    ///
    /// The args are one dict with the port's error counters (omitted when
    /// clean), the worst loop period seen by the caller, and uptime in
    /// minutes. The error counters are reset once reported.
    pub fn build_status_heartbeat(&mut self, msg: &mut Msg, max_loop_ms: u32) {
        {
            let token = self.port.next_token();
            msg.start("HRT", b'B', token);
        }
        msg.append_dict_start();
        self.port.stats.format_stats(msg);
        self.port.stats.reset();
        msg.append_dict_key_value("loop_ms", max_loop_ms);
        let uptime_mins = self.started_at.elapsed().as_secs() / 60;
        msg.append_dict_key_value("uptime", uptime_mins);
        msg.append_dict_end();
        msg.finish();
    }
}
