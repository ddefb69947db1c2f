//! Per-aircraft state: identity, status and the CPR resolver.
//!
//! Pure logic, no I/O. The directory owns records and routes parity-checked
//! messages to [`AircraftRecord::apply`].

use serde::{Serialize, Serializer};
use tracing::{debug, trace};

use crate::config::CprConfig;
use crate::cpr::{CprFrame, CprKind, CprOutcome, CprPairing, CprResolver, Fix};
use crate::frame::DecodedMessage;
use crate::types::*;

/// What happened to the position when a message was applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PositionUpdate {
    /// Not a position message.
    None,
    /// Frame stored, no fix yet.
    Pending,
    Resolved(Fix),
    /// Pair straddles a latitude band boundary; position left as it was.
    Rejected { nl_even: u32, nl_odd: u32 },
    /// Pair decodes to an impossible latitude; position left as it was.
    Invalid { lat: f64 },
}

/// Result of applying one message to a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applied {
    /// Message family, or `None` when the type code is not decoded.
    pub kind: Option<&'static str>,
    pub position: PositionUpdate,
}

fn serialize_icao<S: Serializer>(icao: &Icao, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&icao_to_string(icao))
}

/// Mutable state for a single aircraft.
///
/// Every field starts out unknown (`None` / `Unknown`), except `airborne`
/// which assumes an aircraft in flight until a surface report says otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftRecord {
    #[serde(serialize_with = "serialize_icao")]
    icao: Icao,

    // Identity
    /// Transponder capability (CA field of DF17).
    pub capability: Option<u8>,
    pub callsign: Option<Callsign>,
    pub wake_vortex: WakeVortex,
    pub squawk: Option<String>,
    pub emergency: Option<EmergencyState>,

    // Operation status
    pub capability_class: Option<u16>,
    pub operational_mode: Option<u16>,
    pub single_antenna: Option<bool>,
    pub adsb_version: Option<u8>,

    // Position
    pub surveillance_status: Option<SurveillanceStatus>,
    pub baro_altitude_ft: Option<i32>,
    pub gnss_altitude_ft: Option<i32>,
    pub airborne: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub position_valid: bool,
    pub last_fix: Option<Fix>,

    // Velocity
    pub speed_kts: Option<f64>,
    pub speed_type: Option<SpeedType>,
    /// Track over ground, or heading for airspeed reports.
    pub heading_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,

    // Target state
    pub selected_altitude_ft: Option<i32>,
    pub selected_heading_deg: Option<f64>,
    pub baro_setting_mb: Option<f64>,
    pub autopilot_modes: Option<AutopilotModes>,
    pub tcas_operational: Option<bool>,

    // Metadata
    pub first_seen: f64,
    pub last_update: f64,
    pub message_count: u64,
    pub rssi: Option<f64>,

    #[serde(skip)]
    cpr: CprResolver,
}

impl AircraftRecord {
    pub fn new(icao: Icao, timestamp: f64) -> Self {
        AircraftRecord {
            icao,
            capability: None,
            callsign: None,
            wake_vortex: WakeVortex::Unknown,
            squawk: None,
            emergency: None,
            capability_class: None,
            operational_mode: None,
            single_antenna: None,
            adsb_version: None,
            surveillance_status: None,
            baro_altitude_ft: None,
            gnss_altitude_ft: None,
            airborne: true,
            lat: None,
            lon: None,
            position_valid: false,
            last_fix: None,
            speed_kts: None,
            speed_type: None,
            heading_deg: None,
            vertical_rate_fpm: None,
            selected_altitude_ft: None,
            selected_heading_deg: None,
            baro_setting_mb: None,
            autopilot_modes: None,
            tcas_operational: None,
            first_seen: timestamp,
            last_update: timestamp,
            message_count: 0,
            rssi: None,
            cpr: CprResolver::new(),
        }
    }

    pub fn icao(&self) -> &Icao {
        &self.icao
    }

    pub fn icao_str(&self) -> String {
        icao_to_string(&self.icao)
    }

    pub fn cpr_pairing(&self) -> &CprPairing {
        self.cpr.pairing()
    }

    pub fn last_even(&self) -> Option<&CprFrame> {
        self.cpr.pairing().even()
    }

    pub fn last_odd(&self) -> Option<&CprFrame> {
        self.cpr.pairing().odd()
    }

    /// Best known altitude: barometric, falling back to GNSS.
    pub fn altitude_ft(&self) -> Option<i32> {
        self.baro_altitude_ft.or(self.gnss_altitude_ft)
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.last_update
    }

    pub fn is_stale(&self, now: f64, timeout: f64) -> bool {
        self.age(now) > timeout
    }

    /// Apply a parity-checked message addressed to this aircraft.
    ///
    /// Metadata (capability, last update, count, signal) is refreshed for
    /// every message, including ones whose type code is not decoded.
    /// Applying the same message twice leaves the same state apart from
    /// `message_count`.
    pub fn apply(
        &mut self,
        msg: &DecodedMessage,
        receiver: Option<(f64, f64)>,
        config: &CprConfig,
    ) -> Applied {
        if msg.is_adsb() {
            self.capability = Some(msg.ca());
        }
        self.last_update = self.last_update.max(msg.timestamp());
        self.message_count += 1;
        self.rssi = Some(msg.rssi());

        let payload = match msg.payload() {
            Ok(p) => p,
            Err(e) => {
                trace!(icao = %self.icao_str(), tc = msg.tc(), error = %e, "payload ignored");
                return Applied {
                    kind: None,
                    position: PositionUpdate::None,
                };
            }
        };
        trace!(icao = %self.icao_str(), kind = payload.kind(), "dispatch");

        let position = match &payload {
            AdsbMessage::Identification(m) => {
                self.callsign = Some(m.callsign.clone());
                self.wake_vortex = m.category;
                PositionUpdate::None
            }
            AdsbMessage::AirbornePosition(m) => {
                self.surveillance_status = Some(m.surveillance_status);
                match m.altitude_source {
                    AltitudeSource::Barometric => self.baro_altitude_ft = m.altitude_ft,
                    AltitudeSource::Gnss => self.gnss_altitude_ft = m.altitude_ft,
                }
                self.airborne = true;
                let frame = CprFrame::new(m.cpr, CprKind::Airborne, msg.timestamp());
                self.set_frame(frame, receiver, config)
            }
            AdsbMessage::SurfacePosition(m) => {
                self.airborne = false;
                if let Some(speed) = m.ground_speed_kts {
                    self.speed_kts = Some(speed);
                    self.speed_type = Some(SpeedType::Ground);
                }
                if let Some(track) = m.track_deg {
                    self.heading_deg = Some(track);
                }
                let frame = CprFrame::new(m.cpr, CprKind::Surface, msg.timestamp());
                self.set_frame(frame, receiver, config)
            }
            AdsbMessage::Velocity(m) => {
                self.airborne = true;
                if let Some(speed) = m.speed_kts {
                    self.speed_kts = Some(speed);
                    self.speed_type = Some(m.speed_type);
                }
                if let Some(hdg) = m.heading_deg {
                    self.heading_deg = Some(hdg);
                }
                if let Some(vr) = m.vertical_rate_fpm {
                    self.vertical_rate_fpm = Some(vr);
                }
                PositionUpdate::None
            }
            AdsbMessage::AircraftStatus(m) => {
                self.emergency = Some(m.emergency);
                self.squawk = Some(m.squawk.clone());
                PositionUpdate::None
            }
            AdsbMessage::TargetState(m) => {
                self.selected_altitude_ft = m.selected_altitude_ft;
                self.baro_setting_mb = m.baro_setting_mb;
                self.selected_heading_deg = m.selected_heading_deg;
                if m.modes.is_some() {
                    self.autopilot_modes = m.modes;
                }
                self.tcas_operational = Some(m.tcas_operational);
                PositionUpdate::None
            }
            AdsbMessage::OperationStatus(m) => {
                self.airborne = !m.surface;
                self.capability_class = Some(m.capability_class);
                self.operational_mode = Some(m.operational_mode);
                self.single_antenna = Some(m.single_antenna);
                self.adsb_version = Some(m.version);
                PositionUpdate::None
            }
        };

        Applied {
            kind: Some(payload.kind()),
            position,
        }
    }

    fn set_frame(
        &mut self,
        frame: CprFrame,
        receiver: Option<(f64, f64)>,
        config: &CprConfig,
    ) -> PositionUpdate {
        match self
            .cpr
            .set_frame(frame, self.last_fix.as_ref(), receiver, config)
        {
            Ok(CprOutcome::Resolved(fix)) => {
                self.lat = Some(fix.lat);
                self.lon = Some(fix.lon);
                self.position_valid = true;
                self.last_fix = Some(fix);
                PositionUpdate::Resolved(fix)
            }
            Ok(CprOutcome::Pending) => PositionUpdate::Pending,
            Err(AdsbError::CprPairMismatch { nl_even, nl_odd }) => {
                PositionUpdate::Rejected { nl_even, nl_odd }
            }
            Err(AdsbError::CprLatitudeOutOfRange { lat }) => PositionUpdate::Invalid { lat },
            Err(e) => {
                debug!(icao = %self.icao_str(), error = %e, "CPR frame not resolved");
                PositionUpdate::Pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
