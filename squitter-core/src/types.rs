//! Shared types, error enum, and decoded message types for squitter-core.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// All errors produced by squitter-core.
#[derive(Debug, Error)]
pub enum AdsbError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("parity mismatch: computed {computed:06X}, received {received:06X}")]
    ParityMismatch { computed: u32, received: u32 },
    #[error("unknown type code: {0}")]
    UnknownTypeCode(u8),
    #[error("CPR pair spans a latitude band boundary (NL even={nl_even}, odd={nl_odd})")]
    CprPairMismatch { nl_even: u32, nl_odd: u32 },
    #[error("CPR pair decodes to latitude {lat} outside [-90, 90]")]
    CprLatitudeOutOfRange { lat: f64 },
    #[error("aircraft directory full ({capacity} records)")]
    DirectoryFull { capacity: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AdsbError>;

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 3-byte ICAO address. Stored as raw bytes to avoid per-frame String allocation.
pub type Icao = [u8; 3];

/// Format ICAO address as 6-char uppercase hex string.
pub fn icao_to_string(icao: &Icao) -> String {
    format!("{:02X}{:02X}{:02X}", icao[0], icao[1], icao[2])
}

/// Parse a 6-char hex string into an ICAO address.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    if hex.len() != 6 {
        return None;
    }
    let val = u32::from_str_radix(hex, 16).ok()?;
    Some(icao_from_u32(val))
}

/// Convert ICAO bytes to u32 for numeric comparisons.
pub fn icao_to_u32(icao: &Icao) -> u32 {
    ((icao[0] as u32) << 16) | ((icao[1] as u32) << 8) | (icao[2] as u32)
}

/// Build ICAO from a 24-bit integer.
pub fn icao_from_u32(val: u32) -> Icao {
    [
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ]
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if !hex.len().is_multiple_of(2) {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Callsign
// ---------------------------------------------------------------------------

/// ADS-B character set for callsign encoding (6 bits per character).
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"#ABCDEFGHIJKLMNOPQRSTUVWXYZ##### ###############0123456789######";

/// Maximum number of callsign characters carried by an identification message.
pub const CALLSIGN_LEN: usize = 8;

/// Substituted for any character outside `A-Z`, `0-9` and space.
pub const CALLSIGN_PLACEHOLDER: char = '#';

/// Fixed-capacity callsign. Never holds more than [`CALLSIGN_LEN`] characters,
/// and only ever holds printable characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Callsign(heapless::String<CALLSIGN_LEN>);

impl Callsign {
    /// Build a callsign from raw characters.
    ///
    /// Unprintable characters are replaced with [`CALLSIGN_PLACEHOLDER`],
    /// input beyond the capacity is ignored and trailing padding is trimmed.
    pub fn from_bytes(chars: impl IntoIterator<Item = u8>) -> Self {
        let mut text = heapless::String::new();
        for c in chars.into_iter().take(CALLSIGN_LEN) {
            let c = match c {
                b'A'..=b'Z' | b'0'..=b'9' | b' ' => c as char,
                _ => CALLSIGN_PLACEHOLDER,
            };
            if text.push(c).is_err() {
                break;
            }
        }
        while text.ends_with(' ') {
            text.pop();
        }
        Callsign(text)
    }

    pub fn new(s: &str) -> Self {
        Self::from_bytes(s.bytes())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Categories and status enums
// ---------------------------------------------------------------------------

/// Emitter category carried in identification messages.
///
/// The raw 3-bit category is only meaningful together with the type code that
/// selects the category set (TC4 = set A ... TC1 = set D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WakeVortex {
    #[default]
    Unknown,
    Reserved,
    NoCategoryInfo,
    SurfaceEmergencyVehicle,
    SurfaceServiceVehicle,
    GroundObstruction,
    GliderSailplane,
    LighterThanAir,
    ParachutistSkydiver,
    UltralightHangGliderParaglider,
    UnmannedAerialVehicle,
    SpaceTransatmosphericVehicle,
    /// < 7000 kg
    Light,
    /// 7000 kg - 34000 kg
    Medium1,
    /// 34000 kg - 136000 kg
    Medium2,
    HighVortexAircraft,
    /// > 136000 kg
    Heavy,
    /// > 5 g acceleration and > 400 kt
    HighPerformance,
    Rotorcraft,
}

impl WakeVortex {
    pub fn from_category(tc: u8, category: u8) -> Self {
        use WakeVortex::*;
        match (tc, category) {
            (_, 0) if (2..=4).contains(&tc) => NoCategoryInfo,
            (4, 1) => Light,
            (4, 2) => Medium1,
            (4, 3) => Medium2,
            (4, 4) => HighVortexAircraft,
            (4, 5) => Heavy,
            (4, 6) => HighPerformance,
            (4, 7) => Rotorcraft,
            (3, 1) => GliderSailplane,
            (3, 2) => LighterThanAir,
            (3, 3) => ParachutistSkydiver,
            (3, 4) => UltralightHangGliderParaglider,
            (3, 6) => UnmannedAerialVehicle,
            (3, 7) => SpaceTransatmosphericVehicle,
            (2, 1) => SurfaceEmergencyVehicle,
            (2, 3) => SurfaceServiceVehicle,
            (2, 4..=7) => GroundObstruction,
            (1..=4, _) => Reserved,
            _ => Unknown,
        }
    }
}

/// Surveillance status (SS) field of airborne position messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SurveillanceStatus {
    NoCondition,
    PermanentAlert,
    TemporaryAlert,
    SpiCondition,
}

impl SurveillanceStatus {
    pub fn from_bits(ss: u8) -> Self {
        match ss & 0x03 {
            0 => SurveillanceStatus::NoCondition,
            1 => SurveillanceStatus::PermanentAlert,
            2 => SurveillanceStatus::TemporaryAlert,
            _ => SurveillanceStatus::SpiCondition,
        }
    }
}

/// Emergency/priority state from aircraft status messages (TC 28).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmergencyState {
    None,
    General,
    Lifeguard,
    MinimumFuel,
    NoCommunications,
    UnlawfulInterference,
    DownedAircraft,
    Reserved,
}

impl EmergencyState {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => EmergencyState::None,
            1 => EmergencyState::General,
            2 => EmergencyState::Lifeguard,
            3 => EmergencyState::MinimumFuel,
            4 => EmergencyState::NoCommunications,
            5 => EmergencyState::UnlawfulInterference,
            6 => EmergencyState::DownedAircraft,
            _ => EmergencyState::Reserved,
        }
    }
}

/// CPR format flag (F bit) of a position message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CprParity {
    Even,
    Odd,
}

impl CprParity {
    pub fn from_bit(odd: bool) -> Self {
        if odd {
            CprParity::Odd
        } else {
            CprParity::Even
        }
    }

    pub fn is_odd(self) -> bool {
        self == CprParity::Odd
    }
}

/// Raw CPR counts as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CprCounts {
    /// 17-bit latitude count
    pub lat: u32,
    /// 17-bit longitude count
    pub lon: u32,
    pub parity: CprParity,
}

/// Where an altitude figure comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AltitudeSource {
    Barometric,
    Gnss,
}

/// Speed type for velocity messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeedType {
    Ground,
    IAS,
    TAS,
}

impl fmt::Display for SpeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedType::Ground => write!(f, "ground"),
            SpeedType::IAS => write!(f, "IAS"),
            SpeedType::TAS => write!(f, "TAS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded message types
// ---------------------------------------------------------------------------

/// TC 1-4: Aircraft identification (callsign).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentificationMsg {
    pub callsign: Callsign,
    pub category: WakeVortex,
}

/// TC 9-18 / 20-22: Airborne position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirbornePositionMsg {
    pub surveillance_status: SurveillanceStatus,
    pub altitude_ft: Option<i32>,
    pub altitude_source: AltitudeSource,
    pub cpr: CprCounts,
}

/// TC 5-8: Surface position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfacePositionMsg {
    pub ground_speed_kts: Option<f64>,
    pub track_deg: Option<f64>,
    pub cpr: CprCounts,
}

/// TC 19: Airborne velocity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityMsg {
    pub speed_kts: Option<f64>,
    pub heading_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub speed_type: SpeedType,
}

/// TC 28 subtype 1: Emergency/priority status and Mode A code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftStatusMsg {
    pub emergency: EmergencyState,
    pub squawk: String,
}

/// Autopilot mode flags of a target state message, present only when the
/// transmitter marks them valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutopilotModes {
    pub autopilot: bool,
    pub vnav: bool,
    pub altitude_hold: bool,
    pub approach: bool,
    pub lnav: bool,
}

/// TC 29 subtype 1: Target state and status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStateMsg {
    pub selected_altitude_ft: Option<i32>,
    /// True when the selected altitude comes from the FMS rather than MCP/FCU.
    pub selected_altitude_fms: bool,
    pub baro_setting_mb: Option<f64>,
    pub selected_heading_deg: Option<f64>,
    pub modes: Option<AutopilotModes>,
    pub tcas_operational: bool,
}

/// TC 31: Aircraft operation status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStatusMsg {
    pub surface: bool,
    pub capability_class: u16,
    pub operational_mode: u16,
    pub single_antenna: bool,
    pub version: u8,
}

/// Typed ME payload of an extended squitter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AdsbMessage {
    Identification(IdentificationMsg),
    SurfacePosition(SurfacePositionMsg),
    AirbornePosition(AirbornePositionMsg),
    Velocity(VelocityMsg),
    AircraftStatus(AircraftStatusMsg),
    TargetState(TargetStateMsg),
    OperationStatus(OperationStatusMsg),
}

impl AdsbMessage {
    /// Short family name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AdsbMessage::Identification(_) => "identification",
            AdsbMessage::SurfacePosition(_) => "surface_position",
            AdsbMessage::AirbornePosition(_) => "airborne_position",
            AdsbMessage::Velocity(_) => "velocity",
            AdsbMessage::AircraftStatus(_) => "aircraft_status",
            AdsbMessage::TargetState(_) => "target_state",
            AdsbMessage::OperationStatus(_) => "operation_status",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
