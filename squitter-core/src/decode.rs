//! Decode the ME field of an extended squitter into typed messages.
//!
//! Type codes handled:
//! - TC 1-4:   Aircraft identification (callsign, emitter category)
//! - TC 5-8:   Surface position (movement, track, CPR lat/lon)
//! - TC 9-18:  Airborne position (barometric altitude, CPR lat/lon)
//! - TC 19:    Airborne velocity (ground speed or airspeed, vertical rate)
//! - TC 20-22: Airborne position (GNSS height)
//! - TC 28:    Aircraft status (emergency state, Mode A code)
//! - TC 29:    Target state and status (selected altitude/heading, AP modes)
//! - TC 31:    Aircraft operation status (capabilities, SAF, version)
//!
//! Everything else, including unsupported subtypes, is `UnknownTypeCode`.

use crate::types::*;

// ---------------------------------------------------------------------------
// Bit access
// ---------------------------------------------------------------------------

/// Extract ME bits `first..=last` (1-indexed, as numbered in DO-260).
fn me_bits(me: u64, first: u32, last: u32) -> u32 {
    let len = last - first + 1;
    ((me >> (56 - last)) & ((1u64 << len) - 1)) as u32
}

fn me_flag(me: u64, bit: u32) -> bool {
    me_bits(me, bit, bit) == 1
}

// ---------------------------------------------------------------------------
// Altitude decoding
// ---------------------------------------------------------------------------

/// Decode 12-bit altitude code from an airborne position.
///
/// The Q-bit (bit 4) selects the encoding mode:
/// - Q=1: 25-ft resolution
/// - Q=0: 100-ft Gillham gray code
pub fn decode_altitude(alt_code: u32) -> Option<i32> {
    if alt_code == 0 {
        return None;
    }

    let q_bit = (alt_code >> 4) & 1;

    if q_bit == 1 {
        let n = ((alt_code >> 5) << 4) | (alt_code & 0x0F);
        Some(n as i32 * 25 - 1000)
    } else {
        decode_gillham_altitude(alt_code)
    }
}

/// Decode 100-ft Gillham gray code altitude.
fn decode_gillham_altitude(alt_code: u32) -> Option<i32> {
    let c1 = (alt_code >> 12) & 1;
    let a1 = (alt_code >> 11) & 1;
    let c2 = (alt_code >> 10) & 1;
    let a2 = (alt_code >> 9) & 1;
    let c4 = (alt_code >> 8) & 1;
    let a4 = (alt_code >> 7) & 1;
    // bit 6 = M (metric, should be 0)
    let b1 = (alt_code >> 5) & 1;
    let b2 = (alt_code >> 3) & 1;
    let b4 = (alt_code >> 1) & 1;

    let c_digit = c4 * 4 + c2 * 2 + c1;

    // 100-ft component from C digit (Gray code)
    let mut c_bin = c_digit;
    c_bin ^= c_bin >> 2;
    c_bin ^= c_bin >> 1;

    if c_bin == 0 || c_bin >= 6 {
        return None;
    }

    // 500-ft component: Gray code from combined A and B digits
    let ab_gray = (a4 * 4 + a2 * 2 + a1) << 3 | (b4 * 4 + b2 * 2 + b1);
    let mut ab_bin = ab_gray;
    ab_bin ^= ab_bin >> 4;
    ab_bin ^= ab_bin >> 2;
    ab_bin ^= ab_bin >> 1;

    let altitude = ab_bin as i32 * 500 + c_bin as i32 * 100 - 1200;

    if !(-1200..=126750).contains(&altitude) {
        return None;
    }

    Some(altitude)
}

/// GNSS height (TC 20-22) is carried in metres.
fn decode_gnss_altitude(alt_code: u32) -> Option<i32> {
    if alt_code == 0 {
        return None;
    }
    Some((alt_code as f64 * 3.28084).round() as i32)
}

// ---------------------------------------------------------------------------
// Squawk decoding
// ---------------------------------------------------------------------------

/// Decode 13-bit identity code into 4-digit octal squawk.
///
/// Bits are labeled C1 A1 C2 A2 C4 A4 _ B1 D1 B2 D2 B4 D4
pub fn decode_squawk(id_code: u32) -> String {
    let c1 = (id_code >> 12) & 1;
    let a1 = (id_code >> 11) & 1;
    let c2 = (id_code >> 10) & 1;
    let a2 = (id_code >> 9) & 1;
    let c4 = (id_code >> 8) & 1;
    let a4 = (id_code >> 7) & 1;
    let b1 = (id_code >> 5) & 1;
    let d1 = (id_code >> 4) & 1;
    let b2 = (id_code >> 3) & 1;
    let d2 = (id_code >> 2) & 1;
    let b4 = (id_code >> 1) & 1;
    let d4 = id_code & 1;

    let a = a4 * 4 + a2 * 2 + a1;
    let b = b4 * 4 + b2 * 2 + b1;
    let c = c4 * 4 + c2 * 2 + c1;
    let d = d4 * 4 + d2 * 2 + d1;

    format!("{a}{b}{c}{d}")
}

// ---------------------------------------------------------------------------
// Surface movement
// ---------------------------------------------------------------------------

/// Decode the 7-bit surface movement field into ground speed (kts).
///
/// Non-linear quantization: finer steps at taxi speeds.
pub fn decode_movement(mov: u32) -> Option<f64> {
    let m = mov as f64;
    match mov {
        1 => Some(0.0),
        2..=8 => Some(0.125 + (m - 2.0) * 0.125),
        9..=12 => Some(1.0 + (m - 9.0) * 0.25),
        13..=38 => Some(2.0 + (m - 13.0) * 0.5),
        39..=93 => Some(15.0 + (m - 39.0)),
        94..=108 => Some(70.0 + (m - 94.0) * 2.0),
        109..=123 => Some(100.0 + (m - 109.0) * 5.0),
        124 => Some(175.0),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Per-type decoders
// ---------------------------------------------------------------------------

/// Decode TC 1-4: Aircraft identification (callsign).
pub fn decode_identification(tc: u8, me: u64) -> IdentificationMsg {
    let category = me_bits(me, 6, 8) as u8;

    let chars = (0..CALLSIGN_LEN as u32).map(|i| {
        let idx = me_bits(me, 9 + i * 6, 14 + i * 6) as usize;
        CALLSIGN_CHARSET[idx]
    });

    IdentificationMsg {
        callsign: Callsign::from_bytes(chars),
        category: WakeVortex::from_category(tc, category),
    }
}

fn decode_cpr(me: u64) -> CprCounts {
    CprCounts {
        lat: me_bits(me, 23, 39),
        lon: me_bits(me, 40, 56),
        parity: CprParity::from_bit(me_flag(me, 22)),
    }
}

/// Decode TC 9-18/20-22: Airborne position.
pub fn decode_airborne_position(tc: u8, me: u64) -> AirbornePositionMsg {
    let alt_code = me_bits(me, 9, 20);
    let (altitude_ft, altitude_source) = if (20..=22).contains(&tc) {
        (decode_gnss_altitude(alt_code), AltitudeSource::Gnss)
    } else {
        (decode_altitude(alt_code), AltitudeSource::Barometric)
    };

    AirbornePositionMsg {
        surveillance_status: SurveillanceStatus::from_bits(me_bits(me, 6, 7) as u8),
        altitude_ft,
        altitude_source,
        cpr: decode_cpr(me),
    }
}

/// Decode TC 5-8: Surface position.
pub fn decode_surface_position(me: u64) -> SurfacePositionMsg {
    let track_deg = if me_flag(me, 13) {
        Some(round2(me_bits(me, 14, 20) as f64 * 360.0 / 128.0))
    } else {
        None
    };

    SurfacePositionMsg {
        ground_speed_kts: decode_movement(me_bits(me, 6, 12)),
        track_deg,
        cpr: decode_cpr(me),
    }
}

/// Decode TC 19: Airborne velocity.
pub fn decode_velocity(me: u64) -> Option<VelocityMsg> {
    let subtype = me_bits(me, 6, 8);

    match subtype {
        1 | 2 => Some(decode_ground_velocity(me, subtype == 2)),
        3 | 4 => Some(decode_airspeed(me, subtype == 4)),
        _ => None,
    }
}

fn decode_vertical_rate(me: u64) -> Option<i32> {
    let vr_val = me_bits(me, 38, 46) as i32 - 1;
    if vr_val < 0 {
        return None;
    }
    let rate = vr_val * 64;
    Some(if me_flag(me, 37) { -rate } else { rate })
}

fn decode_ground_velocity(me: u64, supersonic: bool) -> VelocityMsg {
    let scale = if supersonic { 4 } else { 1 };
    let ew_vel = me_bits(me, 15, 24) as i32 - 1;
    let ns_vel = me_bits(me, 26, 35) as i32 - 1;

    let (speed, heading) = if ew_vel >= 0 && ns_vel >= 0 {
        let vx = if me_flag(me, 14) { -ew_vel } else { ew_vel } * scale;
        let vy = if me_flag(me, 25) { -ns_vel } else { ns_vel } * scale;
        let (vx, vy) = (vx as f64, vy as f64);
        let spd = (vx * vx + vy * vy).sqrt();
        let hdg = vx.atan2(vy).to_degrees().rem_euclid(360.0);
        (Some(round2(spd)), Some(round2(hdg)))
    } else {
        (None, None)
    };

    VelocityMsg {
        speed_kts: speed,
        heading_deg: heading,
        vertical_rate_fpm: decode_vertical_rate(me),
        speed_type: SpeedType::Ground,
    }
}

fn decode_airspeed(me: u64, supersonic: bool) -> VelocityMsg {
    let heading = if me_flag(me, 14) {
        Some(round2(me_bits(me, 15, 24) as f64 * 360.0 / 1024.0))
    } else {
        None
    };

    let speed_raw = me_bits(me, 26, 35) as i32;
    let speed = if speed_raw > 0 {
        let scale = if supersonic { 4 } else { 1 };
        Some(((speed_raw - 1) * scale) as f64)
    } else {
        None
    };

    VelocityMsg {
        speed_kts: speed,
        heading_deg: heading,
        vertical_rate_fpm: decode_vertical_rate(me),
        speed_type: if me_flag(me, 25) {
            SpeedType::TAS
        } else {
            SpeedType::IAS
        },
    }
}

/// Decode TC 28 subtype 1: emergency state and Mode A code.
pub fn decode_aircraft_status(me: u64) -> Option<AircraftStatusMsg> {
    if me_bits(me, 6, 8) != 1 {
        return None;
    }
    Some(AircraftStatusMsg {
        emergency: EmergencyState::from_bits(me_bits(me, 9, 11) as u8),
        squawk: decode_squawk(me_bits(me, 12, 24)),
    })
}

/// Decode TC 29 subtype 1: target state and status.
pub fn decode_target_state(me: u64) -> Option<TargetStateMsg> {
    if me_bits(me, 6, 7) != 1 {
        return None;
    }

    let alt = me_bits(me, 10, 20) as i32;
    let baro = me_bits(me, 21, 29);
    let selected_heading_deg = if me_flag(me, 30) {
        Some(round2(me_bits(me, 31, 39) as f64 * 180.0 / 256.0))
    } else {
        None
    };
    let modes = if me_flag(me, 47) {
        Some(AutopilotModes {
            autopilot: me_flag(me, 48),
            vnav: me_flag(me, 49),
            altitude_hold: me_flag(me, 50),
            approach: me_flag(me, 52),
            lnav: me_flag(me, 54),
        })
    } else {
        None
    };

    Some(TargetStateMsg {
        selected_altitude_ft: (alt > 0).then(|| (alt - 1) * 32),
        selected_altitude_fms: me_flag(me, 9),
        baro_setting_mb: (baro > 0).then(|| round2(800.0 + (baro - 1) as f64 * 0.8)),
        selected_heading_deg,
        modes,
        tcas_operational: me_flag(me, 53),
    })
}

/// Decode TC 31: aircraft operation status (subtypes 0 airborne, 1 surface).
pub fn decode_operation_status(me: u64) -> Option<OperationStatusMsg> {
    let subtype = me_bits(me, 6, 8);
    if subtype > 1 {
        return None;
    }
    Some(OperationStatusMsg {
        surface: subtype == 1,
        capability_class: me_bits(me, 9, 24) as u16,
        operational_mode: me_bits(me, 25, 40) as u16,
        single_antenna: me_flag(me, 30),
        version: me_bits(me, 41, 43) as u8,
    })
}

/// Decode an ME field into the appropriate typed message.
///
/// Routes on type code; unsupported type codes and subtypes return
/// `UnknownTypeCode`.
pub fn decode_me(tc: u8, me: u64) -> Result<AdsbMessage> {
    let msg = match tc {
        1..=4 => Some(AdsbMessage::Identification(decode_identification(tc, me))),
        5..=8 => Some(AdsbMessage::SurfacePosition(decode_surface_position(me))),
        9..=18 | 20..=22 => Some(AdsbMessage::AirbornePosition(decode_airborne_position(tc, me))),
        19 => decode_velocity(me).map(AdsbMessage::Velocity),
        28 => decode_aircraft_status(me).map(AdsbMessage::AircraftStatus),
        29 => decode_target_state(me).map(AdsbMessage::TargetState),
        31 => decode_operation_status(me).map(AdsbMessage::OperationStatus),
        _ => None,
    };
    msg.ok_or(AdsbError::UnknownTypeCode(tc))
}

/// Round to 2 decimal places.
fn round2(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::parse_hex;
    use crate::testutil::es_hex;

    fn payload(hex: &str) -> AdsbMessage {
        parse_hex(hex, 1.0).expect("valid frame").payload().expect("known type")
    }

    // -- Identification --

    #[test]
    fn test_decode_identification_klm() {
        match payload("8D4840D6202CC371C32CE0576098") {
            AdsbMessage::Identification(m) => {
                assert_eq!(m.callsign.as_str(), "KLM1023");
                assert_eq!(m.category, WakeVortex::NoCategoryInfo);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_identification_ezy() {
        match payload("8D406B902015A678D4D220AA4BDA") {
            AdsbMessage::Identification(m) => assert_eq!(m.callsign.as_str(), "EZY85MH"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_identification_category_and_placeholder() {
        // TC4 category 5 (heavy), characters: 'A', invalid 0, '1', then spaces
        let mut me: u64 = (4 << 51) | (5 << 48);
        let chars = [1u64, 0, 49, 32, 32, 32, 32, 32];
        for (i, c) in chars.iter().enumerate() {
            me |= *c << (42 - 6 * i);
        }
        let msg = decode_identification(4, me);
        assert_eq!(msg.category, WakeVortex::Heavy);
        assert_eq!(msg.callsign.as_str(), "A#1");
    }

    // -- Position --

    #[test]
    fn test_decode_position_even() {
        match payload("8D40621D58C382D690C8AC2863A7") {
            AdsbMessage::AirbornePosition(m) => {
                assert_eq!(m.altitude_ft, Some(38000));
                assert_eq!(m.altitude_source, AltitudeSource::Barometric);
                assert_eq!(m.surveillance_status, SurveillanceStatus::NoCondition);
                assert_eq!(m.cpr.parity, CprParity::Even);
                assert_eq!(m.cpr.lat, 93000);
                assert_eq!(m.cpr.lon, 51372);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_position_odd() {
        match payload("8D40621D58C386435CC412692AD6") {
            AdsbMessage::AirbornePosition(m) => {
                assert_eq!(m.altitude_ft, Some(38000));
                assert_eq!(m.cpr.parity, CprParity::Odd);
                assert_eq!(m.cpr.lat, 74158);
                assert_eq!(m.cpr.lon, 50194);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_gnss_position() {
        // TC20, 1000 m GNSS height
        let me: u64 = (20 << 51) | (1000 << 36) | (1 << 34) | (1234 << 17) | 5678;
        match decode_me(20, me).unwrap() {
            AdsbMessage::AirbornePosition(m) => {
                assert_eq!(m.altitude_source, AltitudeSource::Gnss);
                assert_eq!(m.altitude_ft, Some(3281));
                assert_eq!(m.cpr.parity, CprParity::Odd);
                assert_eq!(m.cpr.lat, 1234);
                assert_eq!(m.cpr.lon, 5678);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_surface_position() {
        // TC7, movement 17 (4 kt), track valid, 64 -> 180 deg
        let me: u64 = (7 << 51) | (17 << 44) | (1 << 43) | (64 << 36) | (100 << 17) | 200;
        let hex = es_hex(0x484175, me);
        match payload(&hex) {
            AdsbMessage::SurfacePosition(m) => {
                assert_eq!(m.ground_speed_kts, Some(4.0));
                assert_eq!(m.track_deg, Some(180.0));
                assert_eq!(m.cpr.parity, CprParity::Even);
                assert_eq!(m.cpr.lat, 100);
                assert_eq!(m.cpr.lon, 200);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_movement() {
        assert_eq!(decode_movement(0), None);
        assert_eq!(decode_movement(1), Some(0.0));
        assert_eq!(decode_movement(9), Some(1.0));
        assert_eq!(decode_movement(39), Some(15.0));
        assert_eq!(decode_movement(124), Some(175.0));
        assert_eq!(decode_movement(127), None);
    }

    // -- Velocity --

    #[test]
    fn test_decode_velocity_ground() {
        match payload("8D485020994409940838175B284F") {
            AdsbMessage::Velocity(m) => {
                let speed = m.speed_kts.unwrap();
                assert!((speed - 159.0).abs() < 1.0, "Speed should be ~159, got {speed}");
                let heading = m.heading_deg.unwrap();
                assert!(
                    (heading - 182.88).abs() < 0.1,
                    "Heading should be ~182.88, got {heading}"
                );
                assert_eq!(m.vertical_rate_fpm, Some(-832));
                assert_eq!(m.speed_type, SpeedType::Ground);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_velocity_airspeed() {
        // Example from "The 1090MHz Riddle": subtype 3, heading 243.98, TAS 375, -2304 fpm
        match payload("8DA05F219B06B6AF189400CBC33F") {
            AdsbMessage::Velocity(m) => {
                assert_eq!(m.speed_type, SpeedType::TAS);
                assert_eq!(m.speed_kts, Some(375.0));
                let heading = m.heading_deg.unwrap();
                assert!((heading - 243.98).abs() < 0.01, "got {heading}");
                assert_eq!(m.vertical_rate_fpm, Some(-2304));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // -- Status messages --

    #[test]
    fn test_decode_aircraft_status() {
        // subtype 1, emergency 1 (general), squawk 7700
        let id_code: u64 = 0b0_1_0_1_0_1_0_1_0_1_0_1_0;
        let me: u64 = (28 << 51) | (1 << 48) | (1 << 45) | (id_code << 32);
        match decode_me(28, me).unwrap() {
            AdsbMessage::AircraftStatus(m) => {
                assert_eq!(m.emergency, EmergencyState::General);
                assert_eq!(m.squawk, "7700");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_target_state() {
        // Example from pyModeS: selected altitude 16992 ft, QNH 1012.8 mb, hdg 66.8
        match payload("8DA05629EA21485CBF3F8CADAEEB") {
            AdsbMessage::TargetState(m) => {
                assert_eq!(m.selected_altitude_ft, Some(16992));
                assert!(!m.selected_altitude_fms);
                assert_eq!(m.baro_setting_mb, Some(1012.8));
                let hdg = m.selected_heading_deg.unwrap();
                assert!((hdg - 66.8).abs() < 0.1, "got {hdg}");
                let modes = m.modes.unwrap();
                assert!(modes.autopilot);
                assert!(modes.vnav);
                assert!(!modes.altitude_hold);
                assert!(!modes.approach);
                assert!(modes.lnav);
                assert!(m.tcas_operational);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_operation_status() {
        // airborne, CC 0x0400, SAF set, version 2
        let me: u64 = (31 << 51) | (0x0400 << 32) | (1 << 26) | (2 << 13);
        match decode_me(31, me).unwrap() {
            AdsbMessage::OperationStatus(m) => {
                assert!(!m.surface);
                assert_eq!(m.capability_class, 0x0400);
                assert!(m.single_antenna);
                assert_eq!(m.version, 2);
            }
            other => panic!("unexpected {other:?}"),
        }

        let me: u64 = (31 << 51) | (1 << 48);
        match decode_me(31, me).unwrap() {
            AdsbMessage::OperationStatus(m) => {
                assert!(m.surface);
                assert!(!m.single_antenna);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_codes() {
        for tc in [0u8, 23, 24, 25, 26, 27, 30] {
            let me = (tc as u64) << 51;
            assert!(matches!(decode_me(tc, me), Err(AdsbError::UnknownTypeCode(t)) if t == tc));
        }
        // TC28 subtype 2 (TCAS RA) is not decoded
        assert!(decode_me(28, (28 << 51) | (2 << 48)).is_err());
    }

    // -- Altitude --

    #[test]
    fn test_decode_altitude_25ft_exact_value() {
        // n = ((0xC38 >> 5) << 4) | 0x8 = 1560 -> 1560 * 25 - 1000 = 38000
        assert_eq!(decode_altitude(0xC38), Some(38000));
        assert_eq!(decode_altitude(0), None);
    }

    #[test]
    fn test_decode_gillham_range() {
        let mut valid_count = 0;
        for code in 0..0x1000u32 {
            if (code >> 4) & 1 == 1 {
                continue;
            }
            if let Some(alt) = decode_altitude(code) {
                assert!(
                    (-1200..=126750).contains(&alt),
                    "Gillham code 0x{code:04X} gave altitude {alt} out of range"
                );
                valid_count += 1;
            }
        }
        assert!(valid_count > 0);
    }

    // -- Squawk --

    #[test]
    fn test_decode_squawk() {
        assert_eq!(decode_squawk(0b0_1_0_1_0_1_0_1_0_0_0_1_0), "7500");
        assert_eq!(decode_squawk(0b0_1_0_1_0_1_0_0_0_1_0_1_0), "7600");
        assert_eq!(decode_squawk(0b0_1_0_1_0_1_0_1_0_1_0_1_0), "7700");
    }
}
