//! Test helpers: frame builders and a CPR encoder.

use crate::cpr::{modulo, nl, CprKind, CPR_MAX};
use crate::crc;
use crate::frame::{RawMessage, RAW_WORDS};
use crate::types::{hex_decode, hex_encode};

/// Build a DF17 (CA 5) frame hex string with valid parity.
pub fn es_hex(icao: u32, me: u64) -> String {
    let mut data = [0u8; 14];
    data[0] = (17 << 3) | 5;
    data[1..4].copy_from_slice(&icao.to_be_bytes()[1..]);
    data[4..11].copy_from_slice(&me.to_be_bytes()[1..]);
    let parity = crc::crc24_payload(&data);
    data[11..].copy_from_slice(&parity.to_be_bytes()[1..]);
    hex_encode(&data)
}

/// Encode a coordinate into 17-bit CPR counts.
pub fn cpr_encode(lat: f64, lon: f64, odd: bool, kind: CprKind) -> (u32, u32) {
    let i = if odd { 1.0 } else { 0.0 };
    let span = kind.span();
    let dlat = span / (60.0 - i);
    let yz = (CPR_MAX * modulo(lat, dlat) / dlat + 0.5).floor();
    let rlat = dlat * (yz / CPR_MAX + (lat / dlat).floor());
    let dlon = span / (nl(rlat) as f64 - i).max(1.0);
    let xz = (CPR_MAX * modulo(lon, dlon) / dlon + 0.5).floor();
    (
        (yz as u32) % CPR_MAX as u32,
        (xz as u32) % CPR_MAX as u32,
    )
}

/// Airborne position frame (TC 11, 38000 ft) for a coordinate.
pub fn airborne_hex(icao: u32, lat: f64, lon: f64, odd: bool) -> String {
    let (y, x) = cpr_encode(lat, lon, odd, CprKind::Airborne);
    airborne_counts_hex(icao, y, x, odd)
}

/// Airborne position frame (TC 11, 38000 ft) carrying raw CPR counts.
pub fn airborne_counts_hex(icao: u32, lat_count: u32, lon_count: u32, odd: bool) -> String {
    let me = (11u64 << 51)
        | (0xC38 << 36)
        | ((odd as u64) << 34)
        | ((lat_count as u64) << 17)
        | lon_count as u64;
    es_hex(icao, me)
}

/// Words as the capture hardware delivers them for a hex frame: the last
/// word holds 16 payload bits plus one trailing bit, right-aligned.
pub fn capture_words(hex: &str) -> [u32; RAW_WORDS] {
    let data = hex_decode(hex).expect("valid hex");
    let raw = RawMessage::from_bytes(&data, 0.0, 0.0);
    let mut words = *raw.words();
    words[3] = ((words[3] >> 16) << 1) | 1;
    words
}

/// Surface position frame (TC 7, 4 kt, track 180) for a coordinate.
pub fn surface_hex(icao: u32, lat: f64, lon: f64, odd: bool) -> String {
    let (y, x) = cpr_encode(lat, lon, odd, CprKind::Surface);
    let me = (7u64 << 51)
        | (17 << 44)
        | (1 << 43)
        | (64 << 36)
        | ((odd as u64) << 34)
        | ((y as u64) << 17)
        | x as u64;
    es_hex(icao, me)
}

/// Identification frame (TC 4) carrying `callsign`.
pub fn ident_hex(icao: u32, callsign: &str, category: u8) -> String {
    let mut me = (4u64 << 51) | ((category as u64 & 0x7) << 48);
    let mut chars = callsign.bytes().chain(std::iter::repeat(b' '));
    for i in 0..8 {
        let c = chars.next().unwrap_or(b' ');
        let code = match c {
            b'A'..=b'Z' => (c - b'A' + 1) as u64,
            b'0'..=b'9' => (c - b'0' + 48) as u64,
            _ => 32,
        };
        me |= code << (42 - 6 * i);
    }
    es_hex(icao, me)
}
