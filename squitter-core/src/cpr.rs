//! Compact Position Reporting — CPR decode for ADS-B positions.
//!
//! Two decode modes:
//! - Global: requires an even+odd frame pair within the skew bound. Airborne
//!   pairs need no reference; surface pairs are four-fold ambiguous and pick
//!   the candidate nearest a reference.
//! - Local: single frame + reference fix within the local range.
//!
//! Key constants:
//! - NZ = 15 (latitude zones per hemisphere for even frames)
//! - Nb = 17 (bits per coordinate)
//! - Dlat_even = span / (4 * NZ), Dlat_odd = span / (4 * NZ - 1)
//!   where span is 360 degrees airborne and 90 degrees on the surface

use serde::Serialize;
use tracing::debug;

use crate::config::CprConfig;
use crate::types::{AdsbError, CprCounts, CprParity, Result};

/// Number of latitude zones per hemisphere.
const NZ: f64 = 15.0;

/// Bits per CPR coordinate.
const NB: u32 = 17;

/// Maximum CPR value (2^17 = 131072).
pub const CPR_MAX: f64 = (1u32 << NB) as f64;

const EARTH_RADIUS_NM: f64 = 3440.065;

/// Number of longitude zones at a given latitude (NL function).
///
/// Ranges from 1 near the poles to 59 at the equator.
pub fn nl(lat: f64) -> u32 {
    let lat = lat.abs();
    if lat == 0.0 {
        return 59;
    }
    if lat == 87.0 {
        return 2;
    }
    if lat > 87.0 {
        return 1;
    }

    let a = 1.0 - (std::f64::consts::PI / (2.0 * NZ)).cos();
    let b = (std::f64::consts::PI / 180.0 * lat).cos().powi(2);
    let nl_val = (2.0 * std::f64::consts::PI / (1.0 - a / b).acos()).floor() as u32;
    nl_val.max(1)
}

/// Modulo that always returns a non-negative result.
pub fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Round to 6 decimal places.
pub fn round6(val: f64) -> f64 {
    (val * 1_000_000.0).round() / 1_000_000.0
}

/// Great-circle distance in nautical miles.
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_NM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

fn normalize_lon(lon: f64) -> f64 {
    modulo(lon + 180.0, 360.0) - 180.0
}

// ---------------------------------------------------------------------------
// Frames and fixes
// ---------------------------------------------------------------------------

/// Airborne or surface position encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CprKind {
    Airborne,
    Surface,
}

impl CprKind {
    /// Angular span covered by the zones (degrees).
    pub fn span(self) -> f64 {
        match self {
            CprKind::Airborne => 360.0,
            CprKind::Surface => 90.0,
        }
    }
}

/// One received position frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CprFrame {
    pub lat_count: u32,
    pub lon_count: u32,
    pub parity: CprParity,
    pub kind: CprKind,
    pub timestamp: f64,
    /// NL of the latitude band this frame resolved into.
    pub nl: Option<u32>,
    /// Position this frame resolved to.
    pub position: Option<(f64, f64)>,
}

impl CprFrame {
    pub fn new(counts: CprCounts, kind: CprKind, timestamp: f64) -> Self {
        CprFrame {
            lat_count: counts.lat,
            lon_count: counts.lon,
            parity: counts.parity,
            kind,
            timestamp,
            nl: None,
            position: None,
        }
    }

    pub fn lat_fraction(&self) -> f64 {
        self.lat_count as f64 / CPR_MAX
    }

    pub fn lon_fraction(&self) -> f64 {
        self.lon_count as f64 / CPR_MAX
    }

    fn resolve(&mut self, lat: f64, lon: f64) {
        self.nl = Some(nl(lat));
        self.position = Some((lat, lon));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FixMethod {
    Global,
    Local,
}

/// A resolved position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    /// Timestamp of the frame the fix was resolved from.
    pub timestamp: f64,
    pub method: FixMethod,
}

// ---------------------------------------------------------------------------
// Pairing state machine
// ---------------------------------------------------------------------------

/// Which frames are currently held for pairing.
///
/// A new frame replaces the held frame of the same parity. A held frame of
/// the opposite parity but different kind (surface vs airborne) is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub enum CprPairing {
    #[default]
    NoFrames,
    EvenOnly(CprFrame),
    OddOnly(CprFrame),
    Both {
        even: CprFrame,
        odd: CprFrame,
    },
}

impl CprPairing {
    pub fn even(&self) -> Option<&CprFrame> {
        match self {
            CprPairing::EvenOnly(f) | CprPairing::Both { even: f, .. } => Some(f),
            _ => None,
        }
    }

    pub fn odd(&self) -> Option<&CprFrame> {
        match self {
            CprPairing::OddOnly(f) | CprPairing::Both { odd: f, .. } => Some(f),
            _ => None,
        }
    }

    fn slot_mut(&mut self, parity: CprParity) -> Option<&mut CprFrame> {
        match (self, parity) {
            (CprPairing::EvenOnly(f), CprParity::Even)
            | (CprPairing::Both { even: f, .. }, CprParity::Even)
            | (CprPairing::OddOnly(f), CprParity::Odd)
            | (CprPairing::Both { odd: f, .. }, CprParity::Odd) => Some(f),
            _ => None,
        }
    }

    fn with_frame(self, frame: CprFrame) -> Self {
        let same_kind = |f: &CprFrame| f.kind == frame.kind;
        let (even, odd) = match frame.parity {
            CprParity::Even => (Some(frame), self.odd().copied().filter(same_kind)),
            CprParity::Odd => (self.even().copied().filter(same_kind), Some(frame)),
        };
        match (even, odd) {
            (Some(even), Some(odd)) => CprPairing::Both { even, odd },
            (Some(even), None) => CprPairing::EvenOnly(even),
            (None, Some(odd)) => CprPairing::OddOnly(odd),
            (None, None) => CprPairing::NoFrames,
        }
    }
}

/// Result of feeding a frame to the resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CprOutcome {
    Resolved(Fix),
    /// Stored, not yet decodable.
    Pending,
}

/// Per-aircraft CPR state: held frames plus the decode policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CprResolver {
    pairing: CprPairing,
}

impl CprResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairing(&self) -> &CprPairing {
        &self.pairing
    }

    /// Store a frame and try to resolve a position.
    ///
    /// Global decode is attempted when the opposite-parity frame of the same
    /// kind is within the skew bound. Otherwise the frame is decoded locally
    /// against `last_fix` when that fix is recent enough. `receiver` is only
    /// used to disambiguate surface pairs when the aircraft has no fix yet.
    ///
    /// An NL disagreement between the pair returns `CprPairMismatch` and a
    /// pair decoding outside [-90, 90] returns `CprLatitudeOutOfRange`; in
    /// both cases the frames are kept so the next frame can retry.
    pub fn set_frame(
        &mut self,
        frame: CprFrame,
        last_fix: Option<&Fix>,
        receiver: Option<(f64, f64)>,
        config: &CprConfig,
    ) -> Result<CprOutcome> {
        self.pairing = self.pairing.with_frame(frame);

        if let CprPairing::Both { even, odd } = self.pairing {
            let max_skew = match frame.kind {
                CprKind::Airborne => config.airborne_max_skew,
                CprKind::Surface => config.surface_max_skew,
            };
            if (even.timestamp - odd.timestamp).abs() <= max_skew {
                let decoded = match frame.kind {
                    CprKind::Airborne => Some(global_decode_airborne(&even, &odd)?),
                    CprKind::Surface => last_fix
                        .map(|f| (f.lat, f.lon))
                        .or(receiver)
                        .map(|(lat, lon)| global_decode_surface(&even, &odd, lat, lon))
                        .transpose()?,
                };
                if let Some((lat, lon)) = decoded {
                    let newest = if even.timestamp >= odd.timestamp { even } else { odd };
                    return Ok(self.resolved(newest, lat, lon, FixMethod::Global));
                }
            }
        }

        let Some(fix) = last_fix else {
            return Ok(CprOutcome::Pending);
        };
        if (frame.timestamp - fix.timestamp).abs() > config.local_max_age {
            return Ok(CprOutcome::Pending);
        }

        let (lat, lon) = local_decode(&frame, fix.lat, fix.lon);
        if !valid_latitude(lat) {
            debug!(lat, "local CPR decode outside [-90, 90]");
            return Ok(CprOutcome::Pending);
        }
        let range = match frame.kind {
            CprKind::Airborne => config.airborne_local_range_nm,
            CprKind::Surface => config.surface_local_range_nm,
        };
        let dist = haversine_nm(fix.lat, fix.lon, lat, lon);
        if dist > range {
            debug!(dist_nm = dist, range_nm = range, "local CPR decode out of range");
            return Ok(CprOutcome::Pending);
        }
        Ok(self.resolved(frame, lat, lon, FixMethod::Local))
    }

    fn resolved(&mut self, frame: CprFrame, lat: f64, lon: f64, method: FixMethod) -> CprOutcome {
        if let Some(slot) = self.pairing.slot_mut(frame.parity) {
            slot.resolve(lat, lon);
        }
        CprOutcome::Resolved(Fix {
            lat,
            lon,
            timestamp: frame.timestamp,
            method,
        })
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Zone index and the candidate latitude of each frame.
fn pair_latitudes(even: &CprFrame, odd: &CprFrame, span: f64) -> (f64, f64) {
    let dlat_even = span / (4.0 * NZ);
    let dlat_odd = span / (4.0 * NZ - 1.0);

    let j = (59.0 * even.lat_fraction() - 60.0 * odd.lat_fraction() + 0.5).floor();

    let lat_e = dlat_even * (modulo(j, 60.0) + even.lat_fraction());
    let lat_o = dlat_odd * (modulo(j, 59.0) + odd.lat_fraction());
    (lat_e, lat_o)
}

fn valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

fn check_latitudes(lat_e: f64, lat_o: f64) -> Result<()> {
    for lat in [lat_e, lat_o] {
        if !valid_latitude(lat) {
            debug!(lat, "CPR pair decodes outside [-90, 90]");
            return Err(AdsbError::CprLatitudeOutOfRange { lat: round6(lat) });
        }
    }
    Ok(())
}

fn check_nl(lat_e: f64, lat_o: f64) -> Result<u32> {
    let (nl_even, nl_odd) = (nl(lat_e), nl(lat_o));
    if nl_even != nl_odd {
        debug!(nl_even, nl_odd, "CPR pair straddles a latitude band boundary");
        return Err(AdsbError::CprPairMismatch { nl_even, nl_odd });
    }
    Ok(nl_even)
}

/// Longitude from the newest frame of a pair, within `[0, span)`.
fn pair_longitude(even: &CprFrame, odd: &CprFrame, nl_val: u32, span: f64) -> (bool, f64) {
    let use_even = even.timestamp >= odd.timestamp;
    let nl_f = nl_val as f64;
    let m = (even.lon_fraction() * (nl_f - 1.0) - odd.lon_fraction() * nl_f + 0.5).floor();
    let (n_lon, frac) = if use_even {
        (nl_f.max(1.0), even.lon_fraction())
    } else {
        ((nl_f - 1.0).max(1.0), odd.lon_fraction())
    };
    let dlon = span / n_lon;
    (use_even, dlon * (modulo(m, n_lon) + frac))
}

/// Global CPR decode from an airborne even/odd pair.
///
/// The position is resolved with the newer frame. Returns
/// `CprLatitudeOutOfRange` when either candidate latitude is not a real
/// latitude, and `CprPairMismatch` when the two fall in different NL bands.
pub fn global_decode_airborne(even: &CprFrame, odd: &CprFrame) -> Result<(f64, f64)> {
    let (mut lat_e, mut lat_o) = pair_latitudes(even, odd, 360.0);

    // Normalize to [-90, 90]
    if lat_e >= 270.0 {
        lat_e -= 360.0;
    }
    if lat_o >= 270.0 {
        lat_o -= 360.0;
    }
    check_latitudes(lat_e, lat_o)?;

    let nl_val = check_nl(lat_e, lat_o)?;
    let (use_even, lon) = pair_longitude(even, odd, nl_val, 360.0);
    let lat = if use_even { lat_e } else { lat_o };

    Ok((round6(lat), round6(normalize_lon(lon))))
}

/// Global CPR decode from a surface even/odd pair.
///
/// Surface zones cover 90 degrees, so each coordinate has several
/// candidates; the one nearest `(ref_lat, ref_lon)` is chosen.
pub fn global_decode_surface(
    even: &CprFrame,
    odd: &CprFrame,
    ref_lat: f64,
    ref_lon: f64,
) -> Result<(f64, f64)> {
    let (lat_e, lat_o) = pair_latitudes(even, odd, 90.0);

    let nearest_lat = |lat: f64| {
        if (lat - 90.0 - ref_lat).abs() < (lat - ref_lat).abs() {
            lat - 90.0
        } else {
            lat
        }
    };
    let (lat_e, lat_o) = (nearest_lat(lat_e), nearest_lat(lat_o));
    check_latitudes(lat_e, lat_o)?;

    let nl_val = check_nl(lat_e, lat_o)?;
    let (use_even, lon) = pair_longitude(even, odd, nl_val, 90.0);
    let lat = if use_even { lat_e } else { lat_o };

    let lon_offset = |c: f64| normalize_lon(c - ref_lon).abs();
    let lon = (0..4)
        .map(|k| normalize_lon(lon + 90.0 * k as f64))
        .fold(None::<f64>, |best, c| match best {
            Some(b) if lon_offset(b) <= lon_offset(c) => Some(b),
            _ => Some(c),
        })
        .unwrap_or(lon);

    Ok((round6(lat), round6(lon)))
}

/// Local CPR decode using a reference position.
///
/// Unambiguous only when the aircraft is within half a zone of the
/// reference; callers check the result against a range bound. Near the poles
/// the latitude can come out past 90 and must be discarded.
pub fn local_decode(frame: &CprFrame, ref_lat: f64, ref_lon: f64) -> (f64, f64) {
    let span = frame.kind.span();
    let i = if frame.parity.is_odd() { 1.0 } else { 0.0 };
    let dlat = span / (4.0 * NZ - i);

    let cpr_lat = frame.lat_fraction();
    let cpr_lon = frame.lon_fraction();

    // Compute latitude zone index from reference
    let j = (ref_lat / dlat).floor() + (modulo(ref_lat, dlat) / dlat - cpr_lat + 0.5).floor();
    let lat = dlat * (j + cpr_lat);

    // Compute longitude zone size at this latitude
    let n_lon = (nl(lat) as f64 - i).max(1.0);
    let dlon = span / n_lon;

    // Compute longitude zone index from reference
    let m = (ref_lon / dlon).floor() + (modulo(ref_lon, dlon) / dlon - cpr_lon + 0.5).floor();
    let lon = dlon * (m + cpr_lon);

    (round6(lat), round6(normalize_lon(lon)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
