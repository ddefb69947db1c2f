//! Capacity-bounded directory of tracked aircraft.
//!
//! Pure state machine: feed it raw captures with [`AircraftDirectory::ingest_packet`],
//! sweep it with [`AircraftDirectory::update`], and read records back through
//! the accessors. The caller decides what to do with the outcomes (print,
//! forward, etc.).

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::aircraft::{AircraftRecord, PositionUpdate};
use crate::config::{AdmissionPolicy, Config, CprConfig};
use crate::frame::{parse_message, DecodedMessage, RawMessage};
use crate::types::*;

/// Default maximum number of live records.
pub const DEFAULT_CAPACITY: usize = 100;

/// Records are swept after this many seconds without an update.
pub const STALE_TIMEOUT: f64 = 60.0;

/// Result of a successful ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub icao: Icao,
    /// A record was created for this address.
    pub created: bool,
    /// Record evicted to make room, under [`AdmissionPolicy::EvictOldest`].
    pub evicted: Option<Icao>,
    /// Message family, or `None` when the type code is not decoded.
    pub kind: Option<&'static str>,
    pub position: PositionUpdate,
}

/// Ingest counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    pub received: u64,
    pub accepted: u64,
    pub malformed: u64,
    pub parity_errors: u64,
    pub unknown_type: u64,
    pub rejected_full: u64,
    pub created: u64,
    pub evicted: u64,
    pub swept: u64,
    pub position_fixes: u64,
    pub pair_mismatches: u64,
    pub invalid_positions: u64,
}

/// Keyed store of aircraft records.
#[derive(Debug, Clone)]
pub struct AircraftDirectory {
    aircraft: HashMap<Icao, AircraftRecord>,
    capacity: usize,
    stale_timeout: f64,
    admission: AdmissionPolicy,
    cpr: CprConfig,
    receiver: Option<(f64, f64)>,
    stats: DirectoryStats,
}

impl Default for AircraftDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AircraftDirectory {
    pub fn new(capacity: usize) -> Self {
        AircraftDirectory {
            aircraft: HashMap::with_capacity(capacity),
            capacity,
            stale_timeout: STALE_TIMEOUT,
            admission: AdmissionPolicy::default(),
            cpr: CprConfig::default(),
            receiver: None,
            stats: DirectoryStats::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.directory.capacity)
            .with_stale_timeout(config.directory.stale_timeout)
            .with_admission(config.directory.admission)
            .with_cpr(config.cpr.clone())
            .with_receiver(config.receiver.position())
    }

    pub fn with_stale_timeout(mut self, seconds: f64) -> Self {
        self.stale_timeout = seconds;
        self
    }

    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_cpr(mut self, cpr: CprConfig) -> Self {
        self.cpr = cpr;
        self
    }

    /// Receiver location, used to pick among surface position candidates.
    pub fn with_receiver(mut self, receiver: Option<(f64, f64)>) -> Self {
        self.receiver = receiver;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn admission(&self) -> AdmissionPolicy {
        self.admission
    }

    pub fn stats(&self) -> &DirectoryStats {
        &self.stats
    }

    /// Decode a raw capture and apply it to the addressed record.
    ///
    /// Malformed and parity-failed captures are counted and returned as
    /// errors without touching any record. A new address arriving while the
    /// directory is full is handled by the admission policy.
    pub fn ingest_packet(&mut self, raw: &RawMessage) -> Result<IngestOutcome> {
        self.stats.received += 1;
        let msg = match parse_message(raw) {
            Ok(msg) => msg,
            Err(e) => {
                match e {
                    AdsbError::ParityMismatch { .. } => self.stats.parity_errors += 1,
                    _ => self.stats.malformed += 1,
                }
                debug!(error = %e, timestamp = raw.timestamp, "dropped capture");
                return Err(e);
            }
        };
        self.apply_message(&msg)
    }

    fn apply_message(&mut self, msg: &DecodedMessage) -> Result<IngestOutcome> {
        let icao = *msg.icao();
        let created = !self.aircraft.contains_key(&icao);
        let evicted = if created { self.make_room()? } else { None };
        if created {
            self.stats.created += 1;
            debug!(icao = %icao_to_string(&icao), "new aircraft");
        }

        let ac = self
            .aircraft
            .entry(icao)
            .or_insert_with(|| AircraftRecord::new(icao, msg.timestamp()));
        let applied = ac.apply(msg, self.receiver, &self.cpr);

        self.stats.accepted += 1;
        if applied.kind.is_none() {
            self.stats.unknown_type += 1;
        }
        match applied.position {
            PositionUpdate::Resolved(_) => self.stats.position_fixes += 1,
            PositionUpdate::Rejected { .. } => self.stats.pair_mismatches += 1,
            PositionUpdate::Invalid { .. } => self.stats.invalid_positions += 1,
            _ => {}
        }
        trace!(icao = %icao_to_string(&icao), kind = ?applied.kind, "ingested");

        Ok(IngestOutcome {
            icao,
            created,
            evicted,
            kind: applied.kind,
            position: applied.position,
        })
    }

    /// Free a slot for a new address if the directory is full.
    fn make_room(&mut self) -> Result<Option<Icao>> {
        if self.aircraft.len() < self.capacity {
            return Ok(None);
        }

        let victim = match self.admission {
            AdmissionPolicy::RejectNew => None,
            AdmissionPolicy::EvictOldest => self.oldest(),
        };
        let Some(victim) = victim else {
            self.stats.rejected_full += 1;
            warn!(capacity = self.capacity, "aircraft directory full, rejecting new address");
            return Err(AdsbError::DirectoryFull {
                capacity: self.capacity,
            });
        };

        self.aircraft.remove(&victim);
        self.stats.evicted += 1;
        debug!(icao = %icao_to_string(&victim), "evicted least recently updated aircraft");
        Ok(Some(victim))
    }

    /// Least recently updated record; ties go to the lowest address.
    fn oldest(&self) -> Option<Icao> {
        self.aircraft
            .values()
            .min_by(|a, b| {
                a.last_update
                    .total_cmp(&b.last_update)
                    .then_with(|| icao_to_u32(a.icao()).cmp(&icao_to_u32(b.icao())))
            })
            .map(|ac| *ac.icao())
    }

    /// Remove every record not updated within the stale timeout of `now`.
    /// Returns the number removed.
    pub fn update(&mut self, now: f64) -> usize {
        let timeout = self.stale_timeout;
        let before = self.aircraft.len();
        self.aircraft.retain(|_, ac| !ac.is_stale(now, timeout));
        let removed = before - self.aircraft.len();
        if removed > 0 {
            self.stats.swept += removed as u64;
            info!(removed, remaining = self.aircraft.len(), "swept stale aircraft");
        }
        removed
    }

    /// Copy of the record for `icao`.
    pub fn get_aircraft(&self, icao: &Icao) -> Option<AircraftRecord> {
        self.aircraft.get(icao).cloned()
    }

    /// In-place access to the record for `icao`.
    pub fn get_aircraft_mut(&mut self, icao: &Icao) -> Option<&mut AircraftRecord> {
        self.aircraft.get_mut(icao)
    }

    pub fn contains_aircraft(&self, icao: &Icao) -> bool {
        self.aircraft.contains_key(icao)
    }

    pub fn remove_aircraft(&mut self, icao: &Icao) -> Option<AircraftRecord> {
        self.aircraft.remove(icao)
    }

    pub fn num_aircraft(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    /// Insert a record directly. Replacing an existing address always
    /// succeeds; a new address is subject to the capacity limit.
    pub fn insert_aircraft(&mut self, record: AircraftRecord) -> Result<()> {
        let icao = *record.icao();
        if !self.aircraft.contains_key(&icao) && self.aircraft.len() >= self.capacity {
            return Err(AdsbError::DirectoryFull {
                capacity: self.capacity,
            });
        }
        self.aircraft.insert(icao, record);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &AircraftRecord> {
        self.aircraft.values()
    }

    /// All records, ordered by address.
    pub fn snapshot(&self) -> Vec<AircraftRecord> {
        let mut records: Vec<_> = self.aircraft.values().cloned().collect();
        records.sort_by_key(|ac| icao_to_u32(ac.icao()));
        records
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{airborne_counts_hex, airborne_hex, es_hex, ident_hex};

    const IDENT: &str = "8D4840D6202CC371C32CE0576098";

    fn raw(hex: &str, ts: f64) -> RawMessage {
        RawMessage::from_hex(hex, ts, 0.0).expect("valid hex")
    }

    fn ingest(dir: &mut AircraftDirectory, hex: &str, ts: f64) -> Result<IngestOutcome> {
        dir.ingest_packet(&raw(hex, ts))
    }

    fn fill(dir: &mut AircraftDirectory, count: u32) {
        for i in 0..count {
            let icao = 0x100000 + i;
            ingest(dir, &ident_hex(icao, "TEST", 1), i as f64).unwrap();
        }
    }

    #[test]
    fn test_new_aircraft_created() {
        let mut dir = AircraftDirectory::default();
        let out = ingest(&mut dir, IDENT, 1.0).unwrap();
        assert!(out.created);
        assert_eq!(out.kind, Some("identification"));
        assert_eq!(icao_to_string(&out.icao), "4840D6");

        let icao = [0x48, 0x40, 0xD6];
        assert!(dir.contains_aircraft(&icao));
        let ac = dir.get_aircraft(&icao).unwrap();
        assert_eq!(ac.callsign.map(|c| c.to_string()), Some("KLM1023".into()));
        assert_eq!(ac.message_count, 1);
    }

    #[test]
    fn test_second_message_not_new_aircraft() {
        let mut dir = AircraftDirectory::default();
        ingest(&mut dir, IDENT, 1.0).unwrap();
        let out = ingest(&mut dir, IDENT, 2.0).unwrap();
        assert!(!out.created);
        assert_eq!(dir.num_aircraft(), 1);
    }

    #[test]
    fn test_multiple_aircraft() {
        let mut dir = AircraftDirectory::default();
        ingest(&mut dir, IDENT, 1.0).unwrap();
        ingest(&mut dir, "8D406B902015A678D4D220AA4BDA", 2.0).unwrap();
        assert_eq!(dir.num_aircraft(), 2);

        let snap = dir.snapshot();
        assert_eq!(snap[0].icao_str(), "406B90");
        assert_eq!(snap[1].icao_str(), "4840D6");
        assert_eq!(dir.iter().count(), 2);
    }

    #[test]
    fn test_position_cpr_pairing() {
        let mut dir = AircraftDirectory::default();
        let out = ingest(&mut dir, "8D40621D58C382D690C8AC2863A7", 2.0).unwrap();
        assert_eq!(out.position, PositionUpdate::Pending);

        let out = ingest(&mut dir, "8D40621D58C386435CC412692AD6", 1.0).unwrap();
        assert!(matches!(out.position, PositionUpdate::Resolved(_)));

        let ac = dir.get_aircraft(&[0x40, 0x62, 0x1D]).unwrap();
        assert!(ac.position_valid);
        assert_eq!(ac.altitude_ft(), Some(38000));
        // within 10 m of the worked example
        let err_nm = crate::cpr::haversine_nm(ac.lat.unwrap(), ac.lon.unwrap(), 52.2572, 3.9194);
        assert!(err_nm < 0.0054, "error {err_nm} NM");
        assert_eq!(dir.stats().position_fixes, 1);
    }

    #[test]
    fn test_impossible_latitude_counted() {
        let mut dir = AircraftDirectory::default();
        ingest(&mut dir, &airborne_counts_hex(0xABCDEF, 1416, 1000, true), 0.0).unwrap();
        let out = ingest(&mut dir, &airborne_counts_hex(0xABCDEF, 45875, 1000, false), 1.0).unwrap();
        assert!(matches!(out.position, PositionUpdate::Invalid { .. }));
        assert_eq!(dir.stats().invalid_positions, 1);
        assert_eq!(dir.stats().position_fixes, 0);
        assert!(!dir.get_aircraft(&[0xAB, 0xCD, 0xEF]).unwrap().position_valid);
    }

    #[test]
    fn test_corrupted_parity_leaves_directory_unchanged() {
        let mut dir = AircraftDirectory::default();
        ingest(&mut dir, IDENT, 1.0).unwrap();

        let mut data = hex_decode("8D406B902015A678D4D220AA4BDA").unwrap();
        data[13] ^= 0x01;
        let err = dir
            .ingest_packet(&RawMessage::from_bytes(&data, 2.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, AdsbError::ParityMismatch { .. }));
        assert_eq!(dir.num_aircraft(), 1);
        assert_eq!(dir.stats().parity_errors, 1);
    }

    #[test]
    fn test_malformed_capture_counted() {
        let mut dir = AircraftDirectory::default();
        let err = ingest(&mut dir, "02E197C845AC82", 1.0).unwrap_err();
        assert!(matches!(err, AdsbError::MalformedMessage(_)));
        assert_eq!(dir.num_aircraft(), 0);
        assert_eq!(dir.stats().malformed, 1);
        assert_eq!(dir.stats().received, 1);
    }

    #[test]
    fn test_unknown_type_code_counted_not_failed() {
        let mut dir = AircraftDirectory::default();
        let out = ingest(&mut dir, &es_hex(0x123456, 24u64 << 51), 1.0).unwrap();
        assert!(out.created);
        assert_eq!(out.kind, None);
        assert_eq!(dir.stats().unknown_type, 1);
        assert!(dir.contains_aircraft(&[0x12, 0x34, 0x56]));
    }

    #[test]
    fn test_reject_new_at_capacity() {
        let mut dir = AircraftDirectory::new(3);
        fill(&mut dir, 3);

        let err = ingest(&mut dir, IDENT, 10.0).unwrap_err();
        assert!(matches!(err, AdsbError::DirectoryFull { capacity: 3 }));
        assert_eq!(dir.num_aircraft(), 3);
        assert!(!dir.contains_aircraft(&[0x48, 0x40, 0xD6]));
        assert_eq!(dir.stats().rejected_full, 1);

        // known addresses are still updated
        let out = ingest(&mut dir, &ident_hex(0x100001, "TEST", 1), 11.0).unwrap();
        assert!(!out.created);
    }

    #[test]
    fn test_evict_oldest_at_capacity() {
        let mut dir = AircraftDirectory::new(3).with_admission(AdmissionPolicy::EvictOldest);
        fill(&mut dir, 3);
        // refresh the first record so the second becomes the oldest
        ingest(&mut dir, &ident_hex(0x100000, "TEST", 1), 5.0).unwrap();

        let out = ingest(&mut dir, IDENT, 10.0).unwrap();
        assert!(out.created);
        assert_eq!(out.evicted, Some(icao_from_u32(0x100001)));
        assert_eq!(dir.num_aircraft(), 3);
        assert!(dir.contains_aircraft(&[0x48, 0x40, 0xD6]));
        assert!(!dir.contains_aircraft(&icao_from_u32(0x100001)));
        assert_eq!(dir.stats().evicted, 1);
    }

    #[test]
    fn test_evict_ties_break_on_lowest_address() {
        let mut dir = AircraftDirectory::new(2).with_admission(AdmissionPolicy::EvictOldest);
        ingest(&mut dir, &ident_hex(0x300000, "B", 1), 1.0).unwrap();
        ingest(&mut dir, &ident_hex(0x200000, "A", 1), 1.0).unwrap();

        let out = ingest(&mut dir, IDENT, 2.0).unwrap();
        assert_eq!(out.evicted, Some(icao_from_u32(0x200000)));
    }

    #[test]
    fn test_zero_capacity_rejects_even_with_eviction() {
        let mut dir = AircraftDirectory::new(0).with_admission(AdmissionPolicy::EvictOldest);
        assert!(matches!(
            ingest(&mut dir, IDENT, 1.0),
            Err(AdsbError::DirectoryFull { capacity: 0 })
        ));
        assert!(dir.is_empty());
    }

    #[test]
    fn test_update_sweeps_stale() {
        let mut dir = AircraftDirectory::default();
        ingest(&mut dir, IDENT, 1.0).unwrap();
        ingest(&mut dir, "8D406B902015A678D4D220AA4BDA", 30.0).unwrap();

        assert_eq!(dir.update(2.0), 0);
        assert_eq!(dir.update(62.0), 1);
        assert!(!dir.contains_aircraft(&[0x48, 0x40, 0xD6]));
        assert!(dir.contains_aircraft(&[0x40, 0x6B, 0x90]));
        assert_eq!(dir.update(91.0), 1);
        assert_eq!(dir.num_aircraft(), 0);
        assert_eq!(dir.stats().swept, 2);
    }

    #[test]
    fn test_custom_stale_timeout() {
        let mut dir = AircraftDirectory::default().with_stale_timeout(5.0);
        ingest(&mut dir, IDENT, 1.0).unwrap();
        assert_eq!(dir.update(6.0), 0);
        assert_eq!(dir.update(6.5), 1);
    }

    #[test]
    fn test_get_mut_and_remove() {
        let mut dir = AircraftDirectory::default();
        ingest(&mut dir, IDENT, 1.0).unwrap();
        let icao = [0x48, 0x40, 0xD6];

        dir.get_aircraft_mut(&icao).unwrap().squawk = Some("1200".into());
        assert_eq!(dir.get_aircraft(&icao).unwrap().squawk.as_deref(), Some("1200"));

        let removed = dir.remove_aircraft(&icao).unwrap();
        assert_eq!(removed.icao_str(), "4840D6");
        assert!(!dir.contains_aircraft(&icao));
        assert!(dir.remove_aircraft(&icao).is_none());
        assert!(dir.get_aircraft(&icao).is_none());
    }

    #[test]
    fn test_insert_honours_capacity() {
        let mut dir = AircraftDirectory::new(1);
        dir.insert_aircraft(AircraftRecord::new([1, 2, 3], 0.0)).unwrap();
        // replacing the same address is fine
        dir.insert_aircraft(AircraftRecord::new([1, 2, 3], 1.0)).unwrap();
        assert!(matches!(
            dir.insert_aircraft(AircraftRecord::new([4, 5, 6], 1.0)),
            Err(AdsbError::DirectoryFull { .. })
        ));
        assert_eq!(dir.num_aircraft(), 1);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        for policy in [AdmissionPolicy::RejectNew, AdmissionPolicy::EvictOldest] {
            let mut dir = AircraftDirectory::new(5).with_admission(policy);
            for i in 0..40u32 {
                let _ = ingest(&mut dir, &airborne_hex(0x200000 + i, 45.0, 7.0, i % 2 == 1), i as f64);
                assert!(dir.num_aircraft() <= 5);
            }
            assert_eq!(dir.num_aircraft(), 5);
        }
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.directory.capacity = 7;
        config.directory.admission = AdmissionPolicy::EvictOldest;
        let dir = AircraftDirectory::from_config(&config);
        assert_eq!(dir.capacity(), 7);
        assert_eq!(dir.admission(), AdmissionPolicy::EvictOldest);
    }
}
