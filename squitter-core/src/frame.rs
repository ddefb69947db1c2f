//! Frame raw captures into validated extended squitter messages.
//!
//! Responsibilities:
//! - Hold a captured 112-bit buffer as fixed-width words (`RawMessage`)
//! - Undo the capture quirk on the last word
//! - Reject wrong-length or non-DF17/18 captures (`MalformedMessage`)
//! - Reject captures whose parity does not check (`ParityMismatch`) before
//!   any address is attributed
//! - Split the message into DF, CA, ICAO, type code and ME (`DecodedMessage`)

use serde::Serialize;

use crate::crc;
use crate::decode;
use crate::types::{hex_decode, AdsbError, AdsbMessage, Icao, Result};

/// Extended squitter length in bits.
pub const ES_BITS: usize = 112;
/// Extended squitter length in bytes.
pub const ES_BYTES: usize = ES_BITS / 8;
/// Number of 32-bit words a raw buffer can hold.
pub const RAW_WORDS: usize = 4;

const RAW_BYTES: usize = RAW_WORDS * 4;

// DFs that carry an ADS-B ME field with pure parity
const DF_EXTENDED_SQUITTER: &[u8] = &[17, 18];

// ---------------------------------------------------------------------------
// RawMessage
// ---------------------------------------------------------------------------

/// One captured message: left-aligned bit buffer plus capture metadata.
///
/// `Copy` and allocation free so it can be produced from the capture handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMessage {
    words: [u32; RAW_WORDS],
    bits: usize,
    /// Capture timestamp in seconds (monotonic)
    pub timestamp: f64,
    /// Received signal strength, in whatever unit the source reports
    pub rssi: f64,
}

impl RawMessage {
    /// Build from words as they come out of the capture hardware.
    ///
    /// The capture always over-reads the last word by one bit, so the final
    /// word is shifted right once and its low 16 bits are left-aligned. Any
    /// word count other than [`RAW_WORDS`] is kept as a wrong-length buffer
    /// and rejected at parse time.
    pub fn from_capture(captured: &[u32], timestamp: f64, rssi: f64) -> Self {
        let mut words = [0u32; RAW_WORDS];
        for (dst, src) in words.iter_mut().zip(captured) {
            *dst = *src;
        }

        let bits = if captured.len() == RAW_WORDS {
            words[RAW_WORDS - 1] = ((words[RAW_WORDS - 1] >> 1) & 0xFFFF) << 16;
            ES_BITS
        } else {
            captured.len() * 32
        };

        RawMessage {
            words,
            bits,
            timestamp,
            rssi,
        }
    }

    /// Build from message bytes (e.g. a decoded hex string).
    pub fn from_bytes(data: &[u8], timestamp: f64, rssi: f64) -> Self {
        let mut bytes = [0u8; RAW_BYTES];
        for (dst, src) in bytes.iter_mut().zip(data) {
            *dst = *src;
        }

        let mut words = [0u32; RAW_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = u32::from_be_bytes([
                bytes[i * 4],
                bytes[i * 4 + 1],
                bytes[i * 4 + 2],
                bytes[i * 4 + 3],
            ]);
        }

        RawMessage {
            words,
            bits: data.len() * 8,
            timestamp,
            rssi,
        }
    }

    /// Build from a hex string. Fails only on invalid hex; length is checked
    /// when the message is parsed.
    pub fn from_hex(hex: &str, timestamp: f64, rssi: f64) -> Result<Self> {
        let data = hex_decode(hex).ok_or_else(|| AdsbError::InvalidHex(hex.trim().to_string()))?;
        Ok(Self::from_bytes(&data, timestamp, rssi))
    }

    /// Number of bits the source delivered.
    pub fn bit_len(&self) -> usize {
        self.bits
    }

    pub fn words(&self) -> &[u32; RAW_WORDS] {
        &self.words
    }

    /// The first 14 bytes of the buffer, big-endian.
    pub fn es_bytes(&self) -> [u8; ES_BYTES] {
        let mut out = [0u8; ES_BYTES];
        for (i, b) in out.iter_mut().enumerate() {
            *b = (self.words[i / 4] >> (24 - 8 * (i % 4))) as u8;
        }
        out
    }
}

// ---------------------------------------------------------------------------
// DecodedMessage
// ---------------------------------------------------------------------------

/// A parity-checked extended squitter.
///
/// Only [`parse_message`] builds one, so holding a `DecodedMessage` means
/// the length, DF and parity checks all passed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    df: u8,
    ca: u8,
    icao: Icao,
    tc: u8,
    me: u64,
    parity: u32,
    timestamp: f64,
    rssi: f64,
}

impl DecodedMessage {
    /// Downlink Format (17 or 18)
    pub fn df(&self) -> u8 {
        self.df
    }

    /// Capability (3 bits, transponder level for DF17)
    pub fn ca(&self) -> u8 {
        self.ca
    }

    pub fn icao(&self) -> &Icao {
        &self.icao
    }

    /// ADS-B Type Code (first 5 bits of ME)
    pub fn tc(&self) -> u8 {
        self.tc
    }

    /// ME field, 56 bits right-aligned
    pub fn me(&self) -> u64 {
        self.me
    }

    /// Parity field (bits 89-112)
    pub fn parity(&self) -> u32 {
        self.parity
    }

    /// Capture timestamp in seconds
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn rssi(&self) -> f64 {
        self.rssi
    }

    /// True if this is an ADS-B extended squitter from a transponder (DF17).
    pub fn is_adsb(&self) -> bool {
        self.df == 17
    }

    /// Decode the ME field into a typed message.
    pub fn payload(&self) -> Result<AdsbMessage> {
        decode::decode_me(self.tc, self.me)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Validate a raw capture and split it into its fields.
///
/// Length and DF are checked first (`MalformedMessage`), then parity
/// (`ParityMismatch`). No address is extracted from a message that fails
/// either check.
pub fn parse_message(raw: &RawMessage) -> Result<DecodedMessage> {
    if raw.bit_len() != ES_BITS {
        return Err(AdsbError::MalformedMessage(format!(
            "expected {ES_BITS} bits, got {}",
            raw.bit_len()
        )));
    }

    let data = raw.es_bytes();
    let df = (data[0] >> 3) & 0x1F;
    if !DF_EXTENDED_SQUITTER.contains(&df) {
        return Err(AdsbError::MalformedMessage(format!(
            "downlink format {df} is not an extended squitter"
        )));
    }

    let computed = crc::crc24_payload(&data);
    let parity = crc::parity_field(&data);
    if computed != parity {
        return Err(AdsbError::ParityMismatch {
            computed,
            received: parity,
        });
    }

    let me = data[4..11]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);

    Ok(DecodedMessage {
        df,
        ca: data[0] & 0x07,
        icao: [data[1], data[2], data[3]],
        tc: ((me >> 51) & 0x1F) as u8,
        me,
        parity,
        timestamp: raw.timestamp,
        rssi: raw.rssi,
    })
}

/// Parse a hex string directly. Convenience for test vectors and file input.
pub fn parse_hex(hex: &str, timestamp: f64) -> Result<DecodedMessage> {
    parse_message(&RawMessage::from_hex(hex, timestamp, 0.0)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
