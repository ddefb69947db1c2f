//! CRC-24 parity for Mode S extended squitter.
//!
//! ICAO standard polynomial: x^24 + x^23 + x^22 + ... + x^10 + x^3 + 1
//! Generator: 0xFFF409
//!
//! For DF17/18 the last 24 bits are pure parity: the remainder computed over
//! bits 1-88 must equal bits 89-112.

const GENERATOR: u32 = 0xFFF409;

// ---------------------------------------------------------------------------
// CRC lookup table (compile-time)
// ---------------------------------------------------------------------------

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x800000 != 0 {
                crc = (crc << 1) ^ GENERATOR;
            } else {
                crc <<= 1;
            }
            crc &= 0xFFFFFF;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

// ---------------------------------------------------------------------------
// Core CRC functions
// ---------------------------------------------------------------------------

/// Pure CRC-24 polynomial division of all bytes.
pub fn crc24_raw(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc = ((crc << 8) ^ CRC_TABLE[((crc >> 16) ^ byte as u32) as usize & 0xFF]) & 0xFFFFFF;
    }
    crc
}

/// Parity remainder computed over the message body (all bytes except the last 3).
pub fn crc24_payload(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        return 0;
    }
    crc24_raw(&data[..data.len() - 3])
}

/// Parity field carried in the last 3 bytes.
pub fn parity_field(data: &[u8]) -> u32 {
    if data.len() < 3 {
        return 0;
    }
    let n = data.len() - 3;
    (data[n] as u32) << 16 | (data[n + 1] as u32) << 8 | data[n + 2] as u32
}

/// Syndrome of a full message: body remainder XOR parity field.
///
/// Zero for an intact DF17/18 message.
pub fn crc24(data: &[u8]) -> u32 {
    crc24_payload(data) ^ parity_field(data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
