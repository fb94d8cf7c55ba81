//! The Vendor Secret (VS): an out-of-band, human-transcribable secret.
//!
//! A VS is 20 Crockford-Base32 payload characters (~100 bits of entropy) plus
//! one mod-32 checksum character over the payload digits, rendered as five
//! dash-separated groups and a trailing checksum:
//! `AAAA-BBBB-CCCC-DDDD-EEEE-X`.
//!
//! The checksum adds zero entropy; it exists purely to detect transcription
//! errors before any cryptographic work is attempted.

use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Crockford Base32: no I, L, O, U.
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const PAYLOAD_LEN: usize = 20;
const GROUP_LEN: usize = 4;
/// 20 payload characters carry 100 bits; packed big-endian they fill 13 bytes
/// with the final 4 bits zero.
const IKM_LEN: usize = 13;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VendorSecretError {
    #[error("vendor secret has the wrong length or characters")]
    BadFormat,

    #[error("vendor secret checksum mismatch")]
    BadChecksum,
}

/// A validated Vendor Secret. Holds the 20 payload digit values (0..32);
/// zeroized on drop.
pub struct VendorSecret {
    digits: Zeroizing<[u8; PAYLOAD_LEN]>,
}

impl fmt::Debug for VendorSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorSecret")
            .field("digits", &"[REDACTED]")
            .finish()
    }
}

impl VendorSecret {
    /// Draw a fresh Vendor Secret from the OS RNG.
    pub fn generate() -> Self {
        let mut raw = Zeroizing::new([0u8; PAYLOAD_LEN]);
        OsRng.fill_bytes(raw.as_mut());

        let mut digits = Zeroizing::new([0u8; PAYLOAD_LEN]);
        for (i, d) in base32_digits(raw.as_ref(), PAYLOAD_LEN).into_iter().enumerate() {
            digits[i] = d;
        }
        Self { digits }
    }

    /// Parse user input: strips dashes and whitespace, uppercases, verifies
    /// length, character set, and checksum.
    pub fn normalize(input: &str) -> Result<Self, VendorSecretError> {
        let compact: Vec<char> = input
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if compact.len() != PAYLOAD_LEN + 1 {
            return Err(VendorSecretError::BadFormat);
        }

        let mut digits = Zeroizing::new([0u8; PAYLOAD_LEN]);
        for (i, c) in compact[..PAYLOAD_LEN].iter().enumerate() {
            digits[i] = digit_value(*c).ok_or(VendorSecretError::BadFormat)?;
        }
        let claimed_check = digit_value(compact[PAYLOAD_LEN]).ok_or(VendorSecretError::BadFormat)?;

        if claimed_check != checksum(digits.as_ref()) {
            return Err(VendorSecretError::BadChecksum);
        }

        Ok(Self { digits })
    }

    /// Canonical dash-grouped rendering for the outbound approval email.
    pub fn to_dashed_string(&self) -> String {
        let mut out = String::with_capacity(PAYLOAD_LEN + PAYLOAD_LEN / GROUP_LEN + 1);
        for (i, &d) in self.digits.iter().enumerate() {
            if i > 0 && i % GROUP_LEN == 0 {
                out.push('-');
            }
            out.push(ALPHABET[d as usize] as char);
        }
        out.push('-');
        out.push(ALPHABET[checksum(self.digits.as_ref()) as usize] as char);
        out
    }

    /// The payload bits packed into raw bytes, suitable as HKDF IKM.
    pub fn to_ikm_bytes(&self) -> Zeroizing<[u8; IKM_LEN]> {
        let mut out = Zeroizing::new([0u8; IKM_LEN]);
        for (i, &d) in self.digits.iter().enumerate() {
            let bit = i * 5;
            let byte = bit / 8;
            let shift = 3_i32 - (bit % 8) as i32;
            if shift >= 0 {
                out[byte] |= d << shift;
            } else {
                out[byte] |= d >> -shift;
                out[byte + 1] |= d << (8 + shift);
            }
        }
        out
    }
}

fn digit_value(c: char) -> Option<u8> {
    ALPHABET.iter().position(|&a| a as char == c).map(|p| p as u8)
}

fn checksum(digits: &[u8]) -> u8 {
    (digits.iter().map(|&d| d as u32).sum::<u32>() % 32) as u8
}

/// Extract `count` 5-bit big-endian groups from a byte stream.
fn base32_digits(bytes: &[u8], count: usize) -> Vec<u8> {
    (0..count)
        .map(|i| {
            let bit = i * 5;
            let byte = bit / 8;
            let mut window = (bytes[byte] as u16) << 8;
            if byte + 1 < bytes.len() {
                window |= bytes[byte + 1] as u16;
            }
            ((window >> (11 - bit % 8)) & 0x1f) as u8
        })
        .collect()
}
