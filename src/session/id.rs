//! Session identifier minting.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::Error;
use crate::Result;

/// Number of random bytes behind every session identifier.
pub const SID_BYTES: usize = 16;

/// Length of the hex-encoded identifier.
pub const SID_LEN: usize = SID_BYTES * 2;

/// Mint a new session identifier.
///
/// Draws 16 bytes from the operating system's CSPRNG and hex-encodes
/// them into a 32 character string. There is no fallback to a weaker
/// source: if the OS cannot provide entropy, minting fails.
pub fn generate_sid() -> Result<String> {
    generate_sid_from(&mut OsRng)
}

/// Mint an identifier from the given random source.
pub(crate) fn generate_sid_from<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut buf = [0u8; SID_BYTES];
    rng.try_fill_bytes(&mut buf)
        .map_err(|e| Error::IdentifierMinting(e.to_string()))?;
    Ok(hex::encode(buf))
}

/// Check whether a string has the shape of a minted identifier.
pub fn is_well_formed(sid: &str) -> bool {
    sid.len() == SID_LEN && sid.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Random source that is always out of entropy.
#[cfg(test)]
pub(crate) struct Exhausted;

#[cfg(test)]
impl RngCore for Exhausted {
    fn next_u32(&mut self) -> u32 {
        unreachable!("only try_fill_bytes is used")
    }

    fn next_u64(&mut self) -> u64 {
        unreachable!("only try_fill_bytes is used")
    }

    fn fill_bytes(&mut self, _dest: &mut [u8]) {
        unreachable!("only try_fill_bytes is used")
    }

    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        Err(rand::Error::new(std::io::Error::other("no entropy")))
    }
}

/// Identifier source that always fails to mint.
#[cfg(test)]
pub(crate) fn exhausted_sid() -> Result<String> {
    generate_sid_from(&mut Exhausted)
}
