//! Random tie-break among equally eligible machines.

use rand::{CryptoRng, Rng};

use metal_core::Machine;

/// Pick one machine uniformly at random.
///
/// The generator must be cryptographically strong so the allocation order
/// cannot be predicted. Production callers pass `rand::rng()`.
pub fn pick<'a, R>(machines: &'a [Machine], rng: &mut R) -> Option<&'a Machine>
where
    R: Rng + CryptoRng,
{
    if machines.is_empty() {
        return None;
    }
    machines.get(rng.random_range(0..machines.len()))
}
