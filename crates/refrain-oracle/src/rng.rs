//! Deterministic RNG using PCG32 with BLAKE3 seed derivation.
//!
//! Generators take any `rand::Rng`, but the driver loops and the CLI create
//! their generators here so that a base seed fully determines the output.
//! Each generation attempt gets its own stream derived from the base seed.

use rand::SeedableRng;
use rand_pcg::Pcg32;

/// Creates a PCG32 RNG from a 64-bit seed.
pub fn create_rng(seed: u64) -> Pcg32 {
    Pcg32::seed_from_u64(seed)
}

/// Derives the seed for one generation attempt from the base seed.
///
/// Uses BLAKE3 over the base seed and the attempt index so that attempt
/// streams are independent of each other.
pub fn derive_attempt_seed(base_seed: u64, attempt: u64) -> u64 {
    let mut input = Vec::with_capacity(16);
    input.extend_from_slice(&base_seed.to_le_bytes());
    input.extend_from_slice(&attempt.to_le_bytes());

    let hash = blake3::hash(&input);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}

/// Creates the RNG for one generation attempt.
pub fn create_attempt_rng(base_seed: u64, attempt: u64) -> Pcg32 {
    create_rng(derive_attempt_seed(base_seed, attempt))
}
