//! Random number generator utilities

use rand::RngCore;

fn random_fill(buffer: &mut [u8]) {
    let mut random = rand::thread_rng();
    random.fill_bytes(buffer);
}

/// Generate a random fixed size array, used for key handles.
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut data = [0u8; N];
    random_fill(&mut data);
    data
}
