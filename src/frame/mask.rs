use rand::{thread_rng, Rng};

/// XORs `payload` in place with the repeating 4-byte `mask`.
///
/// Masking and unmasking are the same operation, so applying it twice with
/// the same key restores the original bytes.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= mask[i % 4];
    }
}

/// A fresh mask key for client-role frames.
pub fn random_mask() -> [u8; 4] {
    thread_rng().gen()
}
