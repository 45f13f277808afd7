//! Request identifier generation.

use rand::Rng;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const ID_LENGTH: usize = 21;

/// Generate a fresh 21-character URL-safe request identifier.
///
/// 21 symbols over a 64-character alphabet give 126 bits of entropy, which
/// keeps the collision probability within a session far below 2⁻⁶⁴.
pub fn generate_request_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LENGTH)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
