//! Random value generation for codes and opaque tokens.

use rand::{Rng, rng};

/// Alphabet without look-alike characters (`0/O/o`, `1/l/I`).
const UNAMBIGUOUS_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz";

/// Generate `len` characters drawn uniformly from the unambiguous alphabet.
pub fn unambiguous_string(len: usize) -> String {
    let mut rng = rng();
    (0..len)
        .map(|_| UNAMBIGUOUS_ALPHABET[rng.random_range(0..UNAMBIGUOUS_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_requested_length_and_alphabet() {
        let value = unambiguous_string(40);
        assert_eq!(value.len(), 40);
        assert!(value.bytes().all(|b| UNAMBIGUOUS_ALPHABET.contains(&b)));
        assert!(!value.contains(['0', 'O', 'o', '1', 'l', 'I']));
    }

    #[test]
    fn values_are_unique() {
        assert_ne!(unambiguous_string(32), unambiguous_string(32));
    }
}
