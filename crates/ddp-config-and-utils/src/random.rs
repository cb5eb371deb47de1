//! Random identifiers.
//!
//! Ids are drawn from an alphabet without look-alike characters
//! (no `0`/`O`, `1`/`l`/`I`, `U`/`V`), which keeps them safe to read aloud
//! and to paste into URLs.

use rand::Rng;

/// Characters used for generated ids.
pub const UNMISTAKABLE_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of document and subscription ids.
pub const DEFAULT_ID_LEN: usize = 17;

/// A 17-character random id.
pub fn id() -> String {
    id_of_len(DEFAULT_ID_LEN)
}

/// A random id of `len` characters.
pub fn id_of_len(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| UNMISTAKABLE_CHARS[rng.gen_range(0..UNMISTAKABLE_CHARS.len())] as char)
        .collect()
}
