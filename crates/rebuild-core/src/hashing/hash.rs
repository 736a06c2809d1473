//! Hash helpers: un único algoritmo (blake3) para claves e identidades.

use blake3::Hasher;

/// Hashea un string y devuelve hex (64 caracteres).
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Prefijo hex de `len` caracteres del hash de `input`.
pub fn short_digest(input: &str, len: usize) -> String {
    let mut full = hash_str(input);
    full.truncate(len);
    full
}
