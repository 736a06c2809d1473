//! Filtro de membresía de artefactos reconstruidos.
//!
//! Formato binario sin cabecera: un consumidor externo lo reconstruye
//! bit a bit a partir del mismo conjunto de coordenadas, así que tamaño,
//! rondas y función hash son parte del contrato.
//!
//! - tamaño en bytes = 2 × |coordenadas|, acotado a [100, 1_024_000]
//! - 10 rondas; ronda `i` usa `m = i * 7` y pliega `m * acc + codepoint`
//!   con aritmética i32 envolvente
//! - bit = hash mod (tamaño × 8), valor absoluto si es negativo

use std::collections::BTreeSet;

pub const MIN_FILTER_BYTES: usize = 100;
pub const MAX_FILTER_BYTES: usize = 1024 * 1000;
pub const HASH_ROUNDS: i32 = 10;

pub fn filter_size(count: usize) -> usize { count.saturating_mul(2).clamp(MIN_FILTER_BYTES, MAX_FILTER_BYTES) }

pub fn round_hash(round: i32, coordinate: &str) -> i32 {
    let m = round.wrapping_mul(7);
    coordinate.chars().fold(0i32, |acc, c| m.wrapping_mul(acc).wrapping_add(c as i32))
}

fn bit_index(round: i32, coordinate: &str, total_bits: usize) -> usize {
    // total_bits <= 8_192_000 cabe en i32
    let modulus = total_bits as i32;
    let h = round_hash(round, coordinate) % modulus;
    h.unsigned_abs() as usize
}

/// Construye el filtro; depende sólo del conjunto (duplicados y orden no
/// cambian el resultado).
pub fn create_filter<I, S>(coordinates: I) -> Vec<u8>
    where I: IntoIterator<Item = S>,
          S: AsRef<str>
{
    let set: BTreeSet<String> = coordinates.into_iter().map(|c| c.as_ref().to_owned()).collect();
    let size = filter_size(set.len());
    let total_bits = size * 8;
    let mut filter = vec![0u8; size];
    for coordinate in &set {
        for round in 1..=HASH_ROUNDS {
            let bit = bit_index(round, coordinate, total_bits);
            filter[bit / 8] |= 1 << (bit % 8);
        }
    }
    filter
}

/// "Posiblemente presente": nunca da falso negativo para una coordenada
/// usada al construir.
pub fn might_contain(filter: &[u8], coordinate: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let total_bits = filter.len() * 8;
    (1..=HASH_ROUNDS).all(|round| {
                         let bit = bit_index(round, coordinate, total_bits);
                         filter[bit / 8] & (1 << (bit % 8)) != 0
                     })
}
