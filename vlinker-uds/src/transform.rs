//! Seed → key transforms used by Security Access profiles and the seed/key
//! analyser. A tagged sum rather than a callable registry, so profiles stay
//! data (`Facet`-serialisable, inspectable, listable) instead of closures.

use facet::Facet;

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub enum Transform {
    Identity,
    Reverse,
    RotateLeft(u8),
    XorConstant(u8),
    RepeatingXor(Vec<u8>),
}

impl Transform {
    pub fn apply(&self, seed: &[u8]) -> Vec<u8> {
        match self {
            Transform::Identity => seed.to_vec(),
            Transform::Reverse => seed.iter().rev().copied().collect(),
            Transform::RotateLeft(n) => seed.iter().map(|b| b.rotate_left(*n as u32)).collect(),
            Transform::XorConstant(c) => seed.iter().map(|b| b ^ c).collect(),
            Transform::RepeatingXor(key) => {
                if key.is_empty() {
                    return seed.to_vec();
                }
                seed.iter()
                    .enumerate()
                    .map(|(i, b)| b ^ key[i % key.len()])
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_round_trips() {
        let seed = [1u8, 2, 3, 4];
        assert_eq!(Transform::Reverse.apply(&seed), vec![4, 3, 2, 1]);
    }

    #[test]
    fn xor_constant_is_involution() {
        let seed = [0xDE, 0xAD, 0xBE, 0xEF];
        let transform = Transform::XorConstant(0x5A);
        let key = transform.apply(&seed);
        assert_eq!(transform.apply(&key), seed);
    }

    #[test]
    fn repeating_xor_wraps_key() {
        let seed = [1u8, 2, 3, 4, 5];
        let key = Transform::RepeatingXor(vec![0xFF, 0x00]).apply(&seed);
        assert_eq!(key, vec![0xFE, 0x02, 0xFC, 0x04, 0xFA]);
    }
}
