//! Ternary bitstring conditions over binarised inputs.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::{XcsfError, XcsfResult};
use crate::params::Params;
use crate::sam;
use crate::serial;

const DONT_CARE: u8 = b'#';
const ZERO: u8 = b'0';
const ONE: u8 = b'1';

/// Probability of generalising a position to don't-care
const P_DONT_CARE: f64 = 0.5;

const N_MU: usize = 1;

/// A ternary condition: one symbol per binarised input bit
#[derive(Clone, Debug, PartialEq)]
pub struct TernaryCond {
    string: Vec<u8>,
    bits: usize,
    mu: Vec<f64>,
}

/// Encodes a unit-interval value as its most significant bits.
fn float_to_binary(x: f64, bits: usize, out: &mut Vec<u8>) {
    out.clear();
    let max = (1usize << bits) - 1;
    let v = ((x.clamp(0.0, 1.0) * (1 << bits) as f64) as usize).min(max);
    for j in 0..bits {
        let bit = (v >> (bits - 1 - j)) & 1;
        out.push(if bit == 1 { ONE } else { ZERO });
    }
}

impl TernaryCond {
    pub fn new(params: &Params, rng: &mut impl Rng) -> Self {
        let length = params.x_dim * params.cond.bits;
        let mut cond = Self {
            string: vec![DONT_CARE; length],
            bits: params.cond.bits,
            mu: sam::init(&[params.mutation.p], params.sam.min),
        };
        cond.rand(rng);
        cond
    }

    fn rand(&mut self, rng: &mut impl Rng) {
        for s in &mut self.string {
            *s = if rng.gen::<f64>() < P_DONT_CARE {
                DONT_CARE
            } else if rng.gen::<f64>() < 0.5 {
                ZERO
            } else {
                ONE
            };
        }
    }

    pub fn matches(&self, params: &Params, x: &[f64]) -> bool {
        let mut tmp = Vec::with_capacity(self.bits);
        for i in 0..params.x_dim {
            float_to_binary(x[i], self.bits, &mut tmp);
            for j in 0..self.bits {
                let s = self.string[i * self.bits + j];
                if s != DONT_CARE && s != tmp[j] {
                    return false;
                }
            }
        }
        true
    }

    /// Builds a string matching the input, generalised at random positions.
    pub fn cover(&mut self, params: &Params, x: &[f64], rng: &mut impl Rng) {
        let mut tmp = Vec::with_capacity(self.bits);
        for i in 0..params.x_dim {
            float_to_binary(x[i], self.bits, &mut tmp);
            for j in 0..self.bits {
                self.string[i * self.bits + j] = if rng.gen::<f64>() < P_DONT_CARE {
                    DONT_CARE
                } else {
                    tmp[j]
                };
            }
        }
    }

    /// Uniform crossover gated by the crossover probability.
    pub fn crossover(&mut self, other: &mut TernaryCond, params: &Params, rng: &mut impl Rng) -> bool {
        let mut changed = false;
        if rng.gen::<f64>() < params.ea.p_crossover {
            for i in 0..self.string.len() {
                if rng.gen::<f64>() < 0.5 && self.string[i] != other.string[i] {
                    std::mem::swap(&mut self.string[i], &mut other.string[i]);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Specific positions generalise and don't-cares specialise.
    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        sam::adapt(&mut self.mu, params.sam.kind, params.sam.min, rng);
        let mut changed = false;
        for s in &mut self.string {
            if rng.gen::<f64>() < self.mu[0] {
                *s = if *s == DONT_CARE {
                    if rng.gen::<f64>() < 0.5 {
                        ZERO
                    } else {
                        ONE
                    }
                } else {
                    DONT_CARE
                };
                changed = true;
            }
        }
        changed
    }

    /// Whether this condition matches everything the other does, and more.
    pub fn general(&self, other: &TernaryCond) -> bool {
        let mut general = false;
        for (a, b) in self.string.iter().zip(&other.string) {
            if *a != DONT_CARE && a != b {
                return false;
            }
            if a != b {
                general = true;
            }
        }
        general
    }

    pub fn size(&self) -> usize {
        self.string.len()
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.string.len())?;
        serial::write_bytes(w, &self.string)?;
        serial::write_len(w, self.bits)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let length = serial::read_len(r)?;
        if length < 1 {
            return Err(XcsfError::serialization("empty ternary condition"));
        }
        let string = serial::read_bytes(r, length)?;
        let bits = serial::read_len(r)?;
        let mu = serial::read_f64_vec(r, N_MU)?;
        Ok(Self { string, bits, mu })
    }
}

impl std::fmt::Display for TernaryCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ternary: {}", String::from_utf8_lossy(&self.string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ternary_params() -> Params {
        let mut params = Params::default();
        params.x_dim = 2;
        params.cond.bits = 2;
        params
    }

    #[test]
    fn test_float_to_binary() {
        let mut out = Vec::new();
        float_to_binary(0.0, 2, &mut out);
        assert_eq!(out, b"00");
        float_to_binary(0.3, 2, &mut out);
        assert_eq!(out, b"01");
        float_to_binary(0.6, 2, &mut out);
        assert_eq!(out, b"10");
        float_to_binary(1.0, 2, &mut out);
        assert_eq!(out, b"11");
    }

    #[test]
    fn test_all_dont_care_matches_everything() {
        let params = ternary_params();
        let mut rng = StdRng::seed_from_u64(0);
        let mut cond = TernaryCond::new(&params, &mut rng);
        cond.string = vec![DONT_CARE; 4];
        assert!(cond.matches(&params, &[0.1, 0.9]));
        assert!(cond.matches(&params, &[0.9, 0.1]));
    }

    #[test]
    fn test_specific_string_matches_own_input() {
        let params = ternary_params();
        let mut rng = StdRng::seed_from_u64(1);
        let mut cond = TernaryCond::new(&params, &mut rng);
        cond.string = b"0011".to_vec();
        assert!(cond.matches(&params, &[0.1, 0.99]));
        assert!(!cond.matches(&params, &[0.99, 0.99]));
    }

    #[test]
    fn test_cover_matches_input() {
        let params = ternary_params();
        let mut rng = StdRng::seed_from_u64(2);
        let mut cond = TernaryCond::new(&params, &mut rng);
        for trial in 0..50 {
            let x = [
                rng.gen::<f64>(),
                rng.gen::<f64>(),
            ];
            cond.cover(&params, &x, &mut rng);
            assert!(cond.matches(&params, &x), "trial {trial}");
        }
    }

    #[test]
    fn test_general() {
        let params = ternary_params();
        let mut rng = StdRng::seed_from_u64(3);
        let mut a = TernaryCond::new(&params, &mut rng);
        let mut b = TernaryCond::new(&params, &mut rng);
        a.string = b"##01".to_vec();
        b.string = b"1001".to_vec();
        assert!(a.general(&b));
        assert!(!b.general(&a));
        b.string = a.string.clone();
        assert!(!a.general(&b));
    }

    #[test]
    fn test_mutate_flips_between_classes() {
        let mut params = ternary_params();
        params.mutation.p = 1.0;
        params.sam.min = 1.0;
        let mut rng = StdRng::seed_from_u64(4);
        let mut cond = TernaryCond::new(&params, &mut rng);
        cond.string = b"#0#1".to_vec();
        assert!(cond.mutate(&params, &mut rng));
        assert_ne!(cond.string[0], DONT_CARE);
        assert_eq!(cond.string[1], DONT_CARE);
        assert_ne!(cond.string[2], DONT_CARE);
        assert_eq!(cond.string[3], DONT_CARE);
    }

    #[test]
    fn test_save_load_round_trip() {
        let params = ternary_params();
        let mut rng = StdRng::seed_from_u64(5);
        let cond = TernaryCond::new(&params, &mut rng);
        let mut buf = Vec::new();
        cond.save(&mut buf).unwrap();
        let loaded = TernaryCond::load(&mut buf.as_slice()).unwrap();
        assert_eq!(cond, loaded);
    }
}
