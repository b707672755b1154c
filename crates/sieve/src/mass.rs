pub const H2O: f32 = 18.010565;

pub trait Mass {
    /// Monoisotopic mass, or `None` if it contains an ambiguous or unknown residue
    fn monoisotopic(&self) -> Option<f32>;
}

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

impl Mass for u8 {
    fn monoisotopic(&self) -> Option<f32> {
        Some(match self {
            b'A' => 71.03711,
            b'R' => 156.1011,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.0405,
            b'F' => 147.0684,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            b'U' => 150.95363,
            b'O' => 237.14773,
            _ => return None,
        })
    }
}

impl Mass for str {
    fn monoisotopic(&self) -> Option<f32> {
        self.as_bytes()
            .iter()
            .map(|aa| aa.to_ascii_uppercase().monoisotopic())
            .sum::<Option<f32>>()
            .map(|residues| residues + H2O)
    }
}

/// Molecular weight of a protein sequence in kDa
pub fn molecular_weight(sequence: &str) -> Option<f64> {
    sequence.monoisotopic().map(|m| m as f64 / 1000.0)
}

#[cfg(test)]
mod test {
    use super::{molecular_weight, Mass, H2O, VALID_AA};

    #[test]
    fn smoke() {
        for ch in VALID_AA {
            assert!(ch.monoisotopic().unwrap() > 0.0);
        }
    }

    #[test]
    fn sequences() {
        assert_eq!("G".monoisotopic(), Some(57.02146 + H2O));
        assert_eq!("PEPTIDEX".monoisotopic(), None);
        let kda = molecular_weight("gg").unwrap();
        assert!((kda - 0.132053).abs() < 1e-5);
    }
}
