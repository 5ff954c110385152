use sha2::{Digest, Sha256};

/// Stable pseudo-random words derived from a string.
///
/// SHA-256 keeps the values identical across processes, platforms and
/// compiler versions, unlike `std`'s `DefaultHasher`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Seed([u64; 4]);

impl Seed {
    pub(crate) fn of(input: &str) -> Self {
        let digest = Sha256::digest(input.as_bytes());
        let mut words = [0u64; 4];
        for (word, chunk) in words.iter_mut().zip(digest.chunks_exact(8)) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            *word = u64::from_be_bytes(bytes);
        }
        Self(words)
    }

    /// Word `index` (mod 4) mapped onto `[0, 1)`.
    pub(crate) fn unit(&self, index: usize) -> f64 {
        (self.0[index % 4] >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Word `index` mapped onto `[low, high)`.
    pub(crate) fn within(&self, index: usize, low: f64, high: f64) -> f64 {
        low + (high - low) * self.unit(index)
    }

    /// Word `index` mapped onto `[-1, 1)`.
    pub(crate) fn signed(&self, index: usize) -> f64 {
        self.within(index, -1.0, 1.0)
    }
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_seed() {
        assert_eq!(Seed::of("gucci|kith"), Seed::of("gucci|kith"));
        assert_ne!(Seed::of("gucci|kith"), Seed::of("kith|gucci"));
    }

    #[test]
    fn units_stay_in_range() {
        let seed = Seed::of("anything");
        for i in 0..8 {
            let u = seed.unit(i);
            assert!((0.0..1.0).contains(&u));
            let w = seed.within(i, 4.0, 8.0);
            assert!((4.0..8.0).contains(&w));
        }
    }
}
