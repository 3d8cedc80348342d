use rand::distr::uniform::{SampleRange, SampleUniform};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use parking_lot::Mutex;

/// One pseudo-random generator shared by every worker.
///
/// Each draw takes the lock once, so draws from different workers are
/// serialized and a seeded run hands out the same sequence of values.
pub struct SharedRng {
    inner: Mutex<StdRng>,
}

impl SharedRng {
    /// Seeds from `seed`, or from OS entropy when `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            inner: Mutex::new(rng),
        }
    }

    pub fn random_range<T, R>(&self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.inner.lock().random_range(range)
    }

    /// A uniformly chosen element of `items`, `None` if it is empty.
    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut *self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_generators_agree() {
        let left = SharedRng::new(Some(42));
        let right = SharedRng::new(Some(42));
        let draws_left: Vec<u32> = (0..16).map(|_| left.random_range(1..=512)).collect();
        let draws_right: Vec<u32> = (0..16).map(|_| right.random_range(1..=512)).collect();
        assert_eq!(draws_left, draws_right);
        assert!(draws_left.iter().all(|draw| (1..=512).contains(draw)));
    }

    #[test]
    fn choose_from_empty_is_none() {
        let rng = SharedRng::new(None);
        let empty: [u8; 0] = [];
        assert!(rng.choose(&empty).is_none());
        assert_eq!(rng.choose(&[7]), Some(&7));
    }
}
