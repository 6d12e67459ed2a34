//! Key and value sampling from a bounded namespace.

use rand::Rng;
use rand::rngs::SmallRng;

/// Samples keys and values uniformly from the bounded namespace `[1, size]`.
///
/// Repeated keys are expected and intentional: a small keyspace concentrates
/// the generated traffic on the same slots and produces contention on the
/// service under test.
#[derive(Debug, Clone, Copy)]
pub struct Keyspace {
    size: u32,
}

impl Keyspace {
    /// Creates a keyspace covering `[1, size]`.
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Renders the fixed key of slot `n`, as used by the warm-up pass.
    pub fn key_for(n: u32) -> String {
        format!("key{n}")
    }

    /// Draws a uniformly random key.
    pub fn pick_key(&self, rng: &mut SmallRng) -> String {
        Self::key_for(rng.random_range(1..=self.size))
    }

    /// Draws a uniformly random value, independent of any key.
    pub fn pick_value(&self, rng: &mut SmallRng) -> String {
        format!("value{}", rng.random_range(1..=self.size))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn keys_stay_in_bounds() {
        let keyspace = Keyspace::new(10);
        let mut rng = SmallRng::seed_from_u64(1);

        for _ in 0..1000 {
            let key = keyspace.pick_key(&mut rng);
            let n: u32 = key.strip_prefix("key").unwrap().parse().unwrap();
            assert!((1..=10).contains(&n));
        }
    }

    #[test]
    fn values_share_the_bound() {
        let keyspace = Keyspace::new(3);
        let mut rng = SmallRng::seed_from_u64(2);

        for _ in 0..100 {
            let value = keyspace.pick_value(&mut rng);
            let n: u32 = value.strip_prefix("value").unwrap().parse().unwrap();
            assert!((1..=3).contains(&n));
        }
    }

    #[test]
    fn singleton_keyspace_always_yields_slot_one() {
        let keyspace = Keyspace::new(1);
        let mut rng = SmallRng::seed_from_u64(3);

        assert_eq!(keyspace.pick_key(&mut rng), "key1");
        assert_eq!(keyspace.pick_value(&mut rng), "value1");
        assert_eq!(Keyspace::key_for(7), "key7");
    }
}
