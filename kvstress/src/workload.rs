//! The weighted operation mix driving each worker iteration.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use rand::rngs::SmallRng;
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;

use crate::config::Config;
use crate::keyspace::Keyspace;

/// One of the three request kinds issued against the key-value service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpKind {
    /// `POST /set`
    Set,
    /// `GET /get/{key}`
    Get,
    /// `DELETE /delete/{key}`
    Delete,
}

impl OpKind {
    /// All kinds, in reporting order.
    pub const ALL: [OpKind; 3] = [OpKind::Set, OpKind::Get, OpKind::Delete];
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Set => "SET",
            OpKind::Get => "GET",
            OpKind::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A fully-formed request descriptor for a single iteration.
#[derive(Debug, Clone)]
pub enum Action {
    /// Store `value` under `key`.
    Set {
        /// Key to write.
        key: String,
        /// Value to store.
        value: String,
    },
    /// Look up `key`.
    Get {
        /// Key to read.
        key: String,
    },
    /// Remove `key`.
    Delete {
        /// Key to remove.
        key: String,
    },
}

impl Action {
    /// The kind of this action.
    pub fn kind(&self) -> OpKind {
        match self {
            Action::Set { .. } => OpKind::Set,
            Action::Get { .. } => OpKind::Get,
            Action::Delete { .. } => OpKind::Delete,
        }
    }

    /// The key this action addresses.
    pub fn key(&self) -> &str {
        match self {
            Action::Set { key, .. } | Action::Get { key } | Action::Delete { key } => key,
        }
    }
}

/// The per-worker operation mix: weighted kind selection, key and value
/// sampling, and think-time jitter.
///
/// The workload holds no RNG of its own; every worker samples through its
/// private [`SmallRng`] so selection never takes a lock and runs are
/// reproducible under a fixed seed.
#[derive(Debug, Clone)]
pub struct Workload {
    keyspace: Keyspace,
    action_distribution: WeightedIndex<u32>,
    jitter_min: Duration,
    jitter_max: Duration,
}

impl Workload {
    /// Builds the mix from a configuration.
    ///
    /// Fails when every operation weight is zero. Weights are relative and
    /// normalized by the distribution itself.
    pub fn from_config(config: &Config) -> Result<Self> {
        let weights = &config.weights;
        let action_distribution = WeightedIndex::new([weights.set, weights.get, weights.delete])
            .context("operation weights need at least one positive entry")?;

        Ok(Self {
            keyspace: Keyspace::new(config.keyspace_size),
            action_distribution,
            jitter_min: config.jitter.min,
            jitter_max: config.jitter.max,
        })
    }

    /// Samples the next request descriptor.
    pub fn next_action(&self, rng: &mut SmallRng) -> Action {
        match self.action_distribution.sample(rng) {
            0 => Action::Set {
                key: self.keyspace.pick_key(rng),
                value: self.keyspace.pick_value(rng),
            },
            1 => Action::Get {
                key: self.keyspace.pick_key(rng),
            },
            _ => Action::Delete {
                key: self.keyspace.pick_key(rng),
            },
        }
    }

    /// Samples a think-time delay from the inclusive jitter range.
    pub fn jitter(&self, rng: &mut SmallRng) -> Duration {
        let min = self.jitter_min.as_micros() as u64;
        let max = self.jitter_max.as_micros() as u64;
        Duration::from_micros(rng.random_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use crate::config::{Jitter, Weights};

    use super::*;

    fn config_with_weights(set: u32, get: u32, delete: u32) -> Config {
        Config {
            weights: Weights { set, get, delete },
            keyspace_size: 10,
            ..Config::default()
        }
    }

    #[test]
    fn weighted_selection_converges() {
        let workload = Workload::from_config(&config_with_weights(1, 1, 2)).unwrap();
        let mut rng = SmallRng::seed_from_u64(99);

        let mut counts = [0u32; 3];
        for _ in 0..8000 {
            match workload.next_action(&mut rng).kind() {
                OpKind::Set => counts[0] += 1,
                OpKind::Get => counts[1] += 1,
                OpKind::Delete => counts[2] += 1,
            }
        }

        // expectations are 2000/2000/4000, with generous sampling tolerance
        assert!((1650..=2350).contains(&counts[0]), "SET drew {}", counts[0]);
        assert!((1650..=2350).contains(&counts[1]), "GET drew {}", counts[1]);
        assert!((3650..=4350).contains(&counts[2]), "DELETE drew {}", counts[2]);
    }

    #[test]
    fn single_positive_weight_pins_the_mix() {
        let workload = Workload::from_config(&config_with_weights(1, 0, 0)).unwrap();
        let mut rng = SmallRng::seed_from_u64(5);

        for _ in 0..200 {
            let action = workload.next_action(&mut rng);
            assert_eq!(action.kind(), OpKind::Set);
            assert!(action.key().starts_with("key"));
        }
    }

    #[test]
    fn all_zero_weights_are_rejected() {
        assert!(Workload::from_config(&config_with_weights(0, 0, 0)).is_err());
    }

    #[test]
    fn jitter_stays_within_inclusive_bounds() {
        let config = Config {
            jitter: Jitter {
                min: Duration::from_millis(2),
                max: Duration::from_millis(5),
            },
            ..Config::default()
        };
        let workload = Workload::from_config(&config).unwrap();
        let mut rng = SmallRng::seed_from_u64(4);

        for _ in 0..500 {
            let think = workload.jitter(&mut rng);
            assert!(think >= Duration::from_millis(2));
            assert!(think <= Duration::from_millis(5));
        }
    }

    #[test]
    fn degenerate_jitter_range_is_fixed() {
        let config = Config {
            jitter: Jitter {
                min: Duration::from_millis(3),
                max: Duration::from_millis(3),
            },
            ..Config::default()
        };
        let workload = Workload::from_config(&config).unwrap();
        let mut rng = SmallRng::seed_from_u64(6);

        for _ in 0..50 {
            assert_eq!(workload.jitter(&mut rng), Duration::from_millis(3));
        }
    }
}
