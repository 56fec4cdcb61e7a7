//! Random sub-test sampling for abbreviated sessions.
//!
//! Picks a bounded, shuffled subset of question ids and scales the pass
//! threshold down to the subset size. Runs once before a session starts;
//! the returned ordering is fixed for that session.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// A sampled subset: the session's question ordering plus its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledSubset {
    pub question_ids: Vec<String>,
    pub pass_threshold: u32,
}

/// Sample `count` question ids from `pool` with a uniform shuffle.
///
/// `count` is clamped into `[1, pool len]` and `pass_threshold` into
/// `[1, count]`, so a threshold configured against a larger pool never
/// exceeds the sampled size. Every call reshuffles; the input pool is
/// never mutated.
pub fn sample(pool: &[String], count: usize, pass_threshold: u32) -> SampledSubset {
    if pool.is_empty() {
        return SampledSubset {
            question_ids: Vec::new(),
            pass_threshold: 1,
        };
    }

    let count = count.clamp(1, pool.len());
    let mut ids = pool.to_vec();
    ids.shuffle(&mut rand::rng());
    ids.truncate(count);

    SampledSubset {
        question_ids: ids,
        pass_threshold: pass_threshold.clamp(1, count as u32),
    }
}
