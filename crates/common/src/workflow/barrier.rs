//! Join barrier for the results of one planning round
//!
//! Results arrive in completion order. The barrier holds them in plan-order
//! slots and releases the full set exactly once, when the last slot is filled.

use crate::errors::{AppError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

struct RoundSlots<T> {
    slots: Vec<Option<T>>,
    filled: usize,
}

pub struct JoinBarrier<T> {
    rounds: Mutex<HashMap<usize, RoundSlots<T>>>,
}

impl<T> Default for JoinBarrier<T> {
    fn default() -> Self {
        Self {
            rounds: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> JoinBarrier<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<usize, RoundSlots<T>>>> {
        self.rounds.lock().map_err(|_| AppError::Internal {
            message: "Join barrier lock poisoned".to_string(),
        })
    }

    /// Start collecting `expected` results for `round`
    pub fn open(&self, round: usize, expected: usize) -> Result<()> {
        let mut rounds = self.lock()?;
        if rounds.contains_key(&round) {
            return Err(AppError::Internal {
                message: format!("Round {} is already open", round),
            });
        }

        rounds.insert(
            round,
            RoundSlots {
                slots: (0..expected).map(|_| None).collect(),
                filled: 0,
            },
        );
        Ok(())
    }

    /// Record the result for plan item `index` of `round`.
    ///
    /// Returns the ordered results once all of them are present, `None` otherwise.
    pub fn collect(&self, round: usize, index: usize, value: T) -> Result<Option<Vec<T>>> {
        let mut rounds = self.lock()?;

        let entry = rounds.get_mut(&round).ok_or_else(|| AppError::Internal {
            message: format!("Result for round {} which is not open", round),
        })?;

        let slot = entry.slots.get_mut(index).ok_or_else(|| AppError::Internal {
            message: format!("Result index {} out of range for round {}", index, round),
        })?;

        if slot.is_some() {
            return Err(AppError::Internal {
                message: format!("Duplicate result for item {} of round {}", index, round),
            });
        }

        *slot = Some(value);
        entry.filled += 1;

        if entry.filled < entry.slots.len() {
            return Ok(None);
        }

        let complete = rounds.remove(&round).map(|r| r.slots.into_iter().flatten().collect());
        Ok(complete)
    }

    /// Drop any partial results for `round`
    pub fn close(&self, round: usize) -> Result<()> {
        self.lock()?.remove(&round);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_releases_in_plan_order_after_last_result() {
        let barrier = JoinBarrier::new();
        barrier.open(1, 3).unwrap();

        assert_eq!(barrier.collect(1, 2, "c").unwrap(), None);
        assert_eq!(barrier.collect(1, 0, "a").unwrap(), None);
        assert_eq!(barrier.collect(1, 1, "b").unwrap(), Some(vec!["a", "b", "c"]));
    }

    #[test]
    fn test_n_minus_one_results_yield_nothing() {
        let barrier = JoinBarrier::new();
        barrier.open(1, 2).unwrap();
        assert_eq!(barrier.collect(1, 0, 10).unwrap(), None);
    }

    #[test]
    fn test_round_is_released_once() {
        let barrier = JoinBarrier::new();
        barrier.open(1, 1).unwrap();
        assert_eq!(barrier.collect(1, 0, 1).unwrap(), Some(vec![1]));
        assert!(barrier.collect(1, 0, 1).is_err());
    }

    #[test]
    fn test_other_round_results_are_rejected() {
        let barrier = JoinBarrier::new();
        barrier.open(2, 2).unwrap();
        assert!(barrier.collect(1, 0, "stale").is_err());
        assert_eq!(barrier.collect(2, 0, "fresh").unwrap(), None);
    }

    #[test]
    fn test_duplicate_and_out_of_range_indices_are_rejected() {
        let barrier = JoinBarrier::new();
        barrier.open(1, 2).unwrap();
        barrier.collect(1, 0, 'x').unwrap();
        assert!(barrier.collect(1, 0, 'y').is_err());
        assert!(barrier.collect(1, 5, 'z').is_err());
    }

    #[test]
    fn test_close_discards_partial_round() {
        let barrier = JoinBarrier::new();
        barrier.open(1, 2).unwrap();
        barrier.collect(1, 0, ()).unwrap();
        barrier.close(1).unwrap();
        assert!(barrier.collect(1, 1, ()).is_err());
        barrier.open(1, 1).unwrap();
    }
}
