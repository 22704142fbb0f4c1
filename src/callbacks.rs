//! Paired do/undo callback lists and the one shared commit primitive:
//! apply in order, remember how many succeeded, on failure undo exactly
//! those in reverse.

use crate::error::ArborError;
use crate::value::{Key, Value};
use serde_json::Value as Json;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Scalar change hooks: `action(old, new)` may veto or fail; `revert` must
/// not.
pub type ChangeAction = Box<dyn FnMut(&Value, &Value) -> Result<bool, ArborError> + Send>;
pub type ChangeRevert = Box<dyn FnMut(&Value, &Value) + Send>;

/// Whole-record hooks take no arguments.
pub type RecordAction = Box<dyn FnMut() -> Result<bool, ArborError> + Send>;
pub type RecordRevert = Box<dyn FnMut() + Send>;

/// Container insert/erase hooks receive the element key and a serialized
/// snapshot of the element.
pub type EntryAction = Box<dyn FnMut(&Key, &Json) -> Result<bool, ArborError> + Send>;
pub type EntryRevert = Box<dyn FnMut(&Key, &Json) + Send>;

pub struct Hook<A, R> {
    pub action: A,
    pub revert: R,
}

pub type ChangeHook = Hook<ChangeAction, ChangeRevert>;
pub type RecordHook = Hook<RecordAction, RecordRevert>;
pub type EntryHook = Hook<EntryAction, EntryRevert>;

/// Applies `apply` over `pairs` in order. On a veto (`Ok(false)`) or an
/// error, runs `revert` over the successful prefix in reverse and returns
/// the offending outcome. A reverting closure that panics aborts the
/// process: the graph would otherwise be left half-unwound.
pub(crate) fn run_pairs<T>(
    pairs: &mut [T],
    mut apply: impl FnMut(&mut T) -> Result<bool, ArborError>,
    mut revert: impl FnMut(&mut T),
) -> Result<bool, ArborError> {
    let mut done = 0;
    let mut outcome = Ok(true);
    for i in 0..pairs.len() {
        match apply(&mut pairs[i]) {
            Ok(true) => done = i + 1,
            other => {
                outcome = other;
                break;
            }
        }
    }
    if matches!(outcome, Ok(true)) {
        return outcome;
    }
    for i in (0..done).rev() {
        guard_revert(|| revert(&mut pairs[i]));
    }
    outcome
}

/// Runs `revert` over all of `pairs` in reverse, aborting on panic.
pub(crate) fn revert_pairs<T>(pairs: &mut [T], mut revert: impl FnMut(&mut T)) {
    for i in (0..pairs.len()).rev() {
        guard_revert(|| revert(&mut pairs[i]));
    }
}

/// An undo callback may never fail; a panic here means the in-memory state
/// can no longer be restored.
pub(crate) fn guard_revert(f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!("undo callback panicked during rollback; aborting");
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::run_pairs;
    use crate::error::ArborError;

    #[test]
    fn all_applied_in_order() {
        let mut log = Vec::new();
        let mut pairs = vec![1, 2, 3];
        let r = run_pairs(
            &mut pairs,
            |n| {
                log.push(*n);
                Ok(true)
            },
            |_| unreachable!("no unwind on success"),
        );
        assert!(matches!(r, Ok(true)));
        assert_eq!(log, [1, 2, 3]);
    }

    #[test]
    fn veto_unwinds_prefix_in_reverse() {
        let mut log = Vec::new();
        let mut pairs = vec![1, 2, 3];
        let r = {
            let log = std::cell::RefCell::new(&mut log);
            run_pairs(
                &mut pairs,
                |n| {
                    log.borrow_mut().push(("do", *n));
                    Ok(*n != 3)
                },
                |n| log.borrow_mut().push(("undo", *n)),
            )
        };
        assert!(matches!(r, Ok(false)));
        assert_eq!(
            log,
            [("do", 1), ("do", 2), ("do", 3), ("undo", 2), ("undo", 1)]
        );
    }

    #[test]
    fn error_unwinds_and_propagates() {
        let mut undone = Vec::new();
        let mut pairs = vec![1, 2];
        let r = {
            let undone = std::cell::RefCell::new(&mut undone);
            run_pairs(
                &mut pairs,
                |n| {
                    if *n == 2 {
                        Err(ArborError::Validation("boom".into()))
                    } else {
                        Ok(true)
                    }
                },
                |n| undone.borrow_mut().push(*n),
            )
        };
        assert!(r.is_err());
        assert_eq!(undone, [1]);
    }
}
