// SPDX-License-Identifier: CEPL-1.0
//! Undo list for multi-step object creation.

/// Runs the registered undo steps, newest first, when dropped. A creator
/// pushes one step per object it made and calls [`Rollback::commit`] once
/// the whole group is handed out; any early return unwinds what exists.
#[derive(Default)]
pub struct Rollback<'a> {
    undo: Vec<Box<dyn FnOnce() + 'a>>,
}

impl<'a> Rollback<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: impl FnOnce() + 'a) {
        self.undo.push(Box::new(step));
    }

    pub fn commit(mut self) {
        self.undo.clear();
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        while let Some(step) = self.undo.pop() {
            step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn create(log: &RefCell<Vec<&'static str>>, fail_at: Option<usize>) -> Result<(), usize> {
        let mut rollback = Rollback::new();
        for (i, name) in ["instance", "surface", "device"].into_iter().enumerate() {
            if fail_at == Some(i) {
                return Err(i);
            }
            log.borrow_mut().push(name);
            rollback.push(move || log.borrow_mut().push(name));
        }
        rollback.commit();
        Ok(())
    }

    #[test]
    fn failure_unwinds_created_objects_newest_first() {
        let log = RefCell::new(Vec::new());
        assert_eq!(create(&log, Some(2)), Err(2));
        assert_eq!(
            *log.borrow(),
            vec!["instance", "surface", "surface", "instance"]
        );
    }

    #[test]
    fn failure_on_first_step_undoes_nothing() {
        let log = RefCell::new(Vec::new());
        assert_eq!(create(&log, Some(0)), Err(0));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn commit_keeps_everything() {
        let log = RefCell::new(Vec::new());
        assert_eq!(create(&log, None), Ok(()));
        assert_eq!(*log.borrow(), vec!["instance", "surface", "device"]);
    }
}
