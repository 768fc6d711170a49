//! Per-thread stacks of the tasks currently executing on each thread.
//!
//! Every thread that runs tasks (worker or submitting caller) owns one stack.
//! The stack lives in thread-local storage, so it is created on first use and
//! destroyed with its thread; nothing here outlives the thread or needs a
//! lock. It answers two questions when a batch is submitted: how deep the
//! batch is, and which diagnostic label it inherits.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread;

use super::task::TaskId;

thread_local! {
    static CALL_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// A task executing on the current thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Identity of the executing task.
    pub task_id: TaskId,
    /// Label the task was prepared with.
    pub label: Arc<str>,
}

/// Depth and label shared by every task of a batch submitted from the
/// current thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOrigin {
    /// One more than the number of tasks executing on the submitting thread.
    pub depth: usize,
    /// Label of the innermost executing task, or the thread name.
    pub label: Arc<str>,
}

/// Number of tasks currently nested on this thread.
#[must_use]
pub fn depth() -> usize {
    CALL_STACK.with(|stack| stack.borrow().len())
}

/// Label of the innermost task executing on this thread, if any.
#[must_use]
pub fn parent_label() -> Option<Arc<str>> {
    CALL_STACK.with(|stack| stack.borrow().last().map(|frame| Arc::clone(&frame.label)))
}

/// Compute where a batch submitted from this thread sits in the task tree.
#[must_use]
pub fn batch_origin() -> BatchOrigin {
    CALL_STACK.with(|stack| {
        let stack = stack.borrow();
        let label = stack
            .last()
            .map_or_else(current_thread_name, |frame| Arc::clone(&frame.label));
        BatchOrigin {
            depth: stack.len() + 1,
            label,
        }
    })
}

/// Name of the current thread, or its id when it is unnamed.
#[must_use]
pub fn current_thread_name() -> Arc<str> {
    let current = thread::current();
    current
        .name()
        .map_or_else(|| Arc::from(format!("{:?}", current.id())), Arc::from)
}

pub(crate) fn push(frame: Frame) {
    CALL_STACK.with(|stack| stack.borrow_mut().push(frame));
}

pub(crate) fn pop() -> Option<Frame> {
    CALL_STACK.with(|stack| stack.borrow_mut().pop())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u64, label: &str) -> Frame {
        Frame {
            task_id: TaskId::from_raw(id),
            label: Arc::from(label),
        }
    }

    #[test]
    fn test_origin_without_running_task_uses_thread_name() {
        let origin = thread::Builder::new()
            .name("origin-test".into())
            .spawn(batch_origin)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(origin.depth, 1);
        assert_eq!(&*origin.label, "origin-test");
    }

    #[test]
    fn test_origin_inherits_parent_label() {
        thread::spawn(|| {
            push(frame(1, "root"));
            push(frame(2, "root"));
            let origin = batch_origin();
            assert_eq!(origin.depth, 3);
            assert_eq!(&*origin.label, "root");
            assert_eq!(depth(), 2);

            assert_eq!(pop().map(|f| f.task_id), Some(TaskId::from_raw(2)));
            assert_eq!(pop().map(|f| f.task_id), Some(TaskId::from_raw(1)));
            assert_eq!(pop(), None);
            assert_eq!(parent_label(), None);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_stacks_are_per_thread() {
        push(frame(10, "outer"));
        let other_depth = thread::spawn(depth).join().unwrap();
        assert_eq!(other_depth, 0);
        assert_eq!(depth(), 1);
        assert_eq!(pop().map(|f| f.task_id), Some(TaskId::from_raw(10)));
    }

    #[test]
    fn test_unnamed_thread_falls_back_to_id() {
        let (name, id) = thread::Builder::new()
            .spawn(|| (current_thread_name(), format!("{:?}", thread::current().id())))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(&*name, id);
    }
}
