//! Shared queue of ready tasks, kept sorted by depth.

use parking_lot::Mutex;

/// Ready entries ordered by non-decreasing depth from front to back.
///
/// Removal always takes the back entry, i.e. one of the deepest ready tasks.
/// Draining deep work first keeps the number of half-expanded subtrees small.
/// Ordering among entries of equal depth is not part of the contract.
///
/// The queue has its own lock, distinct from every other lock of the
/// executor, so queue traffic never contends with pool bookkeeping.
#[derive(Debug)]
pub struct RunQueue<T> {
    entries: Mutex<Vec<(usize, T)>>,
}

impl<T> Default for RunQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RunQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(1024)),
        }
    }

    /// Insert a whole batch scheduled at `depth`.
    ///
    /// The batch lands right after the last entry whose depth is not greater
    /// than `depth`, scanning from the back, so the depth order holds.
    pub fn insert<I>(&self, depth: usize, batch: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut entries = self.entries.lock();
        let at = entries
            .iter()
            .rposition(|(queued, _)| *queued <= depth)
            .map_or(0, |idx| idx + 1);
        entries.splice(at..at, batch.into_iter().map(|item| (depth, item)));
    }

    /// Remove one of the deepest ready entries.
    pub fn pop_deepest(&self) -> Option<T> {
        self.entries.lock().pop().map(|(_, item)| item)
    }

    /// Number of ready entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entry is ready.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[cfg(test)]
    fn depths(&self) -> Vec<usize> {
        self.entries.lock().iter().map(|(depth, _)| *depth).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_on_empty_queue() {
        let queue = RunQueue::<u32>::new();
        assert!(queue.is_empty());
        assert_eq!(queue.pop_deepest(), None);
    }

    #[test]
    fn test_deepest_entries_pop_first() {
        let queue = RunQueue::new();
        queue.insert(1, ["a1", "a2"]);
        queue.insert(3, ["c1"]);
        queue.insert(2, ["b1", "b2"]);

        assert_eq!(queue.depths(), vec![1, 1, 2, 2, 3]);
        assert_eq!(queue.len(), 5);

        assert_eq!(queue.pop_deepest(), Some("c1"));
        let next_two = [queue.pop_deepest().unwrap(), queue.pop_deepest().unwrap()];
        assert!(next_two.iter().all(|t| t.starts_with('b')));
        let last_two = [queue.pop_deepest().unwrap(), queue.pop_deepest().unwrap()];
        assert!(last_two.iter().all(|t| t.starts_with('a')));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shallow_insert_goes_to_front() {
        let queue = RunQueue::new();
        queue.insert(4, [40]);
        queue.insert(2, [20, 21]);
        queue.insert(1, [10]);
        assert_eq!(queue.depths(), vec![1, 2, 2, 4]);
    }

    #[test]
    fn test_equal_depth_batches_stay_adjacent() {
        let queue = RunQueue::new();
        queue.insert(2, [1, 2]);
        queue.insert(3, [9]);
        queue.insert(2, [3, 4]);
        assert_eq!(queue.depths(), vec![2, 2, 2, 2, 3]);
        assert_eq!(queue.pop_deepest(), Some(9));
        let mut rest: Vec<_> = std::iter::from_fn(|| queue.pop_deepest()).collect();
        rest.sort_unstable();
        assert_eq!(rest, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let queue = RunQueue::<u8>::new();
        queue.insert(5, []);
        assert!(queue.is_empty());
    }
}
