use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

const MIN_REPEAT_INTERVAL: Duration = Duration::from_micros(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone)]
struct TimerEntry<T> {
    handle: TimerHandle,
    task: T,
    repeat: Option<Duration>,
}

/// Cooperative timer queue for a single-threaded game loop.
///
/// Tasks are plain values; the owner drains the due ones every tick and
/// dispatches them itself. A task scheduled while the owner is dispatching
/// never fires in the same tick, even with a zero delay.
#[derive(Debug)]
pub struct Scheduler<T> {
    now: Duration,
    tick: u64,
    next_sequence: u64,
    next_handle: u64,
    queue: BTreeMap<(Duration, u64), TimerEntry<T>>,
    keys_by_handle: HashMap<TimerHandle, (Duration, u64)>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            tick: 0,
            next_sequence: 0,
            next_handle: 0,
            queue: BTreeMap::new(),
            keys_by_handle: HashMap::new(),
        }
    }
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn schedule_once(&mut self, delay: Duration, task: T) -> TimerHandle {
        let handle = self.alloc_handle();
        self.insert(self.now + delay, TimerEntry {
            handle,
            task,
            repeat: None,
        });
        handle
    }

    /// Runs on the next drained tick, after the current one has finished.
    pub fn schedule_next_tick(&mut self, task: T) -> TimerHandle {
        self.schedule_once(Duration::ZERO, task)
    }

    pub fn schedule_repeating(&mut self, interval: Duration, task: T) -> TimerHandle {
        let interval = interval.max(MIN_REPEAT_INTERVAL);
        let handle = self.alloc_handle();
        self.insert(self.now + interval, TimerEntry {
            handle,
            task,
            repeat: Some(interval),
        });
        handle
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.keys_by_handle.remove(&handle) {
            Some(key) => self.queue.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.keys_by_handle.contains_key(&handle)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.keys_by_handle.clear();
    }

    /// Moves the clock forward and returns every task that became due, in
    /// due-time order (ties keep scheduling order). Repeating timers fire at
    /// most once per call.
    pub fn advance(&mut self, dt: Duration) -> Vec<T> {
        self.now += dt;
        self.tick = self.tick.saturating_add(1);

        let due_keys: Vec<(Duration, u64)> = self
            .queue
            .range(..=(self.now, u64::MAX))
            .map(|(key, _)| *key)
            .collect();

        let mut due = Vec::with_capacity(due_keys.len());
        for key in due_keys {
            let Some(entry) = self.queue.remove(&key) else {
                continue;
            };
            self.keys_by_handle.remove(&entry.handle);
            due.push(entry.task.clone());
            if let Some(interval) = entry.repeat {
                self.insert(key.0 + interval, entry);
            }
        }
        due
    }

    fn alloc_handle(&mut self) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        handle
    }

    fn insert(&mut self, due: Duration, entry: TimerEntry<T>) {
        let key = (due, self.next_sequence);
        self.next_sequence = self.next_sequence.saturating_add(1);
        self.keys_by_handle.insert(entry.handle, key);
        self.queue.insert(key, entry);
    }
}
