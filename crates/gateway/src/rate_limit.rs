use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Sliding-window attempt counter keyed by an arbitrary string (login email).
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    limit: u32,
    max_keys: usize,
}

impl RateLimiter {
    /// A `limit` of 0 disables limiting.
    pub fn new(window: Duration, limit: u32, max_keys: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            window,
            limit,
            max_keys,
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        if self.limit == 0 {
            return true;
        }

        let now = Instant::now();
        let mut inner = self.lock();

        let queue = inner.entry(key.to_string()).or_default();
        prune_queue(queue, now, self.window);
        if queue.len() >= self.limit as usize {
            return false;
        }
        queue.push_back(now);

        inner.retain(|_, events| {
            prune_queue(events, now, self.window);
            !events.is_empty()
        });

        if inner.len() > self.max_keys {
            let mut overflow = inner.len() - self.max_keys;
            let keys = inner
                .keys()
                .filter(|k| k.as_str() != key)
                .cloned()
                .collect::<Vec<_>>();
            for stale in keys {
                if overflow == 0 {
                    break;
                }
                if inner.remove(&stale).is_some() {
                    overflow -= 1;
                }
            }
        }

        true
    }

    /// Forgets recorded attempts for `key`, e.g. after a successful login.
    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn prune_queue(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = queue.front() {
        if now.duration_since(*front) > window {
            queue.pop_front();
        } else {
            break;
        }
    }
}
