use super::generation::GenerationToken;
use crate::errors::MonitorError;
use portable_atomic::{AtomicBool, Ordering};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What to do when a tick fires while the previous cycle is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Skip the tick; at most one cycle per view is in flight.
    SkipIfBusy,
    /// Start another cycle anyway; whichever settles last wins.
    Allow,
}

impl std::str::FromStr for OverlapPolicy {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "skip-if-busy" => Ok(Self::SkipIfBusy),
            "allow" => Ok(Self::Allow),
            other => Err(MonitorError::Config(format!(
                "OVERLAP_POLICY: expected `skip` or `allow`, got `{other}`"
            ))),
        }
    }
}

/// Result of one poll cycle, tagged with the generation it started under.
#[derive(Debug)]
pub struct Completion<K, T> {
    pub view: K,
    pub generation: u64,
    pub payload: T,
}

struct TaskHandle {
    generation: u64,
    join: JoinHandle<()>,
}

/// Registry of named repeating tasks, one per view.
///
/// Each task fires immediately, then every `period`. Fetches run detached
/// from the timer loop so cancellation never aborts a request mid-flight;
/// their results are dropped instead when the generation has moved on.
pub struct Scheduler<K, T> {
    policy: OverlapPolicy,
    tx: mpsc::Sender<Completion<K, T>>,
    tokens: HashMap<K, GenerationToken>,
    tasks: HashMap<K, TaskHandle>,
}

impl<K, T> Scheduler<K, T>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    T: Send + 'static,
{
    pub fn new(policy: OverlapPolicy, tx: mpsc::Sender<Completion<K, T>>) -> Self {
        Self {
            policy,
            tx,
            tokens: HashMap::new(),
            tasks: HashMap::new(),
        }
    }

    /// Start (or restart) the repeating task for `view`. Any previous task for
    /// the same view is cancelled first. Returns the generation the new task
    /// runs under.
    pub fn schedule<F, Fut>(&mut self, view: K, period: Duration, refresh: F) -> u64
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let token = self.tokens.entry(view).or_default().clone();
        let generation = if self.tasks.contains_key(&view) {
            self.cancel(view);
            token.current()
        } else {
            token.advance()
        };

        let policy = self.policy;
        let tx = self.tx.clone();
        let busy = Arc::new(AtomicBool::new(false));

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                if !token.is_current(generation) {
                    break;
                }

                if policy == OverlapPolicy::SkipIfBusy && busy.swap(true, Ordering::AcqRel) {
                    tracing::debug!(view = ?view, "previous cycle still in flight, skipping tick");
                    continue;
                }

                let fut = refresh();
                let tx = tx.clone();
                let token = token.clone();
                let busy = busy.clone();

                tokio::spawn(async move {
                    let payload = fut.await;
                    busy.store(false, Ordering::Release);

                    if !token.is_current(generation) {
                        tracing::debug!(view = ?view, generation, "discarding stale cycle");
                        return;
                    }

                    if tx
                        .send(Completion {
                            view,
                            generation,
                            payload,
                        })
                        .await
                        .is_err()
                    {
                        tracing::debug!(view = ?view, "completion channel closed");
                    }
                });
            }
        });

        tracing::debug!(view = ?view, generation, period_ms = period.as_millis() as u64, "view scheduled");
        self.tasks.insert(view, TaskHandle { generation, join });
        generation
    }

    /// Stop scheduling `view` and mark its in-flight cycle stale.
    pub fn cancel(&mut self, view: K) -> bool {
        match self.tasks.remove(&view) {
            Some(handle) => {
                if let Some(token) = self.tokens.get(&view) {
                    token.advance();
                }
                handle.join.abort();
                tracing::debug!(view = ?view, generation = handle.generation, "view cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        let views: Vec<K> = self.tasks.keys().copied().collect();
        for view in views {
            self.cancel(view);
        }
    }

    /// Whether a completion may still be committed. Re-checked by the single
    /// writer because a cancel can land between send and apply.
    pub fn is_current(&self, completion: &Completion<K, T>) -> bool {
        self.tasks
            .get(&completion.view)
            .is_some_and(|h| h.generation == completion.generation)
            && self
                .tokens
                .get(&completion.view)
                .is_some_and(|t| t.is_current(completion.generation))
    }

    pub fn active_views(&self) -> Vec<K> {
        self.tasks.keys().copied().collect()
    }
}

impl<K, T> Drop for Scheduler<K, T> {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.join.abort();
        }
        for token in self.tokens.values() {
            token.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_atomic::AtomicUsize;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    const LONG: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_fires_immediately() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler: Scheduler<&'static str, u32> = Scheduler::new(OverlapPolicy::SkipIfBusy, tx);
        let gen = scheduler.schedule("summary", LONG, || async { 7 });

        let done = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(done.view, "summary");
        assert_eq!(done.payload, 7);
        assert_eq!(done.generation, gen);
        assert!(scheduler.is_current(&done));
    }

    #[tokio::test]
    async fn test_cancel_discards_in_flight() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler: Scheduler<&'static str, u32> = Scheduler::new(OverlapPolicy::SkipIfBusy, tx);
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, mut started_rx) = mpsc::channel::<()>(8);

        let g = gate.clone();
        scheduler.schedule("trades", LONG, move || {
            let g = g.clone();
            let started = started_tx.clone();
            async move {
                let _ = started.send(()).await;
                let _permit = g.acquire().await;
                1
            }
        });

        timeout(Duration::from_secs(1), started_rx.recv()).await.unwrap();
        assert!(scheduler.cancel("trades"));
        gate.add_permits(1);

        assert!(timeout(Duration::from_millis(150), rx.recv()).await.is_err());
        assert!(scheduler.active_views().is_empty());
    }

    #[tokio::test]
    async fn test_reschedule_slow_stale_fast_wins() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler: Scheduler<&'static str, &'static str> =
            Scheduler::new(OverlapPolicy::Allow, tx);
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, mut started_rx) = mpsc::channel::<()>(8);

        let g = gate.clone();
        let old_gen = scheduler.schedule("positions", LONG, move || {
            let g = g.clone();
            let started = started_tx.clone();
            async move {
                let _ = started.send(()).await;
                let _permit = g.acquire().await;
                "old platform"
            }
        });
        timeout(Duration::from_secs(1), started_rx.recv()).await.unwrap();

        // platform switch: same view, new dependency
        let new_gen = scheduler.schedule("positions", LONG, || async { "new platform" });
        assert!(new_gen > old_gen);

        let done = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(done.payload, "new platform");
        assert!(scheduler.is_current(&done));

        // the slow response settles afterwards and must never show up
        gate.add_permits(1);
        assert!(timeout(Duration::from_millis(150), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_skip_if_busy_keeps_one_in_flight() {
        let (tx, _rx) = mpsc::channel(8);
        let mut scheduler: Scheduler<&'static str, ()> = Scheduler::new(OverlapPolicy::SkipIfBusy, tx);
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let (c, g) = (calls.clone(), gate.clone());
        scheduler.schedule("logs", Duration::from_millis(10), move || {
            let (c, g) = (c.clone(), g.clone());
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                let _permit = g.acquire().await;
            }
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        scheduler.cancel_all();
    }

    #[tokio::test]
    async fn test_allow_overlaps() {
        let (tx, _rx) = mpsc::channel(8);
        let mut scheduler: Scheduler<&'static str, ()> = Scheduler::new(OverlapPolicy::Allow, tx);
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let (c, g) = (calls.clone(), gate.clone());
        scheduler.schedule("logs", Duration::from_millis(10), move || {
            let (c, g) = (c.clone(), g.clone());
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                let _permit = g.acquire().await;
            }
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(calls.load(Ordering::SeqCst) > 1);
        scheduler.cancel_all();
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("skip".parse::<OverlapPolicy>().unwrap(), OverlapPolicy::SkipIfBusy);
        assert_eq!("Allow".parse::<OverlapPolicy>().unwrap(), OverlapPolicy::Allow);
        assert!("sometimes".parse::<OverlapPolicy>().is_err());
    }
}
