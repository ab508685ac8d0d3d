//! Per-job fan-out of progress events.
//!
//! Each observer gets its own bounded queue. Publishing never blocks: an
//! observer whose queue is full (or whose receiver is gone) is evicted and
//! sees its stream end, while every other observer is unaffected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use extracta_core::{ProgressEvent, Result};

type SubscriberMap = HashMap<Uuid, HashMap<u64, mpsc::Sender<ProgressEvent>>>;

#[derive(Debug)]
struct Inner {
    subscribers: Mutex<SubscriberMap>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SubscriberMap> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, job_id: Uuid, subscriber_id: u64) -> bool {
        let mut subscribers = self.lock();
        let Some(observers) = subscribers.get_mut(&job_id) else {
            return false;
        };
        let removed = observers.remove(&subscriber_id).is_some();
        if observers.is_empty() {
            subscribers.remove(&job_id);
        }
        removed
    }
}

/// Multicasts [`ProgressEvent`]s to the observers of each job.
#[derive(Debug, Clone)]
pub struct ProgressBroadcaster {
    inner: Arc<Inner>,
}

impl ProgressBroadcaster {
    /// Create a broadcaster whose per-observer queues hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register an observer of `job_id` whose first event is `snapshot()`.
    ///
    /// `snapshot` runs while the broadcaster lock is held, so no publish can
    /// slip in between reading the snapshot and registering the observer.
    /// If it fails, nothing is registered.
    pub fn subscribe_with<F>(&self, job_id: Uuid, snapshot: F) -> Result<Subscription>
    where
        F: FnOnce() -> Result<ProgressEvent>,
    {
        let mut subscribers = self.inner.lock();
        let first = snapshot()?;

        let (tx, rx) = mpsc::channel(self.inner.capacity);
        // Fresh queue with capacity >= 1; cannot be full.
        let _ = tx.try_send(first);

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        subscribers.entry(job_id).or_default().insert(id, tx);
        debug!(%job_id, subscriber_id = id, "Observer subscribed");

        Ok(Subscription {
            id,
            job_id,
            rx,
            owner: Arc::downgrade(&self.inner),
        })
    }

    /// Deliver `event` to every observer of `job_id` without waiting.
    ///
    /// Returns the number of observers the event was queued for.
    pub fn publish(&self, job_id: Uuid, event: &ProgressEvent) -> usize {
        deliver(&mut self.inner.lock(), job_id, event)
    }

    /// Apply a state change and publish the event it yields as one step.
    ///
    /// `update` runs while the broadcaster lock is held, so events reach
    /// observers in the order their state changes were recorded. No event is
    /// published when `update` fails or yields `None`.
    pub fn publish_with<T, F>(&self, job_id: Uuid, update: F) -> Result<T>
    where
        F: FnOnce() -> Result<(T, Option<ProgressEvent>)>,
    {
        let mut subscribers = self.inner.lock();
        let (value, event) = update()?;
        if let Some(event) = event {
            deliver(&mut subscribers, job_id, &event);
        }
        Ok(value)
    }

    /// Drop every observer of `job_id`, ending their streams.
    ///
    /// Returns the number of observers removed.
    pub fn close(&self, job_id: Uuid) -> usize {
        let removed = self.inner.lock().remove(&job_id).map_or(0, |o| o.len());
        if removed > 0 {
            debug!(%job_id, observers = removed, "Closed observer streams");
        }
        removed
    }

    /// Remove an observer. Returns whether it was still registered.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.inner.remove(subscription.job_id, subscription.id)
    }

    /// Number of live observers of `job_id`.
    pub fn subscriber_count(&self, job_id: Uuid) -> usize {
        self.inner.lock().get(&job_id).map_or(0, HashMap::len)
    }
}

fn deliver(subscribers: &mut SubscriberMap, job_id: Uuid, event: &ProgressEvent) -> usize {
    let Some(observers) = subscribers.get_mut(&job_id) else {
        return 0;
    };

    let mut delivered = 0;
    observers.retain(|subscriber_id, tx| match tx.try_send(event.clone()) {
        Ok(()) => {
            delivered += 1;
            true
        }
        Err(TrySendError::Full(_)) => {
            debug!(%job_id, subscriber_id, "Evicting slow observer");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    });

    if observers.is_empty() {
        subscribers.remove(&job_id);
    }
    delivered
}

/// Handle to one observer's event stream. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    job_id: Uuid,
    rx: mpsc::Receiver<ProgressEvent>,
    owner: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Next event, or `None` once the observer has been evicted or removed.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            inner.remove(self.job_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extracta_core::{Error, Stage, StageStatus};

    fn event(job_id: Uuid, progress: u8) -> ProgressEvent {
        ProgressEvent {
            id: job_id,
            stage: Stage::Extraction,
            status: StageStatus::Processing,
            progress,
            message: None,
            error: None,
            download_url: None,
            transcript_txt_url: None,
            transcript_srt_url: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_delivered_first() {
        let broadcaster = ProgressBroadcaster::new(8);
        let job_id = Uuid::new_v4();

        let mut sub = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 10)))
            .unwrap();
        broadcaster.publish(job_id, &event(job_id, 20));

        assert_eq!(sub.recv().await.unwrap().progress, 10);
        assert_eq!(sub.recv().await.unwrap().progress, 20);
    }

    #[tokio::test]
    async fn test_failed_snapshot_registers_nothing() {
        let broadcaster = ProgressBroadcaster::new(8);
        let job_id = Uuid::new_v4();

        let result = broadcaster.subscribe_with(job_id, || Err(Error::NotFound("job".into())));
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(broadcaster.subscriber_count(job_id), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_all_observers() {
        let broadcaster = ProgressBroadcaster::new(8);
        let job_id = Uuid::new_v4();
        let mut a = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 1)))
            .unwrap();
        let mut b = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 1)))
            .unwrap();

        assert_eq!(broadcaster.publish(job_id, &event(job_id, 50)), 2);
        a.recv().await.unwrap();
        b.recv().await.unwrap();
        assert_eq!(a.recv().await.unwrap().progress, 50);
        assert_eq!(b.recv().await.unwrap().progress, 50);
    }

    #[tokio::test]
    async fn test_events_are_scoped_to_job() {
        let broadcaster = ProgressBroadcaster::new(8);
        let job_a = Uuid::new_v4();
        let job_b = Uuid::new_v4();
        let mut sub = broadcaster
            .subscribe_with(job_a, || Ok(event(job_a, 1)))
            .unwrap();

        assert_eq!(broadcaster.publish(job_b, &event(job_b, 99)), 0);
        sub.recv().await.unwrap();
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_slow_observer_is_evicted_others_unaffected() {
        let broadcaster = ProgressBroadcaster::new(2);
        let job_id = Uuid::new_v4();
        let mut slow = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 1)))
            .unwrap();
        let mut fast = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 1)))
            .unwrap();

        for progress in 2..=4 {
            assert!(fast.recv().await.is_some());
            broadcaster.publish(job_id, &event(job_id, progress));
        }

        assert_eq!(broadcaster.subscriber_count(job_id), 1);
        assert_eq!(fast.recv().await.unwrap().progress, 4);

        // The evicted observer drains what was queued, then its stream ends.
        assert_eq!(slow.recv().await.unwrap().progress, 1);
        assert_eq!(slow.recv().await.unwrap().progress, 2);
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let broadcaster = ProgressBroadcaster::new(4);
        let job_id = Uuid::new_v4();
        let sub = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 1)))
            .unwrap();
        assert_eq!(broadcaster.subscriber_count(job_id), 1);

        drop(sub);
        assert_eq!(broadcaster.subscriber_count(job_id), 0);
        assert_eq!(broadcaster.publish(job_id, &event(job_id, 5)), 0);
    }

    #[tokio::test]
    async fn test_publish_with_delivers_only_committed_updates() {
        let broadcaster = ProgressBroadcaster::new(8);
        let job_id = Uuid::new_v4();
        let mut sub = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 1)))
            .unwrap();
        sub.recv().await.unwrap();

        let value = broadcaster
            .publish_with(job_id, || Ok((7, Some(event(job_id, 30)))))
            .unwrap();
        assert_eq!(value, 7);
        broadcaster.publish_with(job_id, || Ok(((), None))).unwrap();
        let failed: Result<()> =
            broadcaster.publish_with(job_id, || Err(Error::Conflict("stage busy".into())));
        assert!(matches!(failed, Err(Error::Conflict(_))));

        assert_eq!(sub.recv().await.unwrap().progress, 30);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_publish_with_serializes_against_subscribe() {
        let broadcaster = ProgressBroadcaster::new(64);
        let job_id = Uuid::new_v4();
        let state = Arc::new(Mutex::new(0u8));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let broadcaster = broadcaster.clone();
            let state = state.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    broadcaster
                        .publish_with(job_id, || {
                            let mut progress = state.lock().unwrap();
                            *progress += 1;
                            Ok(((), Some(event(job_id, *progress))))
                        })
                        .unwrap();
                }
            }));
        }

        let snapshot_state = state.clone();
        let mut sub = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, *snapshot_state.lock().unwrap())))
            .unwrap();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = Vec::new();
        while let Some(event) = sub.try_recv() {
            seen.push(event.progress);
        }
        assert!(seen.windows(2).all(|w| w[1] == w[0] + 1), "out of order: {seen:?}");
        assert_eq!(*seen.last().unwrap(), 40);
    }

    #[tokio::test]
    async fn test_close_ends_every_stream() {
        let broadcaster = ProgressBroadcaster::new(4);
        let job_id = Uuid::new_v4();
        let mut a = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 1)))
            .unwrap();
        let mut b = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 1)))
            .unwrap();

        assert_eq!(broadcaster.close(job_id), 2);
        assert_eq!(broadcaster.subscriber_count(job_id), 0);
        assert_eq!(a.recv().await.unwrap().progress, 1);
        assert!(a.recv().await.is_none());
        assert_eq!(b.recv().await.unwrap().progress, 1);
        assert!(b.recv().await.is_none());
        assert_eq!(broadcaster.close(job_id), 0);
    }

    #[tokio::test]
    async fn test_explicit_unsubscribe() {
        let broadcaster = ProgressBroadcaster::new(4);
        let job_id = Uuid::new_v4();
        let sub = broadcaster
            .subscribe_with(job_id, || Ok(event(job_id, 1)))
            .unwrap();

        assert!(broadcaster.unsubscribe(&sub));
        assert!(!broadcaster.unsubscribe(&sub));
        assert_eq!(broadcaster.subscriber_count(job_id), 0);
    }
}
