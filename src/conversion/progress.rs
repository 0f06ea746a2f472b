//! Per-job progress fan-out.
//!
//! [`ProgressBroadcaster`] keeps one `tokio::sync::broadcast` channel per live
//! job plus the latest event, so a subscriber joining mid-job starts from the
//! current state. When a terminal event is emitted the channel is closed and
//! the event moves to a bounded ring of settled jobs; a late subscriber gets
//! that terminal event once and the stream ends.

use std::collections::{HashMap, VecDeque};

use futures::stream::BoxStream;
use mediaforge_common::config::ProgressConfig;
use mediaforge_common::{JobId, ProgressEvent};
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Stream of a single job's events, ending after the terminal event.
pub type ProgressStream = BoxStream<'static, ProgressEvent>;

struct Channel {
    tx: broadcast::Sender<ProgressEvent>,
    latest: Option<ProgressEvent>,
}

#[derive(Default)]
struct Channels {
    live: HashMap<JobId, Channel>,
    settled: VecDeque<(JobId, ProgressEvent)>,
}

impl Channels {
    fn settled_event(&self, job_id: &JobId) -> Option<ProgressEvent> {
        self.settled
            .iter()
            .rev()
            .find(|(id, _)| id == job_id)
            .map(|(_, event)| event.clone())
    }
}

/// Replay-buffered progress channels keyed by job.
pub struct ProgressBroadcaster {
    channels: Mutex<Channels>,
    capacity: usize,
    retention: usize,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize, retention: usize) -> Self {
        Self {
            channels: Mutex::new(Channels::default()),
            capacity: capacity.max(1),
            retention: retention.max(1),
        }
    }

    pub fn from_config(config: &ProgressConfig) -> Self {
        Self::new(config.channel_capacity, config.settled_retention)
    }

    /// Create the job's channel if it does not exist yet. Reopening a settled
    /// id forgets its old terminal event.
    pub fn open(&self, job_id: &JobId) {
        let mut channels = self.channels.lock();
        Self::open_locked(&mut channels, job_id, self.capacity);
    }

    fn open_locked<'a>(channels: &'a mut Channels, job_id: &JobId, capacity: usize) -> &'a Channel {
        channels.settled.retain(|(id, _)| id != job_id);
        channels.live.entry(job_id.clone()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(capacity);
            Channel { tx, latest: None }
        })
    }

    /// Publish an event. Returns `false` when the job has no open channel, in
    /// which case nothing happens.
    pub fn emit(&self, job_id: &JobId, event: ProgressEvent) -> bool {
        let mut channels = self.channels.lock();

        if event.is_terminal() {
            let Some(channel) = channels.live.remove(job_id) else {
                return false;
            };
            // Dropping the sender after this closes every receiver.
            let _ = channel.tx.send(event.clone());
            channels.settled.push_back((job_id.clone(), event));
            while channels.settled.len() > self.retention {
                channels.settled.pop_front();
            }
            return true;
        }

        let Some(channel) = channels.live.get_mut(job_id) else {
            return false;
        };
        channel.latest = Some(event.clone());
        // No receivers is fine; the replay slot still holds the event.
        let _ = channel.tx.send(event);
        true
    }

    /// Subscribe to a job's events.
    ///
    /// The stream starts with the latest event (if any), then follows live
    /// events until a terminal one. Subscribing to a settled job yields its
    /// terminal event once. Subscribing to an unknown job opens its channel.
    pub fn subscribe(&self, job_id: &JobId) -> ProgressStream {
        let mut channels = self.channels.lock();

        let (replay, rx) = if let Some(channel) = channels.live.get(job_id) {
            (channel.latest.clone(), Some(channel.tx.subscribe()))
        } else if let Some(terminal) = channels.settled_event(job_id) {
            (Some(terminal), None)
        } else {
            let channel = Self::open_locked(&mut channels, job_id, self.capacity);
            (None, Some(channel.tx.subscribe()))
        };
        drop(channels);

        let job_id = job_id.clone();
        Box::pin(async_stream::stream! {
            let mut done = false;
            if let Some(event) = replay {
                done = event.is_terminal();
                yield event;
            }

            if let (false, Some(mut rx)) = (done, rx) {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            yield event;
                            if terminal {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(job_id = %job_id, "Progress subscriber lagged by {n} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Whether the job has a live channel.
    pub fn is_open(&self, job_id: &JobId) -> bool {
        self.channels.lock().live.contains_key(job_id)
    }

    /// Latest event seen for a job, live or settled.
    pub fn latest(&self, job_id: &JobId) -> Option<ProgressEvent> {
        let channels = self.channels.lock();
        match channels.live.get(job_id) {
            Some(channel) => channel.latest.clone(),
            None => channels.settled_event(job_id),
        }
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::from_config(&ProgressConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn id(s: &str) -> JobId {
        JobId::from(s)
    }

    #[test]
    fn emit_without_channel_is_noop() {
        let b = ProgressBroadcaster::default();
        assert!(!b.emit(&id("ghost"), ProgressEvent::progress(10.0)));
        assert!(!b.emit(&id("ghost"), ProgressEvent::Complete));
        assert!(!b.is_open(&id("ghost")));
        assert_eq!(b.latest(&id("ghost")), None);
    }

    #[tokio::test]
    async fn late_subscriber_gets_latest_then_live() {
        let b = ProgressBroadcaster::default();
        let job = id("job");
        b.open(&job);
        b.emit(&job, ProgressEvent::progress(10.0));
        b.emit(&job, ProgressEvent::progress(20.0));

        let stream = b.subscribe(&job);
        b.emit(&job, ProgressEvent::progress(30.0));
        b.emit(&job, ProgressEvent::Complete);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(
            events,
            vec![
                ProgressEvent::progress(20.0),
                ProgressEvent::progress(30.0),
                ProgressEvent::Complete,
            ]
        );
        assert!(!b.is_open(&job));
    }

    #[tokio::test]
    async fn subscribe_after_terminal_yields_it_once() {
        let b = ProgressBroadcaster::default();
        let job = id("done");
        b.open(&job);
        b.emit(&job, ProgressEvent::progress(50.0));
        b.emit(&job, ProgressEvent::error("boom"));

        let events: Vec<_> = b.subscribe(&job).collect().await;
        assert_eq!(events, vec![ProgressEvent::error("boom")]);
        // Nothing after the terminal event reaches anyone.
        assert!(!b.emit(&job, ProgressEvent::progress(60.0)));
        assert_eq!(b.latest(&job), Some(ProgressEvent::error("boom")));
    }

    #[tokio::test]
    async fn subscribe_opens_unknown_job() {
        let b = ProgressBroadcaster::default();
        let job = id("early");
        let stream = b.subscribe(&job);
        assert!(b.is_open(&job));

        b.emit(&job, ProgressEvent::progress(5.0));
        b.emit(&job, ProgressEvent::Cancelled);
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events, vec![ProgressEvent::progress(5.0), ProgressEvent::Cancelled]);
    }

    #[tokio::test]
    async fn only_first_terminal_is_delivered() {
        let b = ProgressBroadcaster::default();
        let job = id("once");
        let stream = b.subscribe(&job);
        assert!(b.emit(&job, ProgressEvent::Cancelled));
        assert!(!b.emit(&job, ProgressEvent::Complete));
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events, vec![ProgressEvent::Cancelled]);
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving() {
        let b = ProgressBroadcaster::new(2, 4);
        let job = id("lag");
        let mut stream = b.subscribe(&job);
        for p in 1..=10 {
            b.emit(&job, ProgressEvent::progress(p as f64));
        }
        b.emit(&job, ProgressEvent::Complete);

        let first = stream.next().await.unwrap();
        // Older events were dropped from the bounded buffer.
        assert!(first.percent().unwrap() >= 9.0);
        let rest: Vec<_> = stream.collect().await;
        assert_eq!(rest.last(), Some(&ProgressEvent::Complete));
    }

    #[test]
    fn settled_ring_is_bounded() {
        let b = ProgressBroadcaster::new(4, 2);
        for name in ["a", "b", "c"] {
            b.open(&id(name));
            b.emit(&id(name), ProgressEvent::Complete);
        }
        assert_eq!(b.latest(&id("a")), None);
        assert_eq!(b.latest(&id("b")), Some(ProgressEvent::Complete));
        assert_eq!(b.latest(&id("c")), Some(ProgressEvent::Complete));
    }

    #[test]
    fn reopening_forgets_settled_event() {
        let b = ProgressBroadcaster::default();
        let job = id("again");
        b.open(&job);
        b.emit(&job, ProgressEvent::Complete);
        b.open(&job);
        assert!(b.is_open(&job));
        assert_eq!(b.latest(&job), None);
    }
}
