//! Per-room progress events with buffered replay and live fan-out.
//!
//! Every room gets a bounded backlog and a broadcast channel. Appends assign
//! the next sequence number and publish while holding the room's lock, and
//! subscribers snapshot the backlog under the same lock, so a late subscriber
//! sees the backlog followed by live events with no gap between them.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::stream::{self, Stream};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::LogStreamConfig;
use crate::models::{LogEntry, LogEvent, LogLevel};

#[derive(Debug, Clone)]
enum Frame {
    Event(LogEvent),
    Closed,
}

struct RoomLogState {
    backlog: VecDeque<LogEvent>,
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
    closed_at: Option<Instant>,
}

struct RoomLog {
    state: Mutex<RoomLogState>,
    sender: broadcast::Sender<Frame>,
}

impl RoomLog {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(RoomLogState {
                backlog: VecDeque::with_capacity(capacity),
                next_seq: 1,
                last_timestamp: None,
                closed_at: None,
            }),
            sender,
        }
    }
}

/// Fan-out hub for room Log Events.
#[derive(Clone)]
pub struct LogStream {
    rooms: Arc<RwLock<HashMap<Uuid, Arc<RoomLog>>>>,
    buffer_size: usize,
    grace_period: Duration,
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new(&LogStreamConfig::default())
    }
}

impl LogStream {
    pub fn new(config: &LogStreamConfig) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            buffer_size: config.buffer_size.max(1),
            grace_period: Duration::from_secs(config.grace_period_secs),
        }
    }

    async fn room(&self, room_id: Uuid) -> Arc<RoomLog> {
        if let Some(log) = self.rooms.read().await.get(&room_id) {
            return log.clone();
        }
        self.rooms
            .write()
            .await
            .entry(room_id)
            .or_insert_with(|| Arc::new(RoomLog::new(self.buffer_size)))
            .clone()
    }

    /// Sequences `entry`, stores it in the backlog and publishes it.
    ///
    /// Appends to a closed room are dropped and return `None`.
    pub async fn append(&self, room_id: Uuid, entry: LogEntry) -> Option<LogEvent> {
        let log = self.room(room_id).await;
        let mut state = log.state.lock().await;

        if state.closed_at.is_some() {
            debug!(room_id = %room_id, dropped = %entry.message, "Dropping log event for closed room");
            return None;
        }

        let mut timestamp = Utc::now();
        if let Some(last) = state.last_timestamp {
            if timestamp <= last {
                timestamp = last + ChronoDuration::microseconds(1);
            }
        }

        let event = LogEvent {
            room_id,
            seq: state.next_seq,
            source: entry.source,
            level: entry.level,
            message: entry.message,
            timestamp,
        };
        state.next_seq += 1;
        state.last_timestamp = Some(timestamp);

        if state.backlog.len() == self.buffer_size {
            state.backlog.pop_front();
        }
        state.backlog.push_back(event.clone());

        mirror_to_tracing(&event);
        // No receivers is fine: the backlog keeps the event for later subscribers.
        let _ = log.sender.send(Frame::Event(event.clone()));

        Some(event)
    }

    /// Backlog followed by live events until the room's log is closed.
    pub async fn subscribe(&self, room_id: Uuid) -> LogSubscription {
        let log = self.room(room_id).await;
        let state = log.state.lock().await;

        let pending: VecDeque<LogEvent> = state.backlog.iter().cloned().collect();
        let closed = state.closed_at.is_some();
        let receiver = log.sender.subscribe();
        drop(state);

        LogSubscription {
            room_id,
            receiver,
            log,
            pending,
            last_seq: 0,
            closed,
        }
    }

    /// Marks the room's log finished. Subscribers drain what they have and end.
    pub async fn close(&self, room_id: Uuid) {
        let log = self.room(room_id).await;
        let mut state = log.state.lock().await;
        if state.closed_at.is_none() {
            state.closed_at = Some(Instant::now());
            let _ = log.sender.send(Frame::Closed);
            debug!(room_id = %room_id, "Log stream closed");
        }
    }

    pub async fn is_closed(&self, room_id: Uuid) -> bool {
        match self.rooms.read().await.get(&room_id) {
            Some(log) => log.state.lock().await.closed_at.is_some(),
            None => false,
        }
    }

    pub async fn backlog(&self, room_id: Uuid) -> Vec<LogEvent> {
        match self.rooms.read().await.get(&room_id) {
            Some(log) => log.state.lock().await.backlog.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .map(|log| log.sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drops closed room logs older than the grace period. Returns how many went.
    pub async fn sweep(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let mut expired = Vec::new();
        for (room_id, log) in rooms.iter() {
            let state = log.state.lock().await;
            if let Some(closed_at) = state.closed_at {
                if closed_at.elapsed() >= self.grace_period {
                    expired.push(*room_id);
                }
            }
        }
        for room_id in &expired {
            rooms.remove(room_id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Swept closed room logs");
        }
        expired.len()
    }

    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let logs = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Log stream sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        logs.sweep().await;
                    }
                }
            }
        })
    }
}

fn mirror_to_tracing(event: &LogEvent) {
    match event.level {
        LogLevel::Info | LogLevel::Success => info!(
            room_id = %event.room_id,
            seq = event.seq,
            source = %event.source,
            log_level = %event.level,
            "{}",
            event.message
        ),
        LogLevel::Warn => warn!(
            room_id = %event.room_id,
            seq = event.seq,
            source = %event.source,
            "{}",
            event.message
        ),
        LogLevel::Error => error!(
            room_id = %event.room_id,
            seq = event.seq,
            source = %event.source,
            "{}",
            event.message
        ),
    }
}

/// One observer of a room's log. Dropping it unsubscribes.
pub struct LogSubscription {
    room_id: Uuid,
    receiver: broadcast::Receiver<Frame>,
    log: Arc<RoomLog>,
    pending: VecDeque<LogEvent>,
    last_seq: u64,
    closed: bool,
}

impl LogSubscription {
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Next event in append order, or `None` once the room's log is closed
    /// and drained.
    pub async fn next(&mut self) -> Option<LogEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event.seq > self.last_seq {
                    self.last_seq = event.seq;
                    return Some(event);
                }
                continue;
            }

            if self.closed {
                return None;
            }

            match self.receiver.recv().await {
                Ok(Frame::Event(event)) => {
                    if event.seq > self.last_seq {
                        self.last_seq = event.seq;
                        return Some(event);
                    }
                }
                Ok(Frame::Closed) | Err(broadcast::error::RecvError::Closed) => {
                    self.closed = true;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(room_id = %self.room_id, skipped, "Subscriber lagged, refilling from backlog");
                    let state = self.log.state.lock().await;
                    self.pending = state
                        .backlog
                        .iter()
                        .filter(|event| event.seq > self.last_seq)
                        .cloned()
                        .collect();
                    // Frames still queued after the refill are skipped by seq.
                    self.closed = state.closed_at.is_some();
                }
            }
        }
    }

    pub fn unsubscribe(self) {}

    pub fn into_stream(self) -> impl Stream<Item = LogEvent> + Send {
        stream::unfold(self, |mut subscription| async move {
            subscription.next().await.map(|event| (event, subscription))
        })
    }
}
