//! Per-document progress fan-out (§4.10). Subscribers receive newline-
//! delimited wire messages (§6) in stage order; a per-document lock
//! serializes subscribe/emit/drop so ordering is preserved across
//! concurrent documents without serializing across them (§5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Uploading,
    Parsing,
    ImageExtraction,
    GraphBuild,
    Embedding,
    Summarization,
    Evaluation,
    Complete,
    Failed,
}

impl Stage {
    /// Global-progress span this stage owns, `start + (stageProgress ×
    /// span)` (§4.10).
    pub fn percent_range(self) -> (u8, u8) {
        match self {
            Stage::Uploading => (0, 10),
            Stage::Parsing => (10, 30),
            Stage::ImageExtraction => (30, 40),
            Stage::GraphBuild => (40, 60),
            Stage::Embedding => (60, 75),
            Stage::Summarization => (75, 90),
            Stage::Evaluation => (90, 95),
            Stage::Complete => (100, 100),
            Stage::Failed => (0, 0),
        }
    }

    /// Maps a `[0,1]` fraction of this stage's own work into the global
    /// 0-100 percent (§4.10).
    pub fn global_percent(self, stage_progress: f64) -> u8 {
        let (start, end) = self.percent_range();
        let span = end as f64 - start as f64;
        (start as f64 + stage_progress.clamp(0.0, 1.0) * span).round() as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        stage: Stage,
        percent: u8,
        message: String,
        #[serde(default)]
        metadata: serde_json::Map<String, serde_json::Value>,
    },
    SummaryComplete {
        summary_payload: serde_json::Value,
        #[serde(default)]
        evaluation_payload: Option<serde_json::Value>,
    },
    Error {
        code: String,
        message: String,
        #[serde(default)]
        stage: Option<Stage>,
    },
    ConnectionEstablished {
        status: String,
    },
}

impl ProgressEvent {
    fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::SummaryComplete { .. } | ProgressEvent::Error { .. })
    }
}

/// Wire envelope (§6): `type` lives on the flattened event, `documentId`
/// and an ISO-8601 UTC `timestamp` wrap it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMessage {
    #[serde(flatten)]
    pub event: ProgressEvent,
    pub document_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Messages larger than this are rejected by the wire layer (§6).
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

pub fn check_message_size(message: &ProgressMessage) -> CoreResult<()> {
    let encoded = serde_json::to_vec(message)?;
    if encoded.len() > MAX_MESSAGE_BYTES {
        return Err(CoreError::ProgressBusCapacity(format!(
            "message exceeds {MAX_MESSAGE_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Per-document {current stage, percent, start time, last-update time,
/// metadata} (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressTracker {
    pub stage: Stage,
    pub percent: u8,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

struct DocumentChannel {
    sender: broadcast::Sender<ProgressMessage>,
    subscriber_count: usize,
    tracker: ProgressTracker,
    last_activity: DateTime<Utc>,
}

/// Process-wide progress fan-out singleton (§5). Constructed once at
/// engine startup and passed explicitly to the orchestrator and to
/// whatever wire layer exposes subscriptions (the out-of-scope server's
/// `ws.rs`-equivalent).
pub struct ProgressBus {
    documents: Mutex<HashMap<String, Arc<Mutex<DocumentChannel>>>>,
    max_subscribers: usize,
    heartbeat_interval: Duration,
    idle_timeout: Duration,
}

const CHANNEL_CAPACITY: usize = 256;

impl ProgressBus {
    pub fn new(max_subscribers: usize, heartbeat_interval: Duration, idle_timeout: Duration) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            max_subscribers,
            heartbeat_interval,
            idle_timeout,
        }
    }

    /// Test/reset hook (§5): clears all tracked documents.
    pub async fn reset_for_tests(&self) {
        self.documents.lock().await.clear();
    }

    async fn channel_for(&self, document_id: &str) -> Arc<Mutex<DocumentChannel>> {
        let mut documents = self.documents.lock().await;
        documents
            .entry(document_id.to_string())
            .or_insert_with(|| {
                let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
                Arc::new(Mutex::new(DocumentChannel {
                    sender,
                    subscriber_count: 0,
                    tracker: ProgressTracker {
                        stage: Stage::Uploading,
                        percent: 0,
                        started_at: Utc::now(),
                        last_update: Utc::now(),
                        metadata: Default::default(),
                    },
                    last_activity: Utc::now(),
                }))
            })
            .clone()
    }

    /// Subscribes a new listener to `document_id`'s events. Rejects beyond
    /// `max_subscribers` (§4.10); sends `connection_established` to all
    /// current subscribers on join.
    pub async fn subscribe(&self, document_id: &str) -> CoreResult<broadcast::Receiver<ProgressMessage>> {
        let channel = self.channel_for(document_id).await;
        let mut guard = channel.lock().await;
        if guard.subscriber_count >= self.max_subscribers {
            return Err(CoreError::ProgressBusCapacity(document_id.to_string()));
        }
        guard.subscriber_count += 1;
        guard.last_activity = Utc::now();
        let rx = guard.sender.subscribe();
        let _ = guard.sender.send(ProgressMessage {
            event: ProgressEvent::ConnectionEstablished {
                status: "connected".to_string(),
            },
            document_id: document_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(rx)
    }

    /// Marks one subscriber as having left; does not close the channel —
    /// other subscribers may remain.
    pub async fn unsubscribe(&self, document_id: &str) {
        let documents = self.documents.lock().await;
        if let Some(channel) = documents.get(document_id) {
            let mut guard = channel.lock().await;
            guard.subscriber_count = guard.subscriber_count.saturating_sub(1);
        }
    }

    /// Publishes `event` to every current subscriber of `document_id`
    /// (§4.10). Terminal events (`summary_complete`, `error`) discard the
    /// tracker and the whole channel entry.
    pub async fn publish(&self, document_id: &str, event: ProgressEvent) -> CoreResult<()> {
        let channel = self.channel_for(document_id).await;
        let terminal = event.is_terminal();
        {
            let mut guard = channel.lock().await;
            if let ProgressEvent::Progress { stage, percent, .. } = &event {
                guard.tracker.stage = *stage;
                guard.tracker.percent = *percent;
                guard.tracker.last_update = Utc::now();
            }
            guard.last_activity = Utc::now();
            let message = ProgressMessage {
                event,
                document_id: document_id.to_string(),
                timestamp: Utc::now(),
            };
            check_message_size(&message)?;
            let _ = guard.sender.send(message);
        }

        if terminal {
            self.documents.lock().await.remove(document_id);
        }
        Ok(())
    }

    pub async fn tracker(&self, document_id: &str) -> Option<ProgressTracker> {
        let documents = self.documents.lock().await;
        let channel = documents.get(document_id)?;
        Some(channel.lock().await.tracker.clone())
    }

    /// Maintenance tick (§4.10): emits a heartbeat (a repeat of the current
    /// tracker state) on documents idle past the heartbeat interval, and
    /// drops documents idle past the connection timeout. Library code does
    /// not spawn its own background task for this — the caller (server or
    /// CLI driving loop) invokes it on an interval, consistent with the
    /// "no hidden global state" rule in §5.
    pub async fn run_maintenance(&self) {
        let now = Utc::now();
        let mut to_drop = Vec::new();
        let snapshot: Vec<(String, Arc<Mutex<DocumentChannel>>)> = {
            let documents = self.documents.lock().await;
            documents.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        for (document_id, channel) in snapshot {
            let mut guard = channel.lock().await;
            let idle = now.signed_duration_since(guard.last_activity);
            if idle > chrono::Duration::from_std(self.idle_timeout).unwrap_or_default() {
                to_drop.push(document_id);
                continue;
            }
            if idle > chrono::Duration::from_std(self.heartbeat_interval).unwrap_or_default() {
                let tracker = guard.tracker.clone();
                let message = ProgressMessage {
                    event: ProgressEvent::Progress {
                        stage: tracker.stage,
                        percent: tracker.percent,
                        message: "heartbeat".to_string(),
                        metadata: Default::default(),
                    },
                    document_id: document_id.clone(),
                    timestamp: now,
                };
                let _ = guard.sender.send(message);
                guard.last_activity = now;
            }
        }

        if !to_drop.is_empty() {
            let mut documents = self.documents.lock().await;
            for id in to_drop {
                documents.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive_progress_in_order() {
        let bus = ProgressBus::new(4, Duration::from_secs(15), Duration::from_secs(30));
        let mut rx = bus.subscribe("doc-1").await.unwrap();
        let _connected = rx.recv().await.unwrap();

        bus.publish(
            "doc-1",
            ProgressEvent::Progress {
                stage: Stage::Parsing,
                percent: 20,
                message: "parsing".to_string(),
                metadata: Default::default(),
            },
        )
        .await
        .unwrap();
        bus.publish(
            "doc-1",
            ProgressEvent::Progress {
                stage: Stage::GraphBuild,
                percent: 50,
                message: "building graph".to_string(),
                metadata: Default::default(),
            },
        )
        .await
        .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first.event, second.event) {
            (ProgressEvent::Progress { stage: s1, .. }, ProgressEvent::Progress { stage: s2, .. }) => {
                assert_eq!(s1, Stage::Parsing);
                assert_eq!(s2, Stage::GraphBuild);
            }
            _ => panic!("expected progress events"),
        }
    }

    #[tokio::test]
    async fn rejects_beyond_max_subscribers() {
        let bus = ProgressBus::new(1, Duration::from_secs(15), Duration::from_secs(30));
        let _first = bus.subscribe("doc-1").await.unwrap();
        let err = bus.subscribe("doc-1").await.unwrap_err();
        assert!(matches!(err, CoreError::ProgressBusCapacity(_)));
    }

    #[tokio::test]
    async fn terminal_event_discards_tracker() {
        let bus = ProgressBus::new(4, Duration::from_secs(15), Duration::from_secs(30));
        let _rx = bus.subscribe("doc-1").await.unwrap();
        bus.publish(
            "doc-1",
            ProgressEvent::Error {
                code: "InvalidPdf".to_string(),
                message: "bad pdf".to_string(),
                stage: Some(Stage::Parsing),
            },
        )
        .await
        .unwrap();
        assert!(bus.tracker("doc-1").await.is_none());
    }

    #[test]
    fn stage_percent_mapping_matches_spec_table() {
        assert_eq!(Stage::Parsing.percent_range(), (10, 30));
        assert_eq!(Stage::GraphBuild.global_percent(0.5), 50);
        assert_eq!(Stage::Summarization.global_percent(1.0), 90);
    }
}
