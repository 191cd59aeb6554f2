//! MeridianBus: typed bounded pub/sub connecting pipeline components
//!
//! Three channel kinds: data meridians (topic fanout), control meridians
//! (multicast commands), and a temporal meridian (periodic time-sync
//! broadcast). Every meridian is bounded; a publish blocks at most the
//! configured timeout and then drops the packet, so publishers can never
//! stall the core. Delivery is best-effort, at-most-once, FIFO per
//! subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use verdure_core::MeridianMetrics;
use verdure_types::{Result, VerdureError};

/// Default bound on packets in transit per meridian
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default maximum time a publish may block
pub const DEFAULT_PUBLISH_TIMEOUT: StdDuration = StdDuration::from_secs(1);

/// Interval between temporal time-sync broadcasts
pub const TIME_SYNC_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// A packet of data flowing through a meridian
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowPacket {
    pub packet_id: String,
    pub source: String,
    /// Topic for data meridians; command name for control packets
    pub topic: Option<String>,
    pub payload: serde_json::Value,
    /// 1 (highest) to 10 (lowest)
    pub priority: u8,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl FlowPacket {
    fn new(source: &str, topic: Option<String>, payload: serde_json::Value, priority: u8) -> Self {
        Self {
            packet_id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            topic,
            payload,
            priority,
            timestamp: Utc::now(),
        }
    }
}

/// Shared plumbing for all meridian kinds
struct MeridianCore {
    meridian_id: String,
    capacity: usize,
    publish_timeout: StdDuration,
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
    delivery_errors: AtomicU64,
}

impl MeridianCore {
    fn new(meridian_id: &str, capacity: usize, publish_timeout: StdDuration) -> Self {
        Self {
            meridian_id: meridian_id.to_string(),
            capacity,
            publish_timeout,
            packets_sent: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            delivery_errors: AtomicU64::new(0),
        }
    }

    /// Deliver one packet to one subscriber queue, dropping on timeout
    async fn deliver(&self, sender: &mpsc::Sender<FlowPacket>, packet: FlowPacket) -> bool {
        match sender.send_timeout(packet, self.publish_timeout).await {
            Ok(()) => {
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(meridian = %self.meridian_id, "meridian congested, packet dropped");
                false
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                self.delivery_errors.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    fn metrics(&self, queue_size: u64, blockages: u64) -> MeridianMetrics {
        let sent = self.packets_sent.load(Ordering::Relaxed);
        let dropped = self.packets_dropped.load(Ordering::Relaxed);
        let errors = self.delivery_errors.load(Ordering::Relaxed);
        let attempted = sent + dropped + errors;
        MeridianMetrics {
            meridian_id: self.meridian_id.clone(),
            timestamp: Utc::now(),
            packets_sent: sent,
            packets_received: sent,
            packets_dropped: dropped,
            queue_size,
            blockages,
            throughput_per_sec: 0.0,
            latency_ms: 0.0,
            error_rate: if attempted > 0 {
                errors as f64 / attempted as f64
            } else {
                0.0
            },
        }
    }
}

type SubscriberMap = HashMap<String, mpsc::Sender<FlowPacket>>;

/// Topic-based fanout meridian for information flow
pub struct DataMeridian {
    core: MeridianCore,
    /// topic -> node -> queue
    topics: RwLock<HashMap<String, SubscriberMap>>,
}

impl DataMeridian {
    pub fn new(meridian_id: &str) -> Self {
        Self::with_capacity(meridian_id, DEFAULT_CAPACITY, DEFAULT_PUBLISH_TIMEOUT)
    }

    pub fn with_capacity(meridian_id: &str, capacity: usize, publish_timeout: StdDuration) -> Self {
        Self {
            core: MeridianCore::new(meridian_id, capacity, publish_timeout),
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe a node to a topic, returning its packet stream
    pub fn subscribe(&self, node_id: &str, topic: &str) -> Result<mpsc::Receiver<FlowPacket>> {
        let (sender, receiver) = mpsc::channel(self.core.capacity);
        let mut topics = self
            .topics
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        topics
            .entry(topic.to_string())
            .or_default()
            .insert(node_id.to_string(), sender);
        debug!(node_id, topic, "subscribed to data meridian");
        Ok(receiver)
    }

    pub fn unsubscribe(&self, node_id: &str, topic: &str) -> Result<()> {
        let mut topics = self
            .topics
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.remove(node_id);
        }
        Ok(())
    }

    /// Publish to every subscriber of a topic; returns deliveries made.
    ///
    /// A saturated subscriber costs at most the publish timeout and its
    /// packet is dropped; other subscribers still receive theirs.
    pub async fn publish(
        &self,
        source: &str,
        topic: &str,
        payload: serde_json::Value,
        priority: u8,
    ) -> Result<usize> {
        let subscribers: Vec<(String, mpsc::Sender<FlowPacket>)> = {
            let topics = self
                .topics
                .read()
                .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
            topics
                .get(topic)
                .map(|subs| {
                    subs.iter()
                        .filter(|(node, _)| node.as_str() != source)
                        .map(|(node, sender)| (node.clone(), sender.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for (_, sender) in subscribers {
            let packet = FlowPacket::new(source, Some(topic.to_string()), payload.clone(), priority);
            if self.core.deliver(&sender, packet).await {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    pub fn metrics(&self) -> Result<MeridianMetrics> {
        let topics = self
            .topics
            .read()
            .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
        let queue_size = topics
            .values()
            .flat_map(|subs| subs.values())
            .map(|s| (s.max_capacity() - s.capacity()) as u64)
            .max()
            .unwrap_or(0);
        Ok(self.core.metrics(queue_size, 0))
    }
}

/// Multicast command meridian
pub struct ControlMeridian {
    core: MeridianCore,
    nodes: RwLock<SubscriberMap>,
}

impl ControlMeridian {
    pub fn new(meridian_id: &str) -> Self {
        Self::with_capacity(meridian_id, DEFAULT_CAPACITY, DEFAULT_PUBLISH_TIMEOUT)
    }

    pub fn with_capacity(meridian_id: &str, capacity: usize, publish_timeout: StdDuration) -> Self {
        Self {
            core: MeridianCore::new(meridian_id, capacity, publish_timeout),
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Connect a node, returning its command stream
    pub fn connect(&self, node_id: &str) -> Result<mpsc::Receiver<FlowPacket>> {
        let (sender, receiver) = mpsc::channel(self.core.capacity);
        let mut nodes = self
            .nodes
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        nodes.insert(node_id.to_string(), sender);
        Ok(receiver)
    }

    pub fn disconnect(&self, node_id: &str) -> Result<()> {
        let mut nodes = self
            .nodes
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        nodes.remove(node_id);
        Ok(())
    }

    /// Send a command to one node, or multicast to all when `target` is None
    pub async fn send_command(
        &self,
        source: &str,
        command: &str,
        params: serde_json::Value,
        target: Option<&str>,
    ) -> Result<usize> {
        let recipients: Vec<mpsc::Sender<FlowPacket>> = {
            let nodes = self
                .nodes
                .read()
                .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
            match target {
                Some(node_id) => nodes.get(node_id).cloned().into_iter().collect(),
                None => nodes
                    .iter()
                    .filter(|(node, _)| node.as_str() != source)
                    .map(|(_, sender)| sender.clone())
                    .collect(),
            }
        };

        let payload = serde_json::json!({ "command": command, "params": params });
        let mut delivered = 0;
        for sender in recipients {
            // Commands are high priority
            let packet = FlowPacket::new(source, Some(command.to_string()), payload.clone(), 1);
            if self.core.deliver(&sender, packet).await {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    pub fn metrics(&self) -> Result<MeridianMetrics> {
        let nodes = self
            .nodes
            .read()
            .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
        let queue_size = nodes
            .values()
            .map(|s| (s.max_capacity() - s.capacity()) as u64)
            .max()
            .unwrap_or(0);
        Ok(self.core.metrics(queue_size, 0))
    }
}

/// Periodic time-sync broadcaster keeping cooperative components aligned
pub struct TemporalMeridian {
    control: Arc<ControlMeridian>,
    sync_interval: StdDuration,
}

impl TemporalMeridian {
    pub fn new(meridian_id: &str) -> Self {
        Self {
            control: Arc::new(ControlMeridian::new(meridian_id)),
            sync_interval: TIME_SYNC_INTERVAL,
        }
    }

    pub fn with_interval(meridian_id: &str, sync_interval: StdDuration) -> Self {
        Self {
            control: Arc::new(ControlMeridian::new(meridian_id)),
            sync_interval,
        }
    }

    pub fn connect(&self, node_id: &str) -> Result<mpsc::Receiver<FlowPacket>> {
        self.control.connect(node_id)
    }

    pub fn metrics(&self) -> Result<MeridianMetrics> {
        self.control.metrics()
    }

    /// Spawn the time-sync loop; stops when `shutdown` flips to true
    pub fn start(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let control = Arc::clone(&self.control);
        let interval = self.sync_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let payload = serde_json::json!({ "timestamp": Utc::now().to_rfc3339() });
                        if let Err(e) = control
                            .send_command("temporal_meridian", "time_sync", payload, None)
                            .await
                        {
                            tracing::error!(error = %e, "time sync broadcast failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// The bus aggregate wired into `Deps`
pub struct MeridianBus {
    pub data: DataMeridian,
    pub control: ControlMeridian,
    pub temporal: TemporalMeridian,
}

impl MeridianBus {
    pub fn new() -> Self {
        Self {
            data: DataMeridian::new("data-main"),
            control: ControlMeridian::new("control-main"),
            temporal: TemporalMeridian::new("temporal-main"),
        }
    }

    /// Current metrics snapshot for every meridian
    pub fn metrics_snapshot(&self) -> Result<Vec<MeridianMetrics>> {
        Ok(vec![
            self.data.metrics()?,
            self.control.metrics()?,
            self.temporal.metrics()?,
        ])
    }
}

impl Default for MeridianBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_topic_subscribers_in_order() {
        let meridian = DataMeridian::new("data-test");
        let mut rx = meridian.subscribe("node-a", "signals").unwrap();

        meridian.publish("producer", "signals", json!(1), 5).await.unwrap();
        meridian.publish("producer", "signals", json!(2), 5).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().payload, json!(1));
        assert_eq!(rx.recv().await.unwrap().payload, json!(2));
    }

    #[tokio::test]
    async fn publisher_never_blocks_past_timeout() {
        let meridian = DataMeridian::with_capacity("tiny", 1, StdDuration::from_millis(50));
        let _rx = meridian.subscribe("slow-node", "t").unwrap();

        // Queue holds one packet; the second must drop instead of blocking
        assert_eq!(meridian.publish("p", "t", json!(1), 5).await.unwrap(), 1);
        let started = std::time::Instant::now();
        assert_eq!(meridian.publish("p", "t", json!(2), 5).await.unwrap(), 0);
        assert!(started.elapsed() < StdDuration::from_millis(500));

        let metrics = meridian.metrics().unwrap();
        assert_eq!(metrics.packets_dropped, 1);
        assert_eq!(metrics.packets_sent, 1);
    }

    #[tokio::test]
    async fn control_multicast_skips_source() {
        let meridian = ControlMeridian::new("control-test");
        let mut rx_a = meridian.connect("node-a").unwrap();
        let _rx_b = meridian.connect("node-b").unwrap();

        let delivered = meridian
            .send_command("node-b", "pause", json!({}), None)
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        let packet = rx_a.recv().await.unwrap();
        assert_eq!(packet.payload["command"], json!("pause"));
        assert_eq!(packet.priority, 1);
    }

    #[tokio::test]
    async fn temporal_broadcasts_time_sync() {
        let meridian = TemporalMeridian::with_interval("temporal-test", StdDuration::from_millis(10));
        let mut rx = meridian.connect("node-a").unwrap();

        let (tx, shutdown) = watch::channel(false);
        let handle = meridian.start(shutdown);

        let packet = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(packet.topic.as_deref(), Some("time_sync"));
        assert!(packet.payload["timestamp"].is_string());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
