//! # Transport Layer
//!
//! The sessions only see the [`Transport`] trait: send bytes on a channel,
//! drain whatever has arrived. [`LoopbackTransport`] is the in-process
//! implementation used by the headless server demo and by tests.
//!
//! ## Channel guarantees
//!
//! - **Reliable**: every packet arrives, in send order.
//! - **Unreliable**: packets may be dropped or reordered; payloads carry a
//!   tick or timestamp so the receiver can discard superseded data.

use bevy::prelude::*;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{NetworkError, NetworkResult};
use crate::protocol::FrontlinesChannel;

// ============================================================================
// Transport Trait
// ============================================================================

/// A received packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub channel: FrontlinesChannel,
    pub bytes: Vec<u8>,
}

/// Bidirectional byte pipe to one peer.
pub trait Transport: Send + Sync {
    fn send(&self, channel: FrontlinesChannel, bytes: Vec<u8>) -> NetworkResult<()>;

    /// Drain everything received since the last call. Reliable packets come first.
    fn receive(&self) -> Vec<Packet>;

    fn is_open(&self) -> bool;

    fn close(&self);
}

// ============================================================================
// Loopback
// ============================================================================

/// Impairments applied to the unreliable channel of one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkConditions {
    /// Silently discard every unreliable packet
    pub drop_unreliable: bool,
    /// Deliver each batch of unreliable packets in reverse order
    pub reorder_unreliable: bool,
}

#[derive(Default)]
struct Link {
    reliable: Mutex<VecDeque<Vec<u8>>>,
    unreliable: Mutex<Vec<Vec<u8>>>,
    conditions: Mutex<LinkConditions>,
}

/// One end of an in-memory connection.
///
/// Clones share the same end.
#[derive(Clone)]
pub struct LoopbackTransport {
    outbound: Arc<Link>,
    inbound: Arc<Link>,
    open: Arc<AtomicBool>,
    max_packet_size: usize,
}

impl LoopbackTransport {
    /// Two connected ends with the default MTU-safe packet limit.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_limit(1400)
    }

    pub fn pair_with_limit(max_packet_size: usize) -> (Self, Self) {
        let a_to_b = Arc::new(Link::default());
        let b_to_a = Arc::new(Link::default());
        let open = Arc::new(AtomicBool::new(true));

        let a = Self {
            outbound: a_to_b.clone(),
            inbound: b_to_a.clone(),
            open: open.clone(),
            max_packet_size,
        };
        let b = Self {
            outbound: b_to_a,
            inbound: a_to_b,
            open,
            max_packet_size,
        };
        (a, b)
    }

    /// Impair packets sent from this end.
    pub fn set_conditions(&self, conditions: LinkConditions) {
        *self.outbound.conditions.lock() = conditions;
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, channel: FrontlinesChannel, bytes: Vec<u8>) -> NetworkResult<()> {
        if !self.is_open() {
            return Err(NetworkError::ConnectionClosed("loopback closed".to_string()));
        }
        if bytes.len() > self.max_packet_size {
            return Err(NetworkError::PacketTooLarge {
                size: bytes.len(),
                max: self.max_packet_size,
            });
        }

        match channel {
            FrontlinesChannel::Reliable => self.outbound.reliable.lock().push_back(bytes),
            FrontlinesChannel::Unreliable => {
                if !self.outbound.conditions.lock().drop_unreliable {
                    self.outbound.unreliable.lock().push(bytes);
                }
            }
        }
        Ok(())
    }

    fn receive(&self) -> Vec<Packet> {
        let mut packets: Vec<Packet> = self
            .inbound
            .reliable
            .lock()
            .drain(..)
            .map(|bytes| Packet {
                channel: FrontlinesChannel::Reliable,
                bytes,
            })
            .collect();

        let mut unreliable: Vec<Vec<u8>> = self.inbound.unreliable.lock().drain(..).collect();
        if self.inbound.conditions.lock().reorder_unreliable {
            unreliable.reverse();
        }
        packets.extend(unreliable.into_iter().map(|bytes| Packet {
            channel: FrontlinesChannel::Unreliable,
            bytes,
        }));
        packets
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

// ============================================================================
// Loopback Hub
// ============================================================================

/// In-process listeners keyed by port.
///
/// The server listens on a port and accepts pending ends each tick; a client
/// connects and keeps the other end. Clones share the same listeners, so two
/// apps in one process can reach each other.
#[derive(Resource, Clone, Default)]
pub struct LoopbackHub {
    listeners: Arc<Mutex<HashMap<u16, Vec<LoopbackTransport>>>>,
}

impl LoopbackHub {
    pub fn listen(&self, port: u16) {
        self.listeners.lock().entry(port).or_default();
    }

    /// Stop listening. Connections not yet accepted are closed.
    pub fn unlisten(&self, port: u16) {
        if let Some(pending) = self.listeners.lock().remove(&port) {
            for transport in pending {
                transport.close();
            }
        }
    }

    pub fn is_listening(&self, port: u16) -> bool {
        self.listeners.lock().contains_key(&port)
    }

    /// Open a connection to the listener on `port` and return the client end.
    pub fn connect(&self, port: u16) -> NetworkResult<LoopbackTransport> {
        let mut listeners = self.listeners.lock();
        let pending = listeners
            .get_mut(&port)
            .ok_or(NetworkError::ConnectionRefused(port))?;
        let (client, server) = LoopbackTransport::pair();
        pending.push(server);
        Ok(client)
    }

    /// Server ends of connections made since the last call.
    pub fn take_pending(&self, port: u16) -> Vec<LoopbackTransport> {
        self.listeners
            .lock()
            .get_mut(&port)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

// ============================================================================
// Bandwidth Tracking
// ============================================================================

/// Tracks bandwidth usage.
#[derive(Resource, Debug, Clone, Default)]
pub struct BandwidthTracker {
    /// Bytes sent per second (rolling average)
    pub bytes_per_sec_sent: f64,
    /// Bytes received per second (rolling average)
    pub bytes_per_sec_recv: f64,
    /// Peak bytes/sec sent
    pub peak_sent: f64,
    /// Peak bytes/sec received
    pub peak_recv: f64,
    sent_accumulator: u64,
    recv_accumulator: u64,
    last_reset: f64,
}

impl BandwidthTracker {
    pub fn record_sent(&mut self, bytes: u64) {
        self.sent_accumulator += bytes;
    }

    pub fn record_recv(&mut self, bytes: u64) {
        self.recv_accumulator += bytes;
    }

    /// Fold the current window into the rolling averages once a second has passed.
    pub fn update(&mut self, delta_secs: f64) {
        self.last_reset += delta_secs;

        if self.last_reset >= 1.0 {
            let alpha = 0.3;
            let sent = self.sent_accumulator as f64 / self.last_reset;
            let recv = self.recv_accumulator as f64 / self.last_reset;

            self.bytes_per_sec_sent = self.bytes_per_sec_sent * (1.0 - alpha) + sent * alpha;
            self.bytes_per_sec_recv = self.bytes_per_sec_recv * (1.0 - alpha) + recv * alpha;

            self.peak_sent = self.peak_sent.max(sent);
            self.peak_recv = self.peak_recv.max(recv);

            self.sent_accumulator = 0;
            self.recv_accumulator = 0;
            self.last_reset = 0.0;
        }
    }

    /// Human-readable bandwidth string.
    pub fn format_bandwidth(&self) -> String {
        fn format_bytes(bytes: f64) -> String {
            if bytes >= 1_000_000.0 {
                format!("{:.2} MB/s", bytes / 1_000_000.0)
            } else if bytes >= 1_000.0 {
                format!("{:.2} KB/s", bytes / 1_000.0)
            } else {
                format!("{:.0} B/s", bytes)
            }
        }

        format!(
            "up {} down {}",
            format_bytes(self.bytes_per_sec_sent),
            format_bytes(self.bytes_per_sec_recv)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliable_preserves_order() {
        let (a, b) = LoopbackTransport::pair();
        for i in 0..5u8 {
            a.send(FrontlinesChannel::Reliable, vec![i]).expect("send");
        }
        let received: Vec<u8> = b.receive().into_iter().map(|p| p.bytes[0]).collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
        assert!(b.receive().is_empty());
    }

    #[test]
    fn test_unreliable_can_drop_and_reorder() {
        let (a, b) = LoopbackTransport::pair();
        a.set_conditions(LinkConditions {
            drop_unreliable: true,
            ..default()
        });
        a.send(FrontlinesChannel::Unreliable, vec![1]).expect("send");
        a.send(FrontlinesChannel::Reliable, vec![2]).expect("send");
        let packets = b.receive();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].channel, FrontlinesChannel::Reliable);

        a.set_conditions(LinkConditions {
            reorder_unreliable: true,
            ..default()
        });
        a.send(FrontlinesChannel::Unreliable, vec![1]).expect("send");
        a.send(FrontlinesChannel::Unreliable, vec![2]).expect("send");
        let order: Vec<u8> = b.receive().into_iter().map(|p| p.bytes[0]).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_directions_are_independent() {
        let (a, b) = LoopbackTransport::pair();
        a.send(FrontlinesChannel::Reliable, vec![1]).expect("send");
        assert!(a.receive().is_empty());
        assert_eq!(b.receive().len(), 1);
    }

    #[test]
    fn test_closed_and_oversized() {
        let (a, b) = LoopbackTransport::pair_with_limit(4);
        assert!(matches!(
            a.send(FrontlinesChannel::Reliable, vec![0; 5]),
            Err(NetworkError::PacketTooLarge { size: 5, max: 4 })
        ));
        b.close();
        assert!(!a.is_open());
        assert!(a.send(FrontlinesChannel::Reliable, vec![0]).is_err());
    }

    #[test]
    fn test_hub_connects_only_to_listeners() {
        let hub = LoopbackHub::default();
        assert!(matches!(hub.connect(7777), Err(NetworkError::ConnectionRefused(7777))));

        hub.listen(7777);
        let client = hub.connect(7777).expect("connect");
        let shared = hub.clone();
        let pending = shared.take_pending(7777);
        assert_eq!(pending.len(), 1);
        assert!(hub.take_pending(7777).is_empty());

        client.send(FrontlinesChannel::Reliable, vec![9]).expect("send");
        assert_eq!(pending[0].receive().len(), 1);
    }

    #[test]
    fn test_unlisten_closes_pending() {
        let hub = LoopbackHub::default();
        hub.listen(7777);
        let client = hub.connect(7777).expect("connect");
        hub.unlisten(7777);
        assert!(!hub.is_listening(7777));
        assert!(!client.is_open());
    }

    #[test]
    fn test_bandwidth_window() {
        let mut tracker = BandwidthTracker::default();
        tracker.record_sent(1000);
        tracker.update(0.5);
        assert_eq!(tracker.bytes_per_sec_sent, 0.0);
        tracker.update(0.5);
        assert!((tracker.bytes_per_sec_sent - 300.0).abs() < 1e-9);
        assert_eq!(tracker.peak_sent, 1000.0);
    }
}
