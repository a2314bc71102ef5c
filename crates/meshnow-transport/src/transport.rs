use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshnow_crypto::{ApplicationKey, SecuritySession};
use meshnow_wire::header::{CHANNEL_ALL, FORWARD_TTL_UNLIMITED};
use meshnow_wire::{DuplicateCache, FrameConfig, FrameHead, FramedPacket, GroupTable, Mac, PacketType, PeerTable};
use parking_lot::{Mutex as PlMutex, RwLock as PlRwLock};
use tokio::sync::{mpsc, Mutex as TokioMutex, Semaphore};

use crate::ack::AckRegistry;
use crate::config::{ConfigTable, NodeEvent, PacketHandler};
use crate::error::TransportError;
use crate::radio::{Country, RadioLink, RxMeta, SendOutcome};

/// One inbound frame as handed up by the radio adapter: source MAC, raw
/// on-wire bytes, and the RX control block (spec §4.C).
pub type RxEvent = (Mac, Vec<u8>, RxMeta);

/// Tunables spec leaves as named constants rather than fixed numbers.
#[derive(Clone, Copy, Debug)]
pub struct TransportConfig {
    /// Bound on `send_mutex.acquire` (spec §5).
    pub send_mutex_timeout: Duration,
    /// Bound on the send-complete wait (spec §4.D `send_max_timeout`).
    pub send_max_timeout: Duration,
    /// Cap on simultaneous in-flight unacknowledged sends, spec §3
    /// `InFlightCounter`: "bounded by half the link-layer TX buffer capacity".
    pub inflight_cap: usize,
    /// Upper bound in ms on the `2 * 2^k` ACK polling backoff (spec §4.D).
    pub ack_backoff_cap_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_mutex_timeout: Duration::from_millis(500),
            send_max_timeout: Duration::from_millis(200),
            inflight_cap: 16,
            ack_backoff_cap_ms: 100,
        }
    }
}

/// The transport core (spec §4.D), radio adapter owner (§4.C), and event/
/// config facade (§4.H), all bundled behind one shared handle the way the
/// teacher threads a single context struct through every API call (spec §9).
pub struct Transport<R: RadioLink> {
    self_mac: Mac,
    radio: Arc<R>,
    pub peers: Arc<PeerTable>,
    pub groups: Arc<GroupTable>,
    dedupe: PlMutex<DuplicateCache>,
    pub config: Arc<ConfigTable>,
    ack: Arc<AckRegistry>,
    send_mutex: TokioMutex<()>,
    inflight: Arc<Semaphore>,
    events_tx: mpsc::UnboundedSender<NodeEvent>,
    security: PlRwLock<Option<Arc<SecuritySession>>>,
    secure_receive_enabled: AtomicBool,
    forwarding_enabled: AtomicBool,
    cfg: TransportConfig,
}

impl<R: RadioLink + 'static> Transport<R> {
    pub fn new(self_mac: Mac, radio: Arc<R>, events_tx: mpsc::UnboundedSender<NodeEvent>, cfg: TransportConfig) -> Arc<Self> {
        Arc::new(Self {
            self_mac,
            radio,
            peers: Arc::new(PeerTable::new()),
            groups: Arc::new(GroupTable::new()),
            dedupe: PlMutex::new(DuplicateCache::new()),
            config: Arc::new(ConfigTable::new()),
            ack: Arc::new(AckRegistry::new()),
            send_mutex: TokioMutex::new(()),
            inflight: Arc::new(Semaphore::new(cfg.inflight_cap)),
            events_tx,
            security: PlRwLock::new(None),
            secure_receive_enabled: AtomicBool::new(false),
            forwarding_enabled: AtomicBool::new(true),
            cfg,
        })
    }

    pub fn self_mac(&self) -> Mac {
        self.self_mac
    }

    pub fn radio(&self) -> &Arc<R> {
        &self.radio
    }

    /// Spawns the single-threaded `main_task` (spec §5) that drains the
    /// radio's receive channel and runs the full receive path.
    pub fn spawn(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<RxEvent>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some((src, bytes, rx_meta)) = rx.recv().await {
                this.clone().handle_inbound(src, bytes, rx_meta).await;
            }
        })
    }

    pub fn add_peer(&self, addr: Mac, lmk: Option<[u8; 16]>) {
        self.peers.add_peer(addr, lmk);
        self.radio.add_peer(addr, lmk);
    }

    pub fn del_peer(&self, addr: Mac) {
        self.peers.del_peer(addr);
        self.radio.remove_peer(addr);
    }

    pub fn install_application_key(&self, key: &ApplicationKey) {
        *self.security.write() = Some(Arc::new(SecuritySession::new(key)));
    }

    pub fn enable_secure_receive(&self, enabled: bool) {
        self.secure_receive_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_forwarding_enabled(&self, enabled: bool) {
        self.forwarding_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_config_for_data_type(&self, packet_type: PacketType, enabled: bool, handler: Option<Arc<dyn PacketHandler>>) {
        self.config.set(packet_type, enabled, handler);
    }

    pub fn emit(&self, event: NodeEvent) {
        tracing::debug!(?event, "node event");
        let _ = self.events_tx.send(event);
    }

    /// Public send API (spec §4.D send path).
    pub async fn send(self: &Arc<Self>, packet_type: PacketType, dest: Mac, payload: &[u8], mut cfg: FrameConfig) -> Result<SendOutcome, TransportError> {
        cfg.broadcast = cfg.broadcast || dest.is_broadcast();
        if !cfg.broadcast && !self.peers.contains(dest) {
            return Err(TransportError::UnknownPeer);
        }

        let framed_payload = self.maybe_encrypt(packet_type, &mut cfg, payload)?;
        let (wire, packet) = FramedPacket::encode(packet_type, dest, self.self_mac, &framed_payload, cfg)
            .map_err(|_| TransportError::InvalidArg)?;

        let magic = packet.head.magic;
        let ack_wanted = packet.head.ack && !dest.is_broadcast();

        let _lock = tokio::time::timeout(self.cfg.send_mutex_timeout, self.send_mutex.lock())
            .await
            .map_err(|_| TransportError::Timeout)?;

        Ok(self
            .send_with_channel_iteration(packet.head, dest, &wire, magic, ack_wanted)
            .await)
    }

    fn maybe_encrypt(&self, packet_type: PacketType, cfg: &mut FrameConfig, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        if packet_type.bypasses_encryption() || !cfg.security {
            cfg.security = false;
            return Ok(payload.to_vec());
        }
        let guard = self.security.read();
        match &*guard {
            Some(session) => Ok(session.auth_encrypt(payload)),
            None => Err(TransportError::InvalidArg),
        }
    }

    /// Iterates every country channel when `head.channel == ALL` and this
    /// node is not itself acting as an AP (spec §4.D); otherwise sets the
    /// requested channel once and sends.
    async fn send_with_channel_iteration(self: &Arc<Self>, head: FrameHead, dest: Mac, wire: &[u8], magic: u16, ack_wanted: bool) -> SendOutcome {
        if head.channel == CHANNEL_ALL {
            let country = self.radio.country();
            let mut last = SendOutcome::Fail;
            for i in 0..country.num_channels {
                self.radio.set_channel(country.start_channel + i, 0);
                last = self.attempt_once(dest, head.broadcast, wire, head.retransmit_count, magic, ack_wanted).await;
            }
            last
        } else {
            if head.channel != 0 && head.channel != self.radio.current_channel() {
                self.radio.set_channel(head.channel, 0);
            }
            self.attempt_once(dest, head.broadcast, wire, head.retransmit_count, magic, ack_wanted).await
        }
    }

    /// Retransmit loop for one already-framed packet (spec §4.D `attempt_once`).
    async fn attempt_once(self: &Arc<Self>, dest: Mac, broadcast: bool, wire: &[u8], retransmit_count: u8, magic: u16, ack_wanted: bool) -> SendOutcome {
        let mut attempt = 0u32;
        let mut remaining = retransmit_count;
        while remaining > 0 {
            remaining -= 1;
            let permit = self.inflight.clone().acquire_owned().await.expect("semaphore never closed");
            let send_fut = self.radio.send_one(dest, broadcast, wire.to_vec());
            let outcome = tokio::time::timeout(self.cfg.send_max_timeout, send_fut).await;
            drop(permit);

            let outcome = match outcome {
                Err(_) => SendOutcome::Timeout,
                Ok(o) => o,
            };

            match outcome {
                SendOutcome::Fail => {
                    if remaining == 0 {
                        return SendOutcome::Fail;
                    }
                }
                SendOutcome::Timeout => {
                    if remaining == 0 {
                        return SendOutcome::Timeout;
                    }
                }
                SendOutcome::Ok => {
                    if !ack_wanted {
                        return SendOutcome::Ok;
                    }
                    let backoff_ms = (2u64 * (1u64 << attempt.min(5))).min(self.cfg.ack_backoff_cap_ms);
                    if self.ack.wait_for(magic, Duration::from_millis(backoff_ms)).await {
                        return SendOutcome::Ok;
                    }
                    if remaining == 0 {
                        return SendOutcome::Timeout;
                    }
                }
            }
            attempt += 1;
        }
        if ack_wanted {
            SendOutcome::Timeout
        } else {
            SendOutcome::Fail
        }
    }

    /// Full receive path, spec §4.D steps 1-9.
    async fn handle_inbound(self: Arc<Self>, _src: Mac, bytes: Vec<u8>, rx_meta: RxMeta) {
        let packet = match FramedPacket::decode(&bytes, self.self_mac) {
            Ok(p) => p,
            Err(e) => {
                tracing::trace!(%e, "dropping invalid frame");
                return;
            }
        };
        let head = packet.head;

        if head.filter_adjacent_channel && rx_meta.channel != head.channel {
            return;
        }
        if head.filter_weak_signal && rx_meta.rssi < head.forward_rssi {
            return;
        }
        if head.security && !self.secure_receive_enabled.load(Ordering::Relaxed) {
            return;
        }

        if self.dedupe.lock().is_duplicate(packet.packet_type as u8, head.magic, head.security) {
            return;
        }

        let plaintext = if head.security && !packet.packet_type.bypasses_encryption() {
            let guard = self.security.read();
            match &*guard {
                Some(session) => match session.auth_decrypt(&packet.payload) {
                    Ok(pt) => pt,
                    Err(_) => {
                        tracing::warn!("AEAD verification failed, dropping secure frame");
                        return;
                    }
                },
                None => return,
            }
        } else {
            packet.payload.clone()
        };

        let is_for_me = packet.dest_addr == self.self_mac;
        let enabled = self.config.is_enabled(packet.packet_type);

        if enabled && head.ack && is_for_me && packet.packet_type != PacketType::Ack {
            self.enqueue_ack(packet.src_addr, head.magic);
        }

        self.route(&packet, &plaintext, is_for_me, enabled, rx_meta);

        if self.forwarding_enabled.load(Ordering::Relaxed) && head.broadcast && head.forward_ttl > 0 && (rx_meta.rssi as i32) >= (head.forward_rssi as i32) {
            self.enqueue_forward(head, packet.dest_addr, bytes);
        }

        self.dedupe.lock().record(packet.packet_type as u8, head.magic, head.security);
    }

    fn route(&self, packet: &FramedPacket, plaintext: &[u8], is_for_me: bool, enabled: bool, rx_meta: RxMeta) {
        match packet.packet_type {
            PacketType::Ack => {
                if is_for_me {
                    self.ack.deliver(packet.head.magic);
                }
            }
            PacketType::Group => {
                if let Some((gid, addrs)) = meshnow_wire::group::GroupUpdate::decode(plaintext) {
                    if meshnow_wire::group::GroupUpdate::targets(&addrs, self.self_mac) {
                        self.groups.join(gid);
                    }
                }
            }
            other => {
                if !enabled {
                    return;
                }
                let deliver_locally = if packet.head.group {
                    self.groups.is_my_group(packet.dest_addr)
                } else {
                    is_for_me || (packet.head.broadcast && packet.dest_addr.is_broadcast())
                };
                if deliver_locally {
                    self.config.dispatch(other, packet.src_addr, plaintext, rx_meta);
                }
            }
        }
    }

    /// `magic` must be the magic of the packet being acknowledged: the
    /// sender correlates an incoming `ACK` back to its own pending send by
    /// magic alone (spec §4.D `AckRegistry`).
    fn enqueue_ack(self: &Arc<Self>, dest: Mac, magic: u16) {
        let this = self.clone();
        tokio::spawn(async move {
            let cfg = FrameConfig {
                ack: false,
                broadcast: true,
                retransmit_count: 1,
                magic,
                ..Default::default()
            };
            let _ = this.send(PacketType::Ack, dest, &[], cfg).await;
        });
    }

    fn enqueue_forward(self: &Arc<Self>, head: FrameHead, dest: Mac, mut raw_bytes: Vec<u8>) {
        let mut new_head = head;
        if new_head.forward_ttl != FORWARD_TTL_UNLIMITED {
            new_head.forward_ttl -= 1;
        }
        let mut head_bytes = [0u8; 6];
        new_head.pack(&mut head_bytes);
        raw_bytes[2..8].copy_from_slice(&head_bytes);

        let this = self.clone();
        tokio::spawn(async move {
            let _lock = this.send_mutex.lock().await;
            if new_head.channel == CHANNEL_ALL {
                let country = this.radio.country();
                for i in 0..country.num_channels {
                    this.radio.set_channel(country.start_channel + i, 0);
                    this.radio.send_one(dest, true, raw_bytes.clone()).await;
                }
            } else {
                this.radio.send_one(dest, true, raw_bytes).await;
            }
        });
    }

    pub async fn set_group(self: &Arc<Self>, id: Mac, addrs: &[Mac], enable: bool) -> Result<SendOutcome, TransportError> {
        if enable {
            self.groups.join(id);
        } else {
            self.groups.leave(id);
        }
        let payload = meshnow_wire::group::GroupUpdate::encode(id, addrs);
        self.send(PacketType::Group, Mac::BROADCAST, &payload, FrameConfig::default()).await
    }
}

/// Exposes [`Country`] for crates that build their own `RadioLink`.
pub fn default_country() -> Country {
    Country::default()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use meshnow_crypto::ApplicationKey;
    use parking_lot::Mutex as PlMutex2;
    use tokio::sync::mpsc;

    use super::*;
    use crate::sim::{SimMedium, SimRadio};

    /// `RadioLink` that hands every `send_one` straight to a captured slot
    /// instead of a medium, so a test can grab the exact wire bytes one
    /// `Transport::send` produced and replay them into another transport's
    /// `handle_inbound` without a second node's event loop in the way.
    struct CapturingRadio {
        last_sent: PlMutex2<Option<Vec<u8>>>,
    }

    impl CapturingRadio {
        fn new() -> Self {
            Self { last_sent: PlMutex2::new(None) }
        }
    }

    #[async_trait]
    impl RadioLink for CapturingRadio {
        async fn send_one(&self, _dest: Mac, _broadcast: bool, bytes: Vec<u8>) -> SendOutcome {
            *self.last_sent.lock() = Some(bytes);
            SendOutcome::Ok
        }
        fn add_peer(&self, _addr: Mac, _lmk: Option<[u8; 16]>) {}
        fn remove_peer(&self, _addr: Mac) {}
        fn set_channel(&self, _primary: u8, _secondary: u8) {}
        fn current_channel(&self) -> u8 {
            1
        }
        fn country(&self) -> Country {
            Country { start_channel: 1, num_channels: 1 }
        }
    }

    fn mac(b: u8) -> Mac {
        Mac::new([b; 6])
    }

    fn rx_meta() -> RxMeta {
        RxMeta { channel: 1, secondary_channel: 0, rssi: -40 }
    }

    fn new_transport_over(radio: Arc<CapturingRadio>, self_mac: Mac) -> (Arc<Transport<CapturingRadio>>, mpsc::UnboundedReceiver<NodeEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (Transport::new(self_mac, radio, events_tx, TransportConfig::default()), events_rx)
    }

    /// Scenario S1: the same broadcast frame arriving twice (e.g. over two
    /// forwarding paths) is delivered to the local handler exactly once.
    #[tokio::test]
    async fn broadcast_duplicate_is_delivered_once() {
        let radio = Arc::new(CapturingRadio::new());
        let (transport, _events) = new_transport_over(radio.clone(), mac(1));

        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        transport.set_config_for_data_type(
            PacketType::Data,
            true,
            Some(Arc::new(move |_src: Mac, _payload: &[u8], _rx: RxMeta| {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        );

        let (wire, _packet) = FramedPacket::encode(PacketType::Data, Mac::BROADCAST, mac(9), b"hello", FrameConfig { broadcast: true, ..Default::default() }).unwrap();

        transport.clone().handle_inbound(mac(9), wire.clone(), rx_meta()).await;
        transport.clone().handle_inbound(mac(9), wire, rx_meta()).await;

        assert_eq!(received.load(Ordering::Relaxed), 1);
    }

    /// Scenario S2: the first link-layer transmission is dropped; the sender
    /// retries and the retransmission is ACKed.
    #[tokio::test]
    async fn unicast_send_survives_a_dropped_first_transmission() {
        let medium = SimMedium::new();
        let a_mac = mac(1);
        let b_mac = mac(2);

        let (radio_a, rx_a) = SimRadio::new(medium.clone(), a_mac);
        let dropped_first = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let drop_flag = dropped_first.clone();
        radio_a.set_failure_hook(move |_bytes| !drop_flag.swap(true, Ordering::SeqCst));
        let (events_tx_a, _events_a) = mpsc::unbounded_channel();
        let transport_a = Transport::new(a_mac, radio_a, events_tx_a, TransportConfig::default());
        transport_a.spawn(rx_a);
        transport_a.add_peer(b_mac, None);

        let (radio_b, rx_b) = SimRadio::new(medium.clone(), b_mac);
        let (events_tx_b, _events_b) = mpsc::unbounded_channel();
        let transport_b = Transport::new(b_mac, radio_b, events_tx_b, TransportConfig::default());
        transport_b.spawn(rx_b);
        transport_b.add_peer(a_mac, None);
        transport_b.set_config_for_data_type(PacketType::Data, true, Some(Arc::new(|_: Mac, _: &[u8], _: RxMeta| {})));

        let outcome = transport_a.send(PacketType::Data, b_mac, b"payload", FrameConfig { ack: true, ..Default::default() }).await.unwrap();
        assert_eq!(outcome, SendOutcome::Ok);
        assert!(dropped_first.load(Ordering::SeqCst));
    }

    /// Scenario S6: a secure frame replayed verbatim is dropped by the
    /// secure duplicate cache, which is independent of the plaintext one.
    #[tokio::test]
    async fn secure_frame_replay_is_dropped_by_the_secure_dedupe_cache() {
        let radio_a = Arc::new(CapturingRadio::new());
        let (transport_a, _events_a) = new_transport_over(radio_a.clone(), mac(1));
        let app_key = ApplicationKey::generate();
        transport_a.install_application_key(&app_key);

        transport_a.add_peer(mac(2), None);
        transport_a
            .send(PacketType::Data, mac(2), b"secret", FrameConfig { security: true, ..Default::default() })
            .await
            .unwrap();
        let wire = radio_a.last_sent.lock().clone().expect("a frame was sent");

        let radio_b = Arc::new(CapturingRadio::new());
        let (transport_b, _events_b) = new_transport_over(radio_b, mac(2));
        transport_b.install_application_key(&app_key);
        transport_b.enable_secure_receive(true);

        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        transport_b.set_config_for_data_type(
            PacketType::Data,
            true,
            Some(Arc::new(move |_src: Mac, _payload: &[u8], _rx: RxMeta| {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        );

        transport_b.clone().handle_inbound(mac(1), wire.clone(), rx_meta()).await;
        transport_b.clone().handle_inbound(mac(1), wire, rx_meta()).await;

        assert_eq!(received.load(Ordering::Relaxed), 1);
    }
}
