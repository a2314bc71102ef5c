use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use meshnow_crypto::{ctr_verifier, ecdh_shared_secret, ApplicationKey, EphemeralKeyPair};
use meshnow_transport::{RadioLink, RxMeta, Transport};
use meshnow_wire::mac::GROUP_SEC;
use meshnow_wire::{FrameConfig, Mac, PacketType};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::messages::HandshakeMsg;

/// Max responders handled per handshake round (spec §6 "Max batch per round: 100").
pub const BATCH_MAX: usize = 100;

/// Per-round timeout waiting for one handshake reply.
const ROUND_TIMEOUT: Duration = Duration::from_millis(500);

/// Population of an initiator's key-distribution run (spec §4.F "Results").
#[derive(Clone, Debug, Default)]
pub struct BatchResult {
    pub successed: Vec<Mac>,
    pub unfinished: Vec<Mac>,
    pub requested: Vec<Mac>,
}

/// Routes handshake replies arriving on `SecStatus`/`Sec` to the per-responder
/// channel awaiting them, the same shape as [`meshnow_transport::AckRegistry`]
/// but keyed by source MAC instead of magic.
struct ReplyRouter {
    channels: DashMap<Mac, mpsc::UnboundedSender<HandshakeMsg>>,
}

impl ReplyRouter {
    fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    fn register(&self, mac: Mac) -> mpsc::UnboundedReceiver<HandshakeMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.insert(mac, tx);
        rx
    }

    fn unregister(&self, mac: Mac) {
        self.channels.remove(&mac);
    }

    fn deliver(&self, src: Mac, msg: HandshakeMsg) {
        if let Some(tx) = self.channels.get(&src) {
            let _ = tx.send(msg);
        }
    }
}

/// Distributes a freshly generated application key to a batch of responders
/// (spec §4.F). One initiator keypair is generated per batch and broadcast
/// once via `CMD0`; the rest of the exchange (`RESP0`/`CMD1`/`RESP1`/`KEY`/
/// `KEY_RESP`) is unicast per responder because each responder's verifier
/// material differs.
pub struct HandshakeInitiator<R: RadioLink> {
    transport: Arc<Transport<R>>,
    pop: Vec<u8>,
    router: Arc<ReplyRouter>,
    scan_replies: Arc<Mutex<HashSet<Mac>>>,
}

impl<R: RadioLink + 'static> HandshakeInitiator<R> {
    /// Registers receive handlers for `SecStatus` (`INFO`) and `Sec`
    /// (everything else) on the given transport.
    pub fn new(transport: Arc<Transport<R>>, pop: impl Into<Vec<u8>>) -> Arc<Self> {
        let this = Arc::new(Self {
            transport: transport.clone(),
            pop: pop.into(),
            router: Arc::new(ReplyRouter::new()),
            scan_replies: Arc::new(Mutex::new(HashSet::new())),
        });

        let scan_replies = this.scan_replies.clone();
        transport.set_config_for_data_type(
            PacketType::SecStatus,
            true,
            Some(Arc::new(move |src: Mac, payload: &[u8], _rx: RxMeta| {
                if let Ok(HandshakeMsg::Info { .. }) = HandshakeMsg::decode(payload) {
                    scan_replies.lock().insert(src);
                }
            })),
        );

        let router = this.router.clone();
        transport.set_config_for_data_type(
            PacketType::Sec,
            true,
            Some(Arc::new(move |src: Mac, payload: &[u8], _rx: RxMeta| {
                if let Ok(msg) = HandshakeMsg::decode(payload) {
                    router.deliver(src, msg);
                }
            })),
        );

        this
    }

    /// Broadcasts `SCAN` up to 5 times and collects `INFO` replies for
    /// `round_timeout` after each (spec §4.F: "broadcast REQUEST repeated
    /// up to 5 times").
    pub async fn scan(&self, round_timeout: Duration) -> Vec<Mac> {
        self.scan_replies.lock().clear();
        for _ in 0..5 {
            let _ = self
                .transport
                .send(PacketType::SecStatus, Mac::BROADCAST, &HandshakeMsg::Scan.encode(), FrameConfig::default())
                .await;
            tokio::time::sleep(round_timeout).await;
        }
        self.scan_replies.lock().iter().copied().collect()
    }

    /// Runs the full provisioning protocol against `addrs`, split into
    /// batches of at most [`BATCH_MAX`] and retried `ceil(N/100) + 1` times
    /// (spec §4.F "retry count of `⌈N/100⌉ + 1 or 2`").
    pub async fn provision(&self, addrs: &[Mac], app_key: &ApplicationKey) -> BatchResult {
        let retry_count = (addrs.len() + BATCH_MAX - 1) / BATCH_MAX + 1;
        let mut result = BatchResult::default();
        let mut pending: Vec<Mac> = addrs.to_vec();

        for _ in 0..retry_count {
            if pending.is_empty() {
                break;
            }
            for chunk in pending.clone().chunks(BATCH_MAX) {
                let chunk_result = self.run_batch(chunk, app_key).await;
                result.successed.extend(chunk_result.successed.iter().copied());
                result.requested.extend(chunk_result.requested.iter().copied());
            }
            pending.retain(|m| !result.successed.contains(m));
        }
        result.unfinished = pending;
        result
    }

    async fn run_batch(&self, addrs: &[Mac], app_key: &ApplicationKey) -> BatchResult {
        let payload = meshnow_wire::group::GroupUpdate::encode(GROUP_SEC, addrs);
        if let Err(e) = self.transport.send(PacketType::Group, Mac::BROADCAST, &payload, FrameConfig::default()).await {
            tracing::warn!(error = ?e, "failed to broadcast SEC group membership update");
        }

        let keypair = EphemeralKeyPair::generate();
        let q_c = keypair.public_bytes();

        let mut receivers = Vec::with_capacity(addrs.len());
        for &addr in addrs {
            receivers.push((addr, self.router.register(addr)));
        }

        let group_cfg = FrameConfig {
            group: true,
            broadcast: true,
            ..Default::default()
        };
        if let Err(e) = self
            .transport
            .send(PacketType::Sec, GROUP_SEC, &HandshakeMsg::Cmd0 { q_c }.encode(), group_cfg)
            .await
        {
            tracing::warn!(error = ?e, "failed to broadcast CMD0, batch will time out");
        }

        let mut result = BatchResult::default();
        for (addr, mut rx) in receivers {
            let outcome = self.drive_responder(addr, &keypair, q_c, app_key, &mut rx).await;
            self.router.unregister(addr);
            match outcome {
                Some(true) => result.successed.push(addr),
                Some(false) => result.requested.push(addr),
                None => {}
            }
        }
        result
    }

    /// Returns `Some(true)` on `KEY_RESP`, `Some(false)` if a reply was seen
    /// but the exchange did not finish, `None` on total silence.
    async fn drive_responder(
        &self,
        addr: Mac,
        keypair: &EphemeralKeyPair,
        q_c: [u8; 32],
        app_key: &ApplicationKey,
        rx: &mut mpsc::UnboundedReceiver<HandshakeMsg>,
    ) -> Option<bool> {
        let resp0 = tokio::time::timeout(ROUND_TIMEOUT, rx.recv()).await.ok().flatten()?;
        let (q_d, rand_d) = match resp0 {
            HandshakeMsg::Resp0 { q_d, rand_d } => (q_d, rand_d),
            _ => return Some(false),
        };

        let k = ecdh_shared_secret(keypair, &q_d, &self.pop);
        let check_c_vec = ctr_verifier(&k, &rand_d, &q_d);
        let mut check_c = [0u8; 32];
        check_c.copy_from_slice(&check_c_vec);
        let _ = self
            .transport
            .send(PacketType::Sec, addr, &HandshakeMsg::Cmd1 { check_c }.encode(), FrameConfig::default())
            .await;

        let resp1 = tokio::time::timeout(ROUND_TIMEOUT, rx.recv()).await.ok().flatten();
        let check_d = match resp1 {
            Some(HandshakeMsg::Resp1 { check_d }) => check_d,
            _ => return Some(false),
        };
        let expect_vec = ctr_verifier(&k, &rand_d, &q_c);
        if expect_vec != check_d {
            tracing::warn!(%addr, "RESP1 verifier mismatch, abandoning responder");
            return Some(false);
        }

        let enc_vec = ctr_verifier(&k, &rand_d, &app_key.to_bytes());
        let mut enc_app_key = [0u8; 48];
        enc_app_key.copy_from_slice(&enc_vec);
        let _ = self
            .transport
            .send(PacketType::Sec, addr, &HandshakeMsg::Key { enc_app_key }.encode(), FrameConfig::default())
            .await;

        match tokio::time::timeout(ROUND_TIMEOUT, rx.recv()).await.ok().flatten() {
            Some(HandshakeMsg::KeyResp) => Some(true),
            _ => Some(false),
        }
    }
}
