use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use meshnow_wire::Mac;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::radio::{Country, RadioLink, RxMeta, SendOutcome};

pub type RxChannel = mpsc::UnboundedReceiver<(Mac, Vec<u8>, RxMeta)>;

/// A shared in-process "air" that several [`SimRadio`]s subscribe to. Not a
/// physical-layer simulation — it only exists to exercise the send/receive/
/// ACK/forward state machine end to end without real hardware (spec §4.C
/// re-architecture hint: "isolate behind a trait").
#[derive(Default)]
pub struct SimMedium {
    subscribers: DashMap<Mac, mpsc::UnboundedSender<(Mac, Vec<u8>, RxMeta)>>,
}

impl SimMedium {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, mac: Mac) -> RxChannel {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(mac, tx);
        rx
    }

    fn deliver(&self, src: Mac, dest: Mac, broadcast: bool, bytes: Vec<u8>, rx: RxMeta) {
        if broadcast {
            for entry in self.subscribers.iter() {
                if *entry.key() != src {
                    let _ = entry.value().send((src, bytes.clone(), rx));
                }
            }
        } else if let Some(tx) = self.subscribers.get(&dest) {
            let _ = tx.send((src, bytes, rx));
        }
    }
}

/// Test/demo [`RadioLink`] backed by a [`SimMedium`]. Reports a fixed RSSI
/// for every delivered frame unless overridden, and supports an injectable
/// failure hook so tests can model a dropped first transmission (spec
/// scenario S2).
pub struct SimRadio {
    medium: Arc<SimMedium>,
    self_mac: Mac,
    channel: AtomicU8,
    country: Country,
    rssi: i8,
    peers: DashSet<Mac>,
    #[allow(clippy::type_complexity)]
    failure_hook: Mutex<Option<Box<dyn Fn(&[u8]) -> bool + Send + Sync>>>,
}

impl SimRadio {
    pub fn new(medium: Arc<SimMedium>, self_mac: Mac) -> (Arc<Self>, RxChannel) {
        let rx = medium.register(self_mac);
        let radio = Arc::new(Self {
            medium,
            self_mac,
            channel: AtomicU8::new(1),
            country: Country::default(),
            rssi: -40,
            peers: DashSet::new(),
            failure_hook: Mutex::new(None),
        });
        (radio, rx)
    }

    pub fn set_rssi(&mut self, rssi: i8) {
        self.rssi = rssi;
    }

    /// Installs a predicate invoked with the raw on-wire bytes before every
    /// send; returning `true` simulates a link-layer send failure.
    pub fn set_failure_hook(&self, hook: impl Fn(&[u8]) -> bool + Send + Sync + 'static) {
        *self.failure_hook.lock() = Some(Box::new(hook));
    }
}

#[async_trait]
impl RadioLink for SimRadio {
    async fn send_one(&self, dest: Mac, broadcast: bool, bytes: Vec<u8>) -> SendOutcome {
        let should_fail = self.failure_hook.lock().as_ref().map(|h| h(&bytes)).unwrap_or(false);
        if should_fail {
            return SendOutcome::Fail;
        }
        let rx_meta = RxMeta {
            channel: self.channel.load(Ordering::Relaxed),
            secondary_channel: 0,
            rssi: self.rssi,
        };
        self.medium.deliver(self.self_mac, dest, broadcast, bytes, rx_meta);
        SendOutcome::Ok
    }

    fn add_peer(&self, addr: Mac, _lmk: Option<[u8; 16]>) {
        self.peers.insert(addr);
    }

    fn remove_peer(&self, addr: Mac) {
        self.peers.remove(&addr);
    }

    fn set_channel(&self, primary: u8, _secondary: u8) {
        self.channel.store(primary, Ordering::Relaxed);
    }

    fn current_channel(&self) -> u8 {
        self.channel.load(Ordering::Relaxed)
    }

    fn country(&self) -> Country {
        self.country
    }
}
