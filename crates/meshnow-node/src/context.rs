use std::path::Path;
use std::sync::Arc;

use meshnow_crypto::KeyValueStore;
use meshnow_handshake::ResponderService;
use meshnow_ota::{FakePartition, OtaResponderService};
use meshnow_transport::{SimMedium, SimRadio, Transport, TransportConfig};
use meshnow_wire::Mac;
use tokio::sync::mpsc;

use crate::file_store::FileStore;

/// One simulated node: its transport, its key-value store, and (for
/// responder nodes) the flash image it is provisioned against. Bundled the
/// way a real firmware's `app_main` would bundle its own node state, but
/// scoped to what the demo binary needs to drive a handshake/OTA round-trip
/// over [`SimMedium`] instead of real radio hardware.
pub struct NodeContext {
    pub mac: Mac,
    pub transport: Arc<Transport<SimRadio>>,
    pub kv: Arc<FileStore>,
    pub flash: Arc<FakePartition>,
}

impl NodeContext {
    /// `base_dir` is the demo run's scratch directory; each node gets its own
    /// `node-<mac>` subdirectory, the way `DataDir::open` scopes one node's
    /// on-disk state to its own home directory.
    pub fn spawn(medium: &Arc<SimMedium>, mac: Mac, flash_image: Vec<u8>, base_dir: &Path) -> Self {
        let (radio, rx) = SimRadio::new(medium.clone(), mac);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let transport = Transport::new(mac, radio, events_tx, TransportConfig::default());
        transport.spawn(rx);

        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                tracing::info!(?event, "node event");
            }
        });

        let node_dir = base_dir.join(format!("node-{mac}"));
        let kv = Arc::new(FileStore::open(&node_dir).expect("demo scratch directory is writable"));

        Self {
            mac,
            transport,
            kv,
            flash: Arc::new(FakePartition::new(flash_image)),
        }
    }

    /// Installs the responder halves of the handshake and OTA protocols on
    /// this node, the way a device's boot sequence would register both
    /// before joining the mesh.
    pub fn install_responder_services(&self, pop: &[u8]) {
        ResponderService::install(self.transport.clone(), pop.to_vec());
        OtaResponderService::install(self.transport.clone(), self.flash.clone(), self.kv.clone() as Arc<dyn KeyValueStore>);
    }
}
