use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use meshnow_crypto::ApplicationKey;
use meshnow_handshake::{BatchResult, HandshakeInitiator};
use meshnow_ota::{image_sha256, FakePartition, ImageReader, OtaInitiator, OtaResult};
use meshnow_transport::SimMedium;
use meshnow_wire::Mac;

use crate::context::NodeContext;

pub fn mac_for(index: u8) -> Mac {
    Mac::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, index])
}

/// Outcome of one end-to-end demo run: the handshake batch result, the OTA
/// batch result, and each responder's post-flash SHA for the caller to
/// check against the distributed image.
pub struct DemoReport {
    pub handshake: BatchResult,
    pub ota: OtaResult,
    pub responder_shas: Vec<(Mac, [u8; 16])>,
}

/// Runs a self-contained in-process mesh: one initiator and `responder_count`
/// responder nodes over a simulated radio, provisioning an application key
/// and then distributing a firmware image of `image_size` bytes end to end.
/// `base_dir` holds each node's file-backed `KeyValueStore`.
pub async fn run_demo(responder_count: usize, image_size: u32, base_dir: PathBuf) -> DemoReport {
    let medium = SimMedium::new();
    let pop = b"shared-proof-of-possession".to_vec();

    let initiator_ctx = NodeContext::spawn(&medium, mac_for(0), Vec::new(), &base_dir);

    let mut responder_ctxs = Vec::with_capacity(responder_count);
    for i in 0..responder_count {
        let ctx = NodeContext::spawn(&medium, mac_for(i as u8 + 1), vec![0u8; image_size as usize], &base_dir);
        ctx.install_responder_services(&pop);
        ctx.transport.add_peer(initiator_ctx.mac, None);
        initiator_ctx.transport.add_peer(ctx.mac, None);
        responder_ctxs.push(ctx);
    }

    let handshake_initiator = HandshakeInitiator::new(initiator_ctx.transport.clone(), pop.clone());
    let found = handshake_initiator.scan(Duration::from_millis(50)).await;
    tracing::info!(count = found.len(), "scan found responders");

    let app_key = ApplicationKey::generate();
    let handshake = handshake_initiator.provision(&found, &app_key).await;
    tracing::info!(
        successed = handshake.successed.len(),
        unfinished = handshake.unfinished.len(),
        "handshake batch complete"
    );

    initiator_ctx.transport.install_application_key(&app_key);
    initiator_ctx.transport.enable_secure_receive(true);

    let image: Vec<u8> = (0..image_size).map(|i| i as u8).collect();
    let sha256 = image_sha256(&image);
    let reader: Arc<dyn ImageReader> = Arc::new(FakePartition::new(image));

    let ota_initiator = OtaInitiator::new(initiator_ctx.transport.clone());
    let ota = ota_initiator.distribute(&handshake.successed, reader, image_size, sha256).await;
    tracing::info!(
        successed = ota.successed.len(),
        device_no_exist = ota.device_no_exist.len(),
        unfinished = ota.unfinished.len(),
        "ota batch complete"
    );

    let mut responder_shas = Vec::with_capacity(responder_ctxs.len());
    for ctx in &responder_ctxs {
        ctx.flash.promote_staged_to_running();
        responder_shas.push((ctx.mac, ctx.flash.running_sha256()));
    }

    DemoReport { handshake, ota, responder_shas }
}
