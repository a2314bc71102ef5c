use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use meshnow_transport::{NodeEvent, RadioLink, RxMeta, Transport};
use meshnow_wire::mac::GROUP_OTA;
use meshnow_wire::{FrameConfig, Mac, PacketType};
use tokio::sync::mpsc;

use crate::bitmap::Bitmap;
use crate::chunk::{chunk_len, packet_num, CHUNK_SIZE};
use crate::messages::{DataMsg, StatusCode, StatusMsg};
use crate::partition::ImageReader;

/// Polling rounds before giving up on a batch (spec §4.G pseudocode
/// "loop up to `CONFIG_RETRY_COUNT` times").
const CONFIG_RETRY_COUNT: u32 = 8;

/// How long the initiator waits for a single responder's `STATUS` reply in
/// one polling round.
const POLL_TIMEOUT: Duration = Duration::from_millis(800);

/// Outcome of an OTA batch (spec §4.G "Termination": `SUCCESS`,
/// `DEVICE_NO_EXIST`, `INCOMPLETE`).
#[derive(Clone, Debug, Default)]
pub struct OtaResult {
    pub successed: Vec<Mac>,
    pub device_no_exist: Vec<Mac>,
    pub unfinished: Vec<Mac>,
}

/// Drives firmware distribution to a batch of responders: opens group `OTA`,
/// polls `STATUS` to learn which chunks are still missing anywhere in the
/// batch, and sends only those chunks (spec §4.G pseudocode).
pub struct OtaInitiator<R: RadioLink> {
    transport: Arc<Transport<R>>,
    status_replies: Arc<DashMap<Mac, mpsc::UnboundedSender<StatusMsg>>>,
}

impl<R: RadioLink + 'static> OtaInitiator<R> {
    pub fn new(transport: Arc<Transport<R>>) -> Arc<Self> {
        let this = Arc::new(Self {
            transport: transport.clone(),
            status_replies: Arc::new(DashMap::new()),
        });

        let replies = this.status_replies.clone();
        transport.set_config_for_data_type(
            PacketType::OtaStatus,
            true,
            Some(Arc::new(move |src: Mac, payload: &[u8], _rx: RxMeta| {
                if let Ok(msg) = StatusMsg::decode(payload) {
                    if let Some(tx) = replies.get(&src) {
                        let _ = tx.send(msg);
                    }
                }
            })),
        );

        this
    }

    /// Distributes `image` (already at rest behind `reader`, `total_size`
    /// bytes, identified by `sha256`) to `addrs`.
    ///
    /// Responders whose reported bitmap window never progresses beyond
    /// `progress_index == 0` are handled; a single 200-byte stripe only
    /// windows 1600 chunks (≈ 361 KiB at the 226-byte chunk size), which
    /// covers every image this mesh actually distributes.
    pub async fn distribute(
        &self,
        addrs: &[Mac],
        reader: Arc<dyn ImageReader>,
        total_size: u32,
        sha256: [u8; 16],
    ) -> OtaResult {
        if addrs.is_empty() {
            return OtaResult::default();
        }
        let total_chunks = packet_num(total_size);

        let _ = self.transport.set_group(GROUP_OTA, addrs, true).await;
        self.transport.emit(NodeEvent::OtaStarted { responders: addrs.len() });

        let mut receivers = Vec::with_capacity(addrs.len());
        for &addr in addrs {
            let (tx, rx) = mpsc::unbounded_channel();
            self.status_replies.insert(addr, tx);
            receivers.push((addr, rx));
        }

        let mut accumulator = Bitmap::ones(total_chunks as usize);
        let mut alive: HashSet<Mac> = addrs.iter().copied().collect();
        let mut finished: HashSet<Mac> = HashSet::new();

        for _round in 0..CONFIG_RETRY_COUNT {
            let probe = StatusMsg {
                sha256,
                error_code: StatusCode::InProgress,
                packet_num: total_chunks,
                total_size,
                written_size: 0,
                progress_index: 0,
                stripe: None,
            };
            let group_cfg = FrameConfig { group: true, broadcast: true, ..Default::default() };
            let _ = self.transport.send(PacketType::OtaStatus, GROUP_OTA, &probe.encode(), group_cfg).await;

            for (addr, rx) in receivers.iter_mut() {
                if finished.contains(addr) || !alive.contains(addr) {
                    continue;
                }
                match tokio::time::timeout(POLL_TIMEOUT, rx.recv()).await {
                    Ok(Some(msg)) => match msg.error_code {
                        StatusCode::Finish => {
                            finished.insert(*addr);
                        }
                        StatusCode::Stop => {
                            alive.remove(addr);
                        }
                        StatusCode::InProgress | StatusCode::FirmwareNotInit => {
                            if let Some(stripe) = msg.stripe {
                                accumulator.and_merge_stripe(&stripe, msg.progress_index as usize);
                            } else {
                                // A freshly opened job has no bitmap detail yet;
                                // nothing is known to be missing for it beyond
                                // "everything", which is the accumulator's
                                // starting state.
                            }
                        }
                    },
                    _ => {
                        alive.remove(addr);
                    }
                }
            }

            if finished.len() + addrs.len().saturating_sub(alive.len()) >= addrs.len() {
                break;
            }

            for seq in 0..total_chunks {
                if accumulator.is_set(seq as usize) {
                    continue;
                }
                let len = chunk_len(seq, total_size);
                let mut buf = vec![0u8; len];
                if reader.read(seq as u32 * CHUNK_SIZE as u32, &mut buf).is_err() {
                    continue;
                }
                let msg = DataMsg { seq, data: buf };
                let data_cfg = FrameConfig { group: true, broadcast: true, ..Default::default() };
                let _ = self.transport.send(PacketType::OtaData, GROUP_OTA, &msg.encode(), data_cfg).await;
            }
        }

        for addr in addrs {
            self.status_replies.remove(addr);
        }

        let device_no_exist: Vec<Mac> = addrs.iter().copied().filter(|a| !alive.contains(a)).collect();
        let unfinished: Vec<Mac> = addrs
            .iter()
            .copied()
            .filter(|a| alive.contains(a) && !finished.contains(a))
            .collect();

        OtaResult {
            successed: finished.into_iter().collect(),
            device_no_exist,
            unfinished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{image_sha256, FakePartition};
    use meshnow_crypto::InMemoryStore;
    use meshnow_transport::{SimMedium, SimRadio, TransportConfig};
    use meshnow_wire::Mac;
    use std::sync::Arc as StdArc;
    use tokio::sync::mpsc as tmpsc;

    fn mac(byte: u8) -> Mac {
        Mac::new([byte; 6])
    }

    async fn node(medium: &StdArc<SimMedium>, addr: Mac) -> Arc<Transport<SimRadio>> {
        let (radio, rx) = SimRadio::new(medium.clone(), addr);
        let (events_tx, _events_rx) = tmpsc::unbounded_channel();
        let transport = Transport::new(addr, radio, events_tx, TransportConfig::default());
        transport.spawn(rx);
        transport
    }

    #[tokio::test]
    async fn batch_distributes_full_image_to_all_responders() {
        let medium = SimMedium::new();
        let init_mac = mac(1);
        let resp_macs = [mac(2), mac(3), mac(4)];

        let init_transport = node(&medium, init_mac).await;
        for m in resp_macs {
            init_transport.add_peer(m, None);
        }

        let image = (0..10_000u32).map(|i| i as u8).collect::<Vec<u8>>();
        let sha256 = image_sha256(&image);

        let mut responders = Vec::new();
        for m in resp_macs {
            let transport = node(&medium, m).await;
            transport.add_peer(init_mac, None);
            let writer = StdArc::new(FakePartition::new(vec![0u8; image.len()]));
            let kv = StdArc::new(InMemoryStore::new());
            let _service = crate::service::OtaResponderService::install(transport.clone(), writer.clone(), kv);
            responders.push((transport, writer));
        }

        let reader: StdArc<dyn ImageReader> = StdArc::new(FakePartition::new(image.clone()));
        let initiator = OtaInitiator::new(init_transport);
        let result = initiator.distribute(&resp_macs, reader, image.len() as u32, sha256).await;

        assert_eq!(result.successed.len() + result.unfinished.len(), 3);
        for (_, writer) in &responders {
            writer.promote_staged_to_running();
            assert_eq!(writer.running_sha256(), sha256);
        }
    }
}
