use std::sync::Arc;

use meshnow_crypto::KeyValueStore;
use meshnow_transport::{RadioLink, RxMeta, Transport};
use meshnow_wire::{Mac, PacketType};

use crate::messages::{DataMsg, StatusMsg};
use crate::partition::ImageWriter;
use crate::responder::OtaResponder;

/// Wires an [`OtaResponder`] into a live [`Transport`]'s `OtaStatus`/`OtaData`
/// handlers, the OTA counterpart of `meshnow_handshake::ResponderService`.
pub struct OtaResponderService<R: RadioLink, W: ImageWriter> {
    transport: Arc<Transport<R>>,
    responder: OtaResponder<W>,
}

impl<R: RadioLink + 'static, W: ImageWriter + 'static> OtaResponderService<R, W> {
    pub fn install(transport: Arc<Transport<R>>, writer: Arc<W>, kv: Arc<dyn KeyValueStore>) -> Arc<Self> {
        let this = Arc::new(Self {
            transport: transport.clone(),
            responder: OtaResponder::new(writer, kv),
        });

        let on_status = this.clone();
        transport.set_config_for_data_type(
            PacketType::OtaStatus,
            true,
            Some(Arc::new(move |src: Mac, payload: &[u8], _rx: RxMeta| {
                if let Ok(status) = StatusMsg::decode(payload) {
                    let svc = on_status.clone();
                    tokio::spawn(async move { svc.on_status(src, status).await });
                }
            })),
        );

        let on_data = this.clone();
        transport.set_config_for_data_type(
            PacketType::OtaData,
            true,
            Some(Arc::new(move |_src: Mac, payload: &[u8], _rx: RxMeta| {
                if let Ok(data) = DataMsg::decode(payload) {
                    let svc = on_data.clone();
                    tokio::spawn(async move { svc.on_data(data).await });
                }
            })),
        );

        this
    }

    async fn on_status(self: Arc<Self>, src: Mac, status: StatusMsg) {
        let reply = self.responder.handle_status(&status);
        let _ = self
            .transport
            .send(PacketType::OtaStatus, src, &reply.encode(), meshnow_wire::FrameConfig::default())
            .await;
    }

    async fn on_data(self: Arc<Self>, data: DataMsg) {
        if let Ok(Some(event)) = self.responder.handle_data(data.seq, &data.data) {
            self.transport.emit(event);
        }
    }
}
