use std::sync::Arc;

use meshnow_transport::{NodeEvent, RadioLink, RxMeta, Transport};
use meshnow_wire::{FrameConfig, Mac, PacketType};
use parking_lot::Mutex;

use crate::messages::HandshakeMsg;
use crate::responder::HandshakeResponder;

/// Wires a [`HandshakeResponder`] up to a live [`Transport`]: registers
/// receive handlers for `SecStatus`/`Sec`, replies inline, and installs the
/// application key on the transport once `KEY` verifies (spec §4.F/§4.H
/// `SEC_*` event mirror).
pub struct ResponderService<R: RadioLink> {
    transport: Arc<Transport<R>>,
    session: Mutex<HandshakeResponder>,
}

impl<R: RadioLink + 'static> ResponderService<R> {
    pub fn install(transport: Arc<Transport<R>>, pop: impl Into<Vec<u8>>) -> Arc<Self> {
        let this = Arc::new(Self {
            transport: transport.clone(),
            session: Mutex::new(HandshakeResponder::new(pop)),
        });

        let me = transport.self_mac();
        let svc = this.clone();
        transport.set_config_for_data_type(
            PacketType::SecStatus,
            true,
            Some(Arc::new(move |src: Mac, payload: &[u8], _rx: RxMeta| {
                svc.on_sec_status(src, me, payload);
            })),
        );

        let svc = this.clone();
        transport.set_config_for_data_type(
            PacketType::Sec,
            true,
            Some(Arc::new(move |src: Mac, payload: &[u8], _rx: RxMeta| {
                svc.on_sec(src, payload);
            })),
        );

        this
    }

    fn on_sec_status(self: &Arc<Self>, src: Mac, me: Mac, payload: &[u8]) {
        let Ok(HandshakeMsg::Scan) = HandshakeMsg::decode(payload) else { return };
        let reply = {
            let session = self.session.lock();
            session.handle_scan(src, me, 1)
        };
        if let Some(reply) = reply {
            self.reply(src, reply);
        }
    }

    fn on_sec(self: &Arc<Self>, src: Mac, payload: &[u8]) {
        let Ok(msg) = HandshakeMsg::decode(payload) else { return };
        match msg {
            HandshakeMsg::Cmd0 { q_c } => {
                let result = self.session.lock().handle_cmd0(src, q_c);
                if let Ok(reply) = result {
                    self.reply(src, reply);
                }
            }
            HandshakeMsg::Cmd1 { check_c } => {
                let result = self.session.lock().handle_cmd1(src, check_c);
                match result {
                    Ok(reply) => self.reply(src, reply),
                    Err(_) => self.transport.emit(NodeEvent::SecStateChanged { addr: src, state: "invalid_state" }),
                }
            }
            HandshakeMsg::Key { enc_app_key } => {
                let result = self.session.lock().handle_key(src, enc_app_key);
                match result {
                    Ok((reply, app_key)) => {
                        self.transport.install_application_key(&app_key);
                        self.transport.enable_secure_receive(true);
                        self.transport.emit(NodeEvent::SecStateChanged { addr: src, state: "installed" });
                        self.reply(src, reply);
                    }
                    Err(_) => self.transport.emit(NodeEvent::SecStateChanged { addr: src, state: "invalid_state" }),
                }
            }
            HandshakeMsg::Rest => self.session.lock().handle_rest(),
            HandshakeMsg::Scan | HandshakeMsg::Info { .. } | HandshakeMsg::Resp0 { .. } | HandshakeMsg::Resp1 { .. } | HandshakeMsg::KeyResp => {}
        }
    }

    fn reply(self: &Arc<Self>, dest: Mac, msg: HandshakeMsg) {
        let this = self.clone();
        tokio::spawn(async move {
            let packet_type = match msg {
                HandshakeMsg::Info { .. } => PacketType::SecStatus,
                _ => PacketType::Sec,
            };
            let _ = this.transport.send(packet_type, dest, &msg.encode(), FrameConfig::default()).await;
        });
    }
}
