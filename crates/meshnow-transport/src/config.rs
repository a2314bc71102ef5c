use std::sync::Arc;

use meshnow_wire::header::TYPE_MAX;
use meshnow_wire::{Mac, PacketType};
use parking_lot::RwLock;

use crate::radio::RxMeta;

/// Per-type receive handler, registered via [`ConfigTable::set`] (spec §4.H).
/// Handlers are expected to return promptly; a failure is logged and
/// swallowed rather than propagated to the sender (spec §7).
pub trait PacketHandler: Send + Sync {
    fn handle(&self, src: Mac, payload: &[u8], rx: RxMeta);
}

impl<F: Fn(Mac, &[u8], RxMeta) + Send + Sync> PacketHandler for F {
    fn handle(&self, src: Mac, payload: &[u8], rx: RxMeta) {
        self(src, payload, rx)
    }
}

#[derive(Clone, Default)]
struct Row {
    enabled: bool,
    handler: Option<Arc<dyn PacketHandler>>,
}

/// The event/configuration facade (spec §4.H): one row per packet type,
/// `{enabled, handler}`, mutated through `set_config_for_data_type`.
pub struct ConfigTable {
    rows: RwLock<[Row; TYPE_MAX as usize]>,
}

impl Default for ConfigTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTable {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Default::default()),
        }
    }

    pub fn set(&self, packet_type: PacketType, enabled: bool, handler: Option<Arc<dyn PacketHandler>>) {
        let mut rows = self.rows.write();
        rows[packet_type as usize] = Row { enabled, handler };
    }

    pub fn is_enabled(&self, packet_type: PacketType) -> bool {
        self.rows.read()[packet_type as usize].enabled
    }

    pub fn dispatch(&self, packet_type: PacketType, src: Mac, payload: &[u8], rx: RxMeta) {
        let handler = {
            let rows = self.rows.read();
            rows[packet_type as usize].handler.clone()
        };
        if let Some(handler) = handler {
            handler.handle(src, payload, rx);
        }
    }
}

/// Typed events emitted to the host, spec §4.H. Carries its own `tracing`
/// breadcrumb at the emission site (see [`crate::transport::Transport::emit`]),
/// since this crate's ambient stack treats "notify the host" and "log it"
/// as one concern the way the teacher's `SystemInterface::event_*` callbacks do.
#[derive(Clone, Debug)]
pub enum NodeEvent {
    OtaStarted { responders: usize },
    OtaStatus { addr: Mac, percent: u8 },
    OtaFinish { addr: Mac },
    OtaStopped { addr: Mac },
    LogFlashFull { size: u32 },
    SecStateChanged { addr: Mac, state: &'static str },
}
