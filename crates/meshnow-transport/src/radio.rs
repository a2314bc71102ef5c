use async_trait::async_trait;
use meshnow_wire::Mac;

/// Result of handing one frame to the link-layer primitive and waiting for
/// its send-complete signal (spec §3 `SendLock`, §4.C).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SendOutcome {
    Ok,
    Fail,
    Timeout,
}

/// RX control block the radio hands back with every received frame (spec §4.C).
#[derive(Clone, Copy, Debug)]
pub struct RxMeta {
    pub channel: u8,
    pub secondary_channel: u8,
    pub rssi: i8,
}

/// The set of Wi-Fi channels this node's country/region allows, so the
/// transport can iterate all of them when a frame's `channel == ALL`
/// (spec §3 `RadioAdapter`, §4.D channel iteration).
#[derive(Clone, Copy, Debug)]
pub struct Country {
    pub start_channel: u8,
    pub num_channels: u8,
}

impl Default for Country {
    fn default() -> Self {
        // A conservative default: channels 1..=11, the common 2.4GHz range.
        Self {
            start_channel: 1,
            num_channels: 11,
        }
    }
}

/// Thin wrapper over the link-layer send primitive (spec §4.C). A real
/// implementation drives an actual Wi-Fi driver; [`crate::sim::SimRadio`]
/// stands in for it in tests and the demo binary.
///
/// `send_one` models the synchronous hand-off *and* the eventual
/// send-complete callback as a single awaited call, since in idiomatic
/// async Rust there is no need to expose the intermediate "wait on an event
/// group" step the original C implementation used — the caller still
/// blocks the length of the critical section either way (spec §4.D/§5).
#[async_trait]
pub trait RadioLink: Send + Sync {
    /// Hand off one already-framed packet. `broadcast` selects the
    /// link-layer broadcast address; otherwise `dest` must already be a
    /// bound peer.
    async fn send_one(&self, dest: Mac, broadcast: bool, bytes: Vec<u8>) -> SendOutcome;

    /// Binds a station peer slot with an optional LMK (spec §4.B).
    fn add_peer(&self, addr: Mac, lmk: Option<[u8; 16]>);

    /// Unbinds a station peer slot.
    fn remove_peer(&self, addr: Mac);

    /// Switches the radio's primary/secondary channel.
    fn set_channel(&self, primary: u8, secondary: u8);

    /// Current channel the radio is tuned to.
    fn current_channel(&self) -> u8;

    /// The channel range this node is allowed to hop across.
    fn country(&self) -> Country;
}
