/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Radio adapter trait (spec §4.C), the retransmit/ACK/forwarding transport
//! core (spec §4.D), and the typed event/config facade (spec §4.H).

pub mod ack;
pub mod config;
pub mod error;
pub mod radio;
pub mod sim;
pub mod transport;

pub use ack::AckRegistry;
pub use config::{ConfigTable, NodeEvent, PacketHandler};
pub use error::TransportError;
pub use radio::{Country, RadioLink, RxMeta, SendOutcome};
pub use sim::{SimMedium, SimRadio};
pub use transport::{Transport, TransportConfig};
