/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! SPAKE2-style key-handshake engine (spec §4.F): wire sub-messages, the
//! per-responder session state machine, and the initiator's batch
//! distribution loop.

pub mod error;
pub mod initiator;
pub mod messages;
pub mod responder;
pub mod service;

pub use error::HandshakeError;
pub use initiator::{BatchResult, HandshakeInitiator, BATCH_MAX};
pub use messages::{HandshakeMsg, MsgKind};
pub use responder::{HandshakeResponder, SessionState};
pub use service::ResponderService;
