/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Frame codec, duplicate-suppression cache, and peer/group tables that sit
//! directly on top of the link-layer send primitive.

pub mod dedupe;
pub mod error;
pub mod group;
pub mod header;
pub mod mac;
pub mod peer;

pub use dedupe::DuplicateCache;
pub use error::CodecError;
pub use group::{GroupId, GroupTable};
pub use header::{FrameConfig, FrameHead, FramedPacket, PacketType, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
pub use mac::Mac;
pub use peer::{Peer, PeerTable};
