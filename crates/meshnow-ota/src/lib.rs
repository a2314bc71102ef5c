/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Chunked OTA firmware distribution (spec §4.G): progress bitmap, wire
//! messages, partition read/write traits, resumable persisted state, and the
//! initiator/responder halves of the protocol.

pub mod bitmap;
pub mod chunk;
pub mod error;
pub mod initiator;
pub mod messages;
pub mod partition;
pub mod persisted;
pub mod responder;
pub mod service;

pub use bitmap::Bitmap;
pub use chunk::{chunk_len, packet_num, CHUNK_SIZE};
pub use error::OtaError;
pub use initiator::{OtaInitiator, OtaResult};
pub use messages::{DataMsg, StatusCode, StatusMsg};
pub use partition::{image_sha256, FakePartition, ImageReader, ImageWriter};
pub use persisted::{PersistedOtaState, NVS_KEY};
pub use responder::OtaResponder;
pub use service::OtaResponderService;
