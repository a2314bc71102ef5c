/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Crypto primitives for the meshnow stack: the AES-GCM session layer (spec
//! §4.E) and the ECDH/AES-CTR pieces the key-handshake engine builds on
//! (spec §4.F/§9), plus the `KeyValueStore` abstraction that stands in for
//! NVS-backed persistence across the whole stack.

pub mod aead;
pub mod error;
pub mod handshake_crypto;
pub mod kv;

pub use aead::{ApplicationKey, SecuritySession, APP_KEY_LEN, AUTH_TAG_LEN, IV_LEN};
pub use error::CryptoError;
pub use handshake_crypto::{ctr_verifier, ecdh_shared_secret, pop_mask, EphemeralKeyPair};
pub use kv::{InMemoryStore, KeyValueStore};
