//! # Tideway Protocol Library
//!
//! The slice of the Bedrock wire protocol a transparent proxy has to
//! understand. Anything it does not need to look at is carried opaquely.
//!
//! ## Architecture
//!
//! ### 1. Codecs Layer ([`codecs`])
//! Field encoders/decoders:
//! - VarInt / VarLong (unsigned LEB128)
//! - Zigzag signed varints
//! - Little-endian floats and shorts
//! - Length-prefixed strings and byte arrays
//! - UUIDs, vectors and block positions
//!
//! ### 2. Packet IDs ([`packets`])
//! IDs of the packets the proxy decodes, and the constants used inside them.
//!
//! ### 3. Packet Structures ([`packet_types`])
//! The [`Packet`] enum. Unrecognised packets decode to [`Packet::Unknown`] and
//! re-encode byte-for-byte; partially parsed packets keep an opaque tail.
//!
//! ### 4. Batches ([`batch`]) and Compression ([`compression`])
//! Length-prefixed frame lists, optionally zlib-compressed as a whole.
//!
//! ### 5. Builders ([`packet_builder`])
//! Packets injected by the proxy itself (state wipes, fake chunks).
//!
//! ## Usage Example
//!
//! ```rust
//! use tideway_protocol::{Packet, encode_batch, decode_batch, CompressionType};
//!
//! let frames = vec![Packet::RequestChunkRadius { radius: 8 }.encode()];
//! let batch = encode_batch(&frames, CompressionType::Zlib).unwrap();
//! let decoded = decode_batch(batch, CompressionType::Zlib).unwrap();
//! assert_eq!(Packet::decode(decoded[0].clone()).unwrap(), Packet::RequestChunkRadius { radius: 8 });
//! ```

pub mod batch;
pub mod codecs;
pub mod compression;
pub mod packets;
pub mod packet_types;
pub mod packet_builder;

// Re-export commonly used items
pub use batch::*;
pub use compression::*;
pub use packets::*;
pub use packet_types::*;
pub use packet_builder::*;
