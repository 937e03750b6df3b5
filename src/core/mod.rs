//! # Core Wire Format
//!
//! Low-level frame handling: the binary header, message splitting, and the
//! encoder used by the socket writer.
//!
//! ## Components
//! - **Frame**: Length-prefixed wire unit with a tag and payload
//! - **Codec**: Tokio encoder for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [TotalLen(4)] [Tag(4)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Declared lengths are validated before allocation
//! - The absolute message cap (default 16MB) prevents memory exhaustion
//! - Negative and truncated lengths are rejected as malformed

pub mod codec;
pub mod frame;
