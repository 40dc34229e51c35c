//! Wire protocol shared by host and client.
//!
//! UTF-8 JSON envelopes ([`Request`], [`Response`]) carrying [`WireValue`]s,
//! delimited according to the configured [`Framing`](crate::Framing).

pub mod frame;
pub mod protocol;
pub mod value;

pub use protocol::{CallTarget, Request, Response};
pub use value::WireValue;
