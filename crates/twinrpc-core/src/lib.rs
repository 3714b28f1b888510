pub mod batch;
pub mod codec;
pub mod error;
pub mod models;
pub mod protocol;
pub mod storage;
pub mod value;

pub use batch::{assemble, BatchEntry};
pub use codec::{decode_value, encode_value, DecodeError, Inbound, Unit, WireCodec};
pub use error::{Error, Result};
pub use protocol::Protocol;
pub use value::Value;
