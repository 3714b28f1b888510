pub mod config;
pub mod error;
pub mod request;
pub mod response;

pub use config::{ClientConfig, ServerConfig};
pub use error::{ErrorCode, RpcError};
pub use request::{validate_method_name, Params, Request, RequestId, RESERVED_PREFIX};
pub use response::ResponsePart;
