//! Request dispatch

pub mod capability;
pub mod dispatcher;

pub use capability::{
    Capability, CapabilityError, CapabilityResult, CapabilitySet, FnCapability, ParamValidator,
    RequirePresence,
};
pub use dispatcher::Dispatcher;
