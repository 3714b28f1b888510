//! Demo API

pub mod diagnostics;
pub mod fields;

use std::sync::Arc;

use crate::dispatch::{CapabilitySet, RequirePresence};

/// Capabilities served by `twinrpcd`
pub fn demo_capabilities() -> CapabilitySet {
    let mut set = CapabilitySet::new();
    fields::register(&mut set);
    diagnostics::register(&mut set);
    set.set_validator(Arc::new(
        RequirePresence::new().require("saveFields", &["field1", "field2"]),
    ));
    set
}
