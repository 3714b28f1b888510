//! Batch assembly

use crate::Protocol;

/// An encoded request or response fragment waiting to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub fragment: String,
    /// Position hint, lower goes first
    pub order: i64,
}

impl BatchEntry {
    pub fn new(fragment: impl Into<String>, order: i64) -> Self {
        Self {
            fragment: fragment.into(),
            order,
        }
    }
}

/// Order the fragments and join them into one payload.
///
/// Sorting is stable, so entries with equal `order` keep their submission
/// order. A single fragment is sent unwrapped. Returns `None` when there is
/// nothing to send.
pub fn assemble(mut entries: Vec<BatchEntry>, protocol: Protocol) -> Option<String> {
    entries.sort_by_key(|entry| entry.order);
    join(entries.into_iter().map(|entry| entry.fragment), protocol)
}

/// Join already ordered fragments using the protocol's wrapper rule
pub fn join<I>(fragments: I, protocol: Protocol) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let fragments: Vec<String> = fragments.into_iter().collect();
    let wrapper = protocol.batch_wrapper();

    let body = match fragments.len() {
        0 => return None,
        1 => fragments.into_iter().next().unwrap_or_default(),
        _ => format!(
            "{}{}{}",
            wrapper.prefix,
            fragments.join(wrapper.separator),
            wrapper.suffix
        ),
    };

    Some(format!("{}{}", protocol.preamble(), body))
}
