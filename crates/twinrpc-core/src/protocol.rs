//! Wire protocol selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::{json::JsonCodec, xml::XmlCodec, WireCodec};
use crate::Error;

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\"?>";

/// The wire format a client or server speaks.
///
/// Changes the codec, batch wrapper and content type, but nothing about
/// correlation or dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "json-rpc")]
    JsonRpc,
    #[serde(rename = "xml-rpc")]
    XmlRpc,
}

/// Prefix, separator and suffix used to wrap several fragments into one payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWrapper {
    pub prefix: &'static str,
    pub separator: &'static str,
    pub suffix: &'static str,
}

static JSON_CODEC: JsonCodec = JsonCodec;
static XML_CODEC: XmlCodec = XmlCodec;

impl Protocol {
    pub fn content_type(&self) -> &'static str {
        match self {
            Protocol::JsonRpc => "application/json; charset=utf-8",
            Protocol::XmlRpc => "text/xml; charset=utf-8",
        }
    }

    /// Media type without parameters, for `Accept` headers
    pub fn media_type(&self) -> &'static str {
        match self {
            Protocol::JsonRpc => "application/json",
            Protocol::XmlRpc => "text/xml",
        }
    }

    /// The XML-RPC wrapper is a non-standard extension and may be rejected by
    /// third-party servers.
    pub fn batch_wrapper(&self) -> BatchWrapper {
        match self {
            Protocol::JsonRpc => BatchWrapper {
                prefix: "[",
                separator: ",",
                suffix: "]",
            },
            Protocol::XmlRpc => BatchWrapper {
                prefix: "<batch>",
                separator: "",
                suffix: "</batch>",
            },
        }
    }

    /// Text placed before every complete payload
    pub fn preamble(&self) -> &'static str {
        match self {
            Protocol::JsonRpc => "",
            Protocol::XmlRpc => XML_DECLARATION,
        }
    }

    pub fn codec(&self) -> &'static dyn WireCodec {
        match self {
            Protocol::JsonRpc => &JSON_CODEC,
            Protocol::XmlRpc => &XML_CODEC,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::JsonRpc => write!(f, "json-rpc"),
            Protocol::XmlRpc => write!(f, "xml-rpc"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "json-rpc" | "jsonrpc" | "json" => Ok(Protocol::JsonRpc),
            "xml-rpc" | "xmlrpc" | "xml" => Ok(Protocol::XmlRpc),
            other => Err(Error::Validation(format!(
                "Unknown protocol '{}'. Must be one of: json-rpc, xml-rpc",
                other
            ))),
        }
    }
}
