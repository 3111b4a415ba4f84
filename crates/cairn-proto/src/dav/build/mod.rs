//! Response XML building.

mod escape;
mod multistatus;
mod writer;

pub use escape::{base64_encode, is_xml_safe};
pub use multistatus::serialize_multistatus;
pub use writer::{WriteResult, XmlWriter};
