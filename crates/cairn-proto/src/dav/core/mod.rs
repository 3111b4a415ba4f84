//! Shared protocol vocabulary types.

mod depth;
mod multistatus;
mod namespace;
mod property;

pub use depth::Depth;
pub use multistatus::{Multistatus, Propstat, PropstatResponse, Status};
pub use namespace::{
    CUSTOM_PROP_NS, DAV_NS, Namespace, QName, SVN_DAV_PROP_NS, SVN_NS, SVN_PROP_NS, dav_props,
    svn_props,
};
pub use property::{DavProperty, PropertyName, PropertyValue};
