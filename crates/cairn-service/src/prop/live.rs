//! Live property computation.
//!
//! Each live property has a resource-kind applicability precondition;
//! an inapplicable property resolves to `None` and lands in the 404
//! propstat tier rather than failing the request.

use cairn_proto::dav::core::{
    DAV_NS, DavProperty, PropertyValue, QName, SVN_DAV_PROP_NS, dav_props, svn_props,
};
use cairn_repo::{NodeInfo, Repository};

use crate::error::ServiceResult;
use crate::resource::{Location, Resource};

/// Computes one live property, gated by applicability.
///
/// ## Errors
/// Propagates repository errors (applicability misses are `Ok(None)`).
pub(crate) fn live_property(
    repo: &dyn Repository,
    context: &str,
    resource: &Resource,
    info: Option<&NodeInfo>,
    qname: &QName,
) -> ServiceResult<Option<DavProperty>> {
    let is_file = info.is_some_and(|i| !i.kind.is_directory());
    let versioned_node = resource.is_versioned() && !resource.baselined && info.is_some();

    let value = match (qname.namespace_uri(), qname.local_name()) {
        (DAV_NS, "resourcetype") => {
            let markers = if resource.baselined {
                vec![QName::dav("baseline")]
            } else if resource.is_collection() {
                vec![QName::dav("collection")]
            } else {
                vec![]
            };
            Some(DavProperty {
                name: qname.clone(),
                value: Some(PropertyValue::ResourceType(markers)),
            })
        }
        (DAV_NS, "getcontentlength") => {
            if is_file {
                info.map(|i| DavProperty::text(qname.clone(), i.size.to_string()))
            } else {
                None
            }
        }
        (DAV_NS, "getcontenttype") => {
            if is_file {
                let mime = repo
                    .node_properties(resource.path(), resource.revision)?
                    .get("svn:mime-type")
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
                Some(DavProperty::text(
                    qname.clone(),
                    mime.unwrap_or_else(|| "text/plain".to_string()),
                ))
            } else {
                None
            }
        }
        (DAV_NS, "getlastmodified") => {
            if versioned_node {
                info.and_then(|i| i.created_date).map(|date| {
                    DavProperty::text(
                        qname.clone(),
                        date.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
                    )
                })
            } else {
                None
            }
        }
        (DAV_NS, "creationdate") => {
            if versioned_node {
                info.and_then(|i| i.created_date).map(|date| {
                    DavProperty::text(
                        qname.clone(),
                        date.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
                    )
                })
            } else {
                None
            }
        }
        (DAV_NS, "version-name") => {
            if resource.baselined {
                resource
                    .revision
                    .map(|rev| DavProperty::text(qname.clone(), rev.to_string()))
            } else if versioned_node {
                info.map(|i| DavProperty::text(qname.clone(), i.created_rev.to_string()))
            } else {
                None
            }
        }
        (DAV_NS, "creator-displayname") => {
            if versioned_node {
                info.and_then(|i| i.author.clone())
                    .map(|author| DavProperty::text(qname.clone(), author))
            } else {
                None
            }
        }
        (DAV_NS, "getetag") => {
            if versioned_node {
                info.map(|i| {
                    DavProperty::text(
                        qname.clone(),
                        format!("\"{}/{}\"", i.created_rev, resource.path()),
                    )
                })
            } else {
                None
            }
        }
        (DAV_NS, "checked-in") => match &resource.location {
            Location::Vcc => {
                let href = Location::Baseline {
                    revision: resource.revision.unwrap_or(0),
                }
                .href(context);
                Some(DavProperty::href(qname.clone(), href))
            }
            Location::Regular { path, .. } => info.map(|i| {
                let href = Location::Version {
                    path: path.clone(),
                    revision: i.created_rev,
                }
                .href(context);
                DavProperty::href(qname.clone(), href)
            }),
            _ => None,
        },
        (DAV_NS, "version-controlled-configuration") => {
            if matches!(resource.location, Location::Regular { .. }) {
                Some(DavProperty::href(qname.clone(), Location::Vcc.href(context)))
            } else {
                None
            }
        }
        (DAV_NS, "baseline-collection") => {
            if resource.baselined {
                resource.revision.map(|rev| {
                    let href = Location::BaselineCollection {
                        path: String::new(),
                        revision: rev,
                    }
                    .href(context);
                    DavProperty::href(qname.clone(), href)
                })
            } else {
                None
            }
        }
        (SVN_DAV_PROP_NS, "baseline-relative-path") => {
            if resource.location.repo_path().is_some() {
                Some(DavProperty::text(qname.clone(), resource.path()))
            } else {
                None
            }
        }
        (SVN_DAV_PROP_NS, "repository-uuid") => {
            Some(DavProperty::text(qname.clone(), repo.uuid()))
        }
        (SVN_DAV_PROP_NS, "md5-checksum") => {
            if is_file {
                info.and_then(|i| i.checksum.clone())
                    .map(|checksum| DavProperty::text(qname.clone(), checksum))
            } else {
                None
            }
        }
        _ => None,
    };

    Ok(value)
}

/// The full live table, for `allprop` and `propname` walks.
pub(crate) fn live_names() -> Vec<QName> {
    vec![
        dav_props::resourcetype(),
        dav_props::getcontentlength(),
        dav_props::getcontenttype(),
        dav_props::getlastmodified(),
        dav_props::creationdate(),
        dav_props::version_name(),
        dav_props::creator_displayname(),
        dav_props::getetag(),
        dav_props::checked_in(),
        dav_props::version_controlled_configuration(),
        dav_props::baseline_collection(),
        svn_props::baseline_relative_path(),
        svn_props::repository_uuid(),
        svn_props::md5_checksum(),
    ]
}
