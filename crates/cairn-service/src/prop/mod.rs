//! The PROPFIND and PROPPATCH engines.

mod live;

use cairn_proto::dav::core::{
    DavProperty, Depth, Multistatus, Namespace, PropertyValue, Propstat, PropstatResponse, QName,
    SVN_PROP_NS, Status,
};
use cairn_proto::dav::parse::{PatchOperation, PropfindRequest, PropfindType, ProppatchRequest};
use cairn_repo::{NodeInfo, Repository, Transaction as _};

use crate::error::{ServiceError, ServiceResult};
use crate::resource::{Location, Resource};
use live::{live_names, live_property};

/// Computes a PROPFIND multistatus.
///
/// ## Summary
/// Visits the resource, then (for positive depth) its children
/// recursively. Resolved properties fill a 200 propstat; every
/// unresolved property gets a 404 propstat in the same response — one
/// property's failure never aborts the request.
///
/// ## Errors
/// `NotFound` when the resource itself does not exist; repository errors
/// otherwise.
#[tracing::instrument(skip(repo, request), fields(path = resource.path(), depth = %depth))]
pub fn propfind(
    repo: &dyn Repository,
    resource: &Resource,
    request: &PropfindRequest,
    depth: Depth,
    context: &str,
) -> ServiceResult<Multistatus> {
    if !resource.exists {
        return Err(ServiceError::NotFound(format!(
            "no such resource '{}'",
            resource.path()
        )));
    }

    let mut multistatus = Multistatus::new();
    visit(repo, resource, request, depth, context, &mut multistatus)?;
    Ok(multistatus)
}

fn visit(
    repo: &dyn Repository,
    resource: &Resource,
    request: &PropfindRequest,
    depth: Depth,
    context: &str,
    multistatus: &mut Multistatus,
) -> ServiceResult<()> {
    let info = stat_of(repo, resource)?;
    multistatus.add_response(response_for(repo, resource, info.as_ref(), request, context)?);

    if depth == Depth::Zero
        || !resource.is_collection()
        || resource.location.repo_path().is_none()
    {
        return Ok(());
    }
    let child_depth = match depth {
        Depth::Infinity => Depth::Infinity,
        Depth::One | Depth::Zero => Depth::Zero,
    };

    for entry in repo.list_dir(resource.path(), resource.revision)? {
        let child = child_resource(resource, &entry.name, entry.kind.is_directory());
        visit(repo, &child, request, child_depth, context, multistatus)?;
    }
    Ok(())
}

fn stat_of(repo: &dyn Repository, resource: &Resource) -> ServiceResult<Option<NodeInfo>> {
    match resource.location.repo_path() {
        Some(path) if !resource.is_working() => Ok(repo.stat(path, resource.revision)?),
        _ => Ok(None),
    }
}

fn child_resource(parent: &Resource, name: &str, is_dir: bool) -> Resource {
    let child_path = if parent.path().is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent.path(), name)
    };
    let location = match &parent.location {
        Location::Version { revision, .. } => Location::Version {
            path: child_path,
            revision: *revision,
        },
        Location::BaselineCollection { revision, .. } => Location::BaselineCollection {
            path: child_path,
            revision: *revision,
        },
        Location::Working { activity_id, .. } => Location::Working {
            activity_id: activity_id.clone(),
            path: child_path,
        },
        _ => Location::Regular {
            path: child_path,
            revision: match parent.location {
                Location::Regular { revision, .. } => revision,
                _ => parent.revision,
            },
        },
    };
    Resource {
        location,
        exists: true,
        versioned: parent.versioned,
        baselined: false,
        working: parent.working,
        collection: is_dir,
        revision: parent.revision,
        txn_name: parent.txn_name.clone(),
    }
}

fn response_for(
    repo: &dyn Repository,
    resource: &Resource,
    info: Option<&NodeInfo>,
    request: &PropfindRequest,
    context: &str,
) -> ServiceResult<PropstatResponse> {
    let href = resource.location.href(context);

    match &request.propfind_type {
        PropfindType::Prop(names) => {
            let dead = dead_properties(repo, resource)?;
            let mut found = Vec::new();
            let mut missing = Vec::new();
            for name in names {
                let qname = name.qname();
                if let Some(prop) = live_property(repo, context, resource, info, &qname)? {
                    found.push(prop);
                } else if let Some((_, value)) = dead.iter().find(|(dead_name, _)| *dead_name == qname)
                {
                    found.push(DavProperty::binary(qname, value.clone()));
                } else {
                    missing.push(DavProperty::empty(qname));
                }
            }
            Ok(PropstatResponse::two_tier(href, found, missing))
        }
        PropfindType::AllProp { include } => {
            let dead = dead_properties(repo, resource)?;
            let mut found = Vec::new();
            for qname in live_names() {
                if let Some(prop) = live_property(repo, context, resource, info, &qname)? {
                    found.push(prop);
                }
            }
            for name in include {
                let qname = name.qname();
                if found.iter().all(|p| p.name != qname)
                    && let Some(prop) = live_property(repo, context, resource, info, &qname)?
                {
                    found.push(prop);
                }
            }
            for (qname, value) in dead {
                found.push(DavProperty::binary(qname, value));
            }
            Ok(PropstatResponse::ok(href, found))
        }
        PropfindType::PropName => {
            let dead = dead_properties(repo, resource)?;
            let mut names = Vec::new();
            for qname in live_names() {
                if live_property(repo, context, resource, info, &qname)?.is_some() {
                    names.push(DavProperty::empty(qname));
                }
            }
            for (qname, _) in dead {
                names.push(DavProperty::empty(qname));
            }
            Ok(PropstatResponse::ok(href, names))
        }
    }
}

/// Versioned node properties keyed by their wire names, in stored-name
/// order.
fn dead_properties(
    repo: &dyn Repository,
    resource: &Resource,
) -> ServiceResult<Vec<(QName, Vec<u8>)>> {
    let mut dead = Vec::new();
    if let Some(path) = resource.location.repo_path()
        && !resource.is_working()
        && resource.exists
        && resource.is_versioned()
    {
        for (name, value) in repo.node_properties(path, resource.revision)? {
            dead.push((prop_name_to_qname(&name), value));
        }
    }
    Ok(dead)
}

/// Maps a stored property name onto its wire namespace.
fn prop_name_to_qname(name: &str) -> QName {
    match name.strip_prefix("svn:") {
        Some(rest) => QName::new(Namespace::SVN_PROP, rest.to_string()),
        None => QName::new(Namespace::CUSTOM, name.to_string()),
    }
}

/// Maps a wire property name back to its stored name; `None` for
/// namespaces clients may not write.
fn qname_to_prop_name(qname: &QName) -> Option<String> {
    match qname.namespace_uri() {
        SVN_PROP_NS => Some(format!("svn:{}", qname.local_name())),
        ns if ns == Namespace::CUSTOM.as_str() => Some(qname.local_name().to_string()),
        _ => None,
    }
}

/// Applies a PROPPATCH to a working resource's transaction.
///
/// ## Summary
/// Operations stage into the bound transaction in document order and
/// never finalize it. The batch is atomic: if any property name is
/// outside the writable namespaces, nothing is applied and the failed
/// property reports 403 with the rest as 424.
///
/// ## Errors
/// `ResourceState` when the target is not a working resource.
#[tracing::instrument(skip(repo, request), fields(path = resource.path()))]
pub fn proppatch(
    repo: &dyn Repository,
    resource: &Resource,
    request: &ProppatchRequest,
) -> ServiceResult<Multistatus> {
    if !resource.is_working() {
        return Err(ServiceError::method_not_allowed(
            "PROPPATCH requires a checked-out working resource",
        ));
    }
    let txn_name = resource
        .txn_name
        .as_deref()
        .ok_or_else(|| ServiceError::conflict("working resource has no bound transaction"))?;
    let href = resource.location.href("");

    // Validate the whole batch before touching the transaction.
    let mut staged: Vec<(QName, String, Option<Vec<u8>>)> = Vec::new();
    let mut rejected: Vec<QName> = Vec::new();
    for operation in &request.operations {
        match operation {
            PatchOperation::Set(prop) => match qname_to_prop_name(&prop.name) {
                Some(name) => {
                    let value = match &prop.value {
                        Some(PropertyValue::Text(text)) => text.clone().into_bytes(),
                        Some(PropertyValue::Binary(bytes)) => bytes.clone(),
                        _ => Vec::new(),
                    };
                    staged.push((prop.name.clone(), name, Some(value)));
                }
                None => rejected.push(prop.name.clone()),
            },
            PatchOperation::Remove(qname) => match qname_to_prop_name(qname) {
                Some(name) => staged.push((qname.clone(), name, None)),
                None => rejected.push(qname.clone()),
            },
        }
    }

    let mut multistatus = Multistatus::new();
    if !rejected.is_empty() {
        let mut propstats = vec![Propstat {
            properties: rejected.into_iter().map(DavProperty::empty).collect(),
            status: Status::Forbidden,
            description: Some("property is not in a writable namespace".to_string()),
        }];
        if !staged.is_empty() {
            propstats.push(Propstat {
                properties: staged
                    .into_iter()
                    .map(|(qname, _, _)| DavProperty::empty(qname))
                    .collect(),
                status: Status::FailedDependency,
                description: None,
            });
        }
        multistatus.add_response(PropstatResponse {
            href,
            propstats,
            description: None,
        });
        return Ok(multistatus);
    }

    let mut txn = repo.open_txn(txn_name)?;
    let mut applied = Vec::new();
    for (qname, name, value) in staged {
        txn.change_node_prop(resource.path(), &name, value)?;
        applied.push(DavProperty::empty(qname));
    }
    tracing::debug!(txn = %txn_name, count = applied.len(), "properties staged");

    multistatus.add_response(PropstatResponse::ok(href, applied));
    Ok(multistatus)
}
