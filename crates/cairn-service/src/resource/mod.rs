//! Resource addressing and the resource model.
//!
//! A request URI splits into the repository context prefix, an optional
//! `!svn` kind marker and a remainder read as a repository path, revision
//! number or activity token. The resulting `Location` is a closed union
//! matched exhaustively wherever resources are handled.

use cairn_core::constants::{
    DEFAULT_VCC_NAME, KIND_ACTIVITY, KIND_BASELINE, KIND_BASELINE_COLL, KIND_VCC, KIND_VERSION,
    KIND_WORKING, KIND_WORKING_BASELINE, SPECIAL_URI,
};
use cairn_proto::dav::parse::ParseError;
use cairn_repo::{ActivityStore, Repository, Transaction as _};

use crate::error::{ServiceError, ServiceResult};

/// Where a request URI points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A public versioned path, at head unless a label pinned it.
    Regular { path: String, revision: Option<u64> },
    /// A version resource: one path frozen at one revision.
    Version { path: String, revision: u64 },
    /// A whole-repository snapshot at a revision.
    Baseline { revision: u64 },
    /// The root collection of a baseline's tree.
    BaselineCollection { path: String, revision: u64 },
    /// One client's in-progress change set.
    Activity { activity_id: String },
    /// The mutable view of a checked-out path, bound to an activity.
    Working { activity_id: String, path: String },
    /// The mutable view of a checked-out baseline.
    WorkingBaseline { activity_id: String, revision: u64 },
    /// The version-controlled configuration.
    Vcc,
    /// Where activities may be created.
    ActivityCollection,
    /// The private namespace root itself.
    PrivateRoot,
}

impl Location {
    /// Splits a repository-relative URI (the part after the context
    /// prefix) into a location.
    ///
    /// ## Errors
    /// `Malformed` for unparsable revision numbers or truncated special
    /// URIs; `NotFound` for unknown kind markers.
    pub fn parse(uri: &str, label: Option<&str>) -> ServiceResult<Self> {
        let decoded = percent_decode(uri);
        let trimmed = decoded.trim_start_matches('/');

        let (head, rest) = split_head(trimmed);
        if head != SPECIAL_URI {
            let path = canonical(trimmed);
            return match label {
                Some(label) => Ok(Self::Version {
                    path,
                    revision: parse_revision(label, "Label")?,
                }),
                None => Ok(Self::Regular {
                    path,
                    revision: None,
                }),
            };
        }

        let Some(rest) = rest else {
            return Ok(Self::PrivateRoot);
        };
        let (marker, parameter) = split_head(rest);
        let parameter = parameter.unwrap_or("");

        match marker {
            KIND_VCC => {
                if parameter != DEFAULT_VCC_NAME {
                    return Err(ServiceError::conflict(format!(
                        "invalid VCC name '{parameter}'"
                    )));
                }
                match label {
                    Some(label) => Ok(Self::Baseline {
                        revision: parse_revision(label, "Label")?,
                    }),
                    None => Ok(Self::Vcc),
                }
            }
            KIND_VERSION => {
                let (revision, path) = split_revision(parameter)?;
                Ok(Self::Version { path, revision })
            }
            KIND_BASELINE => Ok(Self::Baseline {
                revision: parse_revision(parameter, "baseline revision")?,
            }),
            KIND_BASELINE_COLL => {
                let (revision, path) = split_revision(parameter)?;
                Ok(Self::BaselineCollection { path, revision })
            }
            KIND_ACTIVITY => {
                if parameter.is_empty() {
                    Ok(Self::ActivityCollection)
                } else {
                    Ok(Self::Activity {
                        activity_id: parameter.to_string(),
                    })
                }
            }
            KIND_WORKING => {
                let (activity_id, path) = split_head(parameter);
                if activity_id.is_empty() {
                    return Err(ServiceError::Malformed(ParseError::invalid_value(
                        "working resource URI carries no activity id",
                    )));
                }
                Ok(Self::Working {
                    activity_id: activity_id.to_string(),
                    path: canonical(path.unwrap_or("")),
                })
            }
            KIND_WORKING_BASELINE => {
                let (activity_id, revision) = split_head(parameter);
                let Some(revision) = revision else {
                    return Err(ServiceError::Malformed(ParseError::invalid_value(
                        format!("invalid URI '{uri}': working baseline needs a revision"),
                    )));
                };
                Ok(Self::WorkingBaseline {
                    activity_id: activity_id.to_string(),
                    revision: parse_revision(revision, "working baseline revision")?,
                })
            }
            other => Err(ServiceError::NotFound(format!(
                "unknown special resource kind '{other}'"
            ))),
        }
    }

    /// The repository path this location addresses, if it has one.
    #[must_use]
    pub fn repo_path(&self) -> Option<&str> {
        match self {
            Self::Regular { path, .. }
            | Self::Version { path, .. }
            | Self::BaselineCollection { path, .. }
            | Self::Working { path, .. } => Some(path),
            Self::Baseline { .. }
            | Self::Activity { .. }
            | Self::WorkingBaseline { .. }
            | Self::Vcc
            | Self::ActivityCollection
            | Self::PrivateRoot => None,
        }
    }

    /// The activity this location is bound to, if any.
    #[must_use]
    pub fn activity_id(&self) -> Option<&str> {
        match self {
            Self::Activity { activity_id }
            | Self::Working { activity_id, .. }
            | Self::WorkingBaseline { activity_id, .. } => Some(activity_id),
            Self::Regular { .. }
            | Self::Version { .. }
            | Self::Baseline { .. }
            | Self::BaselineCollection { .. }
            | Self::Vcc
            | Self::ActivityCollection
            | Self::PrivateRoot => None,
        }
    }

    /// Rebuilds the canonical URI below the context prefix.
    #[must_use]
    pub fn href(&self, context: &str) -> String {
        let tail = match self {
            Self::Regular { path, .. } => format!("/{path}"),
            Self::Version { path, revision } => {
                if path.is_empty() {
                    format!("/{SPECIAL_URI}/{KIND_VERSION}/{revision}")
                } else {
                    format!("/{SPECIAL_URI}/{KIND_VERSION}/{revision}/{path}")
                }
            }
            Self::Baseline { revision } => format!("/{SPECIAL_URI}/{KIND_BASELINE}/{revision}"),
            Self::BaselineCollection { path, revision } => {
                if path.is_empty() {
                    format!("/{SPECIAL_URI}/{KIND_BASELINE_COLL}/{revision}")
                } else {
                    format!("/{SPECIAL_URI}/{KIND_BASELINE_COLL}/{revision}/{path}")
                }
            }
            Self::Activity { activity_id } => {
                format!("/{SPECIAL_URI}/{KIND_ACTIVITY}/{activity_id}")
            }
            Self::Working { activity_id, path } => {
                if path.is_empty() {
                    format!("/{SPECIAL_URI}/{KIND_WORKING}/{activity_id}")
                } else {
                    format!("/{SPECIAL_URI}/{KIND_WORKING}/{activity_id}/{path}")
                }
            }
            Self::WorkingBaseline {
                activity_id,
                revision,
            } => format!("/{SPECIAL_URI}/{KIND_WORKING_BASELINE}/{activity_id}/{revision}"),
            Self::Vcc => format!("/{SPECIAL_URI}/{KIND_VCC}/{DEFAULT_VCC_NAME}"),
            Self::ActivityCollection => format!("/{SPECIAL_URI}/{KIND_ACTIVITY}/"),
            Self::PrivateRoot => format!("/{SPECIAL_URI}"),
        };
        format!("{context}{tail}")
    }
}

/// A resolved resource: identity plus existence and capabilities.
#[derive(Debug, Clone)]
pub struct Resource {
    pub location: Location,
    pub exists: bool,
    pub versioned: bool,
    pub baselined: bool,
    pub working: bool,
    pub collection: bool,
    /// The revision the resource is pinned or resolved to.
    pub revision: Option<u64>,
    /// The bound transaction, for working resources.
    pub txn_name: Option<String>,
}

impl Resource {
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.collection
    }

    #[must_use]
    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    #[must_use]
    pub fn is_working(&self) -> bool {
        self.working
    }

    /// Whether this resource may act as the source of a MERGE.
    #[must_use]
    pub fn can_be_activity(&self) -> bool {
        matches!(self.location, Location::Activity { .. })
    }

    /// The repository path, defaulting to the root.
    #[must_use]
    pub fn path(&self) -> &str {
        self.location.repo_path().unwrap_or("")
    }
}

/// Resolves a repository-relative URI into a `Resource`.
///
/// ## Summary
/// Parses the URI, then settles existence: activities against the
/// activity store, versioned paths against a repository stat, working
/// resources against their bound transaction.
///
/// ## Errors
/// Propagates URI parse errors; a working resource whose activity has no
/// live transaction mapping is `NotFound`.
#[tracing::instrument(skip(repo, activities), fields(uri))]
pub fn resolve(
    repo: &dyn Repository,
    activities: &dyn ActivityStore,
    uri: &str,
    label: Option<&str>,
) -> ServiceResult<Resource> {
    let location = Location::parse(uri, label)?;
    resolve_location(repo, activities, location)
}

/// Resolves an already-parsed location.
///
/// ## Errors
/// See [`resolve`].
pub fn resolve_location(
    repo: &dyn Repository,
    activities: &dyn ActivityStore,
    location: Location,
) -> ServiceResult<Resource> {
    let head = repo.latest_revision()?;

    let resource = match &location {
        Location::Regular { path, revision } => {
            let info = repo.stat(path, *revision)?;
            Resource {
                exists: info.is_some(),
                versioned: true,
                baselined: false,
                working: false,
                collection: info.as_ref().is_some_and(|i| i.kind.is_directory()),
                revision: Some(revision.unwrap_or(head)),
                txn_name: None,
                location,
            }
        }
        Location::Version { path, revision } | Location::BaselineCollection { path, revision } => {
            let info = repo.stat(path, Some(*revision))?;
            Resource {
                exists: info.is_some(),
                versioned: true,
                baselined: false,
                working: false,
                collection: info.as_ref().is_some_and(|i| i.kind.is_directory()),
                revision: Some(*revision),
                txn_name: None,
                location,
            }
        }
        Location::Baseline { revision } => Resource {
            exists: *revision <= head,
            versioned: true,
            baselined: true,
            working: false,
            collection: false,
            revision: Some(*revision),
            txn_name: None,
            location,
        },
        Location::Activity { activity_id } => {
            let txn_name = activities.get(activity_id)?;
            Resource {
                exists: txn_name.is_some(),
                versioned: false,
                baselined: false,
                working: false,
                collection: false,
                revision: None,
                txn_name,
                location,
            }
        }
        Location::Working { activity_id, path } => {
            let Some(txn_name) = activities.get(activity_id)? else {
                return Err(ServiceError::NotFound(format!(
                    "no activity '{activity_id}' behind working resource"
                )));
            };
            let txn = repo.open_txn(&txn_name)?;
            let info = txn.stat(path)?;
            Resource {
                exists: info.is_some(),
                versioned: true,
                baselined: false,
                working: true,
                collection: info.as_ref().is_some_and(|i| i.kind.is_directory()),
                revision: Some(txn.base_revision()?),
                txn_name: Some(txn_name),
                location,
            }
        }
        Location::WorkingBaseline {
            activity_id,
            revision,
        } => {
            let Some(txn_name) = activities.get(activity_id)? else {
                return Err(ServiceError::NotFound(format!(
                    "no activity '{activity_id}' behind working baseline"
                )));
            };
            Resource {
                exists: *revision <= head,
                versioned: true,
                baselined: true,
                working: true,
                collection: false,
                revision: Some(*revision),
                txn_name: Some(txn_name),
                location,
            }
        }
        Location::Vcc => Resource {
            exists: true,
            versioned: true,
            baselined: true,
            working: false,
            collection: false,
            revision: Some(head),
            txn_name: None,
            location,
        },
        Location::ActivityCollection | Location::PrivateRoot => Resource {
            exists: true,
            versioned: false,
            baselined: false,
            working: false,
            collection: true,
            revision: None,
            txn_name: None,
            location,
        },
    };

    Ok(resource)
}

fn canonical(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Splits off the first path segment.
fn split_head(path: &str) -> (&str, Option<&str>) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => {
            if trimmed.is_empty() {
                ("", None)
            } else {
                (trimmed, None)
            }
        }
    }
}

fn parse_revision(value: &str, what: &str) -> ServiceResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ServiceError::Malformed(ParseError::invalid_value_for(what, value)))
}

/// Splits `REV[/PATH]` parameters.
fn split_revision(parameter: &str) -> ServiceResult<(u64, String)> {
    let (revision, path) = split_head(parameter);
    Ok((
        parse_revision(revision, "revision")?,
        canonical(path.unwrap_or("")),
    ))
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2]))
        {
            out.push(hi * 16 + lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
