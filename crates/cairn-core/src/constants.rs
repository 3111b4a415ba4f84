/// Route component constants shared across crates.
pub const REPOS_ROUTE_COMPONENT: &str = "repos";
pub const REPOS_ROUTE_PREFIX: &str = const_str::concat!("/", REPOS_ROUTE_COMPONENT);

/// Reserved URI segment introducing non-public resource addresses.
pub const SPECIAL_URI: &str = "!svn";

/// The only accepted version-controlled-configuration name.
pub const DEFAULT_VCC_NAME: &str = "default";

/// Kind marker segments under the special URI.
pub const KIND_VERSION: &str = "ver";
pub const KIND_BASELINE: &str = "bln";
pub const KIND_BASELINE_COLL: &str = "bc";
pub const KIND_ACTIVITY: &str = "act";
pub const KIND_WORKING: &str = "wrk";
pub const KIND_WORKING_BASELINE: &str = "wbl";
pub const KIND_VCC: &str = "vcc";

/// Request headers carried by the protocol.
pub const DEPTH_HEADER: &str = "Depth";
pub const LABEL_HEADER: &str = "Label";
pub const DESTINATION_HEADER: &str = "Destination";
pub const OPTIONS_HEADER: &str = "X-SVN-Options";
pub const VERSION_NAME_HEADER: &str = "X-SVN-Version-Name";
pub const LOCK_TOKEN_HEADER: &str = "Lock-Token";

/// Client capability flags accepted in the options header.
pub const OPTION_LOCK_STEAL: &str = "lock-steal";
pub const OPTION_LOCK_BREAK: &str = "lock-break";
pub const OPTION_KEEP_LOCKS: &str = "keep-locks";
pub const OPTION_RELEASE_LOCKS: &str = "release-locks";
pub const OPTION_NO_MERGE_RESPONSE: &str = "no-merge-response";

/// Value of the `DAV` response header advertised by OPTIONS.
pub const DAV_COMPLIANCE: &str = "1,2,version-control";

/// Content type of every XML response body.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";
