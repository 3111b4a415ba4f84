//! REPORT request models.
//!
//! One variant per report kind, each with its own parameter struct,
//! resolved from the root element by a single table lookup.

use chrono::{DateTime, Utc};

use super::error::{ParseError, ParseResult};
use super::tree::{ElementNode, parse_tree};
use super::{flag_value, numeric_attribute, numeric_value, required_numeric, required_value};
use crate::dav::core::{Depth, QName, SVN_NS};

/// A parsed REPORT request.
#[derive(Debug, Clone)]
pub enum ReportRequest {
    DatedRev(DatedRevReport),
    Log(LogReport),
    GetLocations(GetLocationsReport),
    FileRevisions(FileRevisionsReport),
    GetLocks(GetLocksReport),
    Replay(ReplayReport),
    Mergeinfo(MergeinfoReport),
    Update(UpdateReport),
}

impl ReportRequest {
    /// Parses a REPORT body.
    ///
    /// ## Errors
    /// Returns `ParseError` when the XML is malformed, the root element
    /// names no known report, or a parameter fails validation.
    #[tracing::instrument(skip(xml), fields(xml_len = xml.len()))]
    pub fn parse(xml: &[u8]) -> ParseResult<Self> {
        let tree = parse_tree(xml)?;
        Self::from_tree(&tree)
    }

    /// Builds the request model from an already-parsed tree.
    ///
    /// ## Errors
    /// Returns `ParseError` for unknown roots or invalid parameters.
    pub fn from_tree(tree: &ElementNode) -> ParseResult<Self> {
        if tree.name().namespace_uri() != SVN_NS {
            return Err(ParseError::unexpected_element(tree.name().local_name()));
        }
        match tree.name().local_name() {
            "dated-rev-report" => DatedRevReport::from_tree(tree).map(Self::DatedRev),
            "log-report" => LogReport::from_tree(tree).map(Self::Log),
            "get-locations" => GetLocationsReport::from_tree(tree).map(Self::GetLocations),
            "file-revs-report" => FileRevisionsReport::from_tree(tree).map(Self::FileRevisions),
            "get-locks-report" => Ok(Self::GetLocks(GetLocksReport)),
            "replay-report" => ReplayReport::from_tree(tree).map(Self::Replay),
            "mergeinfo-report" => MergeinfoReport::from_tree(tree).map(Self::Mergeinfo),
            "update-report" => UpdateReport::from_tree(tree).map(Self::Update),
            other => Err(ParseError::unexpected_element(other)),
        }
    }

    /// Returns the root element name of this report kind.
    #[must_use]
    pub const fn root_element(&self) -> &'static str {
        match self {
            Self::DatedRev(_) => "dated-rev-report",
            Self::Log(_) => "log-report",
            Self::GetLocations(_) => "get-locations",
            Self::FileRevisions(_) => "file-revs-report",
            Self::GetLocks(_) => "get-locks-report",
            Self::Replay(_) => "replay-report",
            Self::Mergeinfo(_) => "mergeinfo-report",
            Self::Update(_) => "update-report",
        }
    }
}

fn svn(name: &'static str) -> QName {
    QName::svn(name)
}

fn dav(name: &'static str) -> QName {
    QName::dav(name)
}

/// `dated-rev-report`: resolve a timestamp to a revision.
#[derive(Debug, Clone)]
pub struct DatedRevReport {
    pub date: DateTime<Utc>,
}

impl DatedRevReport {
    fn from_tree(tree: &ElementNode) -> ParseResult<Self> {
        let value = required_value(tree, &dav("creationdate"))?;
        let date = DateTime::parse_from_rfc3339(value.trim())
            .map_err(|_| ParseError::invalid_value_for("creationdate", value))?
            .with_timezone(&Utc);
        Ok(Self { date })
    }
}

/// `log-report` parameters.
#[derive(Debug, Clone)]
pub struct LogReport {
    pub start_revision: Option<u64>,
    pub end_revision: Option<u64>,
    pub limit: Option<u64>,
    pub discover_changed_paths: bool,
    pub strict_node_history: bool,
    pub include_merged_revisions: bool,
    pub omit_log_text: bool,
    pub paths: Vec<String>,
}

impl LogReport {
    fn from_tree(tree: &ElementNode) -> ParseResult<Self> {
        Ok(Self {
            start_revision: numeric_value(tree, &svn("start-revision"))?,
            end_revision: numeric_value(tree, &svn("end-revision"))?,
            limit: numeric_value(tree, &svn("limit"))?,
            discover_changed_paths: flag_value(tree, &svn("discover-changed-paths")),
            strict_node_history: flag_value(tree, &svn("strict-node-history")),
            include_merged_revisions: flag_value(tree, &svn("include-merged-revisions")),
            omit_log_text: flag_value(tree, &svn("omit-log-text")),
            paths: tree
                .child_values(&svn("path"))
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }
}

/// `get-locations` parameters.
#[derive(Debug, Clone)]
pub struct GetLocationsReport {
    pub path: String,
    pub peg_revision: u64,
    pub location_revisions: Vec<u64>,
}

impl GetLocationsReport {
    fn from_tree(tree: &ElementNode) -> ParseResult<Self> {
        let path = required_value(tree, &svn("path"))?.to_string();
        let peg_revision = required_numeric(tree, &svn("peg-revision"))?;
        let mut location_revisions = Vec::new();
        for child in tree.children_named(&svn("location-revision")) {
            let value = child
                .first_value()
                .ok_or_else(|| ParseError::missing_element("location-revision"))?;
            let revision = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_value_for("location-revision", value))?;
            location_revisions.push(revision);
        }
        Ok(Self {
            path,
            peg_revision,
            location_revisions,
        })
    }
}

/// `file-revs-report` parameters.
#[derive(Debug, Clone)]
pub struct FileRevisionsReport {
    pub path: String,
    pub start_revision: Option<u64>,
    pub end_revision: Option<u64>,
}

impl FileRevisionsReport {
    fn from_tree(tree: &ElementNode) -> ParseResult<Self> {
        Ok(Self {
            path: required_value(tree, &svn("path"))?.to_string(),
            start_revision: numeric_value(tree, &svn("start-revision"))?,
            end_revision: numeric_value(tree, &svn("end-revision"))?,
        })
    }
}

/// `get-locks-report`: the path under query comes from the request URI.
#[derive(Debug, Clone, Copy)]
pub struct GetLocksReport;

/// `replay-report` parameters.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub revision: u64,
    pub low_water_mark: u64,
    pub send_deltas: bool,
}

impl ReplayReport {
    fn from_tree(tree: &ElementNode) -> ParseResult<Self> {
        Ok(Self {
            revision: required_numeric(tree, &svn("revision"))?,
            low_water_mark: numeric_value(tree, &svn("low-water-mark"))?.unwrap_or(0),
            send_deltas: flag_value(tree, &svn("send-deltas")),
        })
    }
}

/// Mergeinfo inheritance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeinfoInheritance {
    #[default]
    Explicit,
    Inherited,
    NearestAncestor,
}

impl MergeinfoInheritance {
    fn parse(value: &str) -> ParseResult<Self> {
        match value.trim() {
            "explicit" => Ok(Self::Explicit),
            "inherited" => Ok(Self::Inherited),
            "nearest-ancestor" => Ok(Self::NearestAncestor),
            other => Err(ParseError::invalid_value_for("inherit", other)),
        }
    }
}

/// `mergeinfo-report` parameters.
#[derive(Debug, Clone)]
pub struct MergeinfoReport {
    pub revision: Option<u64>,
    pub inherit: MergeinfoInheritance,
    pub paths: Vec<String>,
}

impl MergeinfoReport {
    fn from_tree(tree: &ElementNode) -> ParseResult<Self> {
        let inherit = match tree.child(&svn("inherit")).and_then(ElementNode::first_value) {
            Some(value) => MergeinfoInheritance::parse(value)?,
            None => MergeinfoInheritance::default(),
        };
        Ok(Self {
            revision: numeric_value(tree, &svn("revision"))?,
            inherit,
            paths: tree
                .child_values(&svn("path"))
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }
}

/// One reported working-copy entry inside an `update-report`.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub path: String,
    pub revision: Option<u64>,
    pub depth: Depth,
    pub start_empty: bool,
    pub lock_token: Option<String>,
    pub linkpath: Option<String>,
}

/// The action an `update-report` encodes, derived from its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    Update,
    Status,
    Switch,
    Diff,
}

/// `update-report` parameters.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub send_all: bool,
    pub target_revision: Option<u64>,
    pub src_path: String,
    pub dst_path: Option<String>,
    pub update_target: String,
    pub depth: Depth,
    pub ignore_ancestry: bool,
    pub text_deltas: bool,
    pub resource_walk: bool,
    pub entries: Vec<ReportEntry>,
    pub missing: Vec<String>,
}

impl UpdateReport {
    fn from_tree(tree: &ElementNode) -> ParseResult<Self> {
        let send_all = tree.attribute("send-all") == Some("true");

        let explicit_depth = match tree.child(&svn("depth")).and_then(ElementNode::first_value) {
            Some(value) => Some(
                Depth::from_element(value)
                    .ok_or_else(|| ParseError::invalid_value_for("depth", value))?,
            ),
            None => None,
        };
        let recursive = tree
            .child(&svn("recursive"))
            .map(|child| !matches!(child.first_value(), Some("no" | "false")));
        let depth = Depth::resolve(explicit_depth, recursive, Depth::Infinity);

        let src_path = tree
            .child(&svn("src-path"))
            .and_then(ElementNode::first_value)
            .ok_or_else(|| {
                ParseError::missing_element(
                    "src-path (this may indicate that your client is too old)",
                )
            })?
            .to_string();

        let mut entries = Vec::new();
        for entry in tree.children_named(&svn("entry")) {
            let entry_depth = match entry.attribute("depth") {
                Some(value) => Depth::from_element(value)
                    .ok_or_else(|| ParseError::invalid_value_for("entry depth", value))?,
                None => Depth::Infinity,
            };
            entries.push(ReportEntry {
                path: entry.first_value().unwrap_or("").to_string(),
                revision: numeric_attribute(entry, "rev")?,
                depth: entry_depth,
                start_empty: entry.attribute("start-empty") == Some("true"),
                lock_token: entry.attribute("lock-token").map(str::to_string),
                linkpath: entry.attribute("linkpath").map(str::to_string),
            });
        }

        let text_deltas = match tree.child(&svn("text-deltas")) {
            Some(child) => !matches!(child.first_value(), Some("no" | "false")),
            // Deltas are implied by send-all mode.
            None => send_all,
        };

        Ok(Self {
            send_all,
            target_revision: numeric_value(tree, &svn("target-revision"))?,
            src_path,
            dst_path: tree
                .child(&svn("dst-path"))
                .and_then(ElementNode::first_value)
                .map(str::to_string),
            update_target: tree
                .child(&svn("update-target"))
                .and_then(ElementNode::first_value)
                .unwrap_or("")
                .to_string(),
            depth,
            ignore_ancestry: flag_value(tree, &svn("ignore-ancestry")),
            text_deltas,
            resource_walk: flag_value(tree, &svn("resource-walk")),
            entries,
            missing: tree
                .child_values(&svn("missing"))
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    /// Classifies the request the way the protocol distinguishes update,
    /// status, switch and diff drives.
    #[must_use]
    pub fn action(&self) -> UpdateAction {
        if self.dst_path.is_some() {
            if self.send_all {
                UpdateAction::Switch
            } else {
                UpdateAction::Diff
            }
        } else if self.text_deltas {
            UpdateAction::Update
        } else {
            UpdateAction::Status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_report() {
        let xml = br#"<S:log-report xmlns:S="svn:" xmlns:D="DAV:">
  <S:start-revision>1</S:start-revision>
  <S:end-revision>3</S:end-revision>
  <S:limit>10</S:limit>
  <S:discover-changed-paths/>
  <S:path>/trunk</S:path>
</S:log-report>"#;

        let ReportRequest::Log(log) = ReportRequest::parse(xml).unwrap() else {
            panic!("expected log report");
        };
        assert_eq!(log.start_revision, Some(1));
        assert_eq!(log.end_revision, Some(3));
        assert_eq!(log.limit, Some(10));
        assert!(log.discover_changed_paths);
        assert!(!log.include_merged_revisions);
        assert_eq!(log.paths, vec!["/trunk"]);
    }

    #[test]
    fn unparsable_revision_names_the_element() {
        let xml = br#"<S:log-report xmlns:S="svn:">
  <S:start-revision>banana</S:start-revision>
</S:log-report>"#;

        let err = ReportRequest::parse(xml).unwrap_err();
        assert!(err.message.contains("start-revision"));
        assert!(err.message.contains("banana"));
    }

    #[test]
    fn dated_rev_requires_creationdate() {
        let xml = br#"<S:dated-rev-report xmlns:S="svn:" xmlns:D="DAV:"></S:dated-rev-report>"#;
        let err = ReportRequest::parse(xml).unwrap_err();
        assert!(err.message.contains("creationdate"));
    }

    #[test]
    fn dated_rev_parses_rfc3339() {
        let xml = br#"<S:dated-rev-report xmlns:S="svn:" xmlns:D="DAV:">
  <D:creationdate>2006-02-01T12:00:00.000000Z</D:creationdate>
</S:dated-rev-report>"#;
        let ReportRequest::DatedRev(dated) = ReportRequest::parse(xml).unwrap() else {
            panic!("expected dated-rev report");
        };
        assert_eq!(dated.date.timestamp(), 1_138_795_200);
    }

    #[test]
    fn get_locations_collects_revisions() {
        let xml = br#"<S:get-locations xmlns:S="svn:">
  <S:path>/trunk/a</S:path>
  <S:peg-revision>7</S:peg-revision>
  <S:location-revision>3</S:location-revision>
  <S:location-revision>5</S:location-revision>
</S:get-locations>"#;
        let ReportRequest::GetLocations(loc) = ReportRequest::parse(xml).unwrap() else {
            panic!("expected get-locations report");
        };
        assert_eq!(loc.peg_revision, 7);
        assert_eq!(loc.location_revisions, vec![3, 5]);
    }

    #[test]
    fn update_report_requires_src_path() {
        let xml = br#"<S:update-report xmlns:S="svn:">
  <S:target-revision>2</S:target-revision>
</S:update-report>"#;
        let err = ReportRequest::parse(xml).unwrap_err();
        assert!(err.message.contains("src-path"));
    }

    #[test]
    fn update_depth_defaults_to_infinity() {
        let xml = br#"<S:update-report xmlns:S="svn:" send-all="true">
  <S:src-path>/repos/trunk</S:src-path>
  <S:entry rev="1"></S:entry>
</S:update-report>"#;
        let ReportRequest::Update(update) = ReportRequest::parse(xml).unwrap() else {
            panic!("expected update report");
        };
        assert_eq!(update.depth, Depth::Infinity);
        assert_eq!(update.action(), UpdateAction::Update);
        assert_eq!(update.entries.len(), 1);
        assert_eq!(update.entries[0].revision, Some(1));
    }

    #[test]
    fn update_recursive_no_means_non_recursive() {
        let xml = br#"<S:update-report xmlns:S="svn:" send-all="true">
  <S:src-path>/repos/trunk</S:src-path>
  <S:recursive>no</S:recursive>
</S:update-report>"#;
        let ReportRequest::Update(update) = ReportRequest::parse(xml).unwrap() else {
            panic!("expected update report");
        };
        assert_eq!(update.depth, Depth::Zero);
    }

    #[test]
    fn update_explicit_depth_beats_recursive() {
        let xml = br#"<S:update-report xmlns:S="svn:" send-all="true">
  <S:src-path>/repos/trunk</S:src-path>
  <S:depth>immediates</S:depth>
  <S:recursive>no</S:recursive>
</S:update-report>"#;
        let ReportRequest::Update(update) = ReportRequest::parse(xml).unwrap() else {
            panic!("expected update report");
        };
        assert_eq!(update.depth, Depth::One);
    }

    #[test]
    fn status_drive_without_text_deltas() {
        let xml = br#"<S:update-report xmlns:S="svn:">
  <S:src-path>/repos/trunk</S:src-path>
</S:update-report>"#;
        let ReportRequest::Update(update) = ReportRequest::parse(xml).unwrap() else {
            panic!("expected update report");
        };
        assert_eq!(update.action(), UpdateAction::Status);
    }

    #[test]
    fn replay_report_parses() {
        let xml = br#"<S:replay-report xmlns:S="svn:">
  <S:revision>5</S:revision>
  <S:low-water-mark>2</S:low-water-mark>
  <S:send-deltas>1</S:send-deltas>
</S:replay-report>"#;
        let ReportRequest::Replay(replay) = ReportRequest::parse(xml).unwrap() else {
            panic!("expected replay report");
        };
        assert_eq!(replay.revision, 5);
        assert_eq!(replay.low_water_mark, 2);
        assert!(replay.send_deltas);
    }

    #[test]
    fn unknown_report_root_is_rejected() {
        let xml = br#"<S:blame-report xmlns:S="svn:"/>"#;
        assert!(ReportRequest::parse(xml).is_err());
    }
}
