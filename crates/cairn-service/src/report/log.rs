//! The `log-report` handler.
//!
//! Log items nest when a revision carries merged-from children: the item
//! stays open, children follow inside it, and a sentinel entry with no
//! revision closes it again.

use std::io::Write;

use chrono::SecondsFormat;

use cairn_core::cancel::CancelToken;
use cairn_proto::dav::build::XmlWriter;
use cairn_proto::dav::parse::LogReport;
use cairn_repo::{ChangeAction, LogEntry, LogOptions, RepoError, Repository};

use super::{check_cancel, close_report_root, join_path, open_report_root, write_err};
use crate::error::{ServiceError, ServiceResult};
use crate::resource::Resource;

/// Streams `log-item` fragments, tracking the stack of pending
/// merged-from revisions.
pub struct LogItemWriter<'w, W: Write> {
    writer: &'w mut XmlWriter<W>,
    merge_stack: Vec<u64>,
}

impl<'w, W: Write> LogItemWriter<'w, W> {
    pub fn new(writer: &'w mut XmlWriter<W>) -> Self {
        Self {
            writer,
            merge_stack: Vec::new(),
        }
    }

    /// Writes one entry in callback order.
    ///
    /// ## Errors
    /// An unbalanced sentinel (no pending merged-from run) or an XML
    /// write failure.
    pub fn write_entry(&mut self, entry: &LogEntry) -> Result<(), RepoError> {
        let Some(revision) = entry.revision else {
            // Sentinel: close the innermost pending merged-from run.
            if self.merge_stack.pop().is_none() {
                return Err(RepoError::Storage(
                    "log sentinel without a pending merged-from revision".to_string(),
                ));
            }
            return self.writer.close("S:log-item").map_err(write_err);
        };

        self.item(revision, entry).map_err(write_err)?;

        if entry.has_children {
            self.merge_stack.push(revision);
            Ok(())
        } else {
            self.writer.close("S:log-item").map_err(write_err)
        }
    }

    fn item(&mut self, revision: u64, entry: &LogEntry) -> Result<(), quick_xml::Error> {
        self.writer.open("S:log-item")?;
        self.writer
            .text_element("D:version-name", &revision.to_string())?;
        if let Some(ref author) = entry.author {
            self.writer
                .value_element("D:creator-displayname", &[], author.as_bytes())?;
        }
        if let Some(date) = entry.date {
            self.writer.text_element(
                "S:date",
                &date.to_rfc3339_opts(SecondsFormat::Micros, true),
            )?;
        }
        if let Some(ref message) = entry.message {
            self.writer
                .value_element("D:comment", &[], message.as_bytes())?;
        }
        if entry.has_children {
            self.writer.empty("S:has-children")?;
        }

        for change in &entry.changed_paths {
            let display = format!("/{}", change.path);
            match change.action {
                ChangeAction::Added | ChangeAction::Replaced => {
                    let tag = if change.action == ChangeAction::Added {
                        "S:added-path"
                    } else {
                        "S:replaced-path"
                    };
                    match &change.copyfrom {
                        Some((from_path, from_rev)) => {
                            let from_rev = from_rev.to_string();
                            let from_path = format!("/{from_path}");
                            self.writer.text_element_with_attrs(
                                tag,
                                &[
                                    ("copyfrom-path", from_path.as_str()),
                                    ("copyfrom-rev", from_rev.as_str()),
                                ],
                                &display,
                            )?;
                        }
                        None => self.writer.text_element(tag, &display)?,
                    }
                }
                ChangeAction::Modified => {
                    self.writer.text_element("S:modified-path", &display)?;
                }
                ChangeAction::Deleted => {
                    self.writer.text_element("S:deleted-path", &display)?;
                }
            }
        }
        Ok(())
    }

    /// Pending merged-from runs left open; zero for a balanced drive.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.merge_stack.len()
    }
}

/// Runs a `log-report`.
///
/// ## Errors
/// Propagates repository and write errors; `Cancelled` aborts the
/// document between items.
pub fn handle<W: Write>(
    repo: &dyn Repository,
    resource: &Resource,
    request: &LogReport,
    writer: &mut XmlWriter<W>,
    cancel: &CancelToken,
) -> ServiceResult<()> {
    let head = repo.latest_revision()?;
    let start = request.start_revision.unwrap_or(head);
    let end = request.end_revision.unwrap_or(0);
    let paths: Vec<String> = if request.paths.is_empty() {
        vec![resource.path().to_string()]
    } else {
        request
            .paths
            .iter()
            .map(|path| join_path(resource.path(), path))
            .collect()
    };
    let options = LogOptions {
        discover_changed_paths: request.discover_changed_paths,
        strict_node_history: request.strict_node_history,
        include_merged_revisions: request.include_merged_revisions,
        omit_log_text: request.omit_log_text,
        limit: request.limit,
    };

    open_report_root(writer, "log-report", &[])?;
    let mut items = LogItemWriter::new(writer);
    repo.log(&paths, start, end, &options, &mut |entry| {
        check_cancel(cancel)?;
        items.write_entry(entry)
    })
    .map_err(ServiceError::from)?;

    if items.pending() != 0 {
        return Err(ServiceError::Xml(
            "log drive ended with unclosed merged-from runs".to_string(),
        ));
    }
    close_report_root(writer, "log-report")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Utc};

    fn entry(revision: u64) -> LogEntry {
        LogEntry {
            revision: Some(revision),
            author: Some("alice".to_string()),
            date: Some(Utc.with_ymd_and_hms(2007, 3, 1, 12, 0, 0).unwrap()),
            message: Some(format!("change {revision}")),
            changed_paths: Vec::new(),
            has_children: false,
        }
    }

    fn render(entries: &[LogEntry]) -> String {
        let mut writer = XmlWriter::new(Vec::new());
        let mut items = LogItemWriter::new(&mut writer);
        for e in entries {
            items.write_entry(e).unwrap();
        }
        assert_eq!(items.pending(), 0);
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn entries_emit_in_given_order() {
        let xml = render(&[entry(1), entry(2), entry(3)]);
        let first = xml.find("<D:version-name>1<").unwrap();
        let second = xml.find("<D:version-name>2<").unwrap();
        let third = xml.find("<D:version-name>3<").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn descending_order_is_preserved_verbatim() {
        let xml = render(&[entry(3), entry(2), entry(1)]);
        let first = xml.find("<D:version-name>3<").unwrap();
        let last = xml.find("<D:version-name>1<").unwrap();
        assert!(first < last);
    }

    #[test]
    fn merged_children_nest_until_sentinel() {
        let mut parent = entry(4);
        parent.has_children = true;
        let sentinel = LogEntry::default();

        let xml = render(&[parent, entry(3), sentinel]);
        // The child item sits inside the parent item.
        let parent_open = xml.find("<D:version-name>4<").unwrap();
        let child_open = xml.find("<D:version-name>3<").unwrap();
        assert!(parent_open < child_open);
        assert!(xml.contains("<S:has-children/>"));
        assert_eq!(xml.matches("<S:log-item>").count(), 2);
        assert_eq!(xml.matches("</S:log-item>").count(), 2);
    }

    #[test]
    fn sentinel_without_parent_is_an_error() {
        let mut writer = XmlWriter::new(Vec::new());
        let mut items = LogItemWriter::new(&mut writer);
        assert!(items.write_entry(&LogEntry::default()).is_err());
    }

    #[test]
    fn unsafe_commit_message_is_base64_framed() {
        let mut bad = entry(1);
        bad.message = Some("nul\u{0}inside".to_string());
        let xml = render(&[bad]);
        assert!(xml.contains("<D:comment encoding=\"base64\">"));
    }

    #[test]
    fn changed_paths_carry_copyfrom_attrs() {
        let mut e = entry(2);
        e.changed_paths = vec![
            cairn_repo::ChangedPath {
                path: "trunk/b.txt".to_string(),
                action: ChangeAction::Added,
                copyfrom: Some(("trunk/a.txt".to_string(), 1)),
            },
            cairn_repo::ChangedPath {
                path: "trunk/a.txt".to_string(),
                action: ChangeAction::Deleted,
                copyfrom: None,
            },
        ];
        let xml = render(&[e]);
        assert!(xml.contains("copyfrom-path=\"/trunk/a.txt\""));
        assert!(xml.contains("copyfrom-rev=\"1\""));
        assert!(xml.contains("<S:deleted-path>/trunk/a.txt</S:deleted-path>"));
    }
}
