//! The `update-report` handler: drives the difference between the
//! client's reported working-copy state and a target revision.

use std::io::Write;

use cairn_core::cancel::CancelToken;
use cairn_proto::dav::build::{XmlWriter, base64_encode};
use cairn_proto::dav::parse::UpdateReport;
use cairn_repo::{EditSink, RepoError, ReportedState, Repository, StateEntry};

use super::{check_cancel, close_report_root, join_path, repo_relative, write_err};
use crate::error::{ServiceError, ServiceResult};
use crate::resource::Location;

/// Serializes an update drive as nested `update-report` elements.
///
/// Directories and files nest; each opened node carries the
/// `D:checked-in` href of its version resource at the target revision.
/// In send-all mode text arrives inline as base64 `txdelta` bodies;
/// otherwise the client is told to `fetch-file`.
pub struct UpdateReportWriter<'w, 'c, W: Write> {
    writer: &'w mut XmlWriter<W>,
    cancel: &'c CancelToken,
    context: String,
    send_text: bool,
    target_rev: u64,
    open_tags: Vec<&'static str>,
    paths: Vec<String>,
}

impl<'w, 'c, W: Write> UpdateReportWriter<'w, 'c, W> {
    pub fn new(
        writer: &'w mut XmlWriter<W>,
        cancel: &'c CancelToken,
        context: &str,
        root_path: &str,
        send_text: bool,
    ) -> Self {
        Self {
            writer,
            cancel,
            context: context.to_string(),
            send_text,
            target_rev: 0,
            open_tags: Vec::new(),
            paths: vec![root_path.to_string()],
        }
    }

    fn checked_in(&mut self, path: &str) -> Result<(), RepoError> {
        let href = Location::Version {
            path: path.to_string(),
            revision: self.target_rev,
        }
        .href(&self.context);
        self.writer.open("D:checked-in").map_err(write_err)?;
        self.writer
            .text_element("D:href", &href)
            .map_err(write_err)?;
        self.writer.close("D:checked-in").map_err(write_err)
    }

    fn open_node(
        &mut self,
        tag: &'static str,
        path: &str,
        rev: Option<u64>,
    ) -> Result<(), RepoError> {
        check_cancel(self.cancel)?;
        let name = path.rsplit('/').next().unwrap_or(path);
        match rev {
            Some(rev) => {
                let rev = rev.to_string();
                self.writer
                    .open_with_attrs(tag, &[("name", name), ("rev", rev.as_str())])
            }
            None => self.writer.open_with_attrs(tag, &[("name", name)]),
        }
        .map_err(write_err)?;
        self.open_tags.push(tag);
        self.paths.push(path.to_string());
        self.checked_in(path)
    }

    fn close_node(&mut self) -> Result<(), RepoError> {
        let tag = self.open_tags.pop().ok_or_else(|| {
            RepoError::Storage("update drive closed more nodes than it opened".to_string())
        })?;
        self.paths.pop();
        self.writer.close(tag).map_err(write_err)
    }
}

impl<W: Write> EditSink for UpdateReportWriter<'_, '_, W> {
    fn target_revision(&mut self, revision: u64) -> Result<(), RepoError> {
        self.target_rev = revision;
        let rev = revision.to_string();
        self.writer
            .empty_with_attrs("S:target-revision", &[("rev", rev.as_str())])
            .map_err(write_err)
    }

    fn open_root(&mut self, base_revision: Option<u64>) -> Result<(), RepoError> {
        let rev = base_revision.unwrap_or(0).to_string();
        self.writer
            .open_with_attrs("S:open-directory", &[("rev", rev.as_str())])
            .map_err(write_err)?;
        self.open_tags.push("S:open-directory");
        let root = self.paths[0].clone();
        self.checked_in(&root)
    }

    fn delete_entry(&mut self, path: &str, _revision: Option<u64>) -> Result<(), RepoError> {
        check_cancel(self.cancel)?;
        let name = path.rsplit('/').next().unwrap_or(path);
        self.writer
            .empty_with_attrs("S:delete-entry", &[("name", name)])
            .map_err(write_err)
    }

    fn add_directory(&mut self, path: &str, _copyfrom: Option<(&str, u64)>) -> Result<(), RepoError> {
        self.open_node("S:add-directory", path, None)
    }

    fn open_directory(&mut self, path: &str, base_revision: Option<u64>) -> Result<(), RepoError> {
        self.open_node("S:open-directory", path, base_revision)
    }

    fn change_dir_prop(&mut self, name: &str, value: Option<&[u8]>) -> Result<(), RepoError> {
        write_prop(self.writer, name, value)
    }

    fn close_directory(&mut self) -> Result<(), RepoError> {
        self.close_node()
    }

    fn add_file(&mut self, path: &str, _copyfrom: Option<(&str, u64)>) -> Result<(), RepoError> {
        self.open_node("S:add-file", path, None)
    }

    fn open_file(&mut self, path: &str, base_revision: Option<u64>) -> Result<(), RepoError> {
        self.open_node("S:open-file", path, base_revision)
    }

    fn change_file_prop(&mut self, name: &str, value: Option<&[u8]>) -> Result<(), RepoError> {
        write_prop(self.writer, name, value)
    }

    fn apply_textdelta(&mut self, _base_checksum: Option<&str>) -> Result<(), RepoError> {
        if self.send_text {
            self.writer.open("S:txdelta").map_err(write_err)
        } else {
            self.writer.empty("S:fetch-file").map_err(write_err)
        }
    }

    fn delta_chunk(&mut self, chunk: &[u8]) -> Result<(), RepoError> {
        if self.send_text {
            self.writer.raw(&base64_encode(chunk)).map_err(write_err)?;
        }
        Ok(())
    }

    fn close_textdelta(&mut self) -> Result<(), RepoError> {
        if self.send_text {
            self.writer.close("S:txdelta").map_err(write_err)?;
        }
        Ok(())
    }

    fn close_file(&mut self, checksum: Option<&str>) -> Result<(), RepoError> {
        if let Some(checksum) = checksum {
            self.writer.open("S:prop").map_err(write_err)?;
            self.writer
                .text_element("V:md5-checksum", checksum)
                .map_err(write_err)?;
            self.writer.close("S:prop").map_err(write_err)?;
        }
        self.close_node()
    }

    fn close_edit(&mut self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Versioned property changes inside an update drive, under the uniform
/// escaping rule.
fn write_prop<W: Write>(
    writer: &mut XmlWriter<W>,
    name: &str,
    value: Option<&[u8]>,
) -> Result<(), RepoError> {
    match value {
        Some(value) => writer
            .value_element("S:set-prop", &[("name", name)], value)
            .map_err(write_err),
        None => writer
            .empty_with_attrs("S:remove-prop", &[("name", name)])
            .map_err(write_err),
    }
}

/// Runs an `update-report`.
///
/// ## Errors
/// Propagates repository and write errors; `Cancelled` between emitted
/// operations.
pub fn handle<W: Write>(
    repo: &dyn Repository,
    request: &UpdateReport,
    context: &str,
    writer: &mut XmlWriter<W>,
    cancel: &CancelToken,
) -> ServiceResult<()> {
    let head = repo.latest_revision()?;
    let target_rev = request.target_revision.unwrap_or(head);

    let src = repo_relative(&request.src_path, context);
    let target_path = if request.update_target.is_empty() {
        src
    } else {
        join_path(&src, &request.update_target)
    };

    let state = ReportedState {
        entries: request
            .entries
            .iter()
            .map(|entry| StateEntry {
                path: entry.path.clone(),
                revision: entry.revision,
                start_empty: entry.start_empty,
            })
            .collect(),
        missing: request.missing.clone(),
    };

    writer.declaration()?;
    let mut attrs: Vec<(&str, &str)> = vec![
        ("xmlns:S", cairn_proto::dav::core::SVN_NS),
        ("xmlns:D", cairn_proto::dav::core::DAV_NS),
        ("xmlns:V", cairn_proto::dav::core::SVN_DAV_PROP_NS),
    ];
    if request.send_all {
        attrs.push(("send-all", "true"));
    }
    writer.open_with_attrs("S:update-report", &attrs)?;

    let send_text = request.send_all && request.text_deltas;
    let mut sink = UpdateReportWriter::new(writer, cancel, context, &target_path, send_text);
    repo.drive_update(&state, target_rev, &target_path, request.depth, true, &mut sink)
        .map_err(ServiceError::from)?;
    close_report_root(writer, "update-report")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_proto::dav::parse::ReportRequest;
    use cairn_repo::{MemoryRepository, Transaction as _};

    fn seeded() -> MemoryRepository {
        let repo = MemoryRepository::new();
        let name = repo.begin_txn(0, Some("alice")).unwrap();
        let mut txn = repo.open_txn(&name).unwrap();
        txn.make_dir("trunk").unwrap();
        txn.put_file("trunk/a.txt", b"alpha\n".to_vec()).unwrap();
        txn.commit(&[]).unwrap();
        let name = repo.begin_txn(1, Some("alice")).unwrap();
        let mut txn = repo.open_txn(&name).unwrap();
        txn.put_file("trunk/b.txt", b"beta\n".to_vec()).unwrap();
        txn.commit(&[]).unwrap();
        repo
    }

    fn parse_update(xml: &[u8]) -> UpdateReport {
        match ReportRequest::parse(xml).unwrap() {
            ReportRequest::Update(update) => update,
            _ => panic!("expected update report"),
        }
    }

    #[test]
    fn update_emits_target_revision_first_then_changes() {
        let repo = seeded();
        let request = parse_update(
            br#"<S:update-report xmlns:S="svn:" send-all="true">
  <S:src-path>/repos/trunk</S:src-path>
  <S:target-revision>2</S:target-revision>
  <S:entry rev="1"></S:entry>
</S:update-report>"#,
        );

        let mut writer = XmlWriter::new(Vec::new());
        handle(&repo, &request, "/repos", &mut writer, &CancelToken::new()).unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();

        let target = xml.find("<S:target-revision rev=\"2\"/>").unwrap();
        let root = xml.find("<S:open-directory rev=\"1\">").unwrap();
        let add = xml.find("<S:add-file name=\"b.txt\">").unwrap();
        assert!(target < root && root < add);
        assert!(xml.contains("/repos/!svn/ver/2/trunk/b.txt"));
        assert!(xml.contains("<S:txdelta>"));
        assert!(xml.ends_with("</S:update-report>"));
    }

    #[test]
    fn status_drive_sends_fetch_file_instead_of_text() {
        let repo = seeded();
        let request = parse_update(
            br#"<S:update-report xmlns:S="svn:" send-all="true">
  <S:src-path>/repos/trunk</S:src-path>
  <S:text-deltas>no</S:text-deltas>
  <S:entry rev="1"></S:entry>
</S:update-report>"#,
        );

        let mut writer = XmlWriter::new(Vec::new());
        handle(&repo, &request, "/repos", &mut writer, &CancelToken::new()).unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert!(xml.contains("<S:fetch-file/>"));
        assert!(!xml.contains("<S:txdelta>"));
    }

    #[test]
    fn start_empty_resends_everything() {
        let repo = seeded();
        let request = parse_update(
            br#"<S:update-report xmlns:S="svn:" send-all="true">
  <S:src-path>/repos/trunk</S:src-path>
  <S:entry rev="2" start-empty="true"></S:entry>
</S:update-report>"#,
        );

        let mut writer = XmlWriter::new(Vec::new());
        handle(&repo, &request, "/repos", &mut writer, &CancelToken::new()).unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert!(xml.contains("<S:add-file name=\"a.txt\">"));
        assert!(xml.contains("<S:add-file name=\"b.txt\">"));
    }
}
