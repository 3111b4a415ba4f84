//! The `get-locks-report` handler.

use std::io::Write;

use chrono::SecondsFormat;

use cairn_core::cancel::CancelToken;
use cairn_proto::dav::build::XmlWriter;
use cairn_repo::Repository;

use super::{close_report_root, open_report_root};
use crate::error::{ServiceError, ServiceResult};
use crate::resource::Resource;

/// Emits every lock at or below the addressed path.
///
/// ## Summary
/// Lock owner and comment follow the uniform escaping rule: XML-safe
/// values inline, anything else base64 with an `encoding` attribute.
///
/// ## Errors
/// Propagates repository and write errors; `Cancelled` between items.
pub fn handle<W: Write>(
    repo: &dyn Repository,
    resource: &Resource,
    writer: &mut XmlWriter<W>,
    cancel: &CancelToken,
) -> ServiceResult<()> {
    let locks = repo.get_locks(resource.path())?;

    open_report_root(writer, "get-locks-report", &[])?;
    for lock in locks {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        writer.open("S:lock")?;
        writer.text_element("S:path", &format!("/{}", lock.path))?;
        writer.text_element("S:token", &lock.token)?;
        writer.value_element("S:owner", &[], lock.owner.as_bytes())?;
        if let Some(ref comment) = lock.comment {
            writer.value_element("S:comment", &[], comment)?;
        }
        writer.text_element(
            "S:creationdate",
            &lock.created.to_rfc3339_opts(SecondsFormat::Micros, true),
        )?;
        if let Some(expires) = lock.expires {
            writer.text_element(
                "S:expirationdate",
                &expires.to_rfc3339_opts(SecondsFormat::Micros, true),
            )?;
        }
        writer.close("S:lock")?;
    }
    close_report_root(writer, "get-locks-report")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::resolve;
    use base64::Engine as _;
    use cairn_repo::{MemoryActivityStore, MemoryRepository, Transaction as _};

    fn seeded() -> MemoryRepository {
        let repo = MemoryRepository::new();
        let name = repo.begin_txn(0, None).unwrap();
        let mut txn = repo.open_txn(&name).unwrap();
        txn.make_dir("trunk").unwrap();
        txn.put_file("trunk/a.txt", b"alpha\n".to_vec()).unwrap();
        txn.commit(&[]).unwrap();
        repo
    }

    #[test]
    fn nul_comment_round_trips_through_base64() {
        let repo = seeded();
        let comment = b"before\x00after".to_vec();
        repo.lock("trunk/a.txt", "alice", Some(&comment), false)
            .unwrap();

        let store = MemoryActivityStore::new();
        let resource = resolve(&repo, &store, "/trunk", None).unwrap();
        let mut writer = XmlWriter::new(Vec::new());
        handle(&repo, &resource, &mut writer, &CancelToken::new()).unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();

        let start = xml
            .find("<S:comment encoding=\"base64\">")
            .expect("comment must be base64 framed")
            + "<S:comment encoding=\"base64\">".len();
        let end = xml[start..].find("</S:comment>").unwrap() + start;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(xml[start..end].trim())
            .unwrap();
        assert_eq!(decoded, comment);
    }

    #[test]
    fn cancellation_aborts_before_emitting() {
        let repo = seeded();
        repo.lock("trunk/a.txt", "alice", None, false).unwrap();
        let store = MemoryActivityStore::new();
        let resource = resolve(&repo, &store, "/trunk", None).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let mut writer = XmlWriter::new(Vec::new());
        let err = handle(&repo, &resource, &mut writer, &cancel).unwrap_err();
        assert!(matches!(err, ServiceError::Cancelled));
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert!(!xml.contains("</S:get-locks-report>"));
    }
}
