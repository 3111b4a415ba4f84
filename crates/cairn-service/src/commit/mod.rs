//! The commit state machine.
//!
//! Four independent HTTP calls assemble one atomic commit:
//! create-activity, checkout, stage (put/proppatch), merge. The only
//! state crossing calls is the activity store's id→transaction mapping;
//! everything else lives in the storage engine's transaction.

use cairn_core::constants::{
    OPTION_KEEP_LOCKS, OPTION_LOCK_BREAK, OPTION_LOCK_STEAL, OPTION_NO_MERGE_RESPONSE,
    OPTION_RELEASE_LOCKS,
};
use cairn_proto::dav::build::XmlWriter;
use cairn_proto::dav::core::{DAV_NS, SVN_NS};
use cairn_proto::dav::parse::{CheckoutRequest, MergeRequest};
use cairn_repo::{ActivityStore, RepoError, Repository, Transaction};

use crate::error::{ServiceError, ServiceResult};
use crate::resource::{Location, Resource};

/// Client capability flags from the options header.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientOptions {
    pub lock_steal: bool,
    pub lock_break: bool,
    pub keep_locks: bool,
    pub release_locks: bool,
    pub no_merge_response: bool,
}

impl ClientOptions {
    /// Parses the whitespace-separated flags of the options header.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut options = Self::default();
        for flag in header.split_whitespace() {
            match flag {
                OPTION_LOCK_STEAL => options.lock_steal = true,
                OPTION_LOCK_BREAK => options.lock_break = true,
                OPTION_KEEP_LOCKS => options.keep_locks = true,
                OPTION_RELEASE_LOCKS => options.release_locks = true,
                OPTION_NO_MERGE_RESPONSE => options.no_merge_response = true,
                _ => {}
            }
        }
        options
    }
}

/// Creates an activity: allocates a transaction against head and records
/// the id→transaction mapping.
///
/// ## Errors
/// `ResourceState` when the target is not an activity location or the id
/// is already taken.
#[tracing::instrument(skip(repo, activities))]
pub fn make_activity(
    repo: &dyn Repository,
    activities: &dyn ActivityStore,
    resource: &Resource,
) -> ServiceResult<()> {
    let Location::Activity { activity_id } = &resource.location else {
        return Err(ServiceError::method_not_allowed(
            "activities may only be created within the activity collection",
        ));
    };
    if resource.exists {
        return Err(ServiceError::conflict(format!(
            "activity '{activity_id}' already exists"
        )));
    }

    let head = repo.latest_revision()?;
    let txn_name = repo.begin_txn(head, None)?;
    if !activities.put_new(activity_id, &txn_name)? {
        // Lost a race for the same id; the fresh transaction is orphaned
        // on purpose (no implicit cleanup obligation).
        return Err(ServiceError::conflict(format!(
            "activity '{activity_id}' already exists"
        )));
    }
    tracing::info!(activity = %activity_id, txn = %txn_name, "activity created");
    Ok(())
}

/// Checks out a version or regular resource into an activity.
///
/// ## Summary
/// Validates the target is versioned, existing and not already working,
/// then returns the working location bound to the activity's open
/// transaction. With `new_activity` a fresh activity is allocated first.
///
/// ## Errors
/// `NotFound` for missing targets; `ResourceState` conflicts for
/// non-versioned, non-checkoutable or already-working resources and for
/// activity sets naming no live activity.
#[tracing::instrument(skip(repo, activities, request))]
pub fn checkout(
    repo: &dyn Repository,
    activities: &dyn ActivityStore,
    resource: &Resource,
    request: &CheckoutRequest,
) -> ServiceResult<CheckoutOutcome> {
    if !resource.exists {
        return Err(ServiceError::NotFound(format!(
            "cannot checkout nonexistent resource '{}'",
            resource.path()
        )));
    }
    match &resource.location {
        Location::Regular { .. } | Location::Version { .. } | Location::Baseline { .. } => {}
        Location::Working { .. } | Location::WorkingBaseline { .. } => {
            return Err(ServiceError::conflict(
                "the resource is already checked out to the workspace",
            ));
        }
        Location::Activity { .. }
        | Location::BaselineCollection { .. }
        | Location::Vcc
        | Location::ActivityCollection
        | Location::PrivateRoot => {
            return Err(ServiceError::conflict("cannot checkout this type of resource"));
        }
    }
    if !resource.is_versioned() {
        return Err(ServiceError::conflict("cannot checkout unversioned resource"));
    }

    let mut created_activity = None;
    let activity_id = if request.new_activity {
        let id = uuid::Uuid::new_v4().to_string();
        let head = repo.latest_revision()?;
        let txn_name = repo.begin_txn(head, None)?;
        if !activities.put_new(&id, &txn_name)? {
            return Err(ServiceError::conflict(format!(
                "freshly generated activity id '{id}' already exists"
            )));
        }
        created_activity = Some(id.clone());
        id
    } else {
        // The first named activity that actually exists wins.
        let mut found = None;
        for href in &request.activity_hrefs {
            let location = Location::parse(strip_context(href), None)?;
            if let Location::Activity { activity_id } = location
                && activities.contains(&activity_id)?
            {
                found = Some(activity_id);
                break;
            }
        }
        found.ok_or_else(|| {
            ServiceError::conflict("none of the specified activities exist on the server")
        })?
    };

    let txn_name = activities
        .get(&activity_id)?
        .ok_or_else(|| ServiceError::conflict("activity vanished during checkout"))?;

    let working = if resource.baselined {
        Location::WorkingBaseline {
            activity_id,
            revision: resource.revision.unwrap_or(0),
        }
    } else {
        Location::Working {
            activity_id,
            path: resource.path().to_string(),
        }
    };

    tracing::debug!(txn = %txn_name, "checkout bound to transaction");
    Ok(CheckoutOutcome {
        working,
        txn_name,
        created_activity,
    })
}

/// Result of a successful checkout.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub working: Location,
    pub txn_name: String,
    pub created_activity: Option<String>,
}

/// Result of a successful merge: the revision exists; a post-commit hook
/// failure rides along as a warning.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub revision: u64,
    pub post_commit_error: Option<String>,
}

/// Commits the activity named as the merge source.
///
/// ## Summary
/// The source must resolve to an activity with an open transaction.
/// Supplied lock tokens are attached to the commit. A successful commit
/// removes the activity record whether or not the post-commit hook then
/// fails; a commit conflict aborts the transaction and leaves nothing
/// committed.
///
/// ## Errors
/// A non-activity source is a 405-class `ResourceState` error; a source
/// without an open transaction is a conflict; commit conflicts surface
/// as 409 with the conflicting path in the message.
#[tracing::instrument(skip(repo, activities, request, options))]
pub fn merge(
    repo: &dyn Repository,
    activities: &dyn ActivityStore,
    source: &Resource,
    request: &MergeRequest,
    options: ClientOptions,
) -> ServiceResult<MergeOutcome> {
    if !source.can_be_activity() {
        return Err(ServiceError::method_not_allowed(
            "MERGE can only be performed using an activity as the source",
        ));
    }
    let Location::Activity { activity_id } = &source.location else {
        unreachable!("can_be_activity guaranteed an activity location");
    };
    let txn_name = source.txn_name.clone().ok_or_else(|| {
        ServiceError::conflict(format!("activity '{activity_id}' has no open transaction"))
    })?;

    let lock_tokens: Vec<(String, String)> = request
        .lock_tokens
        .iter()
        .map(|entry| (entry.path.clone(), entry.token.clone()))
        .collect();

    let txn = repo.open_txn(&txn_name).map_err(|err| match err {
        RepoError::NoSuchTransaction(name) => ServiceError::conflict(format!(
            "the transaction '{name}' behind activity '{activity_id}' is gone"
        )),
        other => ServiceError::from(other),
    })?;

    let outcome = match txn.commit(&lock_tokens) {
        Ok(outcome) => outcome,
        Err(err @ (RepoError::Conflict { .. } | RepoError::LockConflict { .. })) => {
            // Nothing was committed; drop the staged tree. The activity
            // record stays — the protocol places no cleanup obligation
            // here.
            if let Ok(stale) = repo.open_txn(&txn_name)
                && let Err(abort_err) = stale.abort()
            {
                tracing::warn!(txn = %txn_name, error = %abort_err, "failed to abort conflicted transaction");
            }
            return Err(err.into());
        }
        Err(other) => return Err(other.into()),
    };

    // One-shot: the activity dies with its commit, hook failure or not.
    activities.remove(activity_id)?;
    tracing::info!(activity = %activity_id, revision = outcome.revision, "merge committed");

    if options.release_locks {
        for entry in &request.lock_tokens {
            if let Err(err) = repo.unlock(&entry.path, Some(&entry.token), false) {
                tracing::debug!(path = %entry.path, error = %err, "post-merge unlock failed");
            }
        }
    }

    Ok(MergeOutcome {
        revision: outcome.revision,
        post_commit_error: outcome.post_commit_error,
    })
}

/// Deletes an activity: aborts its transaction and removes the record.
///
/// ## Errors
/// `NotFound` when the activity does not exist.
#[tracing::instrument(skip(repo, activities))]
pub fn delete_activity(
    repo: &dyn Repository,
    activities: &dyn ActivityStore,
    activity_id: &str,
) -> ServiceResult<()> {
    let Some(txn_name) = activities.remove(activity_id)? else {
        return Err(ServiceError::NotFound(format!(
            "no activity '{activity_id}'"
        )));
    };
    match repo.open_txn(&txn_name).and_then(Transaction::abort) {
        Ok(()) | Err(RepoError::NoSuchTransaction(_)) => Ok(()),
        Err(other) => Err(other.into()),
    }
}

/// Serializes the MERGE response body.
///
/// ## Summary
/// Reports the new baseline in a `D:updated-set`; a post-commit hook
/// failure is carried as an `S:post-commit-err` element inside the same
/// successful response.
///
/// ## Errors
/// Returns an error if XML writing fails.
pub fn write_merge_response(
    repo: &dyn Repository,
    context: &str,
    outcome: &MergeOutcome,
    options: ClientOptions,
) -> ServiceResult<String> {
    let mut writer = XmlWriter::new(Vec::new());
    writer.declaration()?;
    writer.open_with_attrs(
        "D:merge-response",
        &[("xmlns:D", DAV_NS), ("xmlns:S", SVN_NS)],
    )?;

    if let Some(ref message) = outcome.post_commit_error {
        writer.value_element("S:post-commit-err", &[], message.as_bytes())?;
    }

    if !options.no_merge_response {
        let rev_props = repo.revision_properties(outcome.revision)?;
        writer.open("D:updated-set")?;
        writer.open("D:response")?;
        let baseline = Location::Baseline {
            revision: outcome.revision,
        };
        writer.text_element("D:href", &baseline.href(context))?;
        writer.open("D:propstat")?;
        writer.open("D:prop")?;
        writer.open("D:resourcetype")?;
        writer.empty("D:baseline")?;
        writer.close("D:resourcetype")?;
        writer.text_element("D:version-name", &outcome.revision.to_string())?;
        if let Some(date) = rev_props.get("svn:date") {
            writer.value_element("D:creationdate", &[], date)?;
        }
        if let Some(author) = rev_props.get("svn:author") {
            writer.value_element("D:creator-displayname", &[], author)?;
        }
        writer.close("D:prop")?;
        writer.text_element("D:status", "HTTP/1.1 200 OK")?;
        writer.close("D:propstat")?;
        writer.close("D:response")?;
        writer.close("D:updated-set")?;
    }

    writer.close("D:merge-response")?;
    String::from_utf8(writer.into_inner())
        .map_err(|err| ServiceError::Xml(err.to_string()))
}

/// Drops the context prefix from an href so it parses as a
/// repository-relative URI.
fn strip_context(href: &str) -> &str {
    match href.find("/!svn/") {
        Some(pos) => &href[pos..],
        None => href,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::resolve;
    use cairn_proto::dav::parse::{CheckoutRequest, LockTokenEntry};
    use cairn_repo::{MemoryActivityStore, MemoryRepository, Transaction as _};

    fn seeded() -> (MemoryRepository, MemoryActivityStore) {
        let repo = MemoryRepository::new();
        let name = repo.begin_txn(0, Some("alice")).unwrap();
        let mut txn = repo.open_txn(&name).unwrap();
        txn.make_dir("trunk").unwrap();
        txn.put_file("trunk/a.txt", b"alpha\n".to_vec()).unwrap();
        txn.commit(&[]).unwrap();
        (repo, MemoryActivityStore::new())
    }

    fn checkout_request_for(activity_href: &str) -> CheckoutRequest {
        CheckoutRequest {
            activity_hrefs: vec![activity_href.to_string()],
            ..CheckoutRequest::default()
        }
    }

    fn merge_request_for(source_href: &str) -> MergeRequest {
        MergeRequest {
            source_href: source_href.to_string(),
            no_auto_merge: false,
            no_checkout: false,
            prop_names: Vec::new(),
            lock_tokens: Vec::new(),
        }
    }

    /// The full saga: create-activity, checkout, stage, merge.
    #[test]
    fn commit_saga_produces_next_revision_and_invalidates_activity() {
        let (repo, store) = seeded();

        let act = resolve(&repo, &store, "/!svn/act/act-1", None).unwrap();
        make_activity(&repo, &store, &act).unwrap();
        assert!(resolve(&repo, &store, "/!svn/act/act-1", None).unwrap().exists);

        let target = resolve(&repo, &store, "/!svn/ver/1/trunk/a.txt", None).unwrap();
        let outcome = checkout(
            &repo,
            &store,
            &target,
            &checkout_request_for("/repos/!svn/act/act-1"),
        )
        .unwrap();
        assert_eq!(
            outcome.working,
            Location::Working {
                activity_id: "act-1".to_string(),
                path: "trunk/a.txt".to_string()
            }
        );

        let mut txn = repo.open_txn(&outcome.txn_name).unwrap();
        txn.put_file("trunk/a.txt", b"alpha v2\n".to_vec()).unwrap();
        txn.set_rev_prop("svn:log", b"tweak a".to_vec()).unwrap();
        drop(txn);

        let source = resolve(&repo, &store, "/!svn/act/act-1", None).unwrap();
        let merged = merge(
            &repo,
            &store,
            &source,
            &merge_request_for("/repos/!svn/act/act-1"),
            ClientOptions::default(),
        )
        .unwrap();

        assert_eq!(merged.revision, 2);
        assert!(merged.post_commit_error.is_none());
        // One-shot: the activity is gone.
        assert!(!resolve(&repo, &store, "/!svn/act/act-1", None).unwrap().exists);
        assert_eq!(
            repo.file_content("trunk/a.txt", None).unwrap(),
            b"alpha v2\n"
        );
    }

    #[test]
    fn duplicate_activity_id_conflicts() {
        let (repo, store) = seeded();
        let act = resolve(&repo, &store, "/!svn/act/dup", None).unwrap();
        make_activity(&repo, &store, &act).unwrap();
        let again = resolve(&repo, &store, "/!svn/act/dup", None).unwrap();
        let err = make_activity(&repo, &store, &again).unwrap_err();
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn checkout_of_working_resource_is_rejected() {
        let (repo, store) = seeded();
        let act = resolve(&repo, &store, "/!svn/act/w", None).unwrap();
        make_activity(&repo, &store, &act).unwrap();

        let working = resolve(&repo, &store, "/!svn/wrk/w/trunk/a.txt", None).unwrap();
        let err = checkout(
            &repo,
            &store,
            &working,
            &checkout_request_for("/repos/!svn/act/w"),
        )
        .unwrap_err();
        assert_eq!(err.http_status(), 409);
        assert!(err.to_string().contains("already checked out"));
    }

    #[test]
    fn checkout_of_missing_resource_is_not_found() {
        let (repo, store) = seeded();
        let act = resolve(&repo, &store, "/!svn/act/w", None).unwrap();
        make_activity(&repo, &store, &act).unwrap();

        let missing = resolve(&repo, &store, "/trunk/nope.txt", None).unwrap();
        let err = checkout(
            &repo,
            &store,
            &missing,
            &checkout_request_for("/repos/!svn/act/w"),
        )
        .unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn merge_with_non_activity_source_is_405() {
        let (repo, store) = seeded();
        let not_activity = resolve(&repo, &store, "/trunk", None).unwrap();
        let err = merge(
            &repo,
            &store,
            &not_activity,
            &merge_request_for("/repos/trunk"),
            ClientOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.http_status(), 405);
    }

    #[test]
    fn hook_failure_is_success_with_warning() {
        let (repo, store) = seeded();
        repo.set_post_commit_hook(|_| Err("hook blew up".to_string()));

        let act = resolve(&repo, &store, "/!svn/act/h", None).unwrap();
        make_activity(&repo, &store, &act).unwrap();
        let txn_name = store.get("h").unwrap().unwrap();
        let mut txn = repo.open_txn(&txn_name).unwrap();
        txn.put_file("trunk/h.txt", b"hook\n".to_vec()).unwrap();
        drop(txn);

        let source = resolve(&repo, &store, "/!svn/act/h", None).unwrap();
        let outcome = merge(
            &repo,
            &store,
            &source,
            &merge_request_for("/repos/!svn/act/h"),
            ClientOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.revision, 2);
        assert_eq!(outcome.post_commit_error.as_deref(), Some("hook blew up"));
        // The revision exists and the activity is gone regardless.
        assert_eq!(repo.latest_revision().unwrap(), 2);
        assert!(!store.contains("h").unwrap());

        let body = write_merge_response(&repo, "/repos", &outcome, ClientOptions::default())
            .unwrap();
        assert!(body.contains("S:post-commit-err"));
        assert!(body.contains("hook blew up"));
        assert!(body.contains("/repos/!svn/bln/2"));
    }

    #[test]
    fn no_merge_response_suppresses_updated_set() {
        let (repo, store) = seeded();
        let act = resolve(&repo, &store, "/!svn/act/q", None).unwrap();
        make_activity(&repo, &store, &act).unwrap();
        let txn_name = store.get("q").unwrap().unwrap();
        let mut txn = repo.open_txn(&txn_name).unwrap();
        txn.put_file("trunk/q.txt", b"q\n".to_vec()).unwrap();
        drop(txn);

        let source = resolve(&repo, &store, "/!svn/act/q", None).unwrap();
        let options = ClientOptions::parse("no-merge-response release-locks");
        assert!(options.no_merge_response);
        assert!(options.release_locks);

        let outcome = merge(
            &repo,
            &store,
            &source,
            &merge_request_for("/repos/!svn/act/q"),
            options,
        )
        .unwrap();
        let body = write_merge_response(&repo, "/repos", &outcome, options).unwrap();
        assert!(!body.contains("updated-set"));
    }

    #[test]
    fn merge_attaches_lock_tokens() {
        let (repo, store) = seeded();
        let lock = repo.lock("trunk/a.txt", "alice", None, false).unwrap();

        let act = resolve(&repo, &store, "/!svn/act/l", None).unwrap();
        make_activity(&repo, &store, &act).unwrap();
        let txn_name = store.get("l").unwrap().unwrap();
        let mut txn = repo.open_txn(&txn_name).unwrap();
        txn.put_file("trunk/a.txt", b"locked change\n".to_vec())
            .unwrap();
        drop(txn);

        let mut request = merge_request_for("/repos/!svn/act/l");
        request.lock_tokens = vec![LockTokenEntry {
            path: "trunk/a.txt".to_string(),
            token: lock.token.clone(),
        }];
        let source = resolve(&repo, &store, "/!svn/act/l", None).unwrap();
        let outcome = merge(&repo, &store, &source, &request, ClientOptions::default()).unwrap();
        assert_eq!(outcome.revision, 2);
    }

    #[test]
    fn delete_activity_aborts_its_transaction() {
        let (repo, store) = seeded();
        let act = resolve(&repo, &store, "/!svn/act/d", None).unwrap();
        make_activity(&repo, &store, &act).unwrap();
        let txn_name = store.get("d").unwrap().unwrap();

        delete_activity(&repo, &store, "d").unwrap();
        assert!(!store.contains("d").unwrap());
        assert!(repo.open_txn(&txn_name).is_err());
    }
}
