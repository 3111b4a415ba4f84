//! In-process repository implementation.
//!
//! Revisions are whole path->node maps; transactions stage a cloned tree
//! until commit. This backs tests and single-process deployments; a real
//! storage engine plugs in behind the same traits.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use cairn_proto::dav::core::Depth;
use cairn_proto::dav::parse::MergeinfoInheritance;

use crate::edit::EditSink;
use crate::error::{RepoError, RepoResult};
use crate::repo::{FileRevSink, LogOptions, Repository, Transaction};
use crate::types::{
    ChangeAction, ChangedPath, CommitOutcome, DirEntry, FileRevision, LockInfo, LogEntry,
    MergeinfoEntry, NodeInfo, NodeKind, PathLocation, ReportedState,
};

const AUTHOR_PROP: &str = "svn:author";
const DATE_PROP: &str = "svn:date";
const MERGEINFO_PROP: &str = "svn:mergeinfo";

type PostCommitHook = Box<dyn Fn(u64) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    content: Vec<u8>,
    props: BTreeMap<String, Vec<u8>>,
    created_rev: u64,
}

impl Node {
    fn dir() -> Self {
        Self {
            kind: NodeKind::Directory,
            content: Vec::new(),
            props: BTreeMap::new(),
            created_rev: 0,
        }
    }

    fn file(content: Vec<u8>) -> Self {
        Self {
            kind: NodeKind::File,
            content,
            props: BTreeMap::new(),
            created_rev: 0,
        }
    }

    fn checksum(&self) -> Option<String> {
        match self.kind {
            NodeKind::File => Some(hex::encode(Sha256::digest(&self.content))),
            NodeKind::Directory => None,
        }
    }
}

type Tree = BTreeMap<String, Node>;

#[derive(Debug, Clone)]
struct RevisionData {
    tree: Tree,
    props: BTreeMap<String, Vec<u8>>,
    changed: Vec<ChangedPath>,
    date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TxnData {
    base: u64,
    tree: Tree,
    rev_props: BTreeMap<String, Vec<u8>>,
    touched: BTreeSet<String>,
}

struct Inner {
    uuid: String,
    revisions: Vec<RevisionData>,
    txns: HashMap<String, TxnData>,
    locks: HashMap<String, LockInfo>,
    next_txn_id: u64,
    post_commit_hook: Option<PostCommitHook>,
}

/// In-memory revision store.
pub struct MemoryRepository {
    inner: Arc<RwLock<Inner>>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Tree::new();
        tree.insert(String::new(), Node::dir());
        let revision0 = RevisionData {
            tree,
            props: BTreeMap::new(),
            changed: Vec::new(),
            date: Utc::now(),
        };
        Self {
            inner: Arc::new(RwLock::new(Inner {
                uuid: uuid::Uuid::new_v4().to_string(),
                revisions: vec![revision0],
                txns: HashMap::new(),
                locks: HashMap::new(),
                next_txn_id: 0,
                post_commit_hook: None,
            })),
        }
    }

    /// Installs a hook run after each successful commit. A hook error is
    /// reported alongside the new revision, never as a commit failure.
    pub fn set_post_commit_hook(
        &self,
        hook: impl Fn(u64) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.inner.write().post_commit_hook = Some(Box::new(hook));
    }
}

fn canon(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Whether a change at `changed` is relevant to a log target at `target`.
fn touches(changed: &str, target: &str) -> bool {
    target.is_empty()
        || changed == target
        || changed.starts_with(&format!("{target}/"))
        || target.starts_with(&format!("{changed}/"))
}

fn immediate_children<'a>(tree: &'a Tree, dir: &str) -> Vec<(&'a str, &'a Node)> {
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    };
    tree.range(prefix.clone()..)
        .take_while(|(path, _)| path.starts_with(&prefix))
        .filter(|(path, _)| !path.is_empty() && !path[prefix.len()..].contains('/'))
        .map(|(path, node)| (&path[prefix.len()..], node))
        .collect()
}

fn node_info(inner: &Inner, node: &Node) -> NodeInfo {
    let rev_props = inner
        .revisions
        .get(node.created_rev as usize)
        .map(|rev| &rev.props);
    NodeInfo {
        kind: node.kind,
        size: node.content.len() as u64,
        created_rev: node.created_rev,
        created_date: inner
            .revisions
            .get(node.created_rev as usize)
            .map(|rev| rev.date),
        author: rev_props
            .and_then(|props| props.get(AUTHOR_PROP))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        checksum: node.checksum(),
    }
}

impl Inner {
    fn latest(&self) -> u64 {
        (self.revisions.len() - 1) as u64
    }

    fn resolve(&self, revision: Option<u64>) -> RepoResult<u64> {
        match revision {
            Some(rev) if (rev as usize) < self.revisions.len() => Ok(rev),
            Some(rev) => Err(RepoError::NoSuchRevision(rev)),
            None => Ok(self.latest()),
        }
    }

    fn tree_at(&self, revision: Option<u64>) -> RepoResult<&Tree> {
        let rev = self.resolve(revision)?;
        Ok(&self.revisions[rev as usize].tree)
    }

    fn node_at(&self, path: &str, revision: Option<u64>) -> RepoResult<Option<&Node>> {
        Ok(self.tree_at(revision)?.get(&canon(path)))
    }
}

fn diff_trees(base: &Tree, new: &Tree) -> Vec<ChangedPath> {
    let mut changed = Vec::new();
    for (path, node) in new {
        if path.is_empty() {
            continue;
        }
        match base.get(path) {
            None => changed.push(ChangedPath {
                path: path.clone(),
                action: ChangeAction::Added,
                copyfrom: None,
            }),
            Some(old) if old.kind != node.kind => changed.push(ChangedPath {
                path: path.clone(),
                action: ChangeAction::Replaced,
                copyfrom: None,
            }),
            Some(old) if old.content != node.content || old.props != node.props => {
                changed.push(ChangedPath {
                    path: path.clone(),
                    action: ChangeAction::Modified,
                    copyfrom: None,
                });
            }
            Some(_) => {}
        }
    }
    for path in base.keys() {
        if !path.is_empty() && !new.contains_key(path) {
            changed.push(ChangedPath {
                path: path.clone(),
                action: ChangeAction::Deleted,
                copyfrom: None,
            });
        }
    }
    changed.sort_by(|a, b| a.path.cmp(&b.path));
    changed
}

impl Repository for MemoryRepository {
    fn uuid(&self) -> String {
        self.inner.read().uuid.clone()
    }

    fn latest_revision(&self) -> RepoResult<u64> {
        Ok(self.inner.read().latest())
    }

    fn stat(&self, path: &str, revision: Option<u64>) -> RepoResult<Option<NodeInfo>> {
        let inner = self.inner.read();
        Ok(inner
            .node_at(path, revision)?
            .map(|node| node_info(&inner, node)))
    }

    fn list_dir(&self, path: &str, revision: Option<u64>) -> RepoResult<Vec<DirEntry>> {
        let inner = self.inner.read();
        let dir = canon(path);
        let tree = inner.tree_at(revision)?;
        match tree.get(&dir) {
            Some(node) if node.kind.is_directory() => Ok(immediate_children(tree, &dir)
                .into_iter()
                .map(|(name, node)| DirEntry {
                    name: name.to_string(),
                    kind: node.kind,
                })
                .collect()),
            Some(_) => Err(RepoError::Storage(format!("not a directory: {dir}"))),
            None => Err(RepoError::PathNotFound(dir)),
        }
    }

    fn file_content(&self, path: &str, revision: Option<u64>) -> RepoResult<Vec<u8>> {
        let inner = self.inner.read();
        match inner.node_at(path, revision)? {
            Some(node) if !node.kind.is_directory() => Ok(node.content.clone()),
            Some(_) => Err(RepoError::Storage(format!("not a file: {path}"))),
            None => Err(RepoError::PathNotFound(canon(path))),
        }
    }

    fn node_properties(
        &self,
        path: &str,
        revision: Option<u64>,
    ) -> RepoResult<BTreeMap<String, Vec<u8>>> {
        let inner = self.inner.read();
        match inner.node_at(path, revision)? {
            Some(node) => Ok(node.props.clone()),
            None => Err(RepoError::PathNotFound(canon(path))),
        }
    }

    fn revision_properties(&self, revision: u64) -> RepoResult<BTreeMap<String, Vec<u8>>> {
        let inner = self.inner.read();
        let rev = inner.resolve(Some(revision))?;
        let data = &inner.revisions[rev as usize];
        let mut props = data.props.clone();
        props.insert(
            DATE_PROP.to_string(),
            data.date
                .to_rfc3339_opts(SecondsFormat::Micros, true)
                .into_bytes(),
        );
        Ok(props)
    }

    fn revision_for_date(&self, date: DateTime<Utc>) -> RepoResult<u64> {
        let inner = self.inner.read();
        let mut found = 0;
        for (rev, data) in inner.revisions.iter().enumerate() {
            if data.date <= date {
                found = rev as u64;
            }
        }
        Ok(found)
    }

    fn log(
        &self,
        paths: &[String],
        start: u64,
        end: u64,
        options: &LogOptions,
        receiver: &mut dyn FnMut(&LogEntry) -> RepoResult<()>,
    ) -> RepoResult<()> {
        let inner = self.inner.read();
        let latest = inner.latest();
        let (low, high) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        if high > latest {
            return Err(RepoError::NoSuchRevision(high));
        }

        let targets: Vec<String> = paths.iter().map(|p| canon(p)).collect();
        let mut emitted = 0;
        let mut revs: Vec<u64> = (low..=high).collect();
        if start > end {
            revs.reverse();
        }

        for rev in revs {
            let data = &inner.revisions[rev as usize];
            if !targets.is_empty()
                && !data
                    .changed
                    .iter()
                    .any(|change| targets.iter().any(|t| touches(&change.path, t)))
            {
                continue;
            }
            if let Some(limit) = options.limit
                && emitted >= limit
            {
                break;
            }
            let entry = LogEntry {
                revision: Some(rev),
                author: data
                    .props
                    .get(AUTHOR_PROP)
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
                date: Some(data.date),
                message: if options.omit_log_text {
                    None
                } else {
                    data.props
                        .get("svn:log")
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                },
                changed_paths: if options.discover_changed_paths {
                    data.changed.clone()
                } else {
                    Vec::new()
                },
                has_children: false,
            };
            receiver(&entry)?;
            emitted += 1;
        }
        Ok(())
    }

    fn trace_locations(
        &self,
        path: &str,
        peg_revision: u64,
        revisions: &[u64],
        receiver: &mut dyn FnMut(&PathLocation) -> RepoResult<()>,
    ) -> RepoResult<()> {
        let inner = self.inner.read();
        let target = canon(path);
        if inner.node_at(&target, Some(peg_revision))?.is_none() {
            return Err(RepoError::PathNotFound(target));
        }
        for &rev in revisions {
            if (rev as usize) < inner.revisions.len()
                && inner.revisions[rev as usize].tree.contains_key(&target)
            {
                receiver(&PathLocation {
                    path: target.clone(),
                    revision: rev,
                })?;
            }
        }
        Ok(())
    }

    fn file_revisions(
        &self,
        path: &str,
        start: u64,
        end: u64,
        sink: &mut dyn FileRevSink,
    ) -> RepoResult<()> {
        let inner = self.inner.read();
        let target = canon(path);
        let end = inner.resolve(Some(end)).or_else(|_| inner.resolve(None))?;
        let mut previous_props: Option<BTreeMap<String, Vec<u8>>> = None;

        for rev in start..=end {
            let data = &inner.revisions[rev as usize];
            let node_changed = data.changed.iter().any(|change| change.path == target);
            let Some(node) = data.tree.get(&target) else {
                continue;
            };
            if !node_changed {
                continue;
            }

            let mut prop_diffs: Vec<(String, Option<Vec<u8>>)> = Vec::new();
            let previous = previous_props.take().unwrap_or_default();
            for (name, value) in &node.props {
                if previous.get(name) != Some(value) {
                    prop_diffs.push((name.clone(), Some(value.clone())));
                }
            }
            for name in previous.keys() {
                if !node.props.contains_key(name) {
                    prop_diffs.push((name.clone(), None));
                }
            }
            previous_props = Some(node.props.clone());

            let mut rev_props = data.props.clone();
            rev_props.insert(
                DATE_PROP.to_string(),
                data.date
                    .to_rfc3339_opts(SecondsFormat::Micros, true)
                    .into_bytes(),
            );
            let file_rev = FileRevision {
                path: format!("/{target}"),
                revision: rev,
                rev_props,
                prop_diffs,
            };
            sink.open_revision(&file_rev)?;
            sink.delta_chunk(&node.content)?;
            sink.close_revision()?;
        }
        Ok(())
    }

    fn get_locks(&self, path: &str) -> RepoResult<Vec<LockInfo>> {
        let inner = self.inner.read();
        let root = canon(path);
        let mut locks: Vec<LockInfo> = inner
            .locks
            .values()
            .filter(|lock| touches(&lock.path, &root))
            .cloned()
            .collect();
        locks.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(locks)
    }

    fn lock(
        &self,
        path: &str,
        owner: &str,
        comment: Option<&[u8]>,
        steal: bool,
    ) -> RepoResult<LockInfo> {
        let mut inner = self.inner.write();
        let target = canon(path);
        match inner.tree_at(None)?.get(&target) {
            Some(node) if !node.kind.is_directory() => {}
            Some(_) => {
                return Err(RepoError::Storage(format!(
                    "cannot lock directory: {target}"
                )));
            }
            None => return Err(RepoError::PathNotFound(target)),
        }
        if let Some(existing) = inner.locks.get(&target)
            && !steal
        {
            return Err(RepoError::LockConflict {
                path: target,
                message: format!("already locked by {}", existing.owner),
            });
        }
        let lock = LockInfo {
            path: target.clone(),
            token: format!("opaquelocktoken:{}", uuid::Uuid::new_v4()),
            owner: owner.to_string(),
            comment: comment.map(<[u8]>::to_vec),
            created: Utc::now(),
            expires: None,
        };
        inner.locks.insert(target, lock.clone());
        Ok(lock)
    }

    fn unlock(&self, path: &str, token: Option<&str>, break_lock: bool) -> RepoResult<()> {
        let mut inner = self.inner.write();
        let target = canon(path);
        let Some(existing) = inner.locks.get(&target) else {
            return Err(RepoError::PathNotFound(target));
        };
        if !break_lock && token != Some(existing.token.as_str()) {
            return Err(RepoError::LockConflict {
                path: target,
                message: "lock token mismatch".to_string(),
            });
        }
        inner.locks.remove(&target);
        Ok(())
    }

    fn mergeinfo(
        &self,
        paths: &[String],
        revision: Option<u64>,
        inheritance: MergeinfoInheritance,
    ) -> RepoResult<Vec<MergeinfoEntry>> {
        let inner = self.inner.read();
        let tree = inner.tree_at(revision)?;
        let mut entries = Vec::new();
        for path in paths {
            let mut current = canon(path);
            loop {
                if let Some(info) = tree.get(&current).and_then(|n| n.props.get(MERGEINFO_PROP)) {
                    entries.push(MergeinfoEntry {
                        path: format!("/{}", canon(path)),
                        info: String::from_utf8_lossy(info).into_owned(),
                    });
                    break;
                }
                if inheritance == MergeinfoInheritance::Explicit || current.is_empty() {
                    break;
                }
                current = parent_of(&current).to_string();
            }
        }
        Ok(entries)
    }

    fn replay(
        &self,
        revision: u64,
        _low_water_mark: u64,
        send_deltas: bool,
        sink: &mut dyn EditSink,
    ) -> RepoResult<()> {
        let inner = self.inner.read();
        let rev = inner.resolve(Some(revision))?;
        if rev == 0 {
            return Err(RepoError::NoSuchRevision(0));
        }
        let base = &inner.revisions[(rev - 1) as usize].tree;
        let target = &inner.revisions[rev as usize].tree;

        sink.target_revision(rev)?;
        sink.open_root(Some(rev - 1))?;
        drive_dir_diff(
            Some(base),
            target,
            Some(rev - 1),
            "",
            Depth::Infinity,
            send_deltas,
            sink,
        )?;
        sink.close_directory()?;
        sink.close_edit()
    }

    fn drive_update(
        &self,
        state: &ReportedState,
        target_revision: u64,
        target_path: &str,
        depth: Depth,
        send_deltas: bool,
        sink: &mut dyn EditSink,
    ) -> RepoResult<()> {
        let inner = self.inner.read();
        let rev = inner.resolve(Some(target_revision))?;
        let target_tree = &inner.revisions[rev as usize].tree;
        let root = canon(target_path);

        let base_rev = if state.start_empty() {
            None
        } else {
            state.base_revision()
        };
        let mut base_tree: Option<Tree> = match base_rev {
            Some(base) => Some(inner.tree_at(Some(base))?.clone()),
            None => None,
        };
        // Missing paths get re-sent in full.
        if let Some(tree) = base_tree.as_mut() {
            for missing in &state.missing {
                let gone = canon(&join(&root, missing));
                tree.retain(|path, _| !touches(path, &gone) || path == &root);
            }
        }

        sink.target_revision(rev)?;
        sink.open_root(base_rev)?;
        drive_dir_diff(
            base_tree.as_ref(),
            target_tree,
            base_rev,
            &root,
            depth,
            send_deltas,
            sink,
        )?;
        sink.close_directory()?;
        sink.close_edit()
    }

    fn begin_txn(&self, base_revision: u64, author: Option<&str>) -> RepoResult<String> {
        let mut inner = self.inner.write();
        let base = inner.resolve(Some(base_revision))?;
        let tree = inner.revisions[base as usize].tree.clone();
        inner.next_txn_id += 1;
        let name = format!("{base}-{:x}", inner.next_txn_id);
        let mut rev_props = BTreeMap::new();
        if let Some(author) = author {
            rev_props.insert(AUTHOR_PROP.to_string(), author.as_bytes().to_vec());
        }
        inner.txns.insert(
            name.clone(),
            TxnData {
                base,
                tree,
                rev_props,
                touched: BTreeSet::new(),
            },
        );
        tracing::debug!(txn = %name, base, "transaction opened");
        Ok(name)
    }

    fn open_txn(&self, name: &str) -> RepoResult<Box<dyn Transaction>> {
        let inner = self.inner.read();
        if !inner.txns.contains_key(name) {
            return Err(RepoError::NoSuchTransaction(name.to_string()));
        }
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
        }))
    }
}

/// Recursive tree diff shared by replay and update drives.
fn drive_dir_diff(
    base: Option<&Tree>,
    target: &Tree,
    base_rev: Option<u64>,
    dir: &str,
    depth: Depth,
    send_deltas: bool,
    sink: &mut dyn EditSink,
) -> RepoResult<()> {
    // Root property changes first.
    let empty = Tree::new();
    let base_tree = base.unwrap_or(&empty);
    if let (Some(base_node), Some(target_node)) = (base_tree.get(dir), target.get(dir)) {
        emit_prop_diffs(&base_node.props, &target_node.props, true, sink)?;
    } else if let Some(target_node) = target.get(dir) {
        emit_prop_diffs(&BTreeMap::new(), &target_node.props, true, sink)?;
    }

    if depth == Depth::Zero {
        return Ok(());
    }

    let base_children: BTreeMap<String, &Node> = immediate_children(base_tree, dir)
        .into_iter()
        .map(|(name, node)| (name.to_string(), node))
        .collect();
    let target_children: BTreeMap<String, &Node> = immediate_children(target, dir)
        .into_iter()
        .map(|(name, node)| (name.to_string(), node))
        .collect();

    let mut names: BTreeSet<&String> = base_children.keys().collect();
    names.extend(target_children.keys());

    let child_depth = match depth {
        Depth::Infinity => Depth::Infinity,
        Depth::One | Depth::Zero => Depth::Zero,
    };

    for name in names {
        let path = join(dir, name);
        match (base_children.get(name), target_children.get(name)) {
            (Some(_), None) => sink.delete_entry(&path, base_rev)?,
            (None, Some(node)) => emit_add(target, &path, node, send_deltas, child_depth, sink)?,
            (Some(old), Some(new)) => {
                if old.kind != new.kind {
                    sink.delete_entry(&path, base_rev)?;
                    emit_add(target, &path, new, send_deltas, child_depth, sink)?;
                } else if new.kind.is_directory() {
                    if subtree_changed(base_tree, target, &path) {
                        sink.open_directory(&path, base_rev)?;
                        drive_dir_diff(base, target, base_rev, &path, child_depth, send_deltas, sink)?;
                        sink.close_directory()?;
                    }
                } else if old.content != new.content || old.props != new.props {
                    sink.open_file(&path, base_rev)?;
                    emit_prop_diffs(&old.props, &new.props, false, sink)?;
                    if old.content != new.content && send_deltas {
                        sink.apply_textdelta(old.checksum().as_deref())?;
                        sink.delta_chunk(&new.content)?;
                        sink.close_textdelta()?;
                    }
                    sink.close_file(new.checksum().as_deref())?;
                }
            }
            (None, None) => {}
        }
    }
    Ok(())
}

fn subtree_changed(base: &Tree, target: &Tree, dir: &str) -> bool {
    let prefix = format!("{dir}/");
    let base_sub = collect_subtree(base, dir, &prefix);
    let target_sub = collect_subtree(target, dir, &prefix);
    if base_sub.len() != target_sub.len() {
        return true;
    }
    base_sub
        .iter()
        .zip(target_sub.iter())
        .any(|((bp, bn), (tp, tn))| {
            bp != tp || bn.kind != tn.kind || bn.content != tn.content || bn.props != tn.props
        })
}

fn collect_subtree<'t>(tree: &'t Tree, dir: &str, prefix: &str) -> Vec<(&'t String, &'t Node)> {
    let mut nodes: Vec<(&String, &Node)> = Vec::new();
    if let Some(entry) = tree.get_key_value(dir) {
        nodes.push(entry);
    }
    nodes.extend(
        tree.range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix)),
    );
    nodes
}

fn emit_add(
    target: &Tree,
    path: &str,
    node: &Node,
    send_deltas: bool,
    child_depth: Depth,
    sink: &mut dyn EditSink,
) -> RepoResult<()> {
    if node.kind.is_directory() {
        sink.add_directory(path, None)?;
        for (name, value) in &node.props {
            sink.change_dir_prop(name, Some(value))?;
        }
        if child_depth != Depth::Zero {
            for (name, child) in immediate_children(target, path) {
                let child_path = join(path, name);
                emit_add(target, &child_path, child, send_deltas, child_depth, sink)?;
            }
        }
        sink.close_directory()
    } else {
        sink.add_file(path, None)?;
        for (name, value) in &node.props {
            sink.change_file_prop(name, Some(value))?;
        }
        if send_deltas {
            sink.apply_textdelta(None)?;
            sink.delta_chunk(&node.content)?;
            sink.close_textdelta()?;
        }
        sink.close_file(node.checksum().as_deref())
    }
}

fn emit_prop_diffs(
    base: &BTreeMap<String, Vec<u8>>,
    target: &BTreeMap<String, Vec<u8>>,
    is_dir: bool,
    sink: &mut dyn EditSink,
) -> RepoResult<()> {
    for (name, value) in target {
        if base.get(name) != Some(value) {
            if is_dir {
                sink.change_dir_prop(name, Some(value))?;
            } else {
                sink.change_file_prop(name, Some(value))?;
            }
        }
    }
    for name in base.keys() {
        if !target.contains_key(name) {
            if is_dir {
                sink.change_dir_prop(name, None)?;
            } else {
                sink.change_file_prop(name, None)?;
            }
        }
    }
    Ok(())
}

/// Handle to a staged transaction.
struct MemoryTransaction {
    inner: Arc<RwLock<Inner>>,
    name: String,
}

impl MemoryTransaction {
    fn with_txn<T>(&self, f: impl FnOnce(&TxnData) -> RepoResult<T>) -> RepoResult<T> {
        let inner = self.inner.read();
        let txn = inner
            .txns
            .get(&self.name)
            .ok_or_else(|| RepoError::NoSuchTransaction(self.name.clone()))?;
        f(txn)
    }

    fn with_txn_mut<T>(&self, f: impl FnOnce(&mut TxnData) -> RepoResult<T>) -> RepoResult<T> {
        let mut inner = self.inner.write();
        let txn = inner
            .txns
            .get_mut(&self.name)
            .ok_or_else(|| RepoError::NoSuchTransaction(self.name.clone()))?;
        f(txn)
    }
}

fn require_parent_dir(tree: &Tree, path: &str) -> RepoResult<()> {
    let parent = parent_of(path);
    match tree.get(parent) {
        Some(node) if node.kind.is_directory() => Ok(()),
        Some(_) => Err(RepoError::Storage(format!("not a directory: {parent}"))),
        None => Err(RepoError::PathNotFound(parent.to_string())),
    }
}

impl Transaction for MemoryTransaction {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_revision(&self) -> RepoResult<u64> {
        self.with_txn(|txn| Ok(txn.base))
    }

    fn stat(&self, path: &str) -> RepoResult<Option<NodeInfo>> {
        let inner = self.inner.read();
        let txn = inner
            .txns
            .get(&self.name)
            .ok_or_else(|| RepoError::NoSuchTransaction(self.name.clone()))?;
        Ok(txn.tree.get(&canon(path)).map(|node| node_info(&inner, node)))
    }

    fn change_node_prop(
        &mut self,
        path: &str,
        name: &str,
        value: Option<Vec<u8>>,
    ) -> RepoResult<()> {
        let target = canon(path);
        self.with_txn_mut(|txn| {
            let node = txn
                .tree
                .get_mut(&target)
                .ok_or_else(|| RepoError::PathNotFound(target.clone()))?;
            match value {
                Some(value) => {
                    node.props.insert(name.to_string(), value);
                }
                None => {
                    node.props.remove(name);
                }
            }
            txn.touched.insert(target.clone());
            Ok(())
        })
    }

    fn put_file(&mut self, path: &str, content: Vec<u8>) -> RepoResult<()> {
        let target = canon(path);
        self.with_txn_mut(|txn| {
            require_parent_dir(&txn.tree, &target)?;
            if let Some(node) = txn.tree.get_mut(&target) {
                if node.kind.is_directory() {
                    return Err(RepoError::Storage(format!("not a file: {target}")));
                }
                node.content = content;
            } else {
                txn.tree.insert(target.clone(), Node::file(content));
            }
            txn.touched.insert(target.clone());
            Ok(())
        })
    }

    fn make_dir(&mut self, path: &str) -> RepoResult<()> {
        let target = canon(path);
        self.with_txn_mut(|txn| {
            require_parent_dir(&txn.tree, &target)?;
            if txn.tree.contains_key(&target) {
                return Err(RepoError::Conflict {
                    path: target.clone(),
                    message: "path already exists".to_string(),
                });
            }
            txn.tree.insert(target.clone(), Node::dir());
            txn.touched.insert(target.clone());
            Ok(())
        })
    }

    fn delete(&mut self, path: &str) -> RepoResult<()> {
        let target = canon(path);
        self.with_txn_mut(|txn| {
            if !txn.tree.contains_key(&target) {
                return Err(RepoError::PathNotFound(target.clone()));
            }
            let prefix = format!("{target}/");
            txn.tree
                .retain(|path, _| path != &target && !path.starts_with(&prefix));
            txn.touched.insert(target.clone());
            Ok(())
        })
    }

    fn copy(&mut self, from_path: &str, from_revision: u64, to_path: &str) -> RepoResult<()> {
        let source = canon(from_path);
        let dest = canon(to_path);
        let mut inner = self.inner.write();
        let rev = inner.resolve(Some(from_revision))?;
        let source_nodes: Vec<(String, Node)> = {
            let tree = &inner.revisions[rev as usize].tree;
            if !tree.contains_key(&source) {
                return Err(RepoError::PathNotFound(source));
            }
            let prefix = format!("{source}/");
            tree.iter()
                .filter(|(path, _)| *path == &source || path.starts_with(&prefix))
                .map(|(path, node)| {
                    let suffix = &path[source.len()..];
                    (format!("{dest}{suffix}"), node.clone())
                })
                .collect()
        };
        let txn = inner
            .txns
            .get_mut(&self.name)
            .ok_or_else(|| RepoError::NoSuchTransaction(self.name.clone()))?;
        require_parent_dir(&txn.tree, &dest)?;
        for (path, node) in source_nodes {
            txn.touched.insert(path.clone());
            txn.tree.insert(path, node);
        }
        Ok(())
    }

    fn set_rev_prop(&mut self, name: &str, value: Vec<u8>) -> RepoResult<()> {
        self.with_txn_mut(|txn| {
            txn.rev_props.insert(name.to_string(), value);
            Ok(())
        })
    }

    fn commit(self: Box<Self>, lock_tokens: &[(String, String)]) -> RepoResult<CommitOutcome> {
        let mut inner = self.inner.write();
        let txn = inner
            .txns
            .get(&self.name)
            .ok_or_else(|| RepoError::NoSuchTransaction(self.name.clone()))?
            .clone();

        // Out-of-date check: a same-path change committed after our base
        // is a conflict; the caller decides whether to abort.
        for rev in (txn.base + 1)..=inner.latest() {
            for change in &inner.revisions[rev as usize].changed {
                if txn.touched.contains(&change.path) {
                    return Err(RepoError::Conflict {
                        path: format!("/{}", change.path),
                        message: format!("path changed in r{rev} after base r{}", txn.base),
                    });
                }
            }
        }

        // Locked paths need a matching token.
        for path in &txn.touched {
            if let Some(lock) = inner.locks.get(path) {
                let authorized = lock_tokens
                    .iter()
                    .any(|(lock_path, token)| canon(lock_path) == *path && *token == lock.token);
                if !authorized {
                    return Err(RepoError::LockConflict {
                        path: format!("/{path}"),
                        message: "missing lock token".to_string(),
                    });
                }
            }
        }

        let new_rev = inner.latest() + 1;
        let base_tree = inner.revisions[txn.base as usize].tree.clone();
        let changed = diff_trees(&base_tree, &txn.tree);
        let mut tree = txn.tree.clone();
        for change in &changed {
            if change.action != ChangeAction::Deleted
                && let Some(node) = tree.get_mut(&change.path)
            {
                node.created_rev = new_rev;
            }
        }

        inner.revisions.push(RevisionData {
            tree,
            props: txn.rev_props.clone(),
            changed,
            date: Utc::now(),
        });
        inner.txns.remove(&self.name);
        tracing::info!(txn = %self.name, revision = new_rev, "transaction committed");

        let post_commit_error = inner
            .post_commit_hook
            .as_ref()
            .and_then(|hook| hook(new_rev).err());
        if let Some(ref message) = post_commit_error {
            tracing::warn!(revision = new_rev, error = %message, "post-commit hook failed");
        }

        Ok(CommitOutcome {
            revision: new_rev,
            post_commit_error,
        })
    }

    fn abort(self: Box<Self>) -> RepoResult<()> {
        let mut inner = self.inner.write();
        inner
            .txns
            .remove(&self.name)
            .map(|_| ())
            .ok_or_else(|| RepoError::NoSuchTransaction(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Commits one staged change set and returns the new revision.
    fn commit_change(
        repo: &MemoryRepository,
        message: &str,
        stage: impl FnOnce(&mut dyn Transaction),
    ) -> u64 {
        let base = repo.latest_revision().unwrap();
        let name = repo.begin_txn(base, Some("alice")).unwrap();
        let mut txn = repo.open_txn(&name).unwrap();
        txn.set_rev_prop("svn:log", message.as_bytes().to_vec())
            .unwrap();
        stage(txn.as_mut());
        txn.commit(&[]).unwrap().revision
    }

    fn seeded() -> MemoryRepository {
        let repo = MemoryRepository::new();
        commit_change(&repo, "add trunk", |txn| {
            txn.make_dir("trunk").unwrap();
            txn.put_file("trunk/a.txt", b"alpha\n".to_vec()).unwrap();
        });
        commit_change(&repo, "add b", |txn| {
            txn.put_file("trunk/b.txt", b"beta\n".to_vec()).unwrap();
        });
        repo
    }

    #[test]
    fn commit_advances_head_and_records_changes() {
        let repo = seeded();
        assert_eq!(repo.latest_revision().unwrap(), 2);
        let info = repo.stat("trunk/a.txt", None).unwrap().unwrap();
        assert_eq!(info.kind, NodeKind::File);
        assert_eq!(info.created_rev, 1);
        let props = repo.revision_properties(2).unwrap();
        assert_eq!(props.get("svn:log").unwrap(), b"add b");
    }

    #[test]
    fn stale_txn_commit_conflicts() {
        let repo = seeded();
        let name = repo.begin_txn(1, None).unwrap();
        let mut txn = repo.open_txn(&name).unwrap();
        // b.txt landed in r2 on top of our r1 base.
        txn.put_file("trunk/b.txt", b"mine\n".to_vec()).unwrap();
        let err = txn.commit(&[]).unwrap_err();
        assert!(matches!(err, RepoError::Conflict { .. }));
    }

    #[test]
    fn locked_path_requires_token() {
        let repo = seeded();
        let lock = repo.lock("trunk/a.txt", "alice", None, false).unwrap();

        let name = repo.begin_txn(2, None).unwrap();
        let mut txn = repo.open_txn(&name).unwrap();
        txn.put_file("trunk/a.txt", b"locked edit\n".to_vec())
            .unwrap();
        let err = txn.commit(&[]).unwrap_err();
        assert!(matches!(err, RepoError::LockConflict { .. }));

        let name = repo.begin_txn(2, None).unwrap();
        let mut txn = repo.open_txn(&name).unwrap();
        txn.put_file("trunk/a.txt", b"locked edit\n".to_vec())
            .unwrap();
        let outcome = txn
            .commit(&[("trunk/a.txt".to_string(), lock.token.clone())])
            .unwrap();
        assert_eq!(outcome.revision, 3);
    }

    #[test]
    fn hook_failure_is_a_warning_not_a_commit_failure() {
        let repo = seeded();
        repo.set_post_commit_hook(|_| Err("mailer exploded".to_string()));
        let before = repo.latest_revision().unwrap();

        let name = repo.begin_txn(before, None).unwrap();
        let mut txn = repo.open_txn(&name).unwrap();
        txn.put_file("trunk/c.txt", b"gamma\n".to_vec()).unwrap();
        let outcome = txn.commit(&[]).unwrap();

        assert_eq!(outcome.revision, before + 1);
        assert_eq!(outcome.post_commit_error.as_deref(), Some("mailer exploded"));
        assert_eq!(repo.latest_revision().unwrap(), before + 1);
    }

    #[test]
    fn log_ascending_and_descending() {
        let repo = seeded();
        let collect = |start, end| {
            let mut seen = Vec::new();
            repo.log(&[], start, end, &LogOptions::default(), &mut |entry| {
                seen.push(entry.revision.unwrap());
                Ok(())
            })
            .unwrap();
            seen
        };
        assert_eq!(collect(0, 2), vec![0, 1, 2]);
        assert_eq!(collect(2, 0), vec![2, 1, 0]);
    }

    #[test]
    fn log_filters_by_path() {
        let repo = seeded();
        let mut seen = Vec::new();
        repo.log(
            &["trunk/b.txt".to_string()],
            0,
            2,
            &LogOptions::default(),
            &mut |entry| {
                seen.push(entry.revision.unwrap());
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn receiver_error_aborts_log() {
        let repo = seeded();
        let mut calls = 0;
        let err = repo
            .log(&[], 0, 2, &LogOptions::default(), &mut |_| {
                calls += 1;
                Err(RepoError::Cancelled)
            })
            .unwrap_err();
        assert!(matches!(err, RepoError::Cancelled));
        assert_eq!(calls, 1);
    }

    #[test]
    fn deleting_activity_txn_is_abortable() {
        let repo = seeded();
        let name = repo.begin_txn(2, None).unwrap();
        let txn = repo.open_txn(&name).unwrap();
        txn.abort().unwrap();
        assert!(repo.open_txn(&name).is_err());
    }

    #[test]
    fn replay_drives_in_order() {
        #[derive(Default)]
        struct Recorder(Vec<String>);
        impl EditSink for Recorder {
            fn target_revision(&mut self, rev: u64) -> RepoResult<()> {
                self.0.push(format!("target:{rev}"));
                Ok(())
            }
            fn open_root(&mut self, _: Option<u64>) -> RepoResult<()> {
                self.0.push("open-root".to_string());
                Ok(())
            }
            fn delete_entry(&mut self, path: &str, _: Option<u64>) -> RepoResult<()> {
                self.0.push(format!("delete:{path}"));
                Ok(())
            }
            fn add_directory(&mut self, path: &str, _: Option<(&str, u64)>) -> RepoResult<()> {
                self.0.push(format!("add-dir:{path}"));
                Ok(())
            }
            fn open_directory(&mut self, path: &str, _: Option<u64>) -> RepoResult<()> {
                self.0.push(format!("open-dir:{path}"));
                Ok(())
            }
            fn change_dir_prop(&mut self, name: &str, _: Option<&[u8]>) -> RepoResult<()> {
                self.0.push(format!("dir-prop:{name}"));
                Ok(())
            }
            fn close_directory(&mut self) -> RepoResult<()> {
                self.0.push("close-dir".to_string());
                Ok(())
            }
            fn add_file(&mut self, path: &str, _: Option<(&str, u64)>) -> RepoResult<()> {
                self.0.push(format!("add-file:{path}"));
                Ok(())
            }
            fn open_file(&mut self, path: &str, _: Option<u64>) -> RepoResult<()> {
                self.0.push(format!("open-file:{path}"));
                Ok(())
            }
            fn change_file_prop(&mut self, name: &str, _: Option<&[u8]>) -> RepoResult<()> {
                self.0.push(format!("file-prop:{name}"));
                Ok(())
            }
            fn apply_textdelta(&mut self, _: Option<&str>) -> RepoResult<()> {
                self.0.push("textdelta".to_string());
                Ok(())
            }
            fn delta_chunk(&mut self, _: &[u8]) -> RepoResult<()> {
                self.0.push("chunk".to_string());
                Ok(())
            }
            fn close_textdelta(&mut self) -> RepoResult<()> {
                self.0.push("end-textdelta".to_string());
                Ok(())
            }
            fn close_file(&mut self, _: Option<&str>) -> RepoResult<()> {
                self.0.push("close-file".to_string());
                Ok(())
            }
            fn close_edit(&mut self) -> RepoResult<()> {
                self.0.push("close-edit".to_string());
                Ok(())
            }
        }

        let repo = seeded();
        let mut recorder = Recorder::default();
        repo.replay(1, 0, true, &mut recorder).unwrap();
        assert_eq!(
            recorder.0,
            vec![
                "target:1",
                "open-root",
                "add-dir:trunk",
                "add-file:trunk/a.txt",
                "textdelta",
                "chunk",
                "end-textdelta",
                "close-file",
                "close-dir",
                "close-dir",
                "close-edit",
            ]
        );
    }

    #[test]
    fn file_revisions_walks_changes() {
        let repo = seeded();
        commit_change(&repo, "edit a", |txn| {
            txn.put_file("trunk/a.txt", b"alpha2\n".to_vec()).unwrap();
        });

        struct Collect(Vec<u64>);
        impl FileRevSink for Collect {
            fn open_revision(&mut self, rev: &FileRevision) -> RepoResult<()> {
                self.0.push(rev.revision);
                Ok(())
            }
            fn delta_chunk(&mut self, _: &[u8]) -> RepoResult<()> {
                Ok(())
            }
            fn close_revision(&mut self) -> RepoResult<()> {
                Ok(())
            }
        }

        let mut sink = Collect(Vec::new());
        repo.file_revisions("trunk/a.txt", 0, 3, &mut sink).unwrap();
        assert_eq!(sink.0, vec![1, 3]);
    }

    #[test]
    fn revision_for_date_picks_youngest_at_or_before() {
        let repo = seeded();
        let now = Utc::now();
        assert_eq!(repo.revision_for_date(now).unwrap(), 2);
    }
}
