use std::fs;
use std::path::{Path, PathBuf};

use sha3::{Digest, Sha3_256};
use tempfile::TempDir;
use tidemark_core::{ContentHash, Fingerprint};
use tidemark_state::{
    ChangeKind, HashAlgorithm, StateRepository, TrackError, TrackerConfig, WarningKind,
};

fn open(temp: &TempDir) -> StateRepository {
    StateRepository::open(TrackerConfig::new(temp.path())).unwrap()
}

fn sha3_of(content: &[u8]) -> Fingerprint {
    Fingerprint::new(
        content.len() as u64,
        ContentHash::new(Sha3_256::digest(content).into()),
        Some(HashAlgorithm::Sha3_256),
    )
}

fn commit_all(repository: &StateRepository) {
    for change in repository.changes() {
        change.commit().unwrap();
    }
}

fn pending(repository: &StateRepository) -> Vec<(ChangeKind, PathBuf)> {
    repository
        .changes()
        .map(|change| (change.kind(), change.item().to_path_buf()))
        .collect()
}

fn create_test_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    fs::create_dir_all(root.join("docs/notes")).unwrap();
    fs::write(root.join("readme.txt"), "read me").unwrap();
    fs::write(root.join("docs/guide.md"), "# guide").unwrap();
    fs::write(root.join("docs/notes/todo.txt"), "nothing").unwrap();

    temp
}

#[test]
fn test_changes_before_commit() {
    let temp = create_test_tree();
    let repository = open(&temp);

    let changes: Vec<_> = repository.changes().collect();
    assert_eq!(changes.len(), 3);
    for change in &changes {
        assert_eq!(change.kind(), ChangeKind::Added);
        assert!(change.previous_state().is_none());
        assert!(change.new_state().is_some());
    }
}

#[test]
fn test_no_changes_after_commit() {
    let temp = create_test_tree();
    let repository = open(&temp);

    commit_all(&repository);

    assert!(pending(&repository).is_empty());
    assert_eq!(repository.store().items().count(), 3);
}

#[test]
fn test_added_detection() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::write(temp.path().join("a.txt"), "hello").unwrap();

    let changes: Vec<_> = repository.changes().collect();

    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change.item(), Path::new("a.txt"));
    assert_eq!(change.item_path(), repository.root().join("a.txt"));
    assert_eq!(change.previous_state(), None);
    assert_eq!(change.new_state(), Some(&sha3_of(b"hello")));
    assert_eq!(change.new_state().unwrap().size(), 5);
    assert_eq!(
        change.new_state().unwrap().content_hash().to_hex(),
        "3338be694f50c5f338814986cdf0686453a888b84f424d792af4b9202398f392"
    );
}

#[test]
fn test_modified_detection() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::write(temp.path().join("a.txt"), "hello").unwrap();
    commit_all(&repository);

    fs::write(temp.path().join("a.txt"), "world!").unwrap();
    let changes: Vec<_> = repository.changes().collect();

    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change.kind(), ChangeKind::Modified);
    assert_eq!(change.previous_state(), Some(&sha3_of(b"hello")));
    assert_eq!(change.new_state(), Some(&sha3_of(b"world!")));
    assert_ne!(change.previous_state(), change.new_state());
}

#[test]
fn test_rewrite_with_same_content_is_quiet() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::write(temp.path().join("a.txt"), "hello").unwrap();
    commit_all(&repository);

    fs::write(temp.path().join("a.txt"), "hello").unwrap();

    assert!(pending(&repository).is_empty());
}

#[test]
fn test_deleted_detection() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::write(temp.path().join("a.txt"), "hello").unwrap();
    commit_all(&repository);

    fs::remove_file(temp.path().join("a.txt")).unwrap();
    let changes: Vec<_> = repository.changes().collect();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind(), ChangeKind::Deleted);
    assert_eq!(changes[0].previous_state(), Some(&sha3_of(b"hello")));
    assert_eq!(changes[0].new_state(), None);

    for change in changes {
        change.commit().unwrap();
    }
    assert_eq!(repository.store().items().count(), 0);
    assert!(pending(&repository).is_empty());
}

#[test]
fn test_append_to_each_item_yields_one_change_each() {
    let temp = create_test_tree();
    let repository = open(&temp);
    commit_all(&repository);

    let files: Vec<_> = repository.content_paths().collect();
    for path in &files {
        let mut content = fs::read(path).unwrap();
        content.extend_from_slice(b" and more");
        fs::write(path, content).unwrap();

        let changes = pending(&repository);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, ChangeKind::Modified);
        assert_eq!(repository.root().join(&changes[0].1), *path);

        commit_all(&repository);
    }
}

#[test]
fn test_delete_each_item_then_commit_is_quiet() {
    let temp = create_test_tree();
    let repository = open(&temp);
    commit_all(&repository);

    let files: Vec<_> = repository.content_paths().collect();
    for path in &files {
        fs::remove_file(path).unwrap();

        let changes = pending(&repository);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, ChangeKind::Deleted);
        assert_eq!(repository.root().join(&changes[0].1), *path);

        commit_all(&repository);
        assert!(pending(&repository).is_empty());
    }

    assert_eq!(repository.store().items().count(), 0);
}

#[test]
fn test_partial_commit_recovery() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::write(temp.path().join("a.txt"), "first").unwrap();
    fs::write(temp.path().join("b.txt"), "second").unwrap();

    let mut changes = repository.changes();
    let first = changes.next().unwrap();
    let second = changes.next().unwrap();
    let expected = (
        second.item().to_path_buf(),
        second.previous_state().copied(),
        second.new_state().copied(),
    );
    first.commit().unwrap();
    drop(second);
    drop(changes);

    let remaining: Vec<_> = repository.changes().collect();
    assert_eq!(remaining.len(), 1);
    let actual = (
        remaining[0].item().to_path_buf(),
        remaining[0].previous_state().copied(),
        remaining[0].new_state().copied(),
    );
    assert_eq!(actual, expected);
}

#[test]
fn test_deletions_follow_additions() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::write(temp.path().join("a.txt"), "a").unwrap();
    commit_all(&repository);

    fs::remove_file(temp.path().join("a.txt")).unwrap();
    fs::write(temp.path().join("z.txt"), "z").unwrap();

    let kinds: Vec<_> = pending(&repository).into_iter().map(|(kind, _)| kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Added, ChangeKind::Deleted]);
}

#[test]
fn test_full_scan_is_drained() {
    let temp = create_test_tree();
    let repository = open(&temp);

    let mut changes = repository.changes();
    assert!(!changes.is_drained());
    assert_eq!(changes.by_ref().count(), 3);
    assert!(changes.is_drained());
    assert!(changes.warnings().is_empty());
}

#[test]
fn test_same_named_directory_elsewhere_is_tracked() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::create_dir_all(temp.path().join("project/.tidemark")).unwrap();
    fs::write(temp.path().join("project/.tidemark/keep"), "user data").unwrap();

    let changes = pending(&repository);

    assert_eq!(
        changes,
        vec![(ChangeKind::Added, PathBuf::from("project/.tidemark/keep"))]
    );
}

#[test]
fn test_metadata_directory_is_never_reported() {
    let temp = create_test_tree();
    let repository = open(&temp);
    commit_all(&repository);
    fs::write(repository.config().metadata_path().join("stray"), "x").unwrap();

    assert!(pending(&repository).is_empty());
}

#[test]
fn test_corrupt_record_reports_item_as_added() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::write(temp.path().join("a.txt"), "hello").unwrap();
    commit_all(&repository);

    fs::write(repository.store().state_dir().join("a.txt"), "garbage").unwrap();
    let mut changes = repository.changes();
    let change = changes.next().unwrap();

    assert_eq!(change.kind(), ChangeKind::Added);
    assert_eq!(changes.warnings().len(), 1);
    assert_eq!(changes.warnings()[0].kind, WarningKind::CorruptRecord);

    change.commit().unwrap();
    drop(changes);
    assert!(pending(&repository).is_empty());
}

#[test]
fn test_corrupt_record_of_missing_file_is_skipped() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::write(repository.store().state_dir().join("gone.txt"), "size: ?\n").unwrap();

    let mut changes = repository.changes();
    assert!(changes.next().is_none());
    assert_eq!(changes.warnings().len(), 1);
    assert_eq!(changes.warnings()[0].kind, WarningKind::CorruptRecord);
}

#[test]
fn test_algorithm_change_reports_modified() {
    let temp = create_test_tree();
    let repository = open(&temp);
    commit_all(&repository);
    drop(repository);

    let config = TrackerConfig::builder()
        .root(temp.path().to_path_buf())
        .algorithm(HashAlgorithm::Sha256)
        .build()
        .unwrap();
    let repository = StateRepository::open(config).unwrap();

    let changes: Vec<_> = repository.changes().collect();
    assert_eq!(changes.len(), 3);
    for change in &changes {
        assert_eq!(change.kind(), ChangeKind::Modified);
        assert_eq!(
            change.new_state().unwrap().algorithm(),
            Some(HashAlgorithm::Sha256)
        );
    }
}

#[test]
fn test_untagged_record_is_reported_once() {
    let temp = TempDir::new().unwrap();
    let repository = open(&temp);
    fs::write(temp.path().join("a.txt"), "hello").unwrap();

    let current = sha3_of(b"hello");
    let untagged = Fingerprint::new(current.size(), current.content_hash(), None);
    repository
        .store()
        .put(Path::new("a.txt"), Some(&untagged))
        .unwrap();

    let changes: Vec<_> = repository.changes().collect();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind(), ChangeKind::Modified);
    assert_eq!(changes[0].previous_state(), Some(&untagged));

    for change in changes {
        change.commit().unwrap();
    }
    assert!(pending(&repository).is_empty());
}

#[test]
fn test_config_file_selects_algorithm() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(".tidemark")).unwrap();
    fs::write(
        temp.path().join(".tidemark/config.toml"),
        "algorithm = \"sha256\"\n",
    )
    .unwrap();
    fs::write(temp.path().join("a.txt"), "hello").unwrap();

    let repository = StateRepository::open_path(temp.path()).unwrap();
    let changes: Vec<_> = repository.changes().collect();

    assert_eq!(changes.len(), 1);
    let new = changes[0].new_state().unwrap();
    assert_eq!(new.algorithm(), Some(HashAlgorithm::Sha256));
    assert_eq!(
        new.content_hash().to_hex(),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
}

#[test]
fn test_repositories_are_independent() {
    let first = create_test_tree();
    let second = TempDir::new().unwrap();
    fs::write(second.path().join("only.txt"), "only").unwrap();

    let one = open(&first);
    let two = open(&second);
    commit_all(&one);

    assert!(pending(&one).is_empty());
    assert_eq!(
        pending(&two),
        vec![(ChangeKind::Added, PathBuf::from("only.txt"))]
    );
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_ignored() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "hello").unwrap();
    std::os::unix::fs::symlink(temp.path().join("a.txt"), temp.path().join("link")).unwrap();
    let repository = open(&temp);

    assert_eq!(
        pending(&repository),
        vec![(ChangeKind::Added, PathBuf::from("a.txt"))]
    );
}

#[cfg(unix)]
#[test]
fn test_file_replaced_by_symlink_is_deleted() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "hello").unwrap();
    fs::write(temp.path().join("b.txt"), "other").unwrap();
    let repository = open(&temp);
    commit_all(&repository);

    fs::remove_file(temp.path().join("a.txt")).unwrap();
    std::os::unix::fs::symlink(temp.path().join("b.txt"), temp.path().join("a.txt")).unwrap();

    assert_eq!(
        pending(&repository),
        vec![(ChangeKind::Deleted, PathBuf::from("a.txt"))]
    );
}

#[test]
fn test_commit_blocked_by_file_record_returns_store_write() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a"), "file").unwrap();
    let repository = open(&temp);
    commit_all(&repository);

    fs::remove_file(temp.path().join("a")).unwrap();
    fs::create_dir(temp.path().join("a")).unwrap();
    fs::write(temp.path().join("a/b"), "nested").unwrap();

    let mut changes: Vec<_> = repository.changes().collect();
    assert_eq!(changes.len(), 2);
    let deletion = changes.pop().unwrap();
    let addition = changes.pop().unwrap();
    assert_eq!(addition.item(), Path::new("a/b"));
    assert_eq!(deletion.kind(), ChangeKind::Deleted);

    let result = addition.commit();
    assert!(matches!(result, Err(TrackError::StoreWrite { ref item, .. }) if item == Path::new("a/b")));
    assert!(repository.store().get(Path::new("a")).unwrap().is_some());

    deletion.commit().unwrap();
    assert_eq!(
        pending(&repository),
        vec![(ChangeKind::Added, PathBuf::from("a/b"))]
    );
    commit_all(&repository);
    assert!(pending(&repository).is_empty());
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_skipped_with_warning() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("locked.txt"), "secret").unwrap();
    fs::write(temp.path().join("open.txt"), "public").unwrap();
    let locked = temp.path().join("locked.txt");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Permission bits do not stop a privileged user.
    if fs::File::open(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
        return;
    }

    let repository = open(&temp);
    let mut changes = repository.changes();
    let items: Vec<_> = changes
        .by_ref()
        .map(|change| change.item().to_path_buf())
        .collect();

    assert_eq!(items, vec![PathBuf::from("open.txt")]);
    assert!(changes.is_drained());
    let warnings = changes.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        warnings[0].kind,
        WarningKind::PermissionDenied | WarningKind::ReadError
    ));
    drop(changes);

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    assert_eq!(
        pending(&repository),
        vec![
            (ChangeKind::Added, PathBuf::from("locked.txt")),
            (ChangeKind::Added, PathBuf::from("open.txt")),
        ]
    );
}
