use protolens::config::Config;
use protolens::diagnostics::DiagnosticKind;
use protolens::error::WorkspaceError;
use protolens::workspace::{FileEvent, Workspace};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn copy_dir(src: &Path, dst: &Path) {
    std::fs::create_dir_all(dst).unwrap();
    for entry in std::fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        let target = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&path, &target);
        } else {
            std::fs::copy(&path, &target).unwrap();
        }
    }
}

fn setup_repo(fixture: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    copy_dir(&fixture_path(fixture), dir.path());
    dir
}

fn open(root: &Path, config: Config) -> Workspace {
    Workspace::new(vec![root.to_path_buf()], config).unwrap()
}

fn rel(root: &Path, path: &Path) -> String {
    protolens::util::normalize_rel_path(root, path).unwrap()
}

#[test]
fn proto_scan_skips_vendor() {
    let repo = setup_repo("kratos");
    let workspace = open(repo.path(), Config::default());
    let files: Vec<_> = workspace
        .scan_proto_files()
        .unwrap()
        .iter()
        .map(|path| rel(repo.path(), path))
        .collect();
    assert_eq!(
        files,
        [
            "api/helloworld/v1/greeter.proto",
            "api/odd/v1/odd.proto",
            "api/user/v1/user.proto",
            "third_party/google/api/annotations.proto",
            "third_party/google/api/http.proto",
        ]
    );
}

#[test]
fn workspace_services_are_filtered_and_sorted() {
    let repo = setup_repo("kratos");
    let workspace = open(repo.path(), Config::default());
    let all = workspace.scan_and_parse_all_proto_files().unwrap();
    let names: Vec<_> = all.items.iter().map(|s| s.full_name.as_str()).collect();
    assert_eq!(names, ["helloworld.v1.Greeter", "odd.v1.Odd", "user.v1.UserService"]);

    // The comment between `returns` and its type defeats both text layers.
    let odd = &all.items[1];
    assert_eq!(odd.methods[0].name, "Ping");
    assert_eq!(odd.methods[0].response_type, "PingReply");
    assert!(
        all.diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnparseableMethod && d.subject == "Odd.Ping")
    );
}

#[test]
fn vendor_is_listed_when_not_excluded() {
    let repo = setup_repo("kratos");
    let config = Config {
        exclude: Vec::new(),
        ..Config::default()
    };
    let workspace = open(repo.path(), config);
    let all = workspace.scan_and_parse_all_proto_files().unwrap();
    assert!(all.items.iter().any(|s| s.full_name == "other.api.Vendored"));
}

#[test]
fn unreadable_file_does_not_stop_the_batch() {
    let repo = setup_repo("kratos");
    let broken = repo.path().join("api/broken/v1/broken.proto");
    std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
    std::fs::write(&broken, [0xff, 0xfe, 0x00, 0x9f]).unwrap();

    let workspace = open(repo.path(), Config::default());
    let all = workspace.scan_and_parse_all_proto_files().unwrap();
    assert_eq!(all.items.len(), 3);
    let read_error = all
        .diagnostics
        .iter()
        .find(|d| d.kind == DiagnosticKind::ReadError)
        .expect("read error reported");
    assert_eq!(read_error.file.as_deref(), Some(broken.as_path()));
}

#[test]
fn services_and_methods_are_found_by_name() {
    let repo = setup_repo("kratos");
    let workspace = open(repo.path(), Config::default());
    assert_eq!(workspace.find_service("Greeter").unwrap().full_name, "helloworld.v1.Greeter");
    let (service, method) = workspace.find_method("user.v1.UserService", "UpdateUser").unwrap();
    assert_eq!(service.name, "UserService");
    assert_eq!(method.http_body.as_deref(), Some("user"));

    assert!(matches!(
        workspace.find_service("Nope"),
        Err(WorkspaceError::ServiceNotFound(name)) if name == "Nope"
    ));
    assert!(matches!(
        workspace.find_method("Greeter", "Nope"),
        Err(WorkspaceError::MethodNotFound { .. })
    ));
}

#[test]
fn implementations_span_packages() {
    let repo = setup_repo("kratos");
    let workspace = open(repo.path(), Config::default());
    let found = workspace.get_all_implementations().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].interface_name, "GreeterRepo");
    assert_eq!(found[0].struct_name, "greeterRepo");
    assert_eq!(rel(repo.path(), &found[0].struct_file), "internal/data/greeter.go");

    let strict = Config {
        strict_signatures: true,
        ..Config::default()
    };
    let workspace = open(repo.path(), strict);
    assert!(workspace.get_all_implementations().unwrap().is_empty());
}

#[test]
fn batch_analysis_is_reused_by_single_file_lookups() {
    let repo = setup_repo("kratos");
    let workspace = open(repo.path(), Config::default());
    workspace.get_all_implementations().unwrap();
    assert_eq!(workspace.cache_stats().entries, 2);

    let file = repo.path().join("internal/biz/greeter.go");
    let first = workspace.analyze_path(&file).unwrap();
    let again = workspace.analyze_path(&file).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &again));
    assert_eq!(workspace.cache_stats().entries, 2);
}

#[test]
fn file_events_invalidate_and_mtime_bumps_reanalyze() {
    let repo = setup_repo("kratos");
    let workspace = open(repo.path(), Config::default());
    let file = repo.path().join("internal/data/greeter.go");

    let first = workspace.analyze_path(&file).unwrap();
    assert_eq!(first.structs.len(), 2);
    assert_eq!(workspace.cache_stats().entries, 1);

    let again = workspace.analyze_path(&file).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &again));

    std::fs::write(&file, "package data\n\ntype onlyRepo struct{}\n").unwrap();
    let later = SystemTime::now() + Duration::from_secs(5);
    std::fs::File::options()
        .write(true)
        .open(&file)
        .unwrap()
        .set_modified(later)
        .unwrap();
    let updated = workspace.analyze_path(&file).unwrap();
    assert_eq!(updated.structs.len(), 1);
    assert_eq!(updated.structs[0].name, "onlyRepo");

    assert!(workspace.handle_file_event(&FileEvent::Deleted(file.clone())));
    assert!(!workspace.handle_file_event(&FileEvent::Changed(file)));
    assert_eq!(workspace.cache_stats().entries, 0);
}

#[test]
fn missing_inputs_are_errors() {
    assert!(matches!(
        Workspace::new(Vec::new(), Config::default()),
        Err(WorkspaceError::NoRoots)
    ));
    assert!(matches!(
        Workspace::new(vec![PathBuf::from("/definitely/not/here")], Config::default()),
        Err(WorkspaceError::RootNotFound(_))
    ));

    let repo = setup_repo("kratos");
    let workspace = open(repo.path(), Config::default());
    let missing = repo.path().join("internal/none.go");
    assert!(matches!(
        workspace.analyze_path(&missing),
        Err(WorkspaceError::FileNotFound(path)) if path == missing
    ));
    assert!(matches!(
        workspace.parse_proto_file(&repo.path().join("api/none.proto")),
        Err(WorkspaceError::FileNotFound(_))
    ));
}
