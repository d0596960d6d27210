use protolens::model::{ProtoMethod, ProtoService};
use protolens::proto::{ExclusionReason, exclusion_reason, filter_services};
use std::path::PathBuf;

fn service(name: &str, full_name: &str, path: &str) -> ProtoService {
    ProtoService {
        name: name.to_string(),
        full_name: full_name.to_string(),
        file_path: PathBuf::from(path),
        methods: vec![ProtoMethod {
            name: "Get".to_string(),
            request_type: "GetRequest".to_string(),
            response_type: "GetReply".to_string(),
            ..Default::default()
        }],
    }
}

fn mixed() -> Vec<ProtoService> {
    vec![
        service("UserService", "user.v1.UserService", "/repo/api/user/v1/user.proto"),
        service("Health", "grpc.health.v1.Health", "/repo/api/health.proto"),
        service("Greeter", "helloworld.v1.Greeter", "/repo/api/helloworld/v1/greeter.proto"),
        service("Operations", "google.longrunning.Operations", "/repo/api/ops.proto"),
        service("Status", "acme.Status", "/repo/third_party/google/rpc/status.proto"),
        service("Admin", "admin.v1.Admin", "/repo/api/admin/v1/admin.proto"),
        ProtoService {
            methods: Vec::new(),
            ..service("Empty", "empty.v1.Empty", "/repo/api/empty.proto")
        },
    ]
}

#[test]
fn infrastructure_services_are_dropped() {
    let kept = filter_services(mixed());
    let names: Vec<_> = kept.iter().map(|s| s.full_name.as_str()).collect();
    assert_eq!(
        names,
        ["admin.v1.Admin", "helloworld.v1.Greeter", "user.v1.UserService"]
    );
}

#[test]
fn filtering_is_idempotent() {
    let once = filter_services(mixed());
    let twice = filter_services(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn equal_keys_keep_input_order() {
    let first = service("Greeter", "a.Greeter", "/repo/api/greeter.proto");
    let second = service("Greeter", "b.Greeter", "/repo/api/greeter.proto");
    let kept = filter_services(vec![first.clone(), second.clone()]);
    assert_eq!(kept, [first.clone(), second.clone()]);

    let kept = filter_services(vec![second.clone(), first.clone()]);
    assert_eq!(kept, [second, first]);
}

#[test]
fn reasons_follow_rule_precedence() {
    let reasons: Vec<_> = mixed().iter().map(exclusion_reason).collect();
    assert_eq!(
        reasons,
        [
            None,
            Some(ExclusionReason::ServiceName("Health")),
            None,
            Some(ExclusionReason::PackagePrefix("google.")),
            Some(ExclusionReason::FilePath("google/rpc/")),
            None,
            Some(ExclusionReason::NoMethods),
        ]
    );
}

#[test]
fn reason_serializes_with_rule_and_pattern() {
    let value = serde_json::to_value(ExclusionReason::FilePath("validate/")).unwrap();
    assert_eq!(value, serde_json::json!({"rule": "file_path", "pattern": "validate/"}));
    assert_eq!(
        ExclusionReason::PackagePrefix("envoy.").to_string(),
        "package starts with envoy."
    );
}
