use terracheck::cloud::{InMemoryCloud, VmRecord};
use terracheck::scenarios::{self, NicAttached, VmExists, VmImageVersion};
use terracheck::{HarnessConfig, HarnessError, ProvisionedState, QueryError, Scenario, ScenarioConfig, VmImage};

const RG: &str = "shet0028-a05-rg";
const VM: &str = "shet0028-a05-vm";

fn outputs() -> ProvisionedState {
    [
        ("resource_group_name", RG),
        ("vm_name", VM),
        ("vm_image_version", "18.04.202310010"),
        ("nic_name", "shet0028-a05-nic"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn cloud_with_vm(version: &str, nics: &[&str]) -> InMemoryCloud {
    let cloud = InMemoryCloud::new();
    cloud.insert_vm(
        RG,
        VM,
        VmRecord {
            image: VmImage {
                publisher: "Canonical".to_string(),
                offer: "UbuntuServer".to_string(),
                sku: "18.04-LTS".to_string(),
                version: version.to_string(),
                exact_version: None,
            },
            nics: nics.iter().map(|n| n.to_string()).collect(),
        },
    );
    cloud
}

fn config() -> ScenarioConfig {
    ScenarioConfig::new("..").var("labelPrefix", "shet0028")
}

#[tokio::test]
async fn vm_exists_passes_when_vm_is_present() {
    let cloud = cloud_with_vm("18.04.202310010", &["shet0028-a05-nic"]);
    VmExists::new(config()).verify(&outputs(), &cloud).await.unwrap();
}

#[tokio::test]
async fn vm_exists_fails_when_vm_is_gone() {
    let cloud = cloud_with_vm("18.04.202310010", &["shet0028-a05-nic"]);
    cloud.remove_vm(RG, VM);

    let err = VmExists::new(config()).verify(&outputs(), &cloud).await.unwrap_err();
    match err {
        HarnessError::Assertion(msg) => assert!(msg.contains(VM), "got: {}", msg),
        other => panic!("expected assertion failure, got {:?}", other),
    }
}

#[tokio::test]
async fn image_version_requires_exact_match() {
    let cloud = cloud_with_vm("18.04.202310010", &[]);
    VmImageVersion::new(config()).verify(&outputs(), &cloud).await.unwrap();

    let drifted = cloud_with_vm("18.04.202309010", &[]);
    let err = VmImageVersion::new(config())
        .verify(&outputs(), &drifted)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Assertion(_)));
}

#[tokio::test]
async fn image_version_surfaces_not_found_as_query_error() {
    let cloud = InMemoryCloud::new();
    let err = VmImageVersion::new(config())
        .verify(&outputs(), &cloud)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Query(QueryError::NotFound(_))));
}

#[tokio::test]
async fn nic_must_be_a_member_not_the_whole_list() {
    let cloud = cloud_with_vm(
        "18.04.202310010",
        &["shet0028-a05-nic-secondary", "shet0028-a05-nic"],
    );
    NicAttached::new(config()).verify(&outputs(), &cloud).await.unwrap();

    let other = cloud_with_vm("18.04.202310010", &["someone-elses-nic"]);
    let err = NicAttached::new(config())
        .verify(&outputs(), &other)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Assertion(_)));
}

#[tokio::test]
async fn auth_errors_are_distinguished() {
    let cloud = InMemoryCloud::unauthorized("token expired");
    let err = VmExists::new(config()).verify(&outputs(), &cloud).await.unwrap_err();
    assert!(matches!(err, HarnessError::Query(QueryError::Auth(_))));
}

#[tokio::test]
async fn missing_outputs_fail_before_querying() {
    let cloud = cloud_with_vm("18.04.202310010", &["shet0028-a05-nic"]);
    let partial: ProvisionedState = [("vm_name".to_string(), VM.to_string())]
        .into_iter()
        .collect();

    let err = NicAttached::new(config()).verify(&partial, &cloud).await.unwrap_err();
    assert!(matches!(err, HarnessError::MissingOutput(ref key) if key == "resource_group_name"));
}

#[test]
fn select_by_name_keeps_run_order() {
    let config = HarnessConfig::default();

    let all = scenarios::select(&config, &[]).unwrap();
    let names: Vec<&str> = all.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["vm_exists", "vm_image_version", "nic_attached"]);

    let picked = scenarios::select(
        &config,
        &["nic_attached".to_string(), "vm_exists".to_string()],
    )
    .unwrap();
    let names: Vec<&str> = picked.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["vm_exists", "nic_attached"]);

    assert!(scenarios::select(&config, &["vm_reboot".to_string()]).is_err());
}

#[test]
fn every_scenario_gets_the_label_prefix() {
    let config = HarnessConfig::default();
    for scenario in scenarios::all(&config) {
        assert_eq!(scenario.config().vars["labelPrefix"], "shet0028");
    }
}
