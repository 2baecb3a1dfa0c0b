use super::*;
use crate::config::{RolloutConfig, Strategy, TrafficSplitMethod};
use crate::executor::mock::{Call, MockExecutor};
use crate::manifest::fixtures;
use crate::manifest::TRAFFIC_SPLIT_KIND;
use crate::routing::canary_router;
use std::sync::Arc;

fn pod_canary(percentage: Option<i32>) -> (CanaryStrategy, Context, Arc<MockExecutor>) {
    let mut config = RolloutConfig::new(Strategy::Canary);
    config.percentage = percentage;
    let (ctx, mock) = Context::new_mock(config);
    (CanaryStrategy::new(None), ctx, mock)
}

fn smi_canary(percentage: i32) -> (CanaryStrategy, Context, Arc<MockExecutor>) {
    let mut config = RolloutConfig::new(Strategy::Canary);
    config.percentage = Some(percentage);
    config.traffic_split_method = TrafficSplitMethod::Smi;
    let (ctx, mock) = Context::new_mock(config);
    (
        CanaryStrategy::new(canary_router(TrafficSplitMethod::Smi)),
        ctx,
        mock,
    )
}

fn live_workload(mock: &MockExecutor, name: &str) -> Workload {
    match mock.object("Deployment", name) {
        Some(Manifest::Workload(workload)) => workload,
        other => panic!("expected deployment {name}, got {other:?}"),
    }
}

fn split_weights(mock: &MockExecutor) -> (Option<u32>, Option<u32>, Option<u32>) {
    match mock.object(TRAFFIC_SPLIT_KIND, "nginx-service-workflow-rollout") {
        Some(Manifest::TrafficSplit(split)) => (
            split.weight_of("nginx-service-stable"),
            split.weight_of("nginx-service-baseline"),
            split.weight_of("nginx-service-canary"),
        ),
        other => panic!("expected traffic split, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_deploy_creates_canary_without_baseline() {
    let (strategy, ctx, mock) = pod_canary(Some(20));
    let set = fixtures::manifest_set(&[fixtures::NGINX_MANIFESTS]);

    let outcome = strategy.deploy(&ctx, &set).await.unwrap();

    assert_eq!(
        mock.applied_names(),
        vec![vec![
            "Deployment/nginx-deployment-canary",
            "Service/nginx-service",
            "Ingress/nginx-ingress",
            "ConfigMap/nginx-config"
        ]]
    );
    assert_eq!(outcome.deploy_results.len(), 1);
    assert!(outcome.deleted.is_empty());

    let canary = live_workload(&mock, "nginx-deployment-canary");
    // 20% of 4 rounds to 1
    assert_eq!(canary.replicas(), 1);
    assert_eq!(canary.label(CANARY_VERSION_LABEL), Some("canary"));
    assert_eq!(
        canary.object.data["spec"]["selector"]["matchLabels"][CANARY_VERSION_LABEL],
        "canary"
    );
}

#[tokio::test]
async fn test_deploy_clones_live_stable_into_baseline() {
    let (strategy, ctx, mock) = pod_canary(Some(50));
    let mut stable = fixtures::deployment("nginx-deployment", 4);
    stable.object.metadata.uid = Some("0b8f6c1e".to_string());
    stable.object.metadata.resource_version = Some("4711".to_string());
    mock.insert(stable.into());
    let set = fixtures::manifest_set(&[fixtures::NGINX_DEPLOYMENT]);

    strategy.deploy(&ctx, &set).await.unwrap();

    assert_eq!(
        mock.applied_names(),
        vec![vec![
            "Deployment/nginx-deployment-canary",
            "Deployment/nginx-deployment-baseline"
        ]]
    );
    let baseline = live_workload(&mock, "nginx-deployment-baseline");
    assert_eq!(baseline.replicas(), 2);
    assert_eq!(baseline.label(CANARY_VERSION_LABEL), Some("baseline"));
    assert!(baseline.object.metadata.uid.is_none());
    assert!(baseline.object.metadata.resource_version.is_none());
    assert_eq!(live_workload(&mock, "nginx-deployment-canary").replicas(), 2);
}

#[tokio::test]
async fn test_replica_override_bypasses_percentage() {
    let mut config = RolloutConfig::new(Strategy::Canary);
    config.percentage = Some(10);
    config.baseline_and_canary_replicas = Some(7);
    let (ctx, mock) = Context::new_mock(config);
    mock.insert(fixtures::deployment("nginx-deployment", 4).into());
    let set = fixtures::manifest_set(&[fixtures::NGINX_DEPLOYMENT]);

    CanaryStrategy::new(None).deploy(&ctx, &set).await.unwrap();

    assert_eq!(live_workload(&mock, "nginx-deployment-canary").replicas(), 7);
    assert_eq!(live_workload(&mock, "nginx-deployment-baseline").replicas(), 7);
}

#[tokio::test]
async fn test_out_of_range_replica_override_is_rejected_before_apply() {
    let mut config = RolloutConfig::new(Strategy::Canary);
    config.percentage = Some(10);
    config.baseline_and_canary_replicas = Some(101);
    let (ctx, mock) = Context::new_mock(config);
    let set = fixtures::manifest_set(&[fixtures::NGINX_DEPLOYMENT]);

    let result = CanaryStrategy::new(None).deploy(&ctx, &set).await;

    assert!(matches!(result, Err(RolloutError::Validation(_))));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_deploy_without_percentage_is_validation_error() {
    let (strategy, ctx, mock) = pod_canary(None);
    let set = fixtures::manifest_set(&[fixtures::NGINX_DEPLOYMENT]);

    let result = strategy.deploy(&ctx, &set).await;

    assert!(matches!(result, Err(RolloutError::Validation(_))));
    assert_eq!(mock.mutations(), 0);
}

#[tokio::test]
async fn test_failed_apply_aborts_with_stderr() {
    let (strategy, ctx, mock) = pod_canary(Some(20));
    mock.fail_applies("deployments.apps is forbidden");
    let set = fixtures::manifest_set(&[fixtures::NGINX_DEPLOYMENT]);

    let result = strategy.deploy(&ctx, &set).await;

    match result {
        Err(RolloutError::CommandFailed { stderr, .. }) => {
            assert_eq!(stderr, "deployments.apps is forbidden")
        }
        other => panic!("expected command failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pod_promote_applies_input_then_deletes_variants() {
    let (strategy, ctx, mock) = pod_canary(None);
    let set = fixtures::manifest_set(&[fixtures::NGINX_MANIFESTS]);

    let outcome = strategy.promote(&ctx, &set).await.unwrap();

    assert_eq!(
        mock.applied_names(),
        vec![vec![
            "Service/nginx-service",
            "Deployment/nginx-deployment",
            "Ingress/nginx-ingress",
            "ConfigMap/nginx-config"
        ]]
    );
    assert_eq!(
        outcome.deleted,
        vec![
            DeleteTarget::new("Deployment", "nginx-deployment-baseline"),
            DeleteTarget::new("Deployment", "nginx-deployment-canary"),
        ]
    );
    assert_eq!(live_workload(&mock, "nginx-deployment").replicas(), 4);
}

#[tokio::test]
async fn test_pod_reject_only_deletes() {
    let (strategy, ctx, mock) = pod_canary(None);
    let set = fixtures::manifest_set(&[fixtures::NGINX_MANIFESTS]);

    let outcome = strategy.reject(&ctx, &set).await.unwrap();

    assert!(mock.applied().is_empty());
    assert_eq!(outcome.deleted.len(), 2);
    assert!(outcome.deploy_results.is_empty());
}

#[tokio::test]
async fn test_smi_first_deploy_routes_to_canary() {
    let (strategy, ctx, mock) = smi_canary(20);
    let set = fixtures::manifest_set(&[fixtures::NGINX_MANIFESTS]);

    let outcome = strategy.deploy(&ctx, &set).await.unwrap();

    let batches = mock.applied_names();
    assert_eq!(batches.len(), 2);
    assert_eq!(
        batches[0],
        vec![
            "Deployment/nginx-deployment-canary",
            "Service/nginx-service",
            "Ingress/nginx-ingress",
            "ConfigMap/nginx-config"
        ]
    );
    assert!(batches[1].contains(&"Service/nginx-service-stable".to_string()));
    assert_eq!(split_weights(&mock), (Some(0), Some(0), Some(1000)));
    assert_eq!(outcome.deploy_results.len(), 2);

    let fetched_stable = mock.calls().iter().any(|call| {
        matches!(call, Call::Fetch { kind, name } if kind == "Deployment" && name == "nginx-deployment-stable")
    });
    assert!(fetched_stable);
}

#[tokio::test]
async fn test_smi_deploy_with_stable_uses_percentage_split() {
    let (strategy, ctx, mock) = smi_canary(30);
    mock.insert(
        fixtures::deployment("nginx-deployment-stable", 4)
            .with_label(CANARY_VERSION_LABEL, "stable")
            .into(),
    );
    mock.insert(Manifest::Service(crate::routing::service_variant(
        &fixtures::service(),
        "nginx-service-stable".to_string(),
        CANARY_VERSION_LABEL,
        "stable",
        true,
    )));
    let set = fixtures::manifest_set(&[fixtures::NGINX_MANIFESTS]);

    strategy.deploy(&ctx, &set).await.unwrap();

    let baseline = live_workload(&mock, "nginx-deployment-baseline");
    // 30% of 4 rounds to 1
    assert_eq!(baseline.replicas(), 1);
    assert_eq!(split_weights(&mock), (Some(700), Some(150), Some(150)));
}

#[tokio::test]
async fn test_smi_reject_redirects_before_deleting() {
    let (strategy, ctx, mock) = smi_canary(20);
    let set = fixtures::manifest_set(&[fixtures::NGINX_MANIFESTS]);
    strategy.deploy(&ctx, &set).await.unwrap();
    let before = mock.calls().len();

    let outcome = strategy.reject(&ctx, &set).await.unwrap();

    let calls = &mock.calls()[before..];
    let redirect = calls
        .iter()
        .position(|call| matches!(call, Call::Apply { .. }))
        .expect("redirect applied");
    let delete = calls
        .iter()
        .position(|call| matches!(call, Call::Delete { .. }))
        .expect("variants deleted");
    assert!(redirect < delete);
    assert_eq!(split_weights(&mock), (Some(1000), Some(0), Some(0)));
    assert_eq!(
        outcome.deleted,
        vec![
            DeleteTarget::new("Deployment", "nginx-deployment-baseline"),
            DeleteTarget::new("Deployment", "nginx-deployment-canary"),
            DeleteTarget::new("Service", "nginx-service-baseline"),
            DeleteTarget::new("Service", "nginx-service-canary"),
        ]
    );
}

#[tokio::test]
async fn test_smi_reject_does_not_delete_when_redirect_fails() {
    let (strategy, ctx, mock) = smi_canary(20);
    let set = fixtures::manifest_set(&[fixtures::NGINX_MANIFESTS]);
    strategy.deploy(&ctx, &set).await.unwrap();
    mock.fail_applies("the server is currently unable to handle the request");

    let result = strategy.reject(&ctx, &set).await;

    assert!(matches!(result, Err(RolloutError::CommandFailed { .. })));
    assert!(mock.deleted().is_empty());
    assert!(mock.object("Deployment", "nginx-deployment-canary").is_some());
}

#[tokio::test]
async fn test_smi_promote_sequence() {
    let (strategy, ctx, mock) = smi_canary(20);
    let set = fixtures::manifest_set(&[fixtures::NGINX_MANIFESTS]);
    // live state after a deploy that found an existing stable version
    strategy.deploy(&ctx, &set).await.unwrap();
    set_split(&ctx, &mock, 20).await;
    let before = mock.applied().len();

    let outcome = strategy.promote(&ctx, &set).await.unwrap();

    let batches = &mock.applied_names()[before..];
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0], vec!["TrafficSplit/nginx-service-workflow-rollout"]);
    assert_eq!(
        batches[1],
        vec![
            "Deployment/nginx-deployment-stable",
            "Service/nginx-service",
            "Ingress/nginx-ingress",
            "ConfigMap/nginx-config"
        ]
    );
    assert_eq!(batches[2], vec!["TrafficSplit/nginx-service-workflow-rollout"]);
    assert_eq!(split_weights(&mock), (Some(1000), Some(0), Some(0)));

    let stable = live_workload(&mock, "nginx-deployment-stable");
    assert_eq!(stable.label(CANARY_VERSION_LABEL), Some("stable"));
    assert_eq!(stable.replicas(), 4);
    assert_eq!(outcome.deleted.len(), 4);
    assert!(mock.object("Deployment", "nginx-deployment-canary").is_none());
    assert!(mock.object("Service", "nginx-service-canary").is_none());
}

/// Move the live split to a percentage without running a phase
async fn set_split(ctx: &Context, mock: &MockExecutor, percentage: u32) {
    let router = crate::routing::SmiRouter::new(crate::routing::SmiTopology::Canary);
    let split = router
        .traffic_split(ctx, "nginx-service", CanaryWeights::for_percentage(percentage).into())
        .await
        .unwrap();
    mock.insert(split.into());
}
