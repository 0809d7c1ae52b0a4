use alchm_alerts::alerts::{
    AlertCategory, AlertFilter, AlertStore, AlertingSystem, NotificationDispatcher, ResponseStatus,
    Severity,
};
use alchm_alerts::metrics::{MetricAdapters, SnapshotMetrics};
use chrono::{Duration, Utc};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Integration tests for the alerting engine against real state and metrics files

fn engine_at(dir: &Path) -> AlertingSystem {
    let metrics = Arc::new(SnapshotMetrics::from_file(dir.join("metrics.json")));
    let adapters = MetricAdapters::new(metrics.clone(), metrics.clone(), metrics.clone(), metrics);
    AlertingSystem::new(adapters, AlertStore::new(dir.join("state").join("alerting-state.json")))
        .with_notifier(NotificationDispatcher::new(false))
}

fn write_metrics(dir: &Path, json: &str) {
    fs::write(dir.join("metrics.json"), json).unwrap();
}

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    write_metrics(
        temp_dir.path(),
        r#"{"errors": {"typescriptErrors": 640}, "quality": {"codeQualityScore": 90}}"#,
    );

    let now = Utc::now();
    let first = engine_at(temp_dir.path());
    let report = first.run_tick_at(now).await;
    assert_eq!(report.alerts_created, 1);

    let created = first.alerts(&AlertFilter::default()).await;
    first.acknowledge_alert(&created[0].id).await;

    let second = engine_at(temp_dir.path());
    let reloaded = second.alerts(&AlertFilter::default()).await;
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].id, created[0].id);
    assert_eq!(reloaded[0].created_at, created[0].created_at);
    assert!(reloaded[0].acknowledged);
    assert_eq!(reloaded[0].category, AlertCategory::Error);
    assert_eq!(reloaded[0].severity, Severity::High);

    // 640 > 500, so the conditional campaign ran
    let responses = second.responses_for(&reloaded[0].id).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, ResponseStatus::Completed);

    // The cooldown is persisted too
    assert_eq!(second.run_tick_at(now + Duration::minutes(10)).await.alerts_created, 0);
    assert_eq!(second.run_tick_at(now + Duration::minutes(30)).await.alerts_created, 1);
}

#[tokio::test]
async fn test_state_file_uses_camel_case_and_iso_dates() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine_at(temp_dir.path());
    engine.test_alert("memory-usage-high").await.unwrap();

    let raw = fs::read_to_string(temp_dir.path().join("state").join("alerting-state.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

    for key in ["alertRules", "escalationRules", "alerts", "alertResponses", "pendingRetries", "lastFired"] {
        assert!(json.get(key).is_some(), "missing key {key}");
    }
    let created_at = json["alerts"][0]["createdAt"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
    assert_eq!(json["alerts"][0]["type"], "system");
}

#[tokio::test]
async fn test_cooldown_scenario_from_snapshot_file() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine_at(temp_dir.path());
    for rule in engine.alert_rules().await {
        if rule.id != "build-time-critical" {
            engine.delete_alert_rule(&rule.id).await;
        }
    }
    // 15 minute cooldown, threshold 60
    let t0 = Utc::now();

    write_metrics(temp_dir.path(), r#"{"performance": {"averageBuildTime": 50}}"#);
    assert_eq!(engine.check_alert_conditions_at(t0).await, 0);

    write_metrics(temp_dir.path(), r#"{"performance": {"averageBuildTime": 150}}"#);
    assert_eq!(engine.check_alert_conditions_at(t0 + Duration::minutes(5)).await, 1);
    assert_eq!(engine.check_alert_conditions_at(t0 + Duration::minutes(19)).await, 0);
    assert_eq!(engine.check_alert_conditions_at(t0 + Duration::minutes(20)).await, 1);
}

#[tokio::test]
async fn test_legacy_string_conditions_load() {
    let temp_dir = TempDir::new().unwrap();
    let state_dir = temp_dir.path().join("state");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(
        state_dir.join("alerting-state.json"),
        r#"{
          "alertRules": [{
            "id": "errors",
            "name": "Errors",
            "type": "error",
            "metric": "total_errors",
            "condition": "greater_than",
            "threshold": 10,
            "severity": "medium",
            "autoResponse": true,
            "responseActions": [{
              "name": "big-cleanup",
              "kind": {"type": "campaign", "campaign": "cleanup"},
              "conditions": ["error_count > 100"]
            }]
          }]
        }"#,
    )
    .unwrap();
    write_metrics(temp_dir.path(), r#"{"errors": {"totalActiveErrors": 20}}"#);

    let engine = engine_at(temp_dir.path());
    assert_eq!(engine.alert_rules().await.len(), 1);
    assert!(!engine.escalation_rules().await.is_empty());

    engine.run_tick().await;
    let alert = &engine.alerts(&AlertFilter::default()).await[0];
    let responses = engine.responses_for(&alert.id).await;
    assert_eq!(responses[0].status, ResponseStatus::Skipped);
}

#[tokio::test]
async fn test_unrecognised_condition_keeps_persisted_alerts() {
    let temp_dir = TempDir::new().unwrap();
    let first = engine_at(temp_dir.path());
    for _ in 0..3 {
        first.test_alert("build-time-critical").await.unwrap();
    }

    let state_path = temp_dir.path().join("state").join("alerting-state.json");
    let mut raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&state_path).unwrap()).unwrap();
    assert_eq!(raw["alertRules"][0]["id"], "build-time-critical");
    raw["alertRules"][0]["responseActions"][0]["conditions"] =
        serde_json::json!(["build takes too long"]);
    fs::write(&state_path, serde_json::to_string_pretty(&raw).unwrap()).unwrap();

    let second = engine_at(temp_dir.path());
    assert_eq!(second.alerts(&AlertFilter::default()).await.len(), 3);
    assert_eq!(second.alert_rules().await.len(), 5);

    // The action with the unrecognised condition is skipped, the others run
    let alert = second.test_alert("build-time-critical").await.unwrap();
    let responses = second.responses_for(&alert.id).await;
    assert_eq!(responses[0].action_name, "clear-build-cache");
    assert_eq!(responses[0].status, ResponseStatus::Skipped);
    assert_eq!(responses[1].status, ResponseStatus::Completed);

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&state_path).unwrap()).unwrap();
    assert_eq!(saved["alerts"].as_array().unwrap().len(), 4);
    assert_eq!(
        saved["alertRules"][0]["responseActions"][0]["conditions"][0],
        "build takes too long"
    );
}

#[tokio::test]
async fn test_unreadable_state_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let state_dir = temp_dir.path().join("state");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(state_dir.join("alerting-state.json"), "{ not json").unwrap();

    let engine = engine_at(temp_dir.path());
    assert_eq!(engine.alert_rules().await.len(), 5);
    assert!(engine.alerts(&AlertFilter::default()).await.is_empty());
}

#[tokio::test]
async fn test_summary_matches_filters() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine_at(temp_dir.path());

    let a = engine.test_alert("build-time-critical").await.unwrap();
    let b = engine.test_alert("code-quality-low").await.unwrap();
    engine.test_alert("technical-debt-critical").await.unwrap();
    engine.resolve_alert(&a.id).await;
    engine.acknowledge_alert(&b.id).await;

    let summary = engine.alert_summary().await;
    let resolved = engine
        .alerts(&AlertFilter {
            resolved: Some(true),
            ..Default::default()
        })
        .await;
    let critical = engine
        .alerts(&AlertFilter {
            severity: Some(Severity::Critical),
            ..Default::default()
        })
        .await;

    assert_eq!(summary.total_alerts, 3);
    assert_eq!(summary.resolved_alerts, resolved.len());
    assert_eq!(summary.active_alerts, 3 - resolved.len());
    assert_eq!(summary.acknowledged_alerts, 1);
    assert_eq!(summary.alerts_by_severity[&Severity::Critical], critical.len());
    assert_eq!(summary.alerts_by_category[&AlertCategory::Quality], 2);
}
