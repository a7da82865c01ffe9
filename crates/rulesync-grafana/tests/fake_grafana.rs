//! End-to-end reconciliation against an in-process fake Grafana.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use rulesync_core::{
    ContactPoint, DesiredAlertRow, IdentityLabels, ReconcileConfig, ReconcileError, Reconciler,
    RuleStore, RuleType, ServicePolicy, ThresholdOp, sync_contact_points,
    sync_notification_policies,
};
use rulesync_grafana::{GrafanaClient, GrafanaConfig};
use serde_json::{Value, json};

const AUTH: &str = "Basic YWRtaW46c2VjcmV0";

#[derive(Default)]
struct Fake {
    folders: Vec<(String, String)>,
    groups: BTreeMap<(String, String), Value>,
    alertmanager: Value,
    requests: Vec<String>,
    fail_writes: bool,
}

type Shared = Arc<Mutex<Fake>>;

fn authorized(headers: &HeaderMap) -> Result<(), StatusCode> {
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value == AUTH => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn list_folders(
    State(s): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    let fake = s.lock();
    let folders: Vec<Value> = fake
        .folders
        .iter()
        .map(|(uid, title)| json!({"uid": uid, "title": title}))
        .collect();
    Ok(Json(Value::Array(folders)))
}

async fn create_folder(
    State(s): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    let mut fake = s.lock();
    let title = body["title"].as_str().unwrap_or_default().to_string();
    let uid = format!("f{}", fake.folders.len() + 1);
    fake.folders.push((uid.clone(), title.clone()));
    fake.requests.push(format!("POST folder {title}"));
    Ok(Json(json!({"uid": uid, "title": title})))
}

async fn list_groups(
    State(s): State<Shared>,
    headers: HeaderMap,
    Path(folder): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    let fake = s.lock();
    let title = fake
        .folders
        .iter()
        .find(|(uid, _)| *uid == folder)
        .map(|(_, t)| t.clone())
        .ok_or(StatusCode::NOT_FOUND)?;
    let groups: Vec<Value> = fake
        .groups
        .iter()
        .filter(|((f, _), _)| *f == folder)
        .map(|(_, g)| g.clone())
        .collect();
    let mut by_folder = serde_json::Map::new();
    by_folder.insert(title, Value::Array(groups));
    Ok(Json(Value::Object(by_folder)))
}

async fn write_group(
    State(s): State<Shared>,
    headers: HeaderMap,
    Path(folder): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<StatusCode, StatusCode> {
    authorized(&headers)?;
    let mut fake = s.lock();
    if fake.fail_writes {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    if let Some(rules) = body["rules"].as_array_mut() {
        for (idx, rule) in rules.iter_mut().enumerate() {
            if rule["grafana_alert"]["uid"].is_null() {
                rule["grafana_alert"]["uid"] = json!(format!("{name}-{idx}"));
            }
        }
    }
    fake.requests.push(format!("POST group {name}"));
    fake.groups.insert((folder, name), body);
    Ok(StatusCode::ACCEPTED)
}

async fn get_group(
    State(s): State<Shared>,
    headers: HeaderMap,
    Path((folder, name)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    let fake = s.lock();
    fake.groups
        .get(&(folder, name))
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_group(
    State(s): State<Shared>,
    headers: HeaderMap,
    Path((folder, name)): Path<(String, String)>,
) -> Result<StatusCode, StatusCode> {
    authorized(&headers)?;
    let mut fake = s.lock();
    fake.requests.push(format!("DELETE group {name}"));
    fake.groups
        .remove(&(folder, name))
        .map(|_| StatusCode::ACCEPTED)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn datasources(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    Ok(Json(json!([
        {"uid": "prom-1", "name": "Prometheus"},
        {"uid": "kf-1", "name": "KfuseDatasource"},
    ])))
}

async fn get_alertmanager(
    State(s): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    Ok(Json(s.lock().alertmanager.clone()))
}

async fn post_alertmanager(
    State(s): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<StatusCode, StatusCode> {
    authorized(&headers)?;
    let mut fake = s.lock();
    fake.requests.push("POST alertmanager".to_string());
    fake.alertmanager = body;
    Ok(StatusCode::ACCEPTED)
}

async fn start(fake: Fake) -> (String, Shared) {
    let state = Arc::new(Mutex::new(fake));
    let app = Router::new()
        .route("/grafana/api/folders", get(list_folders).post(create_folder))
        .route(
            "/grafana/api/ruler/grafana/api/v1/rules/{folder}",
            get(list_groups).post(write_group),
        )
        .route(
            "/grafana/api/ruler/grafana/api/v1/rules/{folder}/{group}",
            get(get_group).delete(delete_group),
        )
        .route("/grafana/api/datasources", get(datasources))
        .route(
            "/grafana/api/alertmanager/grafana/config/api/v1/alerts",
            get(get_alertmanager).post(post_alertmanager),
        )
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}/grafana"), state)
}

fn client(address: &str, password: &str) -> GrafanaClient {
    let config = GrafanaConfig::new(address)
        .expect("config")
        .with_credentials("admin", password);
    GrafanaClient::new(config).expect("client")
}

fn checkout_row(threshold: &str) -> DesiredAlertRow {
    DesiredAlertRow::new(
        RuleType::HttpRequests,
        "checkout",
        IdentityLabels::parse("region=us-east;kube_namespace=prod").expect("labels"),
        ThresholdOp::GreaterThan,
        threshold.parse().expect("threshold"),
    )
    .with_channel("slack-oncall")
}

#[tokio::test]
async fn full_reconcile_creates_then_converges() {
    let (address, state) = start(Fake::default()).await;
    let client = client(&address, "secret");
    let reconciler = Reconciler::new(&client, ReconcileConfig::default()).expect("config");

    let (_, report) = reconciler.sync(&[checkout_row("100")]).await.expect("sync");
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.created.len(), 1);
    let group = report.created[0].clone();
    assert!(group.starts_with("checkout_") && group.ends_with("_group_1m_1"));

    {
        let fake = state.lock();
        assert_eq!(
            fake.requests,
            vec![
                "POST folder apm_services_alerts".to_string(),
                format!("POST group {group}"),
            ]
        );
        let stored = fake.groups.values().next().expect("stored group");
        let rule = &stored["rules"][0];
        assert_eq!(rule["grafana_alert"]["data"][0]["datasourceUid"], "kf-1");
        assert_eq!(rule["labels"]["slack-oncall"], "true");
    }

    let plan = reconciler.plan(&[checkout_row("100")]).await.expect("plan");
    assert!(plan.diff.is_empty());
}

#[tokio::test]
async fn changed_threshold_replaces_rule_and_keeps_foreign_rules() {
    let (address, state) = start(Fake::default()).await;
    let client = client(&address, "secret");
    let reconciler = Reconciler::new(&client, ReconcileConfig::default()).expect("config");
    let (_, first) = reconciler.sync(&[checkout_row("100")]).await.expect("sync");
    let group = first.created[0].clone();

    {
        let mut fake = state.lock();
        let stored = fake.groups.values_mut().next().expect("stored group");
        if let Some(rules) = stored["rules"].as_array_mut() {
            rules.insert(0, json!({"grafana_alert": {"uid": "manual", "title": "hand made"}}));
        }
    }

    let (_, second) = reconciler.sync(&[checkout_row("250")]).await.expect("sync");
    assert_eq!(second.updated, vec![group]);

    let fake = state.lock();
    let stored = fake.groups.values().next().expect("stored group");
    let rules = stored["rules"].as_array().expect("rules");
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0]["grafana_alert"]["uid"], "manual");
    assert_eq!(
        rules[1]["grafana_alert"]["data"][2]["model"]["expression"],
        "$B > 250"
    );
}

#[tokio::test]
async fn orphan_groups_are_deleted() {
    let mut fake = Fake::default();
    fake.folders.push(("f1".to_string(), "apm_services_alerts".to_string()));
    fake.groups.insert(
        ("f1".to_string(), "orphan_0123456789abcdef_group_1m_1".to_string()),
        json!({"name": "orphan_0123456789abcdef_group_1m_1", "interval": "1m", "rules": []}),
    );
    let (address, state) = start(fake).await;
    let client = client(&address, "secret");
    let reconciler = Reconciler::new(&client, ReconcileConfig::default()).expect("config");

    let (_, report) = reconciler.sync(&[checkout_row("100")]).await.expect("sync");
    assert_eq!(report.deleted, vec!["orphan_0123456789abcdef_group_1m_1"]);
    assert_eq!(report.created.len(), 1);
    let fake = state.lock();
    assert!(
        fake.requests
            .iter()
            .all(|r| !r.starts_with("POST group orphan_"))
    );
}

#[tokio::test]
async fn server_errors_are_reported_per_group() {
    let (address, state) = start(Fake::default()).await;
    state.lock().fail_writes = true;
    let client = client(&address, "secret");
    let reconciler = Reconciler::new(&client, ReconcileConfig::default()).expect("config");

    let (_, report) = reconciler.sync(&[checkout_row("100")]).await.expect("sync");
    assert!(!report.is_success());
    assert!(report.aborted.is_none());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("http 500"));
}

#[tokio::test]
async fn bad_credentials_abort_before_any_write() {
    let (address, state) = start(Fake::default()).await;
    let client = client(&address, "wrong");
    let reconciler = Reconciler::new(&client, ReconcileConfig::default()).expect("config");

    let err = reconciler.sync(&[checkout_row("100")]).await.unwrap_err();
    assert!(matches!(err, ReconcileError::RemoteState { .. }));
    assert!(err.to_string().contains("http 401"));
    assert!(state.lock().requests.is_empty());
}

#[tokio::test]
async fn unknown_datasource_is_configuration_error() {
    let (address, _state) = start(Fake::default()).await;
    let client = client(&address, "secret");
    let config = ReconcileConfig::default().with_datasource("Missing");
    let reconciler = Reconciler::new(&client, config).expect("config");

    let err = reconciler.plan(&[checkout_row("100")]).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Configuration { .. }));
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let client = client("http://127.0.0.1:1", "secret");
    let err = client.find_folder("apm_services_alerts").await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn contact_points_replace_managed_receivers() {
    let fake = Fake {
        alertmanager: json!({
            "alertmanager_config": {
                "receivers": [
                    {"name": "default"},
                    {"name": "stale__kfuse_script_managed"},
                ],
            },
        }),
        ..Fake::default()
    };
    let (address, state) = start(fake).await;
    let client = client(&address, "secret");
    let point = ContactPoint {
        kind: "slack".to_string(),
        name: "oncall".to_string(),
        receiver: "https://hooks.example/x".to_string(),
        title_template: String::new(),
        body_template: String::new(),
    };

    let report = sync_contact_points(&client, &[point]).await.expect("sync");
    assert_eq!(report.kept, 1);

    let fake = state.lock();
    let names: Vec<&str> = fake.alertmanager["alertmanager_config"]["receivers"]
        .as_array()
        .expect("receivers")
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert_eq!(names, vec!["default", "oncall__kfuse_script_managed"]);
}

#[tokio::test]
async fn notification_policies_route_to_managed_receivers() {
    let fake = Fake {
        alertmanager: json!({
            "alertmanager_config": {
                "receivers": [{"name": "default"}, {"name": "oncall__kfuse_script_managed"}],
                "route": {
                    "receiver": "default",
                    "routes": [
                        {"receiver": "stale__kfuse_script_managed"},
                        {"receiver": "team-ui"},
                    ],
                },
            },
        }),
        ..Fake::default()
    };
    let (address, state) = start(fake).await;
    let client = client(&address, "secret");
    let policy = ServicePolicy {
        service: "checkout".to_string(),
        channels: vec!["oncall".to_string()],
        span_names: Vec::new(),
    };

    let report = sync_notification_policies(&client, &[policy], false)
        .await
        .expect("sync");
    assert_eq!(report.kept, 1);

    let fake = state.lock();
    let receivers: Vec<&str> = fake.alertmanager["alertmanager_config"]["route"]["routes"]
        .as_array()
        .expect("routes")
        .iter()
        .filter_map(|r| r["receiver"].as_str())
        .collect();
    assert_eq!(receivers, vec!["oncall__kfuse_script_managed", "team-ui"]);
    assert_eq!(fake.requests.last().map(String::as_str), Some("POST alertmanager"));
}
