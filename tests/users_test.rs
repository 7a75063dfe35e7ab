mod common;

use common::*;
use iped_salesforce::apis::{IpedClient, TrailService, UserService};
use iped_salesforce::common::error::IntegratorError;
use iped_salesforce::common::retry::RetryPolicy;
use iped_salesforce::common::types::{Tenancy, User, UserType};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn services(http: &Arc<ScriptedHttp>) -> (UserService, TrailService) {
    let client = IpedClient::new(http.clone(), config().iped);
    let retry = RetryPolicy::new(3, Duration::from_millis(1));
    (UserService::new(client.clone(), retry), TrailService::new(client))
}

fn profile(user_type: i64) -> serde_json::Value {
    json!({"STATE": 1, "PROFILE": {
        "user_cpf": "123.456.789-00",
        "user_email": "ana@example.com",
        "user_ranking": {"user_points": {"total": "42"}},
        "user_type": user_type
    }})
}

#[tokio::test]
async fn test_home_record_wins_over_branch() -> anyhow::Result<()> {
    let http = Arc::new(ScriptedHttp::new());
    http.push(USERS_URL, 200, json!({"STATE": 1, "USERS": [
        {"user_id": 1, "user_name": "Ana", "user_token": "t1"},
        {"user_id": 2, "user_name": "Bruno", "user_token": "t2"}
    ]}))
    .push(USERS_URL, 200, json!({"STATE": 1, "USERS": [
        {"user_id": 2, "user_name": "Bruno (filial)", "user_token": "t2b"},
        {"user_id": 3, "user_name": "Carla", "user_token": "t3"}
    ]}));

    let (users, _) = services(&http);
    let fetched = users.get_users_basic_info().await?;

    let calls = http.calls_to(USERS_URL);
    assert_eq!(form_value(&calls[0], "token"), Some("home-token"));
    assert_eq!(form_value(&calls[1], "token"), Some("branch-token"));
    assert_eq!(form_value(&calls[0], "api_version"), Some("2"));

    let ids: Vec<i64> = fetched.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(fetched[1].name, "Bruno");
    assert_eq!(fetched[1].tenancy, Tenancy::Home);
    assert_eq!(fetched[2].tenancy, Tenancy::Branch);
    Ok(())
}

#[tokio::test]
async fn test_user_listing_rejected_when_state_is_not_one() {
    let http = Arc::new(ScriptedHttp::new());
    http.push(USERS_URL, 200, json!({"STATE": "1", "USERS": []}));

    let (users, _) = services(&http);
    let err = users.get_users_basic_info().await.unwrap_err();
    assert!(matches!(err, IntegratorError::Response { .. }));
}

#[tokio::test]
async fn test_profile_retries_server_errors() -> anyhow::Result<()> {
    let http = Arc::new(ScriptedHttp::new());
    http.push_raw(PROFILE_URL, 502, "bad gateway")
        .push(PROFILE_URL, 200, profile(4));

    let (users, _) = services(&http);
    let mut ana = User::new(1, "Ana", "t1", Tenancy::Branch);
    users.get_user_full_info(&mut ana).await?;

    let calls = http.calls_to(PROFILE_URL);
    assert_eq!(calls.len(), 2);
    assert_eq!(form_value(&calls[0], "token"), Some("branch-token"));
    assert_eq!(form_value(&calls[0], "user_id"), Some("1"));
    assert_eq!(form_value(&calls[0], "user_token"), Some("t1"));

    assert_eq!(ana.user_type, Some(UserType::UnlimitedPlan));
    assert_eq!(ana.points, 42);
    assert_eq!(ana.cpf.as_deref(), Some("123.456.789-00"));
    Ok(())
}

#[tokio::test]
async fn test_profile_gives_up_after_max_attempts() {
    let http = Arc::new(ScriptedHttp::new());
    for _ in 0..3 {
        http.push_raw(PROFILE_URL, 503, "unavailable");
    }

    let (users, _) = services(&http);
    let mut ana = User::new(1, "Ana", "t1", Tenancy::Home);
    let err = users.get_user_full_info(&mut ana).await.unwrap_err();

    assert!(matches!(err, IntegratorError::Response { status: 503, .. }));
    assert_eq!(http.calls_to(PROFILE_URL).len(), 3);
    assert!(ana.user_type.is_none());
}

#[tokio::test]
async fn test_profile_rejection_is_not_retried() {
    let http = Arc::new(ScriptedHttp::new());
    http.push(PROFILE_URL, 200, json!({"STATE": 0}));

    let (users, _) = services(&http);
    let mut ana = User::new(1, "Ana", "t1", Tenancy::Home);
    assert!(users.get_user_full_info(&mut ana).await.is_err());
    assert_eq!(http.calls_to(PROFILE_URL).len(), 1);
}

#[tokio::test]
async fn test_trails_are_collected_in_order() -> anyhow::Result<()> {
    let http = Arc::new(ScriptedHttp::new());
    http.push(TRAILS_URL, 200, json!({"STATE": 1, "TRAILS": [
        {"trail_title": "Liderança"},
        {"trail_title": "Vendas"}
    ]}));

    let (_, trails) = services(&http);
    let mut ana = User::new(1, "Ana", "t1", Tenancy::Home);
    trails.get_user_trails(&mut ana).await?;
    assert_eq!(ana.trails, vec!["Liderança", "Vendas"]);
    Ok(())
}
