use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::helpers::{error_reason, FaultyStore, TestApp};

#[tokio::test]
async fn users_empty_store_returns_empty_list() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app.get_users().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body, json!([]));

    Ok(())
}

#[tokio::test]
async fn users_lists_every_stored_record() -> Result<()> {
    let app = TestApp::spawn().await?;

    let subscriptions = [
        json!({
            "user_id": "u1",
            "location": "NYC",
            "notification_method": ["email"],
            "email_id": "a@b.com"
        }),
        json!({
            "user_id": "u2",
            "location": "LA",
            "notification_method": ["SMS", "email"],
            "phone_number": "+15550100",
            "preferred_units": "Fahrenheit"
        }),
    ];
    for subscription in &subscriptions {
        let res = app.post_subscribe(subscription).await?;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = app.get_users().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let mut users: Vec<Value> = res.json().await?;
    users.sort_by(|a, b| a["user_id"].as_str().cmp(&b["user_id"].as_str()));

    assert_eq!(
        users,
        vec![
            json!({
                "user_id": "u1",
                "email_id": "a@b.com",
                "phone_number": null,
                "location": "NYC",
                "notification_method": ["email"],
                "preferred_units": "Celsius"
            }),
            json!({
                "user_id": "u2",
                "email_id": null,
                "phone_number": "+15550100",
                "location": "LA",
                "notification_method": ["SMS", "email"],
                "preferred_units": "Fahrenheit"
            }),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn users_repeated_calls_return_the_same_records() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.post_subscribe(&json!({
        "user_id": "u1",
        "location": "NYC",
        "notification_method": ["email"],
        "email_id": "a@b.com"
    }))
    .await?;

    let first: Vec<Value> = app.get_users().await?.json().await?;
    let second: Vec<Value> = app.get_users().await?.json().await?;

    assert_eq!(first.len(), 1);
    assert_eq!(first, second);

    Ok(())
}

#[tokio::test]
async fn users_store_failure_returns_500() -> Result<()> {
    let app = TestApp::spawn_with(FaultyStore {
        fail_list: true,
        ..Default::default()
    })
    .await?;

    let res = app.get_users().await?;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_reason(res).await?, "Service Error!");

    Ok(())
}
