mod common;

use anyhow::Result;
use chamahub::app::routes::APPS;
use reqwest::Method;
use serde_json::{json, Value};

#[tokio::test]
async fn test_every_app_index_answers_on_both_prefixes() -> Result<()> {
    let server = common::spawn().await?;

    for app in APPS {
        let versioned = server
            .client
            .get(server.url(&format!("/api/v1/{}", app.name)))
            .send()
            .await?;
        let legacy = server
            .client
            .get(server.url(&format!("/{}/", app.name)))
            .send()
            .await?;

        assert_eq!(versioned.status(), 200, "/api/v1/{}", app.name);
        assert_eq!(legacy.status(), 200, "/{}/", app.name);

        let a: Value = versioned.json().await?;
        let b: Value = legacy.json().await?;
        assert_eq!(a, b, "index bodies differ for {}", app.name);
        assert_eq!(a["app"], app.name);
    }
    Ok(())
}

#[tokio::test]
async fn test_every_app_resource_resolves_on_both_prefixes() -> Result<()> {
    let server = common::spawn().await?;
    let (_, token) = server.user("wanjiku", "0712000001").await?;

    let group: Value = server
        .post(
            "/api/v1/groups/groups",
            &token,
            json!({
                "name": "Umoja Savers",
                "group_type": "savings",
                "contribution_amount": 100_000,
                "contribution_frequency": "monthly"
            }),
        )
        .await?
        .json()
        .await?;
    let gid = group["id"].as_str().unwrap().to_string();

    let cases: Vec<(Method, String, Option<Value>)> = vec![
        (Method::GET, "/accounts/me".into(), None),
        (Method::GET, "/groups/groups".into(), None),
        (Method::GET, "/finance/contributions".into(), None),
        (Method::GET, "/governance/proposals".into(), None),
        (Method::GET, format!("/investments/investments?group={}", gid), None),
        (Method::GET, "/mpesa/transactions".into(), None),
        (Method::GET, format!("/wealth-engine/groups/{}/portfolio", gid), None),
        (Method::GET, "/credit-scoring/score".into(), None),
        (Method::GET, format!("/analytics/groups/{}", gid), None),
        (Method::GET, format!("/reports/groups/{}/statement", gid), None),
        (Method::GET, "/audit/logs".into(), None),
        (Method::GET, "/kyc/documents".into(), None),
        (
            Method::POST,
            "/ai-assistant/ask".into(),
            Some(json!({ "question": "What is my wallet balance?" })),
        ),
        (Method::GET, "/automation/notifications".into(), None),
        (Method::GET, "/mobile-sync/changes".into(), None),
        (Method::GET, "/api-gateway/version".into(), None),
        (Method::GET, "/gamification/profile".into(), None),
        (Method::GET, "/education/lessons".into(), None),
    ];
    // every app appears exactly once
    assert_eq!(cases.len(), APPS.len());

    for (method, path, body) in cases {
        for prefix in ["/api/v1", ""] {
            let mut request = server
                .client
                .request(method.clone(), server.url(&format!("{}{}", prefix, path)))
                .bearer_auth(&token);
            if let Some(body) = &body {
                request = request.json(body);
            }
            let status = request.send().await?.status();
            assert_eq!(status, 200, "{} {}{}", method, prefix, path);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_trailing_slash_and_unknown_paths() -> Result<()> {
    let server = common::spawn().await?;
    let (_, token) = server.user("otieno", "0712000002").await?;

    for path in ["/api/v1/groups/groups/", "/groups/groups/", "/health/"] {
        let status = server.get(path, &token).await?.status();
        assert_eq!(status, 200, "{}", path);
    }

    let missing = server.get("/api/v1/no-such-app", &token).await?;
    assert_eq!(missing.status(), 404);
    Ok(())
}

#[tokio::test]
async fn test_protected_endpoints_require_token() -> Result<()> {
    let server = common::spawn().await?;

    for path in ["/api/v1/accounts/me", "/finance/loans", "/api-gateway/routes"] {
        let response = server.client.get(server.url(path)).send().await?;
        assert_eq!(response.status(), 401, "{}", path);
        let body: Value = response.json().await?;
        assert_eq!(body["code"], "not_authenticated");
    }
    Ok(())
}
