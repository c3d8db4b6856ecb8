use std::sync::Arc;

use anyhow::Result;
use graphmail::{
    Attachment, ConnectionProbe, Endpoints, ErrorKind, GraphDelivery, GraphMailConfig, Mailbox,
    OutgoingMessage, SettingsOverrides, TokenManager,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEND_PATH: &str = "/v1.0/users/noreply%40example.com/sendMail";

fn config(server: &MockServer, tenant_id: &str) -> GraphMailConfig {
    GraphMailConfig {
        tenant_id: tenant_id.to_string(),
        client_id: "client-a".to_string(),
        client_secret: "secret-a".to_string(),
        sender_email: "noreply@example.com".to_string(),
        sender_name: Some("Notifications".to_string()),
        save_to_sent_items: true,
        endpoints: Endpoints {
            login_base: server.uri(),
            graph_base: format!("{}/v1.0", server.uri()),
        },
    }
}

fn report_message() -> OutgoingMessage {
    OutgoingMessage {
        subject: Some("Build report".to_string()),
        html_body: Some("<h1>green</h1>".to_string()),
        to: vec![
            Mailbox::new("one@example.com"),
            Mailbox::named("two@example.com", "Two"),
        ],
        attachments: vec![Attachment {
            filename: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
            bytes: b"hi".to_vec(),
        }],
        ..OutgoingMessage::default()
    }
}

async fn mount_token(server: &MockServer, tenant_id: &str, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/{tenant_id}/oauth2/v2.0/token")))
        .and(body_string_contains("client_id=client-a"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": token, "expires_in": 3600})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn html_message_is_sent_with_graph_payload() -> Result<()> {
    let server = MockServer::start().await;
    mount_token(&server, "tenant-a", "tok-a", 1).await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer tok-a"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "message": {
                "subject": "Build report",
                "body": {"contentType": "HTML", "content": "<h1>green</h1>"},
                "toRecipients": [
                    {"emailAddress": {"address": "one@example.com"}},
                    {"emailAddress": {"address": "two@example.com", "name": "Two"}}
                ],
                "ccRecipients": [],
                "attachments": [{
                    "@odata.type": "#microsoft.graph.fileAttachment",
                    "name": "a.txt",
                    "contentType": "text/plain",
                    "contentBytes": "aGk="
                }]
            },
            "saveToSentItems": true
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let delivery = GraphDelivery::new(config(&server, "tenant-a"), Arc::new(TokenManager::new().expect("build token manager")));
    delivery
        .deliver(&report_message(), &SettingsOverrides::default())
        .await?;
    Ok(())
}

#[tokio::test]
async fn unauthorized_send_evicts_token_so_next_attempt_refetches() -> Result<()> {
    let server = MockServer::start().await;
    mount_token(&server, "tenant-a", "tok-a", 2).await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "InvalidAuthenticationToken", "message": "Access token has expired."}
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(TokenManager::new().expect("build token manager"));
    let delivery = GraphDelivery::new(config(&server, "tenant-a"), Arc::clone(&tokens));

    let error = delivery
        .deliver(&report_message(), &SettingsOverrides::default())
        .await
        .expect_err("401 must fail the send");
    assert_eq!(error.kind(), ErrorKind::Authentication);
    assert!(error.to_string().contains("Access token has expired."));
    assert_eq!(tokens.cached_entries().await, 0);

    delivery
        .deliver(&report_message(), &SettingsOverrides::default())
        .await?;
    Ok(())
}

#[tokio::test]
async fn tenants_sharing_a_manager_get_their_own_tokens() -> Result<()> {
    let server = MockServer::start().await;
    mount_token(&server, "tenant-a", "tok-a", 1).await;
    mount_token(&server, "tenant-b", "tok-b", 1).await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer tok-a"))
        .respond_with(ResponseTemplate::new(202))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer tok-b"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(TokenManager::new().expect("build token manager"));
    let delivery = GraphDelivery::new(config(&server, "tenant-a"), Arc::clone(&tokens));
    let other_tenant = SettingsOverrides {
        tenant_id: Some("tenant-b".to_string()),
        ..SettingsOverrides::default()
    };

    delivery
        .deliver(&report_message(), &SettingsOverrides::default())
        .await?;
    delivery.deliver(&report_message(), &other_tenant).await?;
    delivery
        .deliver(&report_message(), &SettingsOverrides::default())
        .await?;
    assert_eq!(tokens.cached_entries().await, 2);
    Ok(())
}

#[tokio::test]
async fn concurrent_senders_trigger_a_single_token_exchange() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-a/oauth2/v2.0/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok-a", "expires_in": 3600}))
                .set_delay(std::time::Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer tok-a"))
        .respond_with(ResponseTemplate::new(202))
        .expect(4)
        .mount(&server)
        .await;

    let delivery = Arc::new(GraphDelivery::new(
        config(&server, "tenant-a"),
        Arc::new(TokenManager::new().expect("build token manager")),
    ));
    let handles = (0..4)
        .map(|_| {
            let delivery = Arc::clone(&delivery);
            tokio::spawn(async move {
                delivery
                    .deliver(&report_message(), &SettingsOverrides::default())
                    .await
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        handle.await??;
    }
    Ok(())
}

#[tokio::test]
async fn probe_and_delivery_share_the_cached_token() -> Result<()> {
    let server = MockServer::start().await;
    mount_token(&server, "tenant-a", "tok-a", 1).await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(TokenManager::new().expect("build token manager"));
    let config = config(&server, "tenant-a");

    let result = ConnectionProbe::new(Arc::clone(&tokens)).probe(&config).await;
    assert!(result.success, "probe failed: {:?}", result.error);

    GraphDelivery::new(config, tokens)
        .deliver(
            &OutgoingMessage::test_message(Mailbox::new("admin@example.com")),
            &SettingsOverrides::default(),
        )
        .await?;
    Ok(())
}
