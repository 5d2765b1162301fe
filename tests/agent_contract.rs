//! Contract tests for the `/chat` backend exchange: the exact request shape
//! the backend sees, and how replies (including error replies) parse.

use agentive::agent::{AgentClient, Turn};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn request_carries_the_message_and_prior_history() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_partial_json(json!({
            "user_message": "Find me a phone",
            "history": [
                {"role": "assistant", "content": "Hello!"},
                {"role": "user", "content": "hi"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "Sure"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = AgentClient::new(&format!("{}/chat", server.uri()));
    let history = vec![Turn::assistant("Hello!"), Turn::user("hi")];
    let reply = client.chat("Find me a phone", &history).await.unwrap();

    assert_eq!(reply.text, "Sure");
}

#[tokio::test]
async fn products_and_deals_ride_along_with_the_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "Two options and a bundle",
            "audio_url": "https://cdn.example.com/reply.wav",
            "products": [
                {"ID": 1, "Model Name": "CoolBreeze", "Company Name": "AirFlow", "Capacity": 0, "Max Price": 1999},
                {"ID": "p-2", "Model Name": "WindMax", "Capacity": 64}
            ],
            "special_deal": {
                "heading": "Bundle offer",
                "deal_price": 2499.0,
                "products_involved": [{"ID": 1, "Model Name": "CoolBreeze"}]
            }
        })))
        .mount(&server)
        .await;

    let client = AgentClient::new(&format!("{}/chat", server.uri()));
    let reply = client.chat("anything cheap?", &[]).await.unwrap();

    assert_eq!(reply.audio_url.as_deref(), Some("https://cdn.example.com/reply.wav"));
    assert_eq!(reply.products.len(), 2);
    assert_eq!(reply.products[0].id.as_deref(), Some("1"));
    assert_eq!(reply.products[1].id.as_deref(), Some("p-2"));
    assert_eq!(reply.products[1].price(), 0);

    let deal = reply.special_deal.unwrap();
    assert_eq!(deal.heading, "Bundle offer");
    assert_eq!(deal.products_involved.len(), 1);
}

#[tokio::test]
async fn server_errors_surface_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("agent exploded"))
        .mount(&server)
        .await;

    let client = AgentClient::new(&format!("{}/chat", server.uri()));
    let err = client.chat("hello", &[]).await.unwrap_err();

    let text = err.to_string();
    assert!(text.contains("500"), "missing status in: {text}");
    assert!(text.contains("agent exploded"), "missing body in: {text}");
}

#[tokio::test]
async fn a_malformed_reply_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = AgentClient::new(&format!("{}/chat", server.uri()));
    assert!(client.chat("hello", &[]).await.is_err());
}
