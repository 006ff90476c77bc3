// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the HTTP transport using wiremock.

use std::time::Duration;

use resin_logs::protocol::{ApiConfig, ApiRequest, HttpClient, Transport};
use resin_logs::{Error, Logs, ProtocolError, SubscribeOutcome, SubscriptionState};
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn logs_for(server: &MockServer) -> Logs<HttpClient> {
    Logs::from_config(ApiConfig::new(server.uri()).with_token(TOKEN)).unwrap()
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("channel closed")
}

// ============================================================================
// Transport Tests
// ============================================================================

mod transport {
    use super::*;

    #[tokio::test]
    async fn sends_bearer_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/device/v2/abc/logs"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ApiConfig::new(mock_server.uri())
            .with_token(TOKEN)
            .into_client()
            .unwrap();

        let response = client
            .request(&ApiRequest::get("/device/v2/abc/logs"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn returns_non_success_response_as_is() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&mock_server)
            .await;

        let client = ApiConfig::new(mock_server.uri()).into_client().unwrap();

        let response = client
            .request(&ApiRequest::get("/device/v2/abc/logs"))
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn streaming_request_yields_lines() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("stream", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("one\ntwo\n"))
            .mount(&mock_server)
            .await;

        let client = ApiConfig::new(mock_server.uri()).into_client().unwrap();
        let request = ApiRequest::get("/device/v2/abc/logs")
            .with_query("stream=1")
            .streaming();

        let mut lines = client.request(&request).await.unwrap().into_lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "one");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "two");
        assert!(lines.next_line().await.is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        // Nothing listens on port 9 locally.
        let client = ApiConfig::new("http://127.0.0.1:9")
            .with_connect_timeout(Duration::from_millis(500))
            .into_client()
            .unwrap();

        let result = client.request(&ApiRequest::get("/device/v2/abc/logs")).await;
        assert!(matches!(result, Err(ProtocolError::Http(_))));
    }
}

// ============================================================================
// History Tests
// ============================================================================

mod history {
    use super::*;

    #[tokio::test]
    async fn history_with_count() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/device/v2/dev1/logs"))
            .and(query_param("count", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"message": "first", "timestamp": 1},
                {"message": "second", "timestamp": 2}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let history = logs.history("dev1", Some(5)).await.unwrap();

        assert_eq!(history.as_array().map(Vec::len), Some(2));
        assert_eq!(history[0]["message"], "first");
    }

    #[tokio::test]
    async fn history_without_count() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/device/v2/dev1/logs"))
            .and(query_param_is_missing("count"))
            .and(query_param_is_missing("stream"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let history = logs.history("dev1", None).await.unwrap();

        assert_eq!(history, serde_json::json!([]));
    }

    #[tokio::test]
    async fn history_entries_decodes_records() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/device/v2/dev1/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"message": "Supervisor starting", "isSystem": true, "createdAt": 1_700_000_000_000_u64},
                {"message": "app ready", "serviceId": 42, "isStdErr": false}
            ])))
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let entries = logs.history_entries("dev1", Some(2)).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].is_system, Some(true));
        assert_eq!(entries[0].created_at, Some(1_700_000_000_000));
        assert_eq!(entries[1].service_id, Some(42));
    }

    #[tokio::test]
    async fn history_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Device not found"))
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let err = logs.history("missing", None).await.unwrap_err();

        match err {
            Error::Protocol(ProtocolError::Api { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "Device not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn history_unauthorized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let result = logs.history("dev1", Some(1)).await;

        match result {
            Err(Error::Protocol(ProtocolError::AuthenticationFailed { body })) => {
                assert_eq!(body, "Unauthorized");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn history_invalid_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let result = logs.history("dev1", None).await;

        assert!(matches!(result, Err(Error::Parse(_))));
    }
}

// ============================================================================
// Subscription Tests
// ============================================================================

mod subscribe {
    use super::*;

    fn collecting() -> (
        impl Fn(serde_json::Value) + Send + Sync + 'static,
        mpsc::UnboundedReceiver<serde_json::Value>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |record| {
                let _ = tx.send(record);
            },
            rx,
        )
    }

    #[tokio::test]
    async fn subscribe_delivers_records_skipping_blank_lines() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/device/v2/dev1/logs"))
            .and(query_param("stream", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"message\":\"a\"}\n\n{\"message\":\"b\"}\n"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let (callback, mut rx) = collecting();

        let outcome = logs.subscribe("dev1", callback).await.unwrap();
        assert_eq!(outcome, SubscribeOutcome::Subscribed);

        assert_eq!(recv(&mut rx).await, serde_json::json!({"message": "a"}));
        assert_eq!(recv(&mut rx).await, serde_json::json!({"message": "b"}));
        for _ in 0..200 {
            if logs.subscription_state("dev1") == Some(SubscriptionState::Stopped) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            logs.subscription_state("dev1"),
            Some(SubscriptionState::Stopped)
        );
        assert!(rx.try_recv().is_err());
        assert!(logs.is_subscribed("dev1"));
        assert!(logs.unsubscribe("dev1"));
    }

    #[tokio::test]
    async fn subscribe_twice_keeps_single_subscription() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("stream", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"n\":1}\n"))
            .expect(2)
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let (first_cb, mut first_rx) = collecting();
        let (second_cb, mut second_rx) = collecting();

        let first = logs.subscribe("dev1", first_cb).await.unwrap();
        let second = logs.subscribe("dev1", second_cb).await.unwrap();

        assert_eq!(first, SubscribeOutcome::Subscribed);
        assert_eq!(second, SubscribeOutcome::AlreadySubscribed);
        assert_eq!(logs.len(), 1);

        assert_eq!(recv(&mut first_rx).await, serde_json::json!({"n": 1}));
        // The second callback was dropped without ever being called.
        assert!(second_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_failure_is_returned_to_caller() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Device not found"))
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let (callback, _rx) = collecting();

        let result = logs.subscribe("missing", callback).await;

        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::Api { status: 404, .. }))
        ));
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn malformed_record_reaches_error_callback() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("stream", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("{\"message\":\"ok\"}\nnot json\n"),
            )
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let (callback, mut rx) = collecting();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();

        logs.subscribe_with_errors("dev1", callback, move |err| {
            let _ = err_tx.send(err);
        })
        .await
        .unwrap();

        assert_eq!(recv(&mut rx).await, serde_json::json!({"message": "ok"}));
        assert!(matches!(recv(&mut err_rx).await, Error::Parse(_)));
    }

    #[tokio::test]
    async fn unsubscribe_all_then_unsubscribe_is_noop() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("stream", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&mock_server)
            .await;

        let logs = logs_for(&mock_server);
        let (cb1, _rx1) = collecting();
        let (cb2, _rx2) = collecting();
        logs.subscribe("dev1", cb1).await.unwrap();
        logs.subscribe("dev2", cb2).await.unwrap();

        assert_eq!(logs.unsubscribe_all(), 2);
        assert!(logs.is_empty());
        assert!(!logs.unsubscribe("dev1"));
        assert_eq!(logs.unsubscribe_all(), 0);
    }
}
