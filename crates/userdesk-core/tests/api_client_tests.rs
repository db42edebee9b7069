//! Integration tests for the reqwest transport and ApiClient

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use userdesk_core::api::{ApiClient, ApiError, ApiRequest, ReqwestTransport, Transport, TransportError};
use userdesk_core::auth::{
    ChannelNavigator, Credential, CredentialStore, GuardConfig, LoginRedirect, MemoryCredentialStore,
    SessionGuard, TokenPlacement,
};
use userdesk_core::models::{Role, UserUpdate};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestClient {
    client: ApiClient,
    store: Arc<MemoryCredentialStore>,
    redirects: tokio::sync::mpsc::UnboundedReceiver<LoginRedirect>,
}

fn client_for(server: &MockServer, credential: Option<Credential>, config: GuardConfig) -> TestClient {
    let transport = ReqwestTransport::new(&server.uri()).unwrap();
    let store = Arc::new(match credential {
        Some(c) => MemoryCredentialStore::with_credential(c),
        None => MemoryCredentialStore::new(),
    });
    let (navigator, redirects) = ChannelNavigator::channel();
    let guard = SessionGuard::new(Arc::new(transport), store.clone(), Arc::new(navigator), config);
    TestClient {
        client: ApiClient::new(guard),
        store,
        redirects,
    }
}

fn profile_body() -> serde_json::Value {
    json!({
        "status": 200,
        "message": "ok",
        "ourUsers": {"id": 7, "name": "Ana", "email": "ana@example.com", "city": "Lima", "role": "ADMIN"}
    })
}

fn api_error(err: &anyhow::Error) -> &ApiError {
    err.downcast_ref::<ApiError>().expect("ApiError inside")
}

#[tokio::test]
async fn test_login_stores_credential() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "ana@example.com", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "message": "Usuario autenticado con éxito",
            "token": "A1",
            "refreshToken": "R1",
            "expirationToken": "24h"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server, None, GuardConfig::default());
    assert!(!t.client.is_authenticated());

    let credential = t.client.login("ana@example.com", "secret").await.unwrap();
    assert_eq!(credential.access_token, "A1");
    assert_eq!(credential.refresh_token, "R1");
    assert_eq!(t.store.get().unwrap(), Some(credential));
    assert!(t.client.is_authenticated());

    t.client.logout().unwrap();
    assert!(!t.client.is_authenticated());
}

#[tokio::test]
async fn test_login_failure_reported_in_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": 401, "error": "Credenciales incorrectas"})),
        )
        .mount(&server)
        .await;

    let t = client_for(&server, None, GuardConfig::default());
    let err = t.client.login("ana@example.com", "wrong").await.unwrap_err();

    assert_eq!(api_error(&err), &ApiError::Unauthorized("Credenciales incorrectas".to_string()));
    assert_eq!(t.store.get().unwrap(), None);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_replayed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/adminuser/get-profile"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Token expirado"})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/adminuser/get-profile"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "R1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "token": "A2",
            "refreshToken": "R2",
            "expirationToken": "24h"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server, Some(Credential::new("A1", "R1", "24h")), GuardConfig::default());
    let user = t.client.profile().await.unwrap();

    assert_eq!(user.id, 7);
    assert!(user.is_admin());
    let stored = t.store.get().unwrap().unwrap();
    assert_eq!(stored.access_token, "A2");
    assert_eq!(stored.refresh_token, "R2");
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/adminuser/get-profile"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/admin/get-all-users"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "ourUsersList": [
                {"id": 1, "name": "Ana", "email": "ana@example.com", "role": "ADMIN"},
                {"id": 2, "name": "Luis", "email": "luis@example.com", "role": "USER"}
            ]
        })))
        .mount(&server)
        .await;

    // Slow refresh so both 401s land while it is in flight
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({"token": "A2", "refreshToken": "R2"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server, Some(Credential::new("A1", "R1", "")), GuardConfig::default());
    let (profile, users) = tokio::join!(t.client.profile(), t.client.all_users());

    assert_eq!(profile.unwrap().id, 7);
    let users = users.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].role, "USER");
}

#[tokio::test]
async fn test_failed_refresh_ends_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/adminuser/get-profile"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "refresh token expired"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut t = client_for(&server, Some(Credential::new("A1", "R1", "")), GuardConfig::default());
    let err = t.client.profile().await.unwrap_err();

    assert!(api_error(&err).is_session_expired());
    assert_eq!(t.store.get().unwrap(), None);

    let redirect = t.redirects.try_recv().unwrap();
    assert_eq!(redirect.return_to.as_deref(), Some("/adminuser/get-profile"));
    assert!(t.redirects.try_recv().is_err());
}

#[tokio::test]
async fn test_query_placement_sends_token_param() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/admin/get-users/7"))
        .and(query_param("token", "A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .expect(1)
        .mount(&server)
        .await;

    let config = GuardConfig {
        placement: TokenPlacement::Query {
            param: "token".to_string(),
        },
        ..GuardConfig::default()
    };
    let t = client_for(&server, Some(Credential::new("A1", "R1", "")), config);
    assert_eq!(t.client.user(7).await.unwrap().email, "ana@example.com");
}

#[tokio::test]
async fn test_server_error_message_extraction() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/admin/delete/9"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "No se pudo eliminar"})))
        .mount(&server)
        .await;

    let t = client_for(&server, Some(Credential::new("A1", "R1", "")), GuardConfig::default());
    let err = t.client.delete_user(9).await.unwrap_err();

    assert_eq!(
        api_error(&err),
        &ApiError::Server {
            status: 500,
            message: "No se pudo eliminar".to_string()
        }
    );
    // Non-401 failures leave the session alone
    assert!(t.store.get().unwrap().is_some());
}

#[tokio::test]
async fn test_update_sends_only_set_fields() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/admin/update/7"))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({"city": "Cusco", "role": "USER"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "ourUsers": {"id": 7, "name": "Ana", "email": "ana@example.com", "city": "Cusco", "role": "USER"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server, Some(Credential::new("A1", "R1", "")), GuardConfig::default());
    let update = UserUpdate {
        city: Some("Cusco".to_string()),
        role: Some(Role::User),
        ..UserUpdate::default()
    };
    let user = t.client.update_user(7, &update).await.unwrap();
    assert_eq!(user.city.as_deref(), Some("Cusco"));
    assert!(!user.is_admin());
}

#[tokio::test]
async fn test_update_own_profile_uses_profile_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/adminuser/get-profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/admin/update/7"))
        .and(body_json(json!({"name": "Ana María"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "ourUsers": {"id": 7, "name": "Ana María", "email": "ana@example.com", "role": "ADMIN"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server, Some(Credential::new("A1", "R1", "")), GuardConfig::default());
    let update = UserUpdate {
        name: Some("Ana María".to_string()),
        ..UserUpdate::default()
    };
    assert_eq!(t.client.update_own_profile(&update).await.unwrap().name, "Ana María");
}

#[tokio::test]
async fn test_transport_maps_missing_response_to_network_error() {
    // Nothing listens on port 1
    let transport = ReqwestTransport::with_timeout("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let err = transport.send(&ApiRequest::get("/health")).await.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_transport_returns_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/admin/get-all-users"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&server.uri()).unwrap();
    let err = transport.send(&ApiRequest::get("/admin/get-all-users")).await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Status {
            status: reqwest::StatusCode::FORBIDDEN,
            body: "Forbidden".to_string()
        }
    );
}
