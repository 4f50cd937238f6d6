//! Integration tests for the Keystone password flow: token issuance,
//! caching, refresh, and the service catalog coming back from the token
//! response. All identity traffic runs against a wiremock server.

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ostack::{Cloud, CloudConfig, Error, QueryParams};

/// A password-auth config pointed at the mock identity service.
fn password_config(server: &MockServer) -> CloudConfig {
    let mut config = CloudConfig::default();
    config.auth.auth_url = Some(server.uri());
    config.auth.username = Some("demo".to_string());
    config.auth.password = Some("secret".to_string());
    config.auth.project_name = Some("demo-project".to_string());
    config.auth.user_domain_name = Some("Default".to_string());
    config.auth.project_domain_name = Some("Default".to_string());
    config.region_name = Some("RegionOne".to_string());
    config
}

/// A token response body whose catalog points compute at the mock server.
fn token_body(server: &MockServer) -> serde_json::Value {
    json!({
        "token": {
            "expires_at": (Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
            "catalog": [
                {
                    "type": "compute",
                    "endpoints": [
                        {
                            "interface": "public",
                            "region": "RegionOne",
                            "url": format!("{}/v2.1", server.uri()),
                        },
                        {
                            "interface": "internal",
                            "region": "RegionOne",
                            "url": "http://internal.invalid/v2.1",
                        }
                    ]
                }
            ]
        }
    })
}

mod password_flow {
    use super::*;

    /// The password flow posts a scoped payload, reads the token from the
    /// X-Subject-Token header, and resolves endpoints from the returned
    /// catalog by interface and region.
    #[tokio::test]
    async fn test_password_auth_and_catalog_resolution() {
        let server = MockServer::start().await;

        let expected_payload = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": "demo",
                            "password": "secret",
                            "domain": { "name": "Default" },
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": "demo-project",
                        "domain": { "name": "Default" },
                    }
                }
            }
        });
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .and(body_json_string(expected_payload.to_string()))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "issued-token")
                    .set_body_json(token_body(&server)),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.1/servers"))
            .and(header("x-auth-token", "issued-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{ "id": "s1", "name": "web-1", "status": "ACTIVE" }]
            })))
            .mount(&server)
            .await;

        let cloud = Cloud::new(&password_config(&server)).unwrap();
        let servers = cloud
            .compute()
            .unwrap()
            .list("compute-servers", &QueryParams::new())
            .await
            .unwrap();

        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].id().as_deref(), Some("s1"));
    }

    /// Two API calls reuse one cached token; the identity service is only
    /// hit once.
    #[tokio::test]
    async fn test_token_is_cached_across_requests() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "cached-token")
                    .set_body_json(token_body(&server)),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.1/servers"))
            .and(header("x-auth-token", "cached-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "servers": [] })),
            )
            .expect(2)
            .mount(&server)
            .await;

        let cloud = Cloud::new(&password_config(&server)).unwrap();
        let compute = cloud.compute().unwrap();
        compute.list("compute-servers", &QueryParams::new()).await.unwrap();
        compute.list("compute-servers", &QueryParams::new()).await.unwrap();
    }

    /// `Session::refresh` drops the cached token and re-authenticates.
    #[tokio::test]
    async fn test_refresh_forces_reauthentication() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "token-1")
                    .set_body_json(token_body(&server)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "token-2")
                    .set_body_json(token_body(&server)),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.1/servers"))
            .and(header("x-auth-token", "token-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "servers": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2.1/servers"))
            .and(header("x-auth-token", "token-2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "servers": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cloud = Cloud::new(&password_config(&server)).unwrap();
        let compute = cloud.compute().unwrap();
        compute.list("compute-servers", &QueryParams::new()).await.unwrap();
        cloud.session().refresh().await.unwrap();
        compute.list("compute-servers", &QueryParams::new()).await.unwrap();
    }
}

mod auth_failures {
    use super::*;

    /// A 401 from the identity service surfaces its error message as an
    /// authentication error, not a generic HTTP one.
    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {
                    "code": 401,
                    "message": "The request you have made requires authentication.",
                }
            })))
            .mount(&server)
            .await;

        let cloud = Cloud::new(&password_config(&server)).unwrap();
        let err = cloud
            .compute()
            .unwrap()
            .list("compute-servers", &QueryParams::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Auth(_)), "got {:?}", err);
        assert!(err.to_string().contains("requires authentication"));
    }

    /// A success response without an X-Subject-Token header is unusable.
    #[tokio::test]
    async fn test_missing_subject_token_header() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(201).set_body_json(token_body(&server)))
            .mount(&server)
            .await;

        let cloud = Cloud::new(&password_config(&server)).unwrap();
        let err = cloud
            .compute()
            .unwrap()
            .list("compute-servers", &QueryParams::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Auth(_)), "got {:?}", err);
        assert!(err.to_string().contains("X-Subject-Token"));
    }

    /// A catalog without the requested service yields EndpointNotFound
    /// rather than a request to nowhere.
    #[tokio::test]
    async fn test_service_missing_from_catalog() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "issued-token")
                    .set_body_json(token_body(&server)),
            )
            .mount(&server)
            .await;

        let cloud = Cloud::new(&password_config(&server)).unwrap();
        let err = cloud
            .network()
            .unwrap()
            .list("network-networks", &QueryParams::new())
            .await
            .unwrap_err();

        assert!(
            matches!(&err, Error::EndpointNotFound { service, .. } if service == "network"),
            "got {:?}",
            err
        );
    }
}
