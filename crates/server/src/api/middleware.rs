//! Authentication and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use solvd_core::{AuthError, AuthRequest, Identity};

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Records request duration, count and in-flight requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();
    let response = next.run(request).await;
    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Authenticates the request with the configured authenticator and stores
/// the resulting [`Identity`] in the request extensions.
///
/// Missing or wrong credentials yield 401; authenticator failures yield 500.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let authenticator = state.authenticator();

    if !authenticator.requires_credentials() {
        request.extensions_mut().insert(Identity::anonymous());
        return Ok(next.run(request).await);
    }

    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let source_ip = request
        .extensions()
        .get::<SocketAddr>()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let auth_request = AuthRequest { headers, source_ip };

    match authenticator.authenticate(&auth_request).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(AuthError::NotAuthenticated) => {
            AUTH_FAILURES_TOTAL.with_label_values(&["not_authenticated"]).inc();
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(AuthError::InvalidCredentials(_)) => {
            AUTH_FAILURES_TOTAL.with_label_values(&["invalid_credentials"]).inc();
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(e) => {
            tracing::error!("Authenticator failure: {}", e);
            AUTH_FAILURES_TOTAL.with_label_values(&["internal_error"]).inc();
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Extractor for the caller's [`Identity`].
///
/// Falls back to the anonymous identity when the route is not behind
/// [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.0.is_admin()
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let identity = parts
            .extensions
            .get::<Identity>()
            .cloned()
            .unwrap_or_else(Identity::anonymous);
        std::future::ready(Ok(Caller(identity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, middleware, routing::get, Router};
    use http_body_util::BodyExt;
    use solvd_core::{
        config::{AuthConfig, BusConfig, ServerConfig, StoreConfig},
        create_authenticator, AuthMethod, Config, HealthProbe, KeyValueStore, MemoryBus,
        MemoryStore, MessageBus, OrchestratorConfig,
    };
    use tower::ServiceExt;

    async fn whoami(Caller(identity): Caller) -> String {
        format!("{}:{}", identity.user_id, identity.is_admin())
    }

    fn create_test_state(auth: AuthConfig) -> Arc<AppState> {
        let authenticator = create_authenticator(&auth).unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::new());
        let config = Config {
            auth,
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            bus: BusConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        };
        Arc::new(AppState::new(
            config,
            authenticator,
            Arc::clone(&bus),
            HealthProbe::new(store, bus),
            None,
        ))
    }

    fn app(auth: AuthConfig) -> Router {
        let state = create_test_state(auth);
        Router::new()
            .route("/test", get(whoami))
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state)
    }

    fn api_key_auth() -> AuthConfig {
        AuthConfig {
            method: AuthMethod::ApiKey,
            api_key: Some("secret-key".to_string()),
        }
    }

    async fn body_text(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_none_auth_allows_all_as_anonymous() {
        let app = app(AuthConfig {
            method: AuthMethod::None,
            api_key: None,
        });

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous:false");
    }

    #[tokio::test]
    async fn test_bearer_key_is_admin() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer secret-key")
            .body(Body::empty())
            .unwrap();
        let response = app(api_key_auth()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "api_key_user:true");
    }

    #[tokio::test]
    async fn test_x_api_key_header() {
        let request = Request::builder()
            .uri("/test")
            .header("X-API-Key", "secret-key")
            .body(Body::empty())
            .unwrap();
        let response = app(api_key_auth()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // Any key holder is admin; there are no per-user claims
        assert_eq!(body_text(response).await, "api_key_user:true");
    }

    #[tokio::test]
    async fn test_wrong_key_is_unauthorized() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer wrong-key")
            .body(Body::empty())
            .unwrap();
        let response = app(api_key_auth()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_key_is_unauthorized() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app(api_key_auth()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_caller_without_middleware_is_anonymous() {
        let app: Router = Router::new().route("/test", get(whoami));
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(body_text(response).await, "anonymous:false");
    }
}
