//! Decision, callback, and logout handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use chrono::Utc;
use portcullis_cookie::{CsrfClaims, SessionClaims};
use portcullis_core::ForwardedRequest;
use portcullis_rules::Action;
use tracing::{debug, info, instrument};

use super::ForwardAuth;
use crate::error::{AuthorizationError, BadRequest, HandlerError, UpstreamError};

/// Header carrying the authenticated email back to the proxy.
pub const X_FORWARDED_USER: &str = "x-forwarded-user";

/// Body of a successful logout without a redirect.
const LOGGED_OUT: &str = "You have been logged out";

/// Builds the axum router. Every request is dispatched on its forwarded path.
pub fn router(auth: Arc<ForwardAuth>) -> axum::Router {
    axum::Router::new().fallback(dispatch).with_state(auth)
}

/// Reconstructs the original request and hands it to the matching handler.
pub async fn dispatch(
    State(auth): State<Arc<ForwardAuth>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let req = ForwardedRequest::from_headers(&headers);

    if req.path() == auth.callback_path {
        callback(&auth, &req, jar).await.into_response()
    } else if req.path() == auth.logout_path {
        logout(&auth, &req, jar).into_response()
    } else {
        decide(&auth, &req, jar).into_response()
    }
}

/// Decides whether the proxy may forward the request.
#[instrument(skip_all, fields(host = %req.host(), uri = %req.uri()))]
fn decide(
    auth: &ForwardAuth,
    req: &ForwardedRequest,
    jar: CookieJar,
) -> Result<Response, HandlerError> {
    let action = auth.rules.route(req);
    debug!(rule = action.rule(), source_ip = req.source_ip(), "routing request");

    let provider = match action {
        Action::Allow { rule } => {
            debug!(rule, "allowing request");
            return Ok(StatusCode::OK.into_response());
        }
        Action::Auth { provider, .. } => provider,
    };

    match auth.session_identity(&jar, req.host()) {
        Some(Ok(identity)) => {
            if !auth.passlist.permits(identity.email()) {
                return Err(AuthorizationError::PassListRejected {
                    email: identity.email().to_string(),
                }
                .into());
            }
            debug!(email = identity.email(), "allowing authenticated request");
            Ok((
                StatusCode::OK,
                [(X_FORWARDED_USER, identity.email().to_string())],
            )
                .into_response())
        }
        Some(Err(err)) => Err(err.into()),
        None => begin_login(auth, req, jar, provider),
    }
}

/// Starts a login: sets the CSRF cookie and redirects to the provider.
fn begin_login(
    auth: &ForwardAuth,
    req: &ForwardedRequest,
    jar: CookieJar,
    provider_name: &str,
) -> Result<Response, HandlerError> {
    let provider = auth.provider(provider_name)?;
    let pending = auth
        .csrf
        .begin(req.host(), &req.return_url(), provider_name)?;
    let login_url = provider
        .login_url(&auth.redirect_uri(req), pending.nonce())
        .map_err(UpstreamError::from)?;

    debug!(provider = provider_name, "redirecting to login");
    Ok((
        jar.add(pending.into_cookie()),
        Redirect::temporary(login_url.as_str()),
    )
        .into_response())
}

/// Completes a login started by [`begin_login`].
///
/// The CSRF cookie is cleared on every outcome once one was presented.
#[instrument(skip_all, fields(host = %req.host()))]
async fn callback(
    auth: &ForwardAuth,
    req: &ForwardedRequest,
    jar: CookieJar,
) -> (CookieJar, Result<Response, HandlerError>) {
    debug!(source_ip = req.source_ip(), "handling callback");

    let state = req.query_param("state");
    let (jar, resolved) = auth.csrf.resolve(jar, req.host(), state.as_deref());
    let claims = match resolved {
        Ok(claims) => claims,
        Err(err) => return (jar, Err(err.into())),
    };

    match complete_login(auth, req, &claims).await {
        Ok(cookie) => (
            jar.add(cookie),
            Ok(Redirect::temporary(claims.redirect_target()).into_response()),
        ),
        Err(err) => (jar, Err(err)),
    }
}

async fn complete_login(
    auth: &ForwardAuth,
    req: &ForwardedRequest,
    csrf: &CsrfClaims,
) -> Result<Cookie<'static>, HandlerError> {
    let code = req
        .query_param("code")
        .ok_or(BadRequest::MissingCallbackParameter { name: "code" })?;
    let provider = auth.provider(csrf.provider())?;
    let redirect_uri = auth.redirect_uri(req);

    let token = provider
        .exchange_code(&redirect_uri, &code)
        .await
        .map_err(UpstreamError::from)?;
    let identity = provider
        .user_identity(&token)
        .await
        .map_err(UpstreamError::from)?;

    if !auth.passlist.permits(identity.email()) {
        return Err(AuthorizationError::PassListRejected {
            email: identity.email().to_string(),
        }
        .into());
    }

    let claims = SessionClaims::new(identity.email(), Utc::now());
    let cookie = auth
        .codec
        .issue(&auth.session, &claims, req.host())
        .map_err(|e| UpstreamError::SigningFailed {
            reason: e.to_string(),
        })?;

    info!(
        email = identity.email(),
        provider = csrf.provider(),
        "issued session cookie"
    );
    Ok(cookie)
}

/// Clears a valid session cookie.
#[instrument(skip_all, fields(host = %req.host()))]
fn logout(
    auth: &ForwardAuth,
    req: &ForwardedRequest,
    jar: CookieJar,
) -> Result<Response, HandlerError> {
    let identity = match auth.session_identity(&jar, req.host()) {
        Some(Ok(identity)) => identity,
        _ => return Err(BadRequest::NotAuthenticated.into()),
    };

    let jar = jar.add(auth.codec.clear(&auth.session, req.host()));
    info!(email = identity.email(), "logged out");

    Ok(match &auth.logout_redirect {
        Some(target) => (jar, Redirect::temporary(target)).into_response(),
        None => (jar, LOGGED_OUT).into_response(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use portcullis_core::Identity;
    use portcullis_provider::{Provider, ProviderError};
    use tower::ServiceExt;
    use url::Url;

    use super::*;
    use crate::config::ServerConfig;

    const SECRET: &str = "facade-test-secret";

    /// Provider that accepts one code and returns one email.
    struct StubProvider {
        email: Option<String>,
    }

    impl StubProvider {
        fn returning(email: &str) -> Self {
            Self {
                email: Some(email.to_string()),
            }
        }

        fn without_identity() -> Self {
            Self { email: None }
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "google"
        }

        fn login_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ProviderError> {
            let mut url = Url::parse("https://idp.test/authorize").expect("static url");
            url.query_pairs_mut()
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("state", state);
            Ok(url)
        }

        async fn exchange_code(
            &self,
            _redirect_uri: &str,
            code: &str,
        ) -> Result<String, ProviderError> {
            if code == "good-code" {
                Ok("token".to_string())
            } else {
                Err(ProviderError::CodeExchangeFailed {
                    reason: "invalid_grant".to_string(),
                })
            }
        }

        async fn user_identity(&self, _token: &str) -> Result<Identity, ProviderError> {
            self.email
                .as_deref()
                .map(Identity::new)
                .ok_or_else(|| ProviderError::IdentityFetchFailed {
                    reason: "no email".to_string(),
                })
        }
    }

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let mut map: HashMap<String, String> = [
            ("SECRET", SECRET),
            ("COOKIE_DOMAINS", "example.com"),
            ("PROVIDERS__GOOGLE__CLIENT_ID", "id"),
            ("PROVIDERS__GOOGLE__CLIENT_SECRET", "client-secret"),
            ("RULES__PUBLIC__ACTION", "allow"),
            ("RULES__PUBLIC__RULE", "PathPrefix(`/public`)"),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
        for (k, v) in vars {
            map.insert((*k).to_string(), (*v).to_string());
        }
        ServerConfig::from_sources(None, ::config::Environment::default().source(Some(map)))
            .expect("config should load")
    }

    fn app_with(vars: &[(&str, &str)], provider: StubProvider) -> axum::Router {
        let auth = ForwardAuth::from_config(&config(vars))
            .expect("valid config")
            .with_provider(Arc::new(provider));
        router(Arc::new(auth))
    }

    fn app(provider: StubProvider) -> axum::Router {
        app_with(&[], provider)
    }

    fn forwarded(uri: &str, cookies: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/")
            .header("x-forwarded-method", "GET")
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-host", "app.example.com")
            .header("x-forwarded-uri", uri)
            .header("x-forwarded-for", "10.0.0.1");
        if !cookies.is_empty() {
            let cookie = cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).expect("request")
    }

    /// Returns `name -> value` for every cookie the response sets.
    fn set_cookies(response: &Response) -> HashMap<String, String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse(value.to_string()).ok())
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect()
    }

    fn location(response: &Response) -> Url {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .expect("location header");
        Url::parse(location).expect("absolute location")
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    async fn body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 body")
    }

    fn session_cookie(email: &str) -> String {
        session_cookie_issued(email, Utc::now())
    }

    fn session_cookie_issued(email: &str, issued_at: chrono::DateTime<Utc>) -> String {
        let auth = ForwardAuth::from_config(&config(&[])).expect("valid config");
        let claims = SessionClaims::new(email, issued_at);
        auth.codec
            .sign(&claims, "app.example.com", auth.session.lifetime())
            .expect("signed")
    }

    /// Runs an unauthenticated request and returns the CSRF cookie and nonce.
    async fn start_login(app: &axum::Router) -> (String, String) {
        let response = app
            .clone()
            .oneshot(forwarded("/private?x=1", &[]))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let csrf = set_cookies(&response)
            .remove("_forward_auth_csrf")
            .expect("csrf cookie");
        let state = query(&location(&response), "state").expect("state");
        (csrf, state)
    }

    #[tokio::test]
    async fn allow_rule_passes_without_cookie() {
        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/public/x", &[]))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(X_FORWARDED_USER).is_none());
    }

    #[tokio::test]
    async fn missing_cookie_redirects_to_login_with_nonce() {
        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/private?x=1", &[]))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let login = location(&response);
        assert_eq!(login.host_str(), Some("idp.test"));
        assert_eq!(
            query(&login, "redirect_uri").as_deref(),
            Some("https://app.example.com/_oauth")
        );

        let csrf = set_cookies(&response)
            .remove("_forward_auth_csrf")
            .expect("csrf cookie");
        let auth = ForwardAuth::from_config(&config(&[])).expect("valid config");
        let claims: CsrfClaims = auth
            .codec
            .verify(&csrf, "app.example.com", chrono::Duration::minutes(10))
            .expect("valid csrf cookie");
        assert_eq!(query(&login, "state").as_deref(), Some(claims.nonce()));
        assert_eq!(
            claims.redirect_target(),
            "https://app.example.com/private?x=1"
        );
    }

    #[tokio::test]
    async fn valid_session_is_allowed_with_user_header() {
        let cookie = session_cookie("user@example.com");
        let response = app_with(
            &[("DOMAINS", "example.com")],
            StubProvider::returning("user@example.com"),
        )
        .oneshot(forwarded("/private", &[("_forward_auth", &cookie)]))
        .await
        .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(X_FORWARDED_USER)
                .and_then(|v| v.to_str().ok()),
            Some("user@example.com")
        );
    }

    #[tokio::test]
    async fn session_outside_passlist_is_rejected() {
        let cookie = session_cookie("mallory@evil.org");
        let response = app_with(
            &[("DOMAINS", "example.com")],
            StubProvider::returning("user@example.com"),
        )
        .oneshot(forwarded("/private", &[("_forward_auth", &cookie)]))
        .await
        .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(response).await, "Not authorized");
    }

    #[tokio::test]
    async fn tampered_session_is_rejected() {
        let cookie = format!("{}x", session_cookie("user@example.com"));
        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/private", &[("_forward_auth", &cookie)]))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let issued_at = Utc::now() - chrono::Duration::hours(13);
        let cookie = session_cookie_issued("user@example.com", issued_at);
        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/private", &[("_forward_auth", &cookie)]))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(response).await, "Not authorized");
    }

    #[tokio::test]
    async fn session_signed_with_other_secret_is_rejected() {
        let other = ForwardAuth::from_config(&config(&[("SECRET", "another-secret")]))
            .expect("valid config");
        let cookie = other
            .codec
            .sign(
                &SessionClaims::new("user@example.com", Utc::now()),
                "app.example.com",
                other.session.lifetime(),
            )
            .expect("signed");

        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/private", &[("_forward_auth", &cookie)]))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn callback_issues_session_and_redirects_back() {
        let app = app(StubProvider::returning("user@example.com"));
        let (csrf, state) = start_login(&app).await;

        let response = app
            .clone()
            .oneshot(forwarded(
                &format!("/_oauth?code=good-code&state={state}"),
                &[("_forward_auth_csrf", &csrf)],
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            location(&response).as_str(),
            "https://app.example.com/private?x=1"
        );
        let cookies = set_cookies(&response);
        assert_eq!(cookies.get("_forward_auth_csrf").map(String::as_str), Some(""));
        let session = cookies.get("_forward_auth").expect("session cookie");

        let followup = app
            .oneshot(forwarded("/private", &[("_forward_auth", session)]))
            .await
            .expect("response");
        assert_eq!(followup.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn callback_with_wrong_state_is_rejected_and_clears_csrf() {
        let app = app(StubProvider::returning("user@example.com"));
        let (csrf, _) = start_login(&app).await;

        let response = app
            .oneshot(forwarded(
                "/_oauth?code=good-code&state=forged",
                &[("_forward_auth_csrf", &csrf)],
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.get("_forward_auth_csrf").map(String::as_str), Some(""));
        assert!(!cookies.contains_key("_forward_auth"));
    }

    #[tokio::test]
    async fn callback_without_csrf_cookie_is_rejected() {
        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/_oauth?code=good-code&state=anything", &[]))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn failed_code_exchange_is_unavailable() {
        let app = app(StubProvider::returning("user@example.com"));
        let (csrf, state) = start_login(&app).await;

        let response = app
            .oneshot(forwarded(
                &format!("/_oauth?code=bad-code&state={state}"),
                &[("_forward_auth_csrf", &csrf)],
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            set_cookies(&response)
                .get("_forward_auth_csrf")
                .map(String::as_str),
            Some("")
        );
    }

    #[tokio::test]
    async fn failed_identity_fetch_is_unavailable() {
        let app = app(StubProvider::without_identity());
        let (csrf, state) = start_login(&app).await;

        let response = app
            .oneshot(forwarded(
                &format!("/_oauth?code=good-code&state={state}"),
                &[("_forward_auth_csrf", &csrf)],
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body(response).await, "Service unavailable");
    }

    #[tokio::test]
    async fn callback_identity_outside_passlist_is_rejected() {
        let app = app_with(
            &[("WHITELIST", "admin@example.com")],
            StubProvider::returning("user@example.com"),
        );
        let (csrf, state) = start_login(&app).await;

        let response = app
            .oneshot(forwarded(
                &format!("/_oauth?code=good-code&state={state}"),
                &[("_forward_auth_csrf", &csrf)],
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!set_cookies(&response).contains_key("_forward_auth"));
    }

    #[tokio::test]
    async fn callback_without_code_is_bad_request() {
        let app = app(StubProvider::returning("user@example.com"));
        let (csrf, state) = start_login(&app).await;

        let response = app
            .oneshot(forwarded(
                &format!("/_oauth?state={state}"),
                &[("_forward_auth_csrf", &csrf)],
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_without_session_is_bad_request() {
        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/_tfa-logout", &[]))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(response).await, "Not already authenticated");
    }

    #[tokio::test]
    async fn logout_with_expired_session_is_bad_request() {
        let issued_at = Utc::now() - chrono::Duration::hours(13);
        let cookie = session_cookie_issued("user@example.com", issued_at);
        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/_tfa-logout", &[("_forward_auth", &cookie)]))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(response).await, "Not already authenticated");
    }

    #[tokio::test]
    async fn logout_with_tampered_session_is_bad_request() {
        let cookie = format!("{}x", session_cookie("user@example.com"));
        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/_tfa-logout", &[("_forward_auth", &cookie)]))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(response).await, "Not already authenticated");
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let cookie = session_cookie("user@example.com");
        let response = app(StubProvider::returning("user@example.com"))
            .oneshot(forwarded("/_tfa-logout", &[("_forward_auth", &cookie)]))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            set_cookies(&response).get("_forward_auth").map(String::as_str),
            Some("")
        );
        assert_eq!(body(response).await, LOGGED_OUT);
    }

    #[tokio::test]
    async fn logout_redirects_when_configured() {
        let cookie = session_cookie("user@example.com");
        let response = app_with(
            &[("LOGOUT_REDIRECT", "https://example.com/bye")],
            StubProvider::returning("user@example.com"),
        )
        .oneshot(forwarded("/_tfa-logout", &[("_forward_auth", &cookie)]))
        .await
        .expect("response");

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response).as_str(), "https://example.com/bye");
    }

    #[tokio::test]
    async fn default_allow_passes_unmatched_requests() {
        let response = app_with(
            &[("DEFAULT_ACTION", "allow")],
            StubProvider::returning("user@example.com"),
        )
        .oneshot(forwarded("/anything", &[]))
        .await
        .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
