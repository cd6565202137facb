use super::jwt::JwtService;
use super::models::AuthUser;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    http::Method,
    Error, HttpMessage, HttpResponse,
};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ok, ready, Ready};
use shared::ErrorResponse;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Paths reachable without a token.
const PUBLIC_PATHS: [&str; 2] = ["/api/examples", "/api/health"];
const PUBLIC_PREFIXES: [&str; 1] = ["/example-images/"];

#[derive(Clone)]
pub struct AuthMiddleware {
    jwt_service: Arc<JwtService>,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self {
            jwt_service: Arc::new(jwt_service),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            jwt_service: self.jwt_service.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    jwt_service: Arc<JwtService>,
}

#[derive(Debug)]
enum AuthError {
    NoAuthHeader,
    InvalidHeaderFormat,
    NotBearerToken,
    VerificationFailed(String),
    InvalidUuidInClaims(String),
}

impl AuthError {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthError::NoAuthHeader => format!("No Authorization header found for path: {}", path),
            AuthError::InvalidHeaderFormat => format!("Invalid Authorization header format (non-UTF-8) for path: {}", path),
            AuthError::NotBearerToken => format!("Authorization header for path {} doesn't start with 'Bearer '", path),
            AuthError::VerificationFailed(e) => format!("JWT token verification failed for path {}: {}", path, e),
            AuthError::InvalidUuidInClaims(sub) => format!("Invalid UUID in JWT claims.sub for path {}: {}", path, sub),
        }
    }

    fn client_error(&self) -> ErrorResponse {
        let error_message = match self {
            AuthError::InvalidUuidInClaims(_) => "Invalid token claims",
            AuthError::VerificationFailed(_) => "Token verification failed",
            _ => "Missing or invalid authorization token",
        };
        ErrorResponse {
            error: error_message.to_string(),
        }
    }
}

fn is_public(req: &ServiceRequest) -> bool {
    let path = req.path();
    req.method() == Method::OPTIONS
        || PUBLIC_PATHS.contains(&path)
        || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn validate_request_token(
    req: &ServiceRequest,
    jwt_service: &JwtService,
) -> Result<AuthUser, AuthError> {
    let auth_header = req.headers().get("Authorization").ok_or(AuthError::NoAuthHeader)?;
    let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidHeaderFormat)?;
    let token = auth_str.strip_prefix("Bearer ").ok_or(AuthError::NotBearerToken)?;

    log::debug!("Found Bearer token, verifying...");
    let claims = jwt_service
        .verify_token(token)
        .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;

    log::debug!("JWT token verified for user: {}", claims.sub);
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AuthError::InvalidUuidInClaims(claims.sub.clone()))?;
    Ok(AuthUser::from_claims(user_id, &claims))
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt_service = self.jwt_service.clone();

        Box::pin(async move {
            if is_public(&req) {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let path_str = req.path().to_string();
            log::debug!("Auth middleware processing path: {}", &path_str);

            match validate_request_token(&req, &jwt_service) {
                Ok(user) => {
                    req.extensions_mut().insert(user);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(auth_error) => {
                    log::warn!("{}", auth_error.log_message(&path_str));

                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Unauthorized()
                        .json(auth_error.client_error())
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}

/// Verified caller. Rejects with 401 when the middleware attached no identity.
pub struct AuthenticatedUser(pub AuthUser);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<AuthUser>() {
            Some(user) => ready(Ok(AuthenticatedUser(*user))),
            None => {
                log::warn!("No authenticated user attached to request for path: {}", req.path());
                let response = HttpResponse::Unauthorized().json(ErrorResponse {
                    error: "Authentication required".to_string(),
                });
                ready(Err(InternalError::from_response("unauthenticated", response).into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::tests::{token_for, SECRET};
    use actix_web::{http::StatusCode, test, web, App};
    use shared::SkinType;

    async fn whoami(user: AuthenticatedUser) -> HttpResponse {
        let skin_type = user.0.skin_type.map(|s| s.to_string()).unwrap_or_default();
        HttpResponse::Ok().body(format!("{}|{}", user.0.id, skin_type))
    }

    async fn open() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .wrap(AuthMiddleware::new(JwtService::new(SECRET)))
                    .route("/api/history", web::get().to(whoami))
                    .route("/api/health", web::get().to(open))
                    .route("/example-images/{name}", web::get().to(open)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/history").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "Missing or invalid authorization token");
    }

    #[actix_web::test]
    async fn bad_signature_is_unauthorized() {
        let app = app!();
        let token = crate::auth::jwt::JwtService::new("other")
            .generate_token(&crate::auth::jwt::tests::claims_for(Uuid::new_v4(), None))
            .unwrap();
        let req = test::TestRequest::get()
            .uri("/api/history")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn verified_identity_reaches_handler() {
        let app = app!();
        let user_id = Uuid::new_v4();
        let req = test::TestRequest::get()
            .uri("/api/history")
            .insert_header(("Authorization", format!("Bearer {}", token_for(user_id, Some("sensitive")))))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(
            body,
            format!("{}|{}", user_id, SkinType::Sensitive).as_bytes()
        );
    }

    #[actix_web::test]
    async fn public_paths_skip_verification() {
        let app = app!();
        for uri in ["/api/health", "/example-images/sample.png"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn extractor_without_middleware_rejects() {
        let app = test::init_service(App::new().route("/me", web::get().to(whoami))).await;
        let req = test::TestRequest::get().uri("/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
