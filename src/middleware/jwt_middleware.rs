/// Bearer Token Middleware
///
/// Verifies the access token from the Authorization header and injects
/// its claims into request extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::AccessTokenIssuer;
use crate::error::AuthError;

/// Guards a scope: requests without a valid access token get a 401.
pub struct JwtMiddleware {
    issuer: AccessTokenIssuer,
}

impl JwtMiddleware {
    pub fn new(issuer: AccessTokenIssuer) -> Self {
        Self { issuer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            issuer: self.issuer.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    issuer: AccessTokenIssuer,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract Authorization header
        let auth_header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        match auth_header {
            None => {
                tracing::warn!("Missing or invalid Authorization header");
                let response = HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Missing or invalid authorization header",
                    "code": "UNAUTHORIZED"
                }));
                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(
                        "Unauthorized",
                        response,
                    )
                    .into())
                })
            }
            Some(token) => {
                match self.issuer.verify(&token) {
                    Ok(claims) => {
                        // Inject claims into request extensions
                        req.extensions_mut().insert(claims.clone());

                        tracing::debug!(user_id = %claims.sub, "Access token verified");

                        let service = self.service.clone();
                        Box::pin(async move { service.call(req).await })
                    }
                    Err(e) => {
                        tracing::warn!("Access token rejected: {}", e);
                        let code = match e {
                            AuthError::TokenExpired => "TOKEN_EXPIRED",
                            _ => "TOKEN_INVALID",
                        };
                        let response = HttpResponse::Unauthorized().json(serde_json::json!({
                            "error": "Invalid or expired token",
                            "code": code
                        }));
                        Box::pin(async move {
                            Err(actix_web::error::InternalError::from_response(
                                "Invalid token",
                                response,
                            )
                            .into())
                        })
                    }
                }
            }
        }
    }
}
