//! Request logging middleware.
//!
//! Logs one line when a request starts and one when it completes, with the
//! way the caller authenticated. Only the public prefix of an API key is
//! logged; admin keys and session cookies are reported as present or not.

use std::future::{Ready, ready};
use std::time::Instant;

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use futures_util::future::LocalBoxFuture;
use tracing::{info, warn};

use crate::auth::session::SESSION_COOKIE;
use crate::config::{ADMIN_KEY_HEADER, API_KEY_HEADER};
use crate::services::api_key::KEY_PREFIX_LENGTH;

/// Request logger middleware factory.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { service }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
}

/// How the request claims to be authenticated, safe to log.
fn credential_summary(req: &ServiceRequest) -> String {
    let headers = req.headers();
    if headers.contains_key(ADMIN_KEY_HEADER) {
        return "admin-key".to_string();
    }
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return match key.get(..KEY_PREFIX_LENGTH) {
            Some(prefix) => format!("api-key:{}...", prefix),
            None => "api-key:invalid".to_string(),
        };
    }
    if req.cookie(SESSION_COOKIE).is_some() {
        return "session".to_string();
    }
    "anonymous".to_string()
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        let credentials = credential_summary(&req);

        info!(
            target: "api",
            method = %method,
            path = %path,
            remote_addr = %remote_addr,
            credentials = %credentials,
            "→ Request started"
        );

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            let elapsed = start.elapsed();
            let status = res.status();

            if status.is_success() || status.is_redirection() {
                info!(
                    target: "api",
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    duration_ms = elapsed.as_millis() as u64,
                    "← Request completed"
                );
            } else if status.is_client_error() {
                warn!(
                    target: "api",
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    duration_ms = elapsed.as_millis() as u64,
                    credentials = %credentials,
                    "← Client error"
                );
            } else {
                warn!(
                    target: "api",
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    duration_ms = elapsed.as_millis() as u64,
                    "← Server error"
                );
            }

            Ok(res)
        })
    }
}
