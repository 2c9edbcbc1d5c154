use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorUnauthorized},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

use weave_core::validate_user_id;

/// Middleware that turns the `x-user-id` request header into a validated
/// caller identity stored in the request extensions.
pub struct IdentityMiddleware {
    require_user_id: bool,
    default_user_id: String,
}

impl IdentityMiddleware {
    pub fn new(require_user_id: bool, default_user_id: impl Into<String>) -> Self {
        Self {
            require_user_id,
            default_user_id: default_user_id.into(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityMiddlewareService {
            service: Rc::new(service),
            require_user_id: self.require_user_id,
            default_user_id: self.default_user_id.clone(),
        }))
    }
}

pub struct IdentityMiddlewareService<S> {
    service: Rc<S>,
    require_user_id: bool,
    default_user_id: String,
}

impl<S, B> Service<ServiceRequest> for IdentityMiddlewareService<S>
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
        let header = req
            .headers()
            .get("x-user-id")
            .map(|h| h.to_str().map(str::to_string));

        let user_id = match header {
            Some(Ok(user_id)) => {
                if let Err(e) = validate_user_id(&user_id) {
                    return Box::pin(ready(Err(ErrorBadRequest(e.message))));
                }
                user_id
            }
            Some(Err(_)) => {
                return Box::pin(ready(Err(ErrorBadRequest(
                    "x-user-id header is not valid UTF-8",
                ))));
            }
            None if self.require_user_id => {
                return Box::pin(ready(Err(ErrorUnauthorized("x-user-id header required"))));
            }
            None => self.default_user_id.clone(),
        };

        req.extensions_mut().insert(UserId(user_id));

        let service = Rc::clone(&self.service);
        Box::pin(async move { service.call(req).await })
    }
}

/// Wrapper type for the validated caller identity stored in request
/// extensions.
#[derive(Clone, Debug)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Helper to read the validated identity inside a handler.
pub fn extract_user_id(req: &actix_web::HttpRequest) -> Option<String> {
    req.extensions().get::<UserId>().map(|u| u.0.clone())
}
