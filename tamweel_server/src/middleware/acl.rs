//! Access control middleware for the Tamweel marketplace server.
//! This middleware can be placed on any route or service.
//!
//! It checks the resolved identity stored in the request extensions by the identity middleware against the user
//! types allowed on the route. If the caller's user type is among them, the request continues. Otherwise a 403
//! Forbidden response is returned.
use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorInternalServerError,
    Error,
    HttpMessage,
};
use futures::{
    future::{ok, Ready},
    Future,
};

use crate::{
    auth::{ResolvedIdentity, UserType},
    errors::{AuthError, ServerError},
};

pub struct AclMiddlewareFactory {
    allowed_user_types: Vec<UserType>,
}

impl AclMiddlewareFactory {
    pub fn new(allowed_user_types: &[UserType]) -> Self {
        AclMiddlewareFactory { allowed_user_types: allowed_user_types.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AclMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { allowed_user_types: self.allowed_user_types.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    allowed_user_types: Vec<UserType>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let allowed_user_types = self.allowed_user_types.clone();
        Box::pin(async move {
            let identity = req
                .extensions()
                .get::<ResolvedIdentity>()
                .ok_or_else(|| {
                    log::warn!("No resolved identity found in request extensions");
                    ErrorInternalServerError("No resolved identity found in request extensions")
                })?
                .clone();
            if allowed_user_types.is_empty() || allowed_user_types.contains(&identity.user_type) {
                service.call(req).await
            } else {
                Err(ServerError::from(AuthError::ForbiddenUserType(identity.user_type.to_string())).into())
            }
        })
    }
}
