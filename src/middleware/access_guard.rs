/// Access Guard Middleware
///
/// Verifies the bearer access token and injects the verified claims into
/// request extensions, where handlers pick them up via `web::ReqData`.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{authorize, TokenSigner};
use crate::error::AppError;

/// Guard for routes that require a valid access token
pub struct AccessGuard {
    signer: Arc<TokenSigner>,
}

impl AccessGuard {
    pub fn new(signer: Arc<TokenSigner>) -> Self {
        Self { signer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessGuardService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AccessGuardService {
            service: Rc::new(service),
            signer: Arc::clone(&self.signer),
        }))
    }
}

pub struct AccessGuardService<S> {
    service: Rc<S>,
    signer: Arc<TokenSigner>,
}

impl<S, B> Service<ServiceRequest> for AccessGuardService<S>
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
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match authorize(header, &self.signer) {
            Ok(claims) => {
                tracing::debug!(user_id = claims.payload.sub, "Access token accepted");
                req.extensions_mut().insert(claims);

                let service = Rc::clone(&self.service);
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                tracing::info!(path = %req.path(), reason = %e, "Access token rejected");
                Box::pin(async move { Err(AppError::Auth(e).into()) })
            }
        }
    }
}
