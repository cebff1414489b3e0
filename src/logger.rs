use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use log::info;
use std::rc::Rc;
use std::time::Instant;

use crate::error::{AppError, ErrorHandler};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// 커스텀 Logger 미들웨어
/// 요청마다 request id를 붙이고 응답 상태와 소요 시간을 로깅합니다.
/// 미들웨어(AccessGuard)가 거부한 요청도 응답으로 변환해 같은 방식으로 기록합니다.
/// `AppError` 응답은 같은 request id를 `error_id`로 사용해 다시 렌더링합니다.
/// Authorization 헤더와 요청 본문은 로깅하지 않습니다.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let http_req = req.request().clone();

        info!("Request started: {} {} [{}]", method, path, request_id);

        let service = self.service.clone();

        Box::pin(async move {
            let mut res = match service.call(req).await {
                Ok(res) => res.map_into_boxed_body(),
                Err(e) => ServiceResponse::from_err(e, http_req),
            };

            if let Some(rendered) = render_app_error(res.response(), &request_id) {
                res = res.into_response(rendered);
            }

            let elapsed = start_time.elapsed();
            let status = res.status();

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                res.headers_mut()
                    .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }

            // 응답 정보 로깅
            info!(
                "Request completed: {} {} - Status: {} ({}ms) [{}]",
                method,
                path,
                status.as_u16(),
                elapsed.as_millis(),
                request_id
            );

            Ok(res)
        })
    }
}

/// Log an `AppError` once and rebuild its body under `request_id`
fn render_app_error(response: &HttpResponse, request_id: &str) -> Option<HttpResponse> {
    let err = response.error()?.as_error::<AppError>()?;
    err.log_error(request_id);
    Some(err.render(request_id))
}
