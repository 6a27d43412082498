use crate::telemetry::Metrics;
use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures::future::LocalBoxFuture;
use std::{
    future::{Ready, ready},
    sync::Arc,
    time::Instant,
};

#[derive(Clone)]
pub struct MetricsMiddleware {
    metrics: Arc<Metrics>,
}

impl MetricsMiddleware {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    #[inline(always)]
    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Arc::new(service),
            metrics: self.metrics.clone(),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Arc<S>,
    metrics: Arc<Metrics>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    #[inline(always)]
    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let metrics = self.metrics.clone();
        let method = req.method().to_string();
        // route pattern keeps label cardinality bounded
        let endpoint = req
            .match_pattern()
            .unwrap_or_else(|| "unmatched".to_string());
        let start_time = Instant::now();

        metrics.active_connections.inc();

        Box::pin(async move {
            let res = service.call(req).await;

            let duration = start_time.elapsed().as_secs_f64();
            let status = match &res {
                Ok(response) => response.status().as_u16(),
                Err(_) => 500,
            };

            metrics.active_connections.dec();
            metrics.record_http_request(&method, &endpoint, status, duration);

            res
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DEFAULT_BUCKETS;
    use actix_web::{App, HttpResponse, test, web};

    #[actix_web::test]
    async fn it_should_count_requests_by_route_and_status() {
        let metrics = Arc::new(Metrics::new(&DEFAULT_BUCKETS).unwrap());
        let app = test::init_service(
            App::new()
                .wrap(MetricsMiddleware::new(metrics.clone()))
                .route("/ping", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert!(res.status().is_success());

        let counted = metrics
            .http_requests_total
            .with_label_values(&["GET", "/ping", "200"])
            .get();
        assert_eq!(counted, 1);
        assert_eq!(metrics.active_connections.get(), 0);
    }
}
