use axum::body::Body;
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::limit::ResponseBody;
use tower_http::map_response_body::MapResponseBodyLayer;
use tower_http::trace::HttpMakeClassifier;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Re-wraps the body-limit response body as `axum::body::Body`, which `Cors`
/// requires to be `Default`.
type BoxLimitBody = MapResponseBodyLayer<fn(ResponseBody<Body>) -> Body>;

/// Request tracing, permissive CORS and a cap on request bodies.
pub fn stack(
    body_limit_bytes: usize,
) -> ServiceBuilder<
    Stack<
        RequestBodyLimitLayer,
        Stack<BoxLimitBody, Stack<CorsLayer, Stack<TraceLayer<HttpMakeClassifier>, Identity>>>,
    >,
> {
    let trace = TraceLayer::new_for_http();
    let cors = CorsLayer::permissive();
    let limit = RequestBodyLimitLayer::new(body_limit_bytes);
    let box_body: BoxLimitBody = MapResponseBodyLayer::new(Body::new);

    ServiceBuilder::new()
        .layer(trace)
        .layer(cors)
        .layer(box_body)
        .layer(limit)
}
