//! Tower layer that gates a route on its declared policy.
//!
//! The layer reads the [`IdentityContext`] injected by the authentication
//! layer, looks up the operation in the [`PolicyTable`] and evaluates it
//! before the handler runs.

use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use super::policy::{OperationId, PolicyDecision, PolicyTable};
use crate::error::CivicaError;
use crate::identity::IdentityContext;
use crate::observability::metrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that wraps a route with policy enforcement for one operation.
///
/// # Example
///
/// ```rust,ignore
/// let table = Arc::new(PolicyTable::standard());
///
/// let app = Router::new().route(
///     "/grants",
///     post(create_grant).layer(RequirePolicyLayer::new(table, OperationId::CreateGrant)),
/// );
/// ```
#[derive(Clone)]
pub struct RequirePolicyLayer {
    table: Arc<PolicyTable>,
    operation: OperationId,
}

impl RequirePolicyLayer {
    pub fn new(table: Arc<PolicyTable>, operation: OperationId) -> Self {
        Self { table, operation }
    }

    pub fn operation(&self) -> OperationId {
        self.operation
    }
}

impl<S> Layer<S> for RequirePolicyLayer {
    type Service = RequirePolicyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePolicyService {
            inner,
            table: self.table.clone(),
            operation: self.operation,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct RequirePolicyService<S> {
    inner: S,
    table: Arc<PolicyTable>,
    operation: OperationId,
}

impl<S> Service<Request<Body>> for RequirePolicyService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let table = self.table.clone();
        let operation = self.operation;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let ctx = match request.extensions().get::<IdentityContext>() {
                Some(ctx) => ctx.clone(),
                None => {
                    return Ok(CivicaError::unauthorized(
                        "Authentication credentials are required",
                    )
                    .into_response());
                }
            };

            let label = operation.label();
            match table.check(&operation, &ctx) {
                PolicyDecision::Allow => {
                    metrics::record_policy_decision(&label, true);
                    inner.call(request).await
                }
                PolicyDecision::Deny(missing) => {
                    metrics::record_policy_decision(&label, false);
                    let missing: Vec<String> = missing.iter().map(|r| r.to_string()).collect();
                    warn!(
                        subject = %ctx.subject_id(),
                        operation = %label,
                        missing = ?missing,
                        "Policy denied"
                    );
                    Ok(CivicaError::policy_denied(missing).into_response())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    async fn ok_handler(_req: Request<Body>) -> Result<Response, Infallible> {
        Ok(StatusCode::OK.into_response())
    }

    fn request_with(ctx: Option<IdentityContext>) -> Request<Body> {
        let mut req = axum::http::Request::builder().uri("/grants").body(Body::empty()).unwrap();
        if let Some(ctx) = ctx {
            req.extensions_mut().insert(ctx);
        }
        req
    }

    fn layer(op: OperationId) -> RequirePolicyLayer {
        RequirePolicyLayer::new(Arc::new(PolicyTable::standard()), op)
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let svc = layer(OperationId::CreateGrant).layer(service_fn(ok_handler));
        let resp = svc.oneshot(request_with(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_denied_is_forbidden() {
        let ctx = IdentityContext::builder("u1", "t1").build();
        let svc = layer(OperationId::CreateGrant).layer(service_fn(ok_handler));
        let resp = svc.oneshot(request_with(Some(ctx))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_allowed_reaches_handler() {
        let ctx = IdentityContext::builder("u1", "t1")
            .permission("grants:create")
            .build();
        let svc = layer(OperationId::CreateGrant).layer(service_fn(ok_handler));
        let resp = svc.oneshot(request_with(Some(ctx))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
