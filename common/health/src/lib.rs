//! Readiness reporting for the backends a service depends on.
//!
//! Each backend registers a named check. A readiness request runs every
//! check, in name order, and the process is ready only if all of them pass:
//!   - no registered check means the process is ready
//!   - a single failing check makes the process unready, and the failure
//!     reason is reported next to the check name
//!
//! Checks are awaited one after the other and nothing is cached. A check that
//! never completes stalls the readiness request, so checks doing network I/O
//! should be wrapped with [`HealthCheckExt::with_timeout`].
//!
//! Liveness only says the process is up and never looks at the backends.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error returned by a failing check.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ProbeError(String);

impl ProbeError {
    pub fn new(reason: impl ToString) -> Self {
        ProbeError(reason.to_string())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> Result<(), ProbeError>;
}

#[async_trait]
impl<T: HealthCheck + ?Sized> HealthCheck for Arc<T> {
    async fn check(&self) -> Result<(), ProbeError> {
        (**self).check().await
    }
}

/// Adapts an async closure into a [`HealthCheck`].
pub struct FnCheck<F>(F);

/// Build a check from a closure returning a future, e.g.
/// `check_fn(|| async { Ok(()) })`.
pub fn check_fn<F, Fut>(f: F) -> FnCheck<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeError>> + Send,
{
    FnCheck(f)
}

#[async_trait]
impl<F, Fut> HealthCheck for FnCheck<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeError>> + Send,
{
    async fn check(&self) -> Result<(), ProbeError> {
        (self.0)().await
    }
}

/// A check that fails if the wrapped one does not complete in time.
pub struct WithTimeout<C> {
    inner: C,
    timeout: Duration,
}

#[async_trait]
impl<C: HealthCheck> HealthCheck for WithTimeout<C> {
    async fn check(&self) -> Result<(), ProbeError> {
        match tokio::time::timeout(self.timeout, self.inner.check()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::new(format!(
                "check timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

pub trait HealthCheckExt: HealthCheck + Sized {
    fn with_timeout(self, timeout: Duration) -> WithTimeout<Self> {
        WithTimeout {
            inner: self,
            timeout,
        }
    }
}

impl<C: HealthCheck + Sized> HealthCheckExt for C {}

/// Outcome of a single check, as rendered in the readiness body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<(), ProbeError>> for CheckStatus {
    fn from(result: Result<(), ProbeError>) -> Self {
        match result {
            Ok(()) => CheckStatus {
                healthy: true,
                error: None,
            },
            Err(err) => CheckStatus {
                healthy: false,
                error: Some(err.0),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// The overall status: true if all checks passed
    pub healthy: bool,
    /// Result of each registered check, keyed by check name
    pub checks: BTreeMap<String, CheckStatus>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus {
            healthy: true,
            checks: BTreeMap::new(),
        }
    }
}

impl HealthStatus {
    /// Names of the failing checks, in name order.
    pub fn failing(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, status)| !status.healthy)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl IntoResponse for HealthStatus {
    /// 200 when every check passed, 503 otherwise, with the per-check
    /// breakdown as a JSON body in both cases.
    fn into_response(self) -> Response {
        let code = match self.healthy {
            true => StatusCode::OK,
            false => StatusCode::SERVICE_UNAVAILABLE,
        };
        (code, Json(self)).into_response()
    }
}

/// Always-healthy liveness status.
pub struct LivenessStatus;

impl IntoResponse for LivenessStatus {
    fn into_response(self) -> Response {
        (StatusCode::OK, "ok").into_response()
    }
}

#[derive(Clone)]
pub struct HealthAggregator {
    name: String,
    checks: Arc<RwLock<BTreeMap<String, Arc<dyn HealthCheck>>>>,
}

impl HealthAggregator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            checks: Default::default(),
        }
    }

    /// Registers a named check. A check already registered under the same
    /// name is replaced.
    pub fn add_check(&self, name: impl Into<String>, check: impl HealthCheck + 'static) {
        let name = name.into();
        let check: Arc<dyn HealthCheck> = Arc::new(check);
        let mut checks = self
            .checks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if checks.insert(name.clone(), check).is_some() {
            warn!(check = %name, "{} check replaced", self.name);
        } else {
            debug!(check = %name, "{} check registered", self.name);
        }
    }

    /// Unregisters a check, returning whether one was registered.
    pub fn remove_check(&self, name: &str) -> bool {
        let removed = self
            .checks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            debug!(check = %name, "{} check removed", self.name);
        }
        removed
    }

    pub fn check_names(&self) -> Vec<String> {
        self.checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The process is running, whatever the state of its backends.
    pub fn liveness(&self) -> LivenessStatus {
        LivenessStatus
    }

    /// Runs every registered check and returns the combined status.
    /// Can be used as an axum handler.
    pub async fn readiness(&self) -> HealthStatus {
        // Snapshot so that no lock is held while the checks do I/O
        let checks: Vec<(String, Arc<dyn HealthCheck>)> = self
            .checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, check)| (name.clone(), check.clone()))
            .collect();

        let mut status = HealthStatus::default();
        for (name, check) in checks {
            let result = check.check().await;
            if let Err(err) = &result {
                warn!(check = %name, error = %err, "{} check failed", self.name);
                status.healthy = false;
            }
            drop(status.checks.insert(name, result.into()));
        }

        match status.healthy {
            true => info!("{} health check ok", self.name),
            false => warn!("{} health check failed: {:?}", self.name, status.failing()),
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use assert_json_diff::assert_json_eq;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;

    use crate::{check_fn, HealthAggregator, HealthCheckExt, HealthStatus, ProbeError};

    fn passing() -> impl crate::HealthCheck {
        check_fn(|| async { Ok(()) })
    }

    fn failing(reason: &'static str) -> impl crate::HealthCheck {
        check_fn(move || async move { Err(ProbeError::new(reason)) })
    }

    #[tokio::test]
    async fn defaults_to_ready() {
        let aggregator = HealthAggregator::new("readiness");
        let status = aggregator.readiness().await;
        assert!(status.healthy);
        assert!(status.checks.is_empty());
    }

    #[tokio::test]
    async fn all_checks_passing() {
        let aggregator = HealthAggregator::new("readiness");
        aggregator.add_check("one", passing());
        aggregator.add_check("two", passing());

        let status = aggregator.readiness().await;
        assert!(status.healthy);
        assert_eq!(status.checks.len(), 2);
        assert!(status.failing().is_empty());
    }

    #[tokio::test]
    async fn reports_every_failing_check() {
        let aggregator = HealthAggregator::new("readiness");
        aggregator.add_check("a-cache", passing());
        aggregator.add_check("b-store", failing("connection refused"));
        aggregator.add_check("c-producer", passing());
        aggregator.add_check("d-consumer", failing("unknown topic"));

        let status = aggregator.readiness().await;
        assert!(!status.healthy);
        assert_eq!(status.failing(), vec!["b-store", "d-consumer"]);
        assert_eq!(
            status.checks.get("b-store").and_then(|s| s.error.as_deref()),
            Some("connection refused")
        );
    }

    #[tokio::test]
    async fn checks_run_on_every_request() {
        let aggregator = HealthAggregator::new("readiness");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        aggregator.add_check(
            "counted",
            check_fn(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        aggregator.readiness().await;
        aggregator.readiness().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn duplicate_name_replaces_check() {
        let aggregator = HealthAggregator::new("readiness");
        aggregator.add_check("one", failing("old"));
        aggregator.add_check("one", passing());

        assert_eq!(aggregator.len(), 1);
        assert!(aggregator.readiness().await.healthy);
    }

    #[tokio::test]
    async fn removed_check_no_longer_runs() {
        let aggregator = HealthAggregator::new("readiness");
        aggregator.add_check("one", failing("down"));
        aggregator.add_check("two", passing());

        assert!(aggregator.remove_check("one"));
        assert!(!aggregator.remove_check("one"));
        assert_eq!(aggregator.check_names(), vec!["two".to_string()]);
        assert!(aggregator.readiness().await.healthy);
    }

    #[tokio::test]
    async fn slow_check_times_out() {
        let aggregator = HealthAggregator::new("readiness");
        aggregator.add_check(
            "slow",
            check_fn(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .with_timeout(Duration::from_millis(50)),
        );

        let status = tokio::time::timeout(Duration::from_secs(2), aggregator.readiness())
            .await
            .expect("readiness should not wait for the slow check");
        assert!(!status.healthy);
        assert_eq!(status.failing(), vec!["slow"]);
    }

    #[tokio::test]
    async fn liveness_ignores_checks() {
        let aggregator = HealthAggregator::new("readiness");
        aggregator.add_check("broken", failing("down"));

        let response = aggregator.liveness().into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn into_response() {
        let ok = HealthStatus::default().into_response();
        assert_eq!(ok.status(), StatusCode::OK);

        let aggregator = HealthAggregator::new("readiness");
        aggregator.add_check("one", failing("down"));
        let nok = aggregator.readiness().await.into_response();
        assert_eq!(nok.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn serializes_breakdown() {
        let aggregator = HealthAggregator::new("readiness");
        aggregator.add_check("main-cache", passing());
        aggregator.add_check("main-store", failing("timeout"));

        let status = aggregator.readiness().await;
        assert_json_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "healthy": false,
                "checks": {
                    "main-cache": {"healthy": true},
                    "main-store": {"healthy": false, "error": "timeout"}
                }
            })
        );
    }
}
