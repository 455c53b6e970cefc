//! Validating admission webhook guarding the managed-by label of
//! OpenIDConnect resources created by this controller.

use std::collections::BTreeMap;

use axum::{Json, Router, routing::post};
use kube::core::{
    DynamicObject,
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::{LABEL_MANAGED_BY, LABEL_MANAGED_BY_VALUE};

pub const WEBHOOK_PATH: &str = "/webhooks/oidc";

pub const DENY_MESSAGE: &str = "removing or changing label \"app.kubernetes.io/managed-by\" for managed OpenIDConnect is not allowed";

type Labels = BTreeMap<String, String>;

/// Admission check keeping managed OpenIDConnect objects recognizable as
/// managed. Pure: looks only at the objects of the request.
pub struct LabelGuard;

impl LabelGuard {
    /// Rejects updates that take a managed OpenIDConnect out of management.
    /// Anything that is not an update is allowed, as is every update of an
    /// object that was not managed before.
    pub fn check(
        operation: &Operation,
        old_labels: Option<&Labels>,
        new_labels: Option<&Labels>,
    ) -> Result<()> {
        if !matches!(operation, Operation::Update) {
            return Ok(());
        }
        if !is_managed(old_labels) {
            return Ok(());
        }
        if is_managed(new_labels) {
            Ok(())
        } else {
            Err(Error::ValidationDenied(DENY_MESSAGE.to_string()))
        }
    }

    pub fn handle(
        old: Option<&DynamicObject>,
        new: Option<&DynamicObject>,
        operation: &Operation,
    ) -> Result<()> {
        Self::check(
            operation,
            old.and_then(|o| o.metadata.labels.as_ref()),
            new.and_then(|o| o.metadata.labels.as_ref()),
        )
    }

    /// Builds the admission response for a decoded request.
    pub fn review(req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let resp = AdmissionResponse::from(req);
        if matches!(req.operation, Operation::Update) && req.old_object.is_none()
        {
            return resp.deny("update request without oldObject");
        }
        match Self::handle(
            req.old_object.as_ref(),
            req.object.as_ref(),
            &req.operation,
        ) {
            Ok(()) => resp,
            Err(e) => resp.deny(e.to_string()),
        }
    }
}

fn is_managed(labels: Option<&Labels>) -> bool {
    labels
        .and_then(|l| l.get(LABEL_MANAGED_BY))
        .is_some_and(|v| v == LABEL_MANAGED_BY_VALUE)
}

async fn handle_review(
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "webhook: invalid admission review");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    debug!(
        operation = ?req.operation,
        name = %req.name,
        user = ?req.user_info.username,
        "webhook: reviewing OpenIDConnect"
    );
    let resp = LabelGuard::review(&req);
    if !resp.allowed {
        info!(
            name = %req.name,
            user = ?req.user_info.username,
            "webhook: denied change of managed-by label"
        );
    }
    Json(resp.into_review())
}

pub fn router() -> Router {
    Router::new().route(WEBHOOK_PATH, post(handle_review))
}
