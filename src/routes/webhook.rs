/// Payment provider callbacks
///
/// The signature is checked before the notification is looked at for
/// anything else.

use actix_web::{web, HttpResponse};

use crate::error::{AppError, AuthError};
use crate::webhook::{PaymentNotification, WebhookSignatureVerifier};

/// POST /webhooks/payment
///
/// # Errors
/// - 401 `INVALID_SIGNATURE` when the signature does not match
pub async fn payment_notification(
    notification: web::Json<PaymentNotification>,
    verifier: web::Data<WebhookSignatureVerifier>,
) -> Result<HttpResponse, AppError> {
    if !verifier.verify_notification(&notification) {
        tracing::warn!(order_id = %notification.order_id, "Rejected payment notification with bad signature");
        return Err(AuthError::InvalidSignature.into());
    }

    tracing::info!(
        order_id = %notification.order_id,
        status_code = %notification.status_code,
        transaction_status = ?notification.transaction_status,
        "Payment notification accepted"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "accepted" })))
}
