// src/models/refund.rs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestRefundRequest {
    #[validate(length(min = 3, max = 500, message = "Informe o motivo do reembolso."))]
    #[schema(example = "Produto chegou quebrado")]
    pub reason: String,
    /// Só vale para administradores; abre revisão mesmo em pedidos não entregues.
    #[serde(default)]
    pub admin_initiated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefundDecision {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RespondRefundRequest {
    pub decision: RefundDecision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_flag_defaults_to_false() {
        let payload: RequestRefundRequest =
            serde_json::from_str(r#"{"reason":"Tamanho errado"}"#).unwrap();
        assert!(!payload.admin_initiated);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn empty_reason_is_rejected() {
        let payload: RequestRefundRequest = serde_json::from_str(r#"{"reason":""}"#).unwrap();
        assert!(payload.validate().is_err());
    }
}
