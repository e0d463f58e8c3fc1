use serde::{Deserialize, Serialize};

/// Body of `POST /process-payment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPaymentRequest {
    pub amount: f64,
    pub currency: String,
}

impl ProcessPaymentRequest {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if !self.amount.is_finite() || self.amount <= 0.0 {
            errors.push(ValidationError {
                field: "amount".to_string(),
                message: "amount must be a positive number".to_string(),
            });
        }
        if self.currency.len() != 3 {
            errors.push(ValidationError {
                field: "currency".to_string(),
                message: "currency must be a 3-letter ISO 4217 code".to_string(),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}
