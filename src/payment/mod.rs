use serde::{Deserialize, Serialize};

/// Result of a processed charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub message: String,
}

/// The protected operation: a simulated payment processor that takes a
/// fixed amount of time and returns a confirmation message.
pub struct PaymentService {
    processing_delay: std::time::Duration,
}

impl PaymentService {
    pub fn new(processing_delay: std::time::Duration) -> Self {
        Self { processing_delay }
    }

    pub async fn charge(&self, amount: f64, currency: &str) -> PaymentReceipt {
        tokio::time::sleep(self.processing_delay).await;
        crate::observability::metrics::record_payment_processed(currency);
        PaymentReceipt {
            message: format!("Charged {amount} {currency}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn charge_formats_receipt() {
        let service = PaymentService::new(std::time::Duration::from_millis(0));
        let receipt = service.charge(100.0, "USD").await;
        assert_eq!(receipt.message, "Charged 100 USD");
    }
}
