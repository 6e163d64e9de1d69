use crate::domain::booking::PaymentMethod;
use crate::domain::ids::UserId;
use crate::domain::money::Amount;
use crate::domain::ports::{PaymentGateway, PaymentOutcome};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Stand-in for the external payment gateway. Approves every charge except
/// for methods configured to be declined.
#[derive(Debug, Default, Clone)]
pub struct MockPaymentGateway {
    declined_methods: HashSet<PaymentMethod>,
    refunded: Arc<Mutex<Vec<String>>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declining(methods: impl IntoIterator<Item = PaymentMethod>) -> Self {
        Self {
            declined_methods: methods.into_iter().collect(),
            refunded: Arc::default(),
        }
    }

    /// References reversed so far, oldest first.
    pub fn refunds(&self) -> Vec<String> {
        self.refunded.lock().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, _user: &UserId, _amount: Amount, method: PaymentMethod) -> Result<PaymentOutcome> {
        if self.declined_methods.contains(&method) {
            return Ok(PaymentOutcome::Declined {
                reason: format!("{method} payments are unavailable"),
            });
        }
        Ok(PaymentOutcome::Approved {
            reference: format!("mock-{}", Uuid::now_v7().simple()),
        })
    }

    async fn refund(&self, reference: &str) -> Result<()> {
        info!(reference, "mock_refund");
        self.refunded.lock().push(reference.to_string());
        Ok(())
    }
}
