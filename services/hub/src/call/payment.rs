/// Whether a call requires a payment token, and whether the caller holds a
/// valid one. Stripe/crypto processor integration is a Non-goal; this trait
/// is the seam a future billing module plugs into without touching the
/// policy engine.
pub trait PaymentGate: Send + Sync {
    fn callee_requires_payment(&self, callee_address: &str) -> bool;
    fn has_valid_payment_token(&self, caller_address: &str, callee_address: &str) -> bool;
}

/// No payment gating until a billing module exists: every call is free.
pub struct NoopPaymentGate;

impl PaymentGate for NoopPaymentGate {
    fn callee_requires_payment(&self, _callee_address: &str) -> bool {
        false
    }

    fn has_valid_payment_token(&self, _caller_address: &str, _callee_address: &str) -> bool {
        true
    }
}
