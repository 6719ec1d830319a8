use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Internal order status vocabulary.
///
/// The storefront moves an order `draft → pending_payment`, payment
/// reconciliation moves it to `paid`/`rejected`, and the merchant walks a
/// paid order through fulfillment. Terminal statuses are never regressed by
/// webhook-driven updates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    PendingPayment,
    Paid,
    Rejected,
    Accepted,
    InPreparation,
    Ready,
    OutForDelivery,
    Delivered,
    Cancelled,
    Refunded,
    ChargedBack,
}

impl OrderStatus {
    /// Statuses the reconciliation engine will never transition away from.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Refunded
                | OrderStatus::ChargedBack
        )
    }

    /// Storefront/merchant transition table.
    ///
    /// Any non-terminal status may be cancelled. Refunds and chargebacks
    /// only follow a captured payment.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if self == next {
            return false;
        }
        if next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Draft, PendingPayment)
                | (PendingPayment, Paid)
                | (PendingPayment, Rejected)
                | (Paid, Accepted)
                | (Paid, Refunded)
                | (Paid, ChargedBack)
                | (Accepted, InPreparation)
                | (InPreparation, Ready)
                | (Ready, OutForDelivery)
                | (OutForDelivery, Delivered)
        )
    }
}

/// Processor-side payment status vocabulary.
///
/// `Unknown` is a deliberate catch-all: a status this system does not yet
/// understand must never block reconciliation of the payment's existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessorPaymentStatus {
    Approved,
    Pending,
    InProcess,
    Cancelled,
    Rejected,
    Refunded,
    ChargedBack,
    #[serde(other)]
    Unknown,
}

/// Fixed lookup table from the processor vocabulary to ours.
///
/// Unmapped statuses default to `pending_payment` rather than failing.
pub fn map_processor_status(status: ProcessorPaymentStatus) -> OrderStatus {
    match status {
        ProcessorPaymentStatus::Approved => OrderStatus::Paid,
        ProcessorPaymentStatus::Pending | ProcessorPaymentStatus::InProcess => {
            OrderStatus::PendingPayment
        }
        ProcessorPaymentStatus::Cancelled => OrderStatus::Cancelled,
        ProcessorPaymentStatus::Rejected => OrderStatus::Rejected,
        ProcessorPaymentStatus::Refunded => OrderStatus::Refunded,
        ProcessorPaymentStatus::ChargedBack => OrderStatus::ChargedBack,
        ProcessorPaymentStatus::Unknown => OrderStatus::PendingPayment,
    }
}
