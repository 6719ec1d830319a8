pub mod status;

pub use status::{map_processor_status, OrderStatus, ProcessorPaymentStatus};
