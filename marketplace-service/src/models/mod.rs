pub mod booking;
pub mod catalog;
pub mod coupon;
pub mod feedback;
pub mod transaction;
pub mod user;

pub use booking::{Booking, BookingStatus, PaymentStatus};
pub use catalog::{Service, ServiceFeedbackEntry};
pub use coupon::{Coupon, DiscountType};
pub use feedback::{Feedback, ProviderFeedback, ServiceFeedback};
pub use transaction::{
    PaymentMethod, Transaction, TransactionStatus, WithdrawalDetails, WithdrawalMethod,
};
pub use user::User;

/// New record identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
