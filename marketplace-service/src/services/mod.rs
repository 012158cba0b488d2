pub mod booking;
pub mod coupon;
pub mod feedback;
pub mod metrics;
pub mod payment;
pub mod razorpay;
pub mod repository;

pub use booking::{BookingService, CatalogService};
pub use coupon::CouponService;
pub use feedback::FeedbackService;
pub use metrics::{get_metrics, init_metrics};
pub use payment::PaymentService;
pub use razorpay::RazorpayClient;
pub use repository::{InMemoryRepository, MongoRepository, Repository};
