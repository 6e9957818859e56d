pub mod review;
pub mod session;

pub use review::{ReviewError, ReviewService};
pub use session::ReviewSession;
