pub mod api;
pub mod database;
pub mod draw;
pub mod error;
pub mod events;
pub mod redemption;
pub mod reports;
pub mod spin;
pub mod types;
pub mod utils;

pub use draw::{evaluate_spin, generate_ticket_id, issue_ticket, select_weighted_index};
pub use error::{DrawError, PaymentError, RedemptionError, SpinError};
pub use events::{EventBus, Subscription, WheelEvent};
pub use redemption::{classify, form_fields, validate_form};
pub use spin::{SpinReceipt, SpinService};
pub use types::*;
