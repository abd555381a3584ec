//! Records the node stores besides members.
//!
//! Members themselves are [`ternion_tree::Member`]; this module holds the
//! payment records exchanged between them.

mod payment;

pub use payment::{PaymentKind, PaymentRecord, PaymentStatus};
