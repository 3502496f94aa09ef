//! Database models split into domain-specific modules.

pub mod customer;
pub mod detail;
pub mod fabric;
pub mod form;
pub mod measurement;
pub mod payment;
pub mod reference;
pub mod user;

pub use customer::*;
pub use detail::*;
pub use fabric::*;
pub use form::*;
pub use measurement::*;
pub use payment::*;
pub use reference::*;
pub use user::*;
