//! Domain model module declarations.

pub mod channel;
pub mod decision;
pub mod session;
