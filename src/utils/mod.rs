//! Small shared helpers.

pub mod cancel;
