//! Analytics records and aggregate shapes.

pub mod record;
