pub mod academic;
pub mod classes;
pub mod core;
pub mod fee_types;
pub mod payments;
pub mod students;
