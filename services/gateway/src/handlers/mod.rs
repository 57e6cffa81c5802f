pub mod admin;
pub mod investment;
pub mod market;
pub mod order;
