pub mod catalog;
pub mod quote;
pub mod session;
pub mod tier;
