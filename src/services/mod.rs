pub mod catalog;
pub mod discounts;
pub mod inventory;
pub mod orders;
pub mod payments;
