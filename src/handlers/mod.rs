pub mod checkout;
pub mod common;
pub mod discounts;
pub mod inventory;
pub mod orders;
pub mod payment_webhooks;
pub mod products;
