pub mod checkout_draft;
pub mod discount_code;
pub mod inventory_log_entry;
pub mod order;
pub mod order_item;
pub mod order_status_history;
pub mod product;
pub mod shipping_address;
pub mod user;
