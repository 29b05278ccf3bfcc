pub mod delivery;
pub mod material;
pub mod purchase_order;
pub mod request;
pub mod site;
