//! Shopify Admin REST access: link-header pagination and the order models
//! the flattening step reads.
pub mod client;
pub mod link_header;
pub mod models;

pub use client::{HttpTransport, Page, PageTransport, ShopifyClient};
pub use link_header::parse_next_link;
