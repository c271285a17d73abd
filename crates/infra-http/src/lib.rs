// Autopost Infrastructure - HTTP Adapters
// Implements: ContentGenerator (AI gateway), SitePublisher (site gateway)

mod client;
mod generator;
mod publisher;

pub use client::{classify_status, GatewayClient};
pub use generator::HttpContentGenerator;
pub use publisher::HttpSitePublisher;
