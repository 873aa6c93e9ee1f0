//! The syndication token service: a refresh/access JWT pair gating content syndicated
//! to external clients, plus the registered-client catalog backing the exchange.

pub mod client;
pub mod token;

pub use client::{Client, SyndicationClient};
pub use token::{TokenClaims, ACCESS_TOKEN_TTL_SECONDS};
