mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod representation;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
pub mod api;
pub mod config;
pub mod constants;
pub mod media;

pub use api::{routes::routes, state::State};
pub use authentication::*;
pub use config::Config;
pub use database::*;
