pub mod auth;
pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod password;
pub mod posts;
pub mod router;
pub mod speech;
pub mod state;
pub mod token;
pub mod users;
pub mod votes;
