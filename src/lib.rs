pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod registry;
pub mod routes;
pub mod server;
pub mod translate;
pub mod users;
