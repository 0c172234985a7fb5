pub mod controller;
pub mod db;
pub mod error;
pub mod live;
pub mod models;
pub mod store;
