pub mod accumulator;
pub mod app;
pub mod calendar;
pub mod channels;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;
pub mod ui;
pub mod state;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use store::{FileStore, TimeLogStore};
