pub mod api;
pub mod model;
pub mod settings;

pub use api::{Error, HistoryQuery};
pub use model::Api;
