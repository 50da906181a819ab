pub mod categories;
pub mod health;
pub mod index;
pub mod search;

pub use categories::categories_handler;
pub use health::{health_handler, ready_handler};
pub use index::{rebuild_handler, save_handler};
pub use search::search_handler;
