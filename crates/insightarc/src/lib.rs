pub mod agent;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod research;
pub mod search;
pub mod session;
pub mod store;
pub mod systems;
