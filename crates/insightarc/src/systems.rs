pub mod research;
pub mod system;
pub mod web_search;

pub use system::System;
