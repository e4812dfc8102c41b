pub mod analysis;
pub mod extract;
pub mod handlers;
pub mod prompts;
pub mod slide_parser;
pub mod store;
