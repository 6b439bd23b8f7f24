pub mod engine;
pub mod history;
pub mod reporter;
pub mod resolver;
pub mod session;
pub mod state;
