pub mod android;
pub mod harmony;
pub mod manager;
pub mod monitor;
pub mod shell;
pub mod traits;

#[cfg(test)]
pub mod fake;
