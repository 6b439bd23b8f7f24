pub mod matcher;
pub mod screenshot;
pub mod traits;
pub mod types;
pub mod ui_tree;
pub mod vision;
