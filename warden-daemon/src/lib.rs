pub mod errors;
pub mod handler;
pub mod logs;
pub mod path;
pub mod settings;
pub mod store;
pub mod supervisor;

pub use settings::{default_socket_path, global_state_dir};
