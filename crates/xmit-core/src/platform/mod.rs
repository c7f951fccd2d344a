mod paths;

pub use paths::{config_dir, home_dir};
