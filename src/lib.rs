pub mod artifact;
pub mod config;
pub mod errors;
pub mod extract;
pub mod guard;
pub mod logging;
pub mod normalize;
pub mod orchestrator;
pub mod portal;
pub mod session;
pub mod site;
pub mod types;
pub mod ui;
pub mod util;
