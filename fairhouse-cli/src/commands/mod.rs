pub mod config;
pub mod funds;
pub mod house;
pub mod session;

pub use config::{handle_config_command, ConfigCommands};
pub use funds::{handle_funds_command, FundsCommands};
pub use house::{handle_house_command, HouseCommands};
pub use session::{handle_session_command, SessionCommands};
