pub mod init;
pub mod logs;
pub mod rooms;
pub mod run;
pub mod serve;
pub mod version;

pub use init::cmd_init;
pub use logs::cmd_logs;
pub use rooms::{handle_rooms_command, RoomsCommand};
pub use run::cmd_run;
pub use serve::cmd_serve;
pub use version::cmd_version;
