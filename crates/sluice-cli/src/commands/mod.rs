pub mod check;
pub mod down;
pub mod init;
pub mod migrate;
pub mod new;
pub mod status;
pub mod unlock;
pub mod up;

pub use check::cmd_check;
pub use down::cmd_down;
pub use init::cmd_init;
pub use migrate::cmd_migrate;
pub use new::cmd_new;
pub use status::cmd_status;
pub use unlock::cmd_unlock;
pub use up::cmd_up;
