mod init;
mod qr;

pub use init::cmd_init;
pub use qr::{cmd_qr_deactivate, cmd_qr_ensure, cmd_qr_list, cmd_qr_render};
