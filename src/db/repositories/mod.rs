pub mod attendance;
pub mod company;
pub mod qr_code;
pub mod replay;
