pub mod attendance;
pub mod company;
pub mod qr;
