pub mod prelude;

pub mod attendances;
pub mod companies;
pub mod company_qr_codes;
pub mod employees;
pub mod qr_replay_marks;
