pub use super::attendances::Entity as Attendances;
pub use super::companies::Entity as Companies;
pub use super::company_qr_codes::Entity as CompanyQrCodes;
pub use super::employees::Entity as Employees;
pub use super::qr_replay_marks::Entity as QrReplayMarks;
