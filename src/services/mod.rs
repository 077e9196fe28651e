pub mod qr_service;
pub mod qr_service_impl;
pub use qr_service::{QrError, QrService, QrSettings};
pub use qr_service_impl::SeaOrmQrService;

pub mod scan_service;
pub mod scan_service_impl;
pub use scan_service::{
    ScanError, ScanResult, ScanService, VerifiedCheckIn, VerifyPolicies, VerifyPolicy,
};
pub use scan_service_impl::SeaOrmScanService;

pub mod leave_service;
pub mod leave_service_impl;
pub use leave_service::{LeaveError, LeaveQr, LeaveService, LeaveStart};
pub use leave_service_impl::SeaOrmLeaveService;
