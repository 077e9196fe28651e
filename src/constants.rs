pub mod headers {

    /// Subject asserted by the upstream identity provider.
    pub const USER_ID: &str = "x-user-id";

    /// Optional company-context assertion.
    pub const COMPANY_ID: &str = "x-company-id";

    pub const REQUEST_ID: &str = "x-request-id";
}

pub mod routes {

    pub const SCAN_CHECK_IN: &str = "/scan";

    pub const SCAN_CHECK_OUT: &str = "/scan/checkout";
}

pub mod db {
    use std::time::Duration;

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

    pub const MAX_LIFETIME: Duration = Duration::from_secs(600);
}
