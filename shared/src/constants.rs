pub const SPIN_ENDPOINT: &str = "/api/spin";
pub const SAVE_EMAIL_ENDPOINT: &str = "/api/save-email";
pub const PRIZES_ENDPOINT: &str = "/api/prizes";
pub const ENV_CHECK_ENDPOINT: &str = "/api/test-env";
pub const HEALTH_CHECK_ENDPOINT: &str = "/api/health_check";

pub const REQUIRED_FIELDS_ERROR: &str = "Email and prize amount are required";
pub const INVALID_EMAIL_ERROR: &str = "Invalid email format";
pub const INVALID_BIRTHDAY_ERROR: &str = "Please enter a valid birthday";
pub const SAVE_FAILED_ERROR: &str = "Failed to save email to Google Sheets";
pub const SESSION_NOT_FOUND_ERROR: &str = "Spin session not found";

pub const EMAIL_SAVED_MESSAGE: &str = "Email saved successfully";
pub const INVALID_BODY_ERROR: &str = "Invalid request body";
