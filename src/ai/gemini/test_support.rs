use wiremock::matchers::{method, path_regex};
use wiremock::MockBuilder;

pub const GENERATE_CONTENT_PATH_REGEX: &str = r"^/v1beta/models/[^/]+:generateContent$";
pub const PREDICT_PATH_REGEX: &str = r"^/v1beta/models/[^/]+:predict$";
pub const PREDICT_LONG_RUNNING_PATH_REGEX: &str = r"^/v1beta/models/[^/]+:predictLongRunning$";

pub fn post_path_regex(pattern: &str) -> MockBuilder {
    wiremock::Mock::given(method("POST")).and(path_regex(pattern))
}

pub fn get_path_regex(pattern: &str) -> MockBuilder {
    wiremock::Mock::given(method("GET")).and(path_regex(pattern))
}
