//! Well-known metric names and tagged sub-metric naming

/// Requests issued
pub const HTTP_REQS: &str = "http_reqs";
/// Request latency in milliseconds
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Requests that failed: status >= 400, network error or timeout
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
/// Requests that got no response or ran into their timeout
pub const DROPPED_REQUESTS: &str = "dropped_requests";
/// Responses that look like a crashed or overloaded server (no response, 503).
/// A heuristic, not a confirmed fault.
pub const HEURISTIC_CRASH_SIGNALS: &str = "heuristic_crash_signals";
/// Completed iterations
pub const ITERATIONS: &str = "iterations";
/// Iteration wall time in milliseconds
pub const ITERATION_DURATION: &str = "iteration_duration";
/// Iterations that returned an error or panicked
pub const ITERATION_ERRORS: &str = "iteration_errors";
/// Live virtual users
pub const VUS: &str = "vus";

/// Name of a sub-metric filtered by one tag, e.g. `http_req_duration{name:login}`
pub fn tagged(base: &str, key: &str, value: &str) -> String {
    format!("{}{{{}:{}}}", base, key, value)
}

/// Split `base{key:value}` into its parts; `None` for untagged names
pub fn split_tagged(name: &str) -> Option<(&str, &str, &str)> {
    let open = name.find('{')?;
    let inner = name[open + 1..].strip_suffix('}')?;
    let (key, value) = inner.split_once(':')?;
    Some((&name[..open], key, value))
}
