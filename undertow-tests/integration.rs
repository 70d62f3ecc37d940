//! Integration tests for Undertow
//!
//! Drive the whole resolution stack: a mock catalog site served by wiremock,
//! real decoder processes running shell scripts, and the API router.

#[cfg(unix)]
#[path = "integration/support.rs"]
mod support;

#[cfg(unix)]
#[path = "integration/decoder_process.rs"]
mod decoder_process;
#[cfg(unix)]
#[path = "integration/http_api.rs"]
mod http_api;
#[cfg(unix)]
#[path = "integration/pipeline_end_to_end.rs"]
mod pipeline_end_to_end;
