//! Out-of-band response headers.
//!
//! Failures and status overrides travel in headers rather than in the body,
//! so a client can rebuild a typed error without parsing prose.
//!
//! | Header | Values |
//! |--------|--------|
//! | `x-status` | [`STATUS_OK`], [`STATUS_ERROR`], [`STATUS_SKIP`] or [`STATUS_CONFIRM`] |
//! | `x-error-type` | Name of the failure kind, e.g. `TypeError` |
//! | `x-error-msg` | Human-readable failure message |
//! | `x-error-report` | JSON [`ErrorReportRef`](crate::ErrorReportRef) for reportable failures |
//! | `x-updated` | `yes` / `no`: server build fingerprint |
//!
//! `x-make-view-request: yes` on a request asks the server whether the
//! controller behind it should be shown at all.

pub const X_STATUS: &str = "x-status";
pub const X_ERROR_TYPE: &str = "x-error-type";
pub const X_ERROR_MSG: &str = "x-error-msg";
pub const X_ERROR_REPORT: &str = "x-error-report";
pub const X_UPDATED: &str = "x-updated";
pub const X_MAKE_VIEW_REQUEST: &str = "x-make-view-request";

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";
pub const STATUS_SKIP: &str = "skip";
pub const STATUS_CONFIRM: &str = "confirm";
