/// Middleware module
///
/// Bearer token guard for protected routes.

mod access_guard;

pub use access_guard::AccessGuard;
