/// Router Module Index
///
/// Routing is split by who may reach a route, and access control is applied per
/// module with Axum layers so no protected endpoint is exposed by accident.

/// Routes accessible to anyone (catalog reads, login, registration).
pub mod public;

/// Routes that need a verified session of any role.
pub mod authenticated;

/// Librarian-only API, nested under `/staff` behind the role guard.
pub mod staff;

/// Navigation checks and page gates consulted by the front-end router.
pub mod pages;
