/// Router Module Index
///
/// Routing is split by what a request needs from the client: nothing, a logged-in session,
/// or a guard decision.

/// Routes open to any client.
pub mod public;

/// Routes behind the session middleware.
pub mod authenticated;

/// Dashboard views. Everything not matched here falls through to the guarded view handler.
pub mod views;
