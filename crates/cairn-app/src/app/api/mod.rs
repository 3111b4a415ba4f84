mod dav;

use salvo::Router;

use crate::state::{ServerState, StateHandler};

/// ## Summary
/// Constructs the router serving one repository under its context
/// prefix.
#[must_use]
pub fn routes(state: ServerState) -> Router {
    let component = state
        .context
        .trim_matches('/')
        .to_string();
    Router::new()
        .hoop(StateHandler { state })
        .push(Router::with_path(component).push(dav::routes()))
}
