//! Server state shared with every request worker through the depot.

use std::sync::Arc;

use salvo::async_trait;

use cairn_core::error::CoreError;
use cairn_repo::{ActivityStore, Repository};

use crate::error::AppResult;

/// The repository, activity store and context prefix one server
/// instance serves.
#[derive(Clone)]
pub struct ServerState {
    pub repo: Arc<dyn Repository>,
    pub activities: Arc<dyn ActivityStore>,
    /// URI prefix the repository is addressed under, e.g. `/repos`.
    pub context: String,
}

impl ServerState {
    #[must_use]
    pub fn new(
        repo: Arc<dyn Repository>,
        activities: Arc<dyn ActivityStore>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            activities,
            context: context.into(),
        }
    }

    /// Strips the context prefix from a request path, leaving the
    /// repository-relative URI.
    #[must_use]
    pub fn relative_uri<'p>(&self, request_path: &'p str) -> &'p str {
        let rest = request_path
            .strip_prefix(self.context.as_str())
            .unwrap_or(request_path);
        if rest.is_empty() { "/" } else { rest }
    }
}

/// Injects the server state into each request's depot.
pub struct StateHandler {
    pub state: ServerState,
}

#[async_trait]
impl salvo::Handler for StateHandler {
    async fn handle(
        &self,
        _req: &mut salvo::Request,
        depot: &mut salvo::Depot,
        _res: &mut salvo::Response,
        _ctrl: &mut salvo::FlowCtrl,
    ) {
        depot.inject(self.state.clone());
    }
}

/// ## Summary
/// Retrieves the server state from the depot.
///
/// ## Errors
/// Returns an error if the state is not found in the depot.
pub fn state_from_depot(depot: &salvo::Depot) -> AppResult<&ServerState> {
    depot
        .obtain::<ServerState>()
        .map_err(|_err| CoreError::InvariantViolation("Server state not found in depot").into())
}
