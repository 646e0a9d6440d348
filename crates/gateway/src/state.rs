use std::sync::Arc;

use wd_advisory::AdvisoryClient;
use wd_domain::config::Config;
use wd_domain::time::Clock;
use wd_logbook::Logbook;
use wd_policy::{PolicyEngine, ToolRouter};

use crate::runtime::actuators::ToolDispatcher;
use crate::runtime::foreground::ForegroundProbe;

/// Shared application state passed to all API handlers.
///
/// Everything flows through here; there are no module-level singletons, so
/// tests can swap the dispatcher, probe, and clock freely.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub logbook: Arc<Logbook>,
    pub policy: Arc<PolicyEngine>,
    pub router: Arc<ToolRouter>,
    pub advisory: Arc<AdvisoryClient>,
    pub dispatcher: Arc<dyn ToolDispatcher>,
    pub foreground: Arc<dyn ForegroundProbe>,
    pub clock: Arc<dyn Clock>,
}
