//! Host lifecycle events and the subscriber contract.

use crate::patch::{ConfigStore, ModuleHost};

/// Lifecycle points the host dispatches to plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    AfterInitialise,
    AfterRoute,
    AfterDispatch,
}

impl HostEvent {
    /// Host-side event name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AfterInitialise => "onAfterInitialise",
            Self::AfterRoute => "onAfterRoute",
            Self::AfterDispatch => "onAfterDispatch",
        }
    }
}

/// Host services handed to a subscriber for one dispatch.
pub struct HostContext<'a> {
    pub modules: &'a mut dyn ModuleHost,
    pub options: &'a mut dyn ConfigStore,
}

impl<'a> HostContext<'a> {
    pub fn new(modules: &'a mut dyn ModuleHost, options: &'a mut dyn ConfigStore) -> Self {
        Self { modules, options }
    }
}

/// Plugin-side event contract.
pub trait EventSubscriber {
    type Output;

    fn subscribed_events(&self) -> &'static [HostEvent];

    /// Handles `event`. Returns `None` for events the subscriber ignores.
    fn handle(&mut self, event: HostEvent, context: &mut HostContext<'_>) -> Option<Self::Output>;
}
