// ABOUTME: Handler registry mapping each handler to the set of event kinds it accepts
// ABOUTME: Lookup walks an event kind's ancestry and yields every interested handler once

use crate::error::BotError;
use crate::handler::EventHandler;
use crate::kind::{EventKind, Interest};
use std::sync::Arc;

struct Registration {
    handler: Arc<dyn EventHandler>,
    interest: Interest,
}

/// Registry of event handlers, keyed by handler identity.
///
/// Populated before the bot runs and read-only afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    registrations: Vec<Registration>,
}

fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for an explicit set of kinds.
    ///
    /// Registering the same handler again merges the kinds instead of adding
    /// a second entry, so it is never scheduled twice for one event.
    pub fn register(
        &mut self,
        interest: impl Into<Interest>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), BotError> {
        let interest = interest.into();
        if interest.is_empty() {
            return Err(BotError::EmptyInterest {
                handler: handler.name().to_string(),
            });
        }

        tracing::debug!(
            handler = %handler.name(),
            kinds = ?interest.kinds().map(|k| k.to_string()).collect::<Vec<_>>(),
            "Registering event handler"
        );

        match self
            .registrations
            .iter_mut()
            .find(|r| same_handler(&r.handler, &handler))
        {
            Some(existing) => existing.interest.extend(interest),
            None => self.registrations.push(Registration { handler, interest }),
        }
        Ok(())
    }

    /// Register `handler` for the kinds it declares through [`EventHandler::interest`].
    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) -> Result<(), BotError> {
        let interest = handler.interest();
        self.register(interest, handler)
    }

    /// Handlers interested in an event of `kind`.
    ///
    /// Walks the kind's ancestry most specific first; a handler interested in
    /// several ancestors appears once, at its first match.
    pub fn matching(&self, kind: EventKind) -> Vec<Arc<dyn EventHandler>> {
        let mut matched: Vec<Arc<dyn EventHandler>> = Vec::new();
        for ancestor in kind.ancestry() {
            for registration in &self.registrations {
                if !registration.interest.contains(ancestor) {
                    continue;
                }
                if matched.iter().any(|h| same_handler(h, &registration.handler)) {
                    continue;
                }
                matched.push(Arc::clone(&registration.handler));
            }
        }
        matched
    }

    /// Kinds registered for `handler`, if it is registered at all
    pub fn interest_of(&self, handler: &Arc<dyn EventHandler>) -> Option<&Interest> {
        self.registrations
            .iter()
            .find(|r| same_handler(&r.handler, handler))
            .map(|r| &r.interest)
    }

    /// Number of distinct handlers
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
