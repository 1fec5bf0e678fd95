//! Remote Operation Executor: token attachment and bounded re-authentication.

use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::operations::Operation;
use crate::session::SessionView;
use crate::transport::Transport;

/// Cumulative re-authentication retries allowed for one logical call.
pub const MAX_REAUTH_RETRIES: u32 = 5;

/// Retry allowance owned by a single call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(retries: u32) -> Self {
        Self {
            remaining: retries,
            used: 0,
        }
    }

    /// Takes one retry from the budget, returning false once it is spent.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.used += 1;
        true
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(MAX_REAUTH_RETRIES)
    }
}

#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Runs `operation`, refreshing the session's token first when it is close
    /// to expiry and re-authenticating whenever the service answers UNAUTHENTICATED.
    pub async fn execute(
        &self,
        session: Option<&mut dyn SessionView>,
        operation: &Operation,
    ) -> Result<Value> {
        self.execute_with_budget(session, operation, RetryBudget::default())
            .await
    }

    pub async fn execute_with_budget(
        &self,
        mut session: Option<&mut dyn SessionView>,
        operation: &Operation,
        mut budget: RetryBudget,
    ) -> Result<Value> {
        loop {
            let bearer = match session.as_deref_mut() {
                Some(session) => {
                    if session.needs_refresh() {
                        debug!("Access token near expiry, refreshing before {}", operation.name);
                        session.refresh(self.transport.as_ref()).await?;
                    }
                    session.current_token().map(str::to_string)
                }
                None => None,
            };

            match self.transport.send(operation, bearer.as_deref()).await {
                Ok(data) => return Ok(data),
                Err(Error::Unauthenticated(msg)) => {
                    let Some(session) = session.as_deref_mut() else {
                        return Err(Error::Unauthenticated(msg));
                    };
                    if !budget.try_consume() {
                        warn!(
                            "Giving up on {} after {} re-authentication attempts",
                            operation.name,
                            budget.used()
                        );
                        return Err(Error::Unauthenticated(msg));
                    }
                    warn!(
                        "{} was rejected as unauthenticated, re-authenticating (attempt {}/{})",
                        operation.name,
                        budget.used(),
                        MAX_REAUTH_RETRIES
                    );
                    session.authenticate(self.transport.as_ref()).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
