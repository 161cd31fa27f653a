//! Leader-forwarding write path.
//!
//! A write enters on any node. The leader executes it locally; a follower
//! replays it against the leader's own write endpoint. While no leader is
//! known the attempt is retried with exponential backoff until either the
//! attempt limit or the deadline runs out.
//!
//! There is no request id on forwarded writes. If the leader commits but the
//! reply is lost, the retry commits the same command again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::command::Command;
use crate::engine::{CommitReceipt, ConsensusEngine, Role};
use crate::error::{EngineError, ForwardError};
use crate::transport::{ForwardRequest, PeerTransport};

/// Limits for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub deadline: Duration,
}

impl Default for ForwardPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(1),
            deadline: Duration::from_secs(10),
        }
    }
}

impl ForwardPolicy {
    /// Upper bound of the pause after `attempt` (1-based): doubles each time,
    /// capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }

    /// Full-jitter pause somewhere in the upper half of [`Self::backoff`].
    fn jittered(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff(attempt);
        let floor = ceiling / 2;
        if ceiling <= floor {
            return ceiling;
        }
        rand::thread_rng().gen_range(floor..=ceiling)
    }
}

/// How a submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(CommitReceipt),
    Forwarded { leader: String },
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    LocalApply,
    Forward(String),
    LeaderUnknown,
}

enum Step {
    Done(Outcome),
    Retry,
}

/// Submits writes on behalf of one node: locally while it leads, otherwise
/// to whichever peer it believes leads.
#[derive(Clone)]
pub struct LeaderForwarder {
    engine: Arc<dyn ConsensusEngine>,
    transport: Arc<dyn PeerTransport>,
    policy: ForwardPolicy,
    seed: Option<String>,
}

impl LeaderForwarder {
    /// Forwards through `transport` and gives up per `policy`.
    pub fn new(
        engine: Arc<dyn ConsensusEngine>,
        transport: Arc<dyn PeerTransport>,
        policy: ForwardPolicy,
    ) -> Self {
        Self {
            engine,
            transport,
            policy,
            seed: None,
        }
    }

    /// Uses `seed` as the target whenever the leader is unknown.
    pub fn with_seed(mut self, seed: Option<String>) -> Self {
        self.seed = seed;
        self
    }

    /// Gets `command` committed somewhere in the cluster.
    pub async fn submit(&self, command: Command) -> Result<Outcome, ForwardError> {
        command
            .validate()
            .map_err(|err| ForwardError::Rejected(err.into()))?;
        let request = ForwardRequest::from_command(&command).map_err(ForwardError::Encode)?;

        let started = Instant::now();
        let deadline = started + self.policy.deadline;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let step = match self.route() {
                Route::LocalApply => match timeout(remaining, self.engine.execute(command.clone())).await {
                    Ok(Ok(receipt)) => Step::Done(Outcome::Applied(receipt)),
                    Ok(Err(EngineError::NotLeader { leader })) => {
                        debug!(?leader, attempt, "lost leadership before commit");
                        Step::Retry
                    }
                    Ok(Err(err)) => return Err(ForwardError::Rejected(err)),
                    Err(_) => {
                        debug!(attempt, "local commit hit the deadline");
                        Step::Retry
                    }
                },
                Route::Forward(target) => {
                    match timeout(remaining, self.transport.forward(&target, &request)).await {
                        Ok(Ok(())) => Step::Done(Outcome::Forwarded { leader: target }),
                        Ok(Err(err)) => {
                            debug!(peer = %target, error = %err, attempt, "forward failed");
                            Step::Retry
                        }
                        Err(_) => {
                            debug!(peer = %target, attempt, "forward hit the deadline");
                            Step::Retry
                        }
                    }
                }
                Route::LeaderUnknown => {
                    debug!(command = command.name(), attempt, "leader unknown");
                    Step::Retry
                }
            };

            if let Step::Done(outcome) = step {
                return Ok(outcome);
            }

            let now = Instant::now();
            if attempt >= self.policy.max_attempts || now >= deadline {
                let elapsed = now.duration_since(started);
                warn!(command = command.name(), attempt, ?elapsed, "giving up on write");
                return Err(ForwardError::Timeout {
                    attempts: attempt,
                    elapsed,
                });
            }
            let pause = self.policy.jittered(attempt).min(deadline - now);
            sleep(pause).await;
        }
    }

    fn route(&self) -> Route {
        if self.engine.state() == Role::Leader {
            return Route::LocalApply;
        }
        match self.engine.leader() {
            Some(leader) if leader != self.engine.name() => Route::Forward(leader),
            _ => self
                .seed
                .clone()
                .map_or(Route::LeaderUnknown, Route::Forward),
        }
    }
}
