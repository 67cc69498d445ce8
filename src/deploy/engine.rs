//! Deployment decision engine.
//!
//! One request runs resolve, inspect, decide and at most one mutating call,
//! strictly in that order. There is no retry loop: a conflict is reported and
//! the caller resubmits with new intent (an upgrade confirmation, or after
//! running cleanup).

use super::cluster::ClusterClient;
use super::inspector::{ReleaseInspector, ReleaseState};
use super::outcome::{self, DeployFailure, DeploymentOutcome, DeploymentType, EngineResult, Stage};
use super::request::DeployRequest;
use super::resolver::{ImageRegistry, ImageTagResolver};

/// What the engine will do about the inspected release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Install { release: String },
    Upgrade { release: String },
    ExistingDeployment { release: String },
    OperationInProgress { release: String, reason: String },
    ReleaseNotFound { release: String },
}

/// Pick an action from the inspected state and the caller's intent
pub fn decide(state: &ReleaseState, upgrade_only: bool, release_name: &str) -> Decision {
    match state {
        ReleaseState::Locked { release, reason } => Decision::OperationInProgress {
            release: release.clone(),
            reason: reason.clone(),
        },
        ReleaseState::Healthy(release) if upgrade_only => Decision::Upgrade {
            release: release.clone(),
        },
        ReleaseState::Healthy(release) => Decision::ExistingDeployment {
            release: release.clone(),
        },
        ReleaseState::Absent if upgrade_only => Decision::ReleaseNotFound {
            release: release_name.to_string(),
        },
        ReleaseState::Absent => Decision::Install {
            release: release_name.to_string(),
        },
    }
}

/// Tracks the current stage of one run and rejects illegal transitions
struct Run<'r> {
    stage: Stage,
    namespace: &'r str,
}

impl<'r> Run<'r> {
    fn new(namespace: &'r str) -> Self {
        Self {
            stage: Stage::Start,
            namespace,
        }
    }

    fn enter(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.stage,
            next
        );
        tracing::debug!(namespace = self.namespace, from = ?self.stage, to = ?next, "engine transition");
        self.stage = next;
    }

    fn fail(&mut self, failure: DeployFailure) -> EngineResult {
        self.enter(Stage::Failed);
        EngineResult::Failed(failure)
    }
}

pub struct DeploymentEngine<'a> {
    cluster: &'a dyn ClusterClient,
    resolver: ImageTagResolver<'a>,
    inspector: ReleaseInspector<'a>,
}

impl<'a> DeploymentEngine<'a> {
    pub fn new(cluster: &'a dyn ClusterClient, registry: &'a dyn ImageRegistry) -> Self {
        Self {
            cluster,
            resolver: ImageTagResolver::new(registry),
            inspector: ReleaseInspector::new(cluster),
        }
    }

    /// Process one deploy request to completion. Never panics on collaborator
    /// failures; every path ends in a structured outcome.
    pub fn deploy(&self, request: &DeployRequest) -> DeploymentOutcome {
        let result = self.run(request);
        let outcome = outcome::report(request, result);

        if outcome.success() {
            crate::log_info!("{}", outcome.message());
        } else {
            crate::log_warn!(
                "{} [{}]",
                outcome.message(),
                outcome.code().map(|c| c.to_string()).unwrap_or_default()
            );
        }
        outcome
    }

    fn run(&self, request: &DeployRequest) -> EngineResult {
        let mut run = Run::new(&request.namespace);

        let validated = match request.validate() {
            Ok(v) => v,
            Err(e) => return run.fail(DeployFailure::InvalidRequest(e)),
        };

        run.enter(Stage::Resolving);
        let image = match self.resolver.resolve(
            &validated.repository,
            validated.branch.as_deref(),
            request.force_image_tag,
        ) {
            Ok(image) => image,
            Err(e) => return run.fail(DeployFailure::Resolution(e)),
        };
        crate::log_info!("Resolved image {}", image);

        run.enter(Stage::Inspecting);
        let state = match self
            .inspector
            .inspect(&request.namespace, &validated.release_name)
        {
            Ok(state) => state,
            Err(e) => return run.fail(DeployFailure::Inspection(e)),
        };

        run.enter(Stage::Deciding);
        let decision = decide(&state, request.upgrade_only, &validated.release_name);
        tracing::debug!(namespace = %request.namespace, ?state, ?decision, "decided");

        match decision {
            Decision::Install { release } => {
                run.enter(Stage::Installing);
                crate::log_info!(
                    "Installing release {} into namespace {}",
                    release,
                    request.namespace
                );
                match self
                    .cluster
                    .install(&request.namespace, &release, &image, &request.config)
                {
                    Ok(handle) => {
                        run.enter(Stage::Done);
                        EngineResult::Completed {
                            deployment_type: DeploymentType::New,
                            image,
                            handle,
                        }
                    }
                    Err(error) => run.fail(DeployFailure::Mutation {
                        stage: Stage::Installing,
                        release,
                        image,
                        error,
                    }),
                }
            }
            Decision::Upgrade { release } => {
                run.enter(Stage::Upgrading);
                crate::log_info!(
                    "Upgrading release {} in namespace {}",
                    release,
                    request.namespace
                );
                match self
                    .cluster
                    .upgrade(&request.namespace, &release, &image, &request.config)
                {
                    Ok(handle) => {
                        run.enter(Stage::Done);
                        EngineResult::Completed {
                            deployment_type: DeploymentType::Upgrade,
                            image,
                            handle,
                        }
                    }
                    Err(error) => run.fail(DeployFailure::Mutation {
                        stage: Stage::Upgrading,
                        release,
                        image,
                        error,
                    }),
                }
            }
            Decision::ExistingDeployment { release } => {
                run.enter(Stage::ReportingConflict);
                run.fail(DeployFailure::ExistingDeployment { release })
            }
            Decision::OperationInProgress { release, reason } => {
                run.enter(Stage::ReportingConflict);
                run.fail(DeployFailure::OperationInProgress { release, reason })
            }
            Decision::ReleaseNotFound { release } => {
                run.fail(DeployFailure::ReleaseNotFound { release })
            }
        }
    }
}
