//! Canonical pipeline stacks.
//!
//! Two delivery stacks ship out of the box: the full three-stage
//! source/build/deploy pipeline and a two-stage variant that deploys
//! straight from the fetched source. Both are plain data; callers are
//! free to build their own definitions instead.

use super::{Environment, PipelineConfig, StageAction, StageConfig};
use crate::core::ArtifactKind;
use crate::engine::RetryPolicy;
use std::collections::BTreeMap;

fn fetch_stage(owner: &str, repo: &str, branch: &str) -> StageConfig {
    StageConfig::new(
        "source",
        StageAction::FetchSource {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
        },
        ArtifactKind::SourceTree,
    )
}

fn build_stage(environment: Environment) -> StageConfig {
    let mut env = BTreeMap::new();
    env.insert(
        "DEPLOY_ENVIRONMENT".to_string(),
        environment.as_str().to_string(),
    );

    StageConfig::new(
        "build",
        StageAction::RunBuild {
            commands: vec![
                "install".to_string(),
                "test".to_string(),
                "package".to_string(),
            ],
            env,
        },
        ArtifactKind::BuildOutput,
    )
    .with_dependency("source")
    .with_input(ArtifactKind::SourceTree)
    .with_retry(RetryPolicy::new().with_max_attempts(3))
}

fn deploy_stage(environment: Environment, input: ArtifactKind, dep: &str) -> StageConfig {
    StageConfig::new(
        "deploy",
        StageAction::ApplyDeployment {
            target: environment,
            require_approval: environment == Environment::Prod,
        },
        ArtifactKind::DeploymentRecord,
    )
    .with_dependency(dep)
    .with_input(input)
}

/// The full delivery stack: source -> build -> deploy.
///
/// The build stage retries up to three times and receives the target
/// environment through its variable map; production deploys require
/// approval.
#[must_use]
pub fn source_build_deploy(
    environment: Environment,
    owner: &str,
    repo: &str,
    branch: &str,
) -> PipelineConfig {
    PipelineConfig::new(format!("{environment}-delivery"), environment)
        .with_stage(fetch_stage(owner, repo, branch))
        .with_stage(build_stage(environment))
        .with_stage(deploy_stage(
            environment,
            ArtifactKind::BuildOutput,
            "build",
        ))
}

/// The two-stage variant: source -> deploy, no separate build.
#[must_use]
pub fn source_deploy(
    environment: Environment,
    owner: &str,
    repo: &str,
    branch: &str,
) -> PipelineConfig {
    PipelineConfig::new(format!("{environment}-direct-delivery"), environment)
        .with_stage(fetch_stage(owner, repo, branch))
        .with_stage(deploy_stage(
            environment,
            ArtifactKind::SourceTree,
            "source",
        ))
}
