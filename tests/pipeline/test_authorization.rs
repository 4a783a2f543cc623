//! Authorization in front of pipeline mutations.

use qa_pipeline::auth::{Authorizer, ResourceKind, UnmappedActionPolicy};
use qa_pipeline::error::AppError;
use qa_pipeline::models::{Role, RunStatus, ScriptStatus, TestCaseStatus};
use qa_pipeline::services::{change_role, resolve_actor};

use super::test_helpers::*;

/// Scenario D
#[tokio::test]
async fn test_developer_cannot_delete_users() {
    let env = setup_without_workers().await;

    let decision = env
        .authorizer
        .authorize(Some(&env.developer), &ResourceKind::parse("users"), "delete");
    assert!(!decision.is_allowed());
    assert!(matches!(
        decision.into_result(),
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_forbidden_run_creation_short_circuits() {
    let executor = ScriptedExecutor::new();
    let env = setup(executor.clone()).await;
    let case = create_case(&env, "Permissions").await;
    let script = create_script(&env, case.id, "perm.cy.js", ScriptStatus::Active).await;

    // Developers only read runs; no validation or execution happens first
    let err = env
        .runs
        .create_run(&env.developer, automated(case.id, script.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = env
        .runs
        .create_run(&env.developer, manual(case.id, RunStatus::Running))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    assert!(executor.calls().is_empty());
    let history = env.runs.list_runs_for_case(&env.developer, case.id).await.unwrap();
    assert!(history.is_empty());
    assert_eq!(case_status(&env, case.id).await, TestCaseStatus::Draft);
}

#[tokio::test]
async fn test_role_change_applies_to_next_request() {
    let env = setup(ScriptedExecutor::new()).await;
    let case = create_case(&env, "Role change").await;

    let before = resolve_actor(&env.pool, env.tester.id).await.unwrap();
    assert_eq!(before.role, Role::Tester);
    env.runs
        .create_run(&before, manual(case.id, RunStatus::Passed))
        .await
        .unwrap();

    let updated = change_role(&env.pool, &env.authorizer, &env.admin, env.tester.id, Role::Developer)
        .await
        .unwrap();
    assert_eq!(updated.role, Role::Developer);

    let after = resolve_actor(&env.pool, env.tester.id).await.unwrap();
    let err = env
        .runs
        .create_run(&after, manual(case.id, RunStatus::Passed))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_only_admin_changes_roles() {
    let env = setup_without_workers().await;

    for actor in [env.manager, env.developer, env.tester] {
        let err = change_role(&env.pool, &env.authorizer, &actor, env.developer.id, Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    let developer = resolve_actor(&env.pool, env.developer.id).await.unwrap();
    assert_eq!(developer.role, Role::Developer);
}

#[tokio::test]
async fn test_unmapped_action_policy_is_configurable() {
    let env = setup_without_workers().await;
    let users = ResourceKind::User;

    let permissive = Authorizer::default();
    assert!(permissive.authorize(Some(&env.tester), &users, "export").is_allowed());

    let strict = Authorizer::new(UnmappedActionPolicy::Deny);
    assert!(!strict.authorize(Some(&env.tester), &users, "export").is_allowed());
    assert!(strict.authorize(Some(&env.admin), &users, "export").is_allowed());
}
