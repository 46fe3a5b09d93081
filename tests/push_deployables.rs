mod common;

use std::fs;

use appwrite_cli::api::{ResourceKind, ResourceRef};
use appwrite_cli::config::ConfigStore;
use appwrite_cli::push::functions::push_functions;
use appwrite_cli::push::sites::push_sites;
use appwrite_cli::push::{DeploymentFailure, PushError, PushOptions};
use common::{context, options, store_on_disk, MockApi, ScriptedPrompter};
use serde_json::{json, Value};
use tempfile::TempDir;

fn project(functions: Value) -> Value {
    json!({ "projectId": "demo", "functions": functions })
}

fn api_function(entrypoint: Option<&str>) -> Value {
    json!([{
        "$id": "api",
        "name": "API",
        "runtime": "node-18.0",
        "entrypoint": entrypoint,
        "path": "functions/api"
    }])
}

fn workspace(config: &Value) -> (TempDir, ConfigStore) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("functions/api");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("index.js"), "export default () => 'ok';").unwrap();
    let store = store_on_disk(dir.path(), config);
    (dir, store)
}

#[tokio::test]
async fn test_new_function_is_created_deployed_and_routed() {
    let (_dir, mut store) = workspace(&project(api_function(Some("index.js"))));
    let api = MockApi::new();
    let prompter = ScriptedPrompter::new(&[]);

    let summary = push_functions(&context(&api, &prompter, options()), &mut store)
        .await
        .unwrap();

    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    assert_eq!(summary.pushed, 1);
    assert_eq!(summary.deployed, 1);
    let create = api.position("create functions api").unwrap();
    let rule = api.position("create_rule function api").unwrap();
    let deploy = api.position("create_deployment function api").unwrap();
    assert!(create < rule && rule < deploy);
    assert_eq!(api.deployment_polls(), 1);
}

#[tokio::test]
async fn test_runtime_mismatch_fails_without_mutating() {
    let (_dir, mut store) = workspace(&project(api_function(Some("index.js"))));
    let api = MockApi::new();
    api.insert(
        ResourceKind::Function,
        ResourceRef::new("api"),
        json!({ "name": "API", "runtime": "python-3.9", "entrypoint": "index.js" }),
    );
    let prompter = ScriptedPrompter::new(&["YES"]);

    let summary = push_functions(&context(&api, &prompter, options()), &mut store)
        .await
        .unwrap();

    assert_eq!(summary.pushed, 0);
    assert_eq!(summary.failures.len(), 1);
    let error = summary.failures[0]
        .error
        .downcast_ref::<PushError>()
        .unwrap();
    assert!(matches!(
        error,
        PushError::IdentityMismatch { field: "runtime", .. }
    ));
    assert!(api.mutations().is_empty(), "{:?}", api.mutations());
}

#[tokio::test]
async fn test_deployment_that_never_finishes_uses_whole_budget() {
    let (_dir, mut store) = workspace(&project(api_function(Some("index.js"))));
    let api = MockApi::new();
    api.set_deployment_status("building");
    let prompter = ScriptedPrompter::new(&[]);
    let opts = PushOptions {
        attempts: 4,
        ..options()
    };

    let summary = push_functions(&context(&api, &prompter, opts), &mut store)
        .await
        .unwrap();

    assert_eq!(api.deployment_polls(), 4);
    assert_eq!(summary.pushed, 1);
    assert_eq!(summary.deployed, 0);
    let failed = &summary.failed_deployments[0];
    assert_eq!(failed.reason, DeploymentFailure::TimedOut { attempts: 4 });
    assert_eq!(
        failed.console_url,
        "https://cloud.appwrite.io/console/project-demo/functions/function-api/deployment-deployment-1"
    );
}

#[tokio::test]
async fn test_failed_build_is_reported_as_remote_failure() {
    let (_dir, mut store) = workspace(&project(api_function(Some("index.js"))));
    let api = MockApi::new();
    api.set_deployment_status("failed");
    let prompter = ScriptedPrompter::new(&[]);

    let summary = push_functions(&context(&api, &prompter, options()), &mut store)
        .await
        .unwrap();

    assert_eq!(api.deployment_polls(), 1);
    assert_eq!(summary.failed_deployments[0].reason, DeploymentFailure::Remote);
}

#[tokio::test]
async fn test_async_deploy_does_not_poll() {
    let (_dir, mut store) = workspace(&project(api_function(Some("index.js"))));
    let api = MockApi::new();
    let prompter = ScriptedPrompter::new(&[]);
    let opts = PushOptions {
        async_deploy: true,
        ..options()
    };

    let summary = push_functions(&context(&api, &prompter, opts), &mut store)
        .await
        .unwrap();

    assert_eq!(api.deployment_polls(), 0);
    assert_eq!(summary.deployed, 1);
}

#[tokio::test]
async fn test_no_code_skips_deployment() {
    let (_dir, mut store) = workspace(&project(api_function(None)));
    let api = MockApi::new();
    let prompter = ScriptedPrompter::new(&[]);
    let opts = PushOptions {
        code: false,
        ..options()
    };

    let summary = push_functions(&context(&api, &prompter, opts), &mut store)
        .await
        .unwrap();

    assert_eq!(summary.pushed, 1);
    assert_eq!(api.count("create_deployment function api"), 0);
    assert!(prompter.asked().is_empty());
}

#[tokio::test]
async fn test_missing_entrypoint_is_asked_and_saved() {
    let (dir, mut store) = workspace(&project(api_function(None)));
    let api = MockApi::new();
    let prompter = ScriptedPrompter::new(&["index.js"]);

    let summary = push_functions(&context(&api, &prompter, options()), &mut store)
        .await
        .unwrap();

    assert_eq!(summary.deployed, 1);
    let saved: Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("appwrite.config.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["functions"][0]["entrypoint"], "index.js");
}

#[tokio::test]
async fn test_variables_are_replaced_from_env_file() {
    let (dir, mut store) = workspace(&project(api_function(Some("index.js"))));
    fs::write(dir.path().join("functions/api/.env"), "API_KEY=secret\nREGION=eu\n").unwrap();
    let api = MockApi::new();
    let prompter = ScriptedPrompter::new(&[]);
    let opts = PushOptions {
        with_variables: true,
        code: false,
        ..options()
    };

    push_functions(&context(&api, &prompter, opts), &mut store)
        .await
        .unwrap();

    assert_eq!(api.count("create_variable function api API_KEY"), 1);
    assert_eq!(api.count("create_variable function api REGION"), 1);
}

#[tokio::test]
async fn test_site_deploys_from_its_own_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sites/web")).unwrap();
    fs::write(dir.path().join("sites/web/index.html"), "<h1>hi</h1>").unwrap();
    let mut store = store_on_disk(
        dir.path(),
        &json!({
            "projectId": "demo",
            "sites": [{
                "$id": "web",
                "name": "Web",
                "framework": "other",
                "outputDirectory": "./",
                "path": "sites/web"
            }]
        }),
    );
    let api = MockApi::new();
    let prompter = ScriptedPrompter::new(&[]);

    let summary = push_sites(&context(&api, &prompter, options()), &mut store)
        .await
        .unwrap();

    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    assert_eq!(summary.deployed, 1);
    assert_eq!(api.count("create_rule site web"), 1);
}

#[tokio::test]
async fn test_failed_rule_only_fails_its_own_function() {
    let config = project(json!([
        { "$id": "api", "name": "API", "runtime": "node-18.0", "entrypoint": "index.js", "path": "functions/api" },
        { "$id": "jobs", "name": "Jobs", "runtime": "node-18.0", "entrypoint": "index.js", "path": "functions/jobs" }
    ]));
    let (dir, mut store) = workspace(&config);
    let jobs = dir.path().join("functions/jobs");
    fs::create_dir_all(&jobs).unwrap();
    fs::write(jobs.join("index.js"), "export default () => 'jobs';").unwrap();
    let api = MockApi::new();
    api.fail_on("create_rule function api");
    let prompter = ScriptedPrompter::new(&[]);

    let summary = push_functions(&context(&api, &prompter, options()), &mut store)
        .await
        .unwrap();

    assert_eq!(summary.pushed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].id, "api");
    assert!(matches!(
        summary.failures[0].error.downcast_ref::<PushError>(),
        Some(PushError::Bootstrap { .. })
    ));
    assert_eq!(api.count("create_deployment function api"), 0);
    assert_eq!(api.count("create_deployment function jobs"), 1);
}

#[tokio::test]
async fn test_unreadable_console_variables_fail_bootstrap() {
    let (_dir, mut store) = workspace(&project(api_function(Some("index.js"))));
    let api = MockApi::new();
    api.fail_on("console_variables");
    let prompter = ScriptedPrompter::new(&[]);

    let summary = push_functions(&context(&api, &prompter, options()), &mut store)
        .await
        .unwrap();

    assert_eq!(summary.pushed, 0);
    assert!(matches!(
        summary.failures[0].error.downcast_ref::<PushError>(),
        Some(PushError::Bootstrap { .. })
    ));
    assert_eq!(api.count("create_rule function api"), 0);
}

#[tokio::test]
async fn test_deployment_without_id_fails_instead_of_polling() {
    let (_dir, mut store) = workspace(&project(api_function(Some("index.js"))));
    let api = MockApi::new();
    api.omit_deployment_ids();
    let prompter = ScriptedPrompter::new(&[]);

    let summary = push_functions(&context(&api, &prompter, options()), &mut store)
        .await
        .unwrap();

    assert_eq!(summary.pushed, 0);
    assert_eq!(summary.failures.len(), 1);
    let error = format!("{:#}", summary.failures[0].error);
    assert!(error.contains("no $id"), "{error}");
    assert_eq!(api.deployment_polls(), 0);
}
