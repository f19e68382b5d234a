//! The sample sales-order service wired into a running workflow, the same
//! way the CLI does it.

use std::time::Duration;

use form_workflow::config::DemoConfig;
use form_workflow::demo::SalesOrderService;
use form_workflow::{spawn_workflow, FormWorkflow, FormWorkflowConfig, RuntimeOptions};

mod fixtures;
use fixtures::sales_order;

#[tokio::test]
async fn test_sales_order_cycle_from_rejection_to_restart() {
    let service = SalesOrderService::new(100, Duration::ZERO);
    let runtime = spawn_workflow(FormWorkflow::new(), service, RuntimeOptions::default());
    let handle = runtime.handle();

    for (key, value) in sales_order("Jim", "20", "Dunder Mifflin") {
        handle.change(key, value).await.unwrap();
    }
    handle.submit().await.unwrap();

    let rejected = handle.wait_for_state("editing.error").await.unwrap();
    assert_eq!(rejected.context.errors.get("reams"), Some("Not enough reams!"));
    assert_eq!(rejected.context.errors.len(), 1);

    handle.change("reams", "150").await.unwrap();
    handle.submit().await.unwrap();
    let accepted = handle.wait_for_state("success").await.unwrap();
    assert_eq!(accepted.context.value("reams"), Some("150"));

    handle.again().await.unwrap();
    let fresh = handle.wait_for_state("editing.pristine").await.unwrap();
    assert!(fresh.context.is_empty());

    let workflow = runtime.shutdown().await.unwrap();
    let path: Vec<String> = workflow.history().map(|record| record.to.to_string()).collect();
    assert_eq!(
        path,
        vec![
            "submitting",
            "editing.error",
            "submitting",
            "success",
            "editing.pristine",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_configured_latency_keeps_workflow_submitting() {
    let config = FormWorkflowConfig {
        demo: DemoConfig {
            min_reams: 10,
            latency_ms: 5_000,
        },
        ..Default::default()
    };
    let service = SalesOrderService::from_config(&config.demo);
    let runtime = spawn_workflow(
        FormWorkflow::new(),
        service,
        config.workflow.runtime_options(),
    );
    let handle = runtime.handle();

    for (key, value) in sales_order("Stanley", "12", "Acme") {
        handle.change(key, value).await.unwrap();
    }
    handle.submit().await.unwrap();
    handle.wait_for_state("submitting").await.unwrap();

    tokio::time::sleep(Duration::from_millis(4_000)).await;
    assert!(handle.current_state().matches("submitting"));

    let settled = handle.wait_for_state("success").await.unwrap();
    assert_eq!(settled.context.value("name"), Some("Stanley"));

    runtime.shutdown().await.unwrap();
}
