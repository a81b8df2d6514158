use std::sync::{Arc, Mutex};
use std::time::Duration;

use nodus_store::{
    ActionContext, ActionRecord, ActionSubscriber, CallOptions, Diagnostic, HandlerError, ModuleConfig, Store,
    StoreOptions, SubscribeOptions, SubscriberPhase,
};
use serde_json::{json, Value};

fn dev_options() -> StoreOptions {
    StoreOptions {
        dev_diagnostics: true,
        ..StoreOptions::default()
    }
}

fn cart_module() -> ModuleConfig {
    ModuleConfig::new()
        .namespaced(true)
        .state_fn(|| json!({"items": []}))
        .mutation("add", |state, item| {
            if let Some(items) = state["items"].as_array_mut() {
                items.push(item.clone());
            }
        })
        .action("checkout", |ctx: ActionContext, _| async move {
            let empty = ctx.state()["items"].as_array().map(Vec::is_empty).unwrap_or(true);
            if empty {
                return Err(HandlerError::rejected("empty"));
            }
            Ok(json!("ok"))
        })
}

fn cart_store() -> Store {
    Store::builder(ModuleConfig::new().module("cart", cart_module()))
        .options(dev_options())
        .observed_state()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_rejected_checkout_runs_error_subscribers() {
    let store = cart_store();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    store.subscribe_action(
        ActionSubscriber::new().on_error(move |action: &ActionRecord, state: &Value, error: &HandlerError| {
            sink.lock()
                .unwrap()
                .push((action.action_type.clone(), state.clone(), error.to_string()));
        }),
        SubscribeOptions::default(),
    );

    let err = store.dispatch("cart/checkout", Value::Null).await.unwrap_err();

    assert_eq!(err, HandlerError::rejected("empty"));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("cart/checkout".to_string(), json!({"cart": {"items": []}}), "empty".to_string())]
    );
}

#[tokio::test]
async fn test_successful_checkout_runs_after_subscribers() {
    let store = cart_store();
    store.commit("cart/add", json!("apple")).unwrap();

    let phases = Arc::new(Mutex::new(Vec::new()));
    let (before, after, error) = (phases.clone(), phases.clone(), phases.clone());
    store.subscribe_action(
        ActionSubscriber::new()
            .on_before(move |action: &ActionRecord, _: &Value| before.lock().unwrap().push(format!("before {}", action.action_type)))
            .on_after(move |action: &ActionRecord, _: &Value| after.lock().unwrap().push(format!("after {}", action.action_type)))
            .on_error(move |_: &ActionRecord, _: &Value, _: &HandlerError| error.lock().unwrap().push("error".to_string())),
        SubscribeOptions::default(),
    );

    let result = store.dispatch("cart/checkout", Value::Null).await.unwrap();

    assert_eq!(result, json!("ok"));
    assert_eq!(*phases.lock().unwrap(), vec!["before cart/checkout", "after cart/checkout"]);
}

#[tokio::test]
async fn test_before_phase_runs_at_dispatch_time() {
    let store = cart_store();
    store.commit("cart/add", json!("pear")).unwrap();

    let phases = Arc::new(Mutex::new(Vec::new()));
    let (before, after) = (phases.clone(), phases.clone());
    store.subscribe_action(
        ActionSubscriber::new()
            .on_before(move |_: &ActionRecord, _: &Value| before.lock().unwrap().push("before"))
            .on_after(move |_: &ActionRecord, _: &Value| after.lock().unwrap().push("after")),
        SubscribeOptions::default(),
    );

    let pending = store.dispatch("cart/checkout", Value::Null);
    assert_eq!(*phases.lock().unwrap(), vec!["before"]);

    pending.await.unwrap();
    assert_eq!(*phases.lock().unwrap(), vec!["before", "after"]);
}

fn counting_root() -> ModuleConfig {
    ModuleConfig::new()
        .state(json!({"count": 0}))
        .mutation("inc", |state, _| {
            state["count"] = json!(state["count"].as_i64().unwrap_or(0) + 1);
        })
}

#[tokio::test]
async fn test_ignored_dispatch_still_runs_the_action() {
    let store = Store::builder(counting_root().action_sync("bump", |ctx: ActionContext, _| {
        ctx.commit("inc", Value::Null)?;
        Ok(Value::Null)
    }))
    .observed_state()
    .build()
    .unwrap();

    let settled = Arc::new(Mutex::new(0));
    let sink = settled.clone();
    store.subscribe_action(
        ActionSubscriber::new().on_after(move |_: &ActionRecord, _: &Value| *sink.lock().unwrap() += 1),
        SubscribeOptions::default(),
    );

    drop(store.dispatch("bump", Value::Null));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(store.state()["count"], json!(1));
    assert_eq!(*settled.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_rejected_root_action_does_not_cancel_its_sibling() {
    let store = Store::builder(
        counting_root()
            .module(
                "a",
                ModuleConfig::new()
                    .namespaced(true)
                    .root_action("go", |_: ActionContext, _| async { Err(HandlerError::rejected("boom")) }),
            )
            .module(
                "b",
                ModuleConfig::new()
                    .namespaced(true)
                    .root_action("go", |ctx: ActionContext, _| async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        ctx.commit_with("inc", Value::Null, CallOptions::root())?;
                        Ok(json!("done"))
                    }),
            ),
    )
    .observed_state()
    .build()
    .unwrap();

    let err = store.dispatch("go", Value::Null).await.unwrap_err();

    assert_eq!(err, HandlerError::rejected("boom"));
    // the combined dispatch settles only once the sibling has finished
    assert_eq!(store.state()["count"], json!(1));
}

#[tokio::test]
async fn test_root_actions_from_two_modules_are_joined() {
    let module = |label: &'static str, delay_ms: u64| {
        ModuleConfig::new()
            .namespaced(true)
            .root_action("ping", move |_: ActionContext, _| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(json!(label))
            })
    };

    let store = Store::builder(
        ModuleConfig::new()
            .module("slow", module("slow", 20))
            .module("fast", module("fast", 1)),
    )
    .observed_state()
    .build()
    .unwrap();

    let results = store.dispatch("ping", Value::Null).await.unwrap();
    assert_eq!(results, json!(["slow", "fast"]));
}

#[tokio::test]
async fn test_joined_actions_reject_if_one_rejects() {
    let store = Store::builder(
        ModuleConfig::new()
            .module(
                "ok",
                ModuleConfig::new().root_action("sync", |_: ActionContext, _| async { Ok(json!(1)) }),
            )
            .module(
                "broken",
                ModuleConfig::new().root_action("sync", |_: ActionContext, _| async {
                    Err(HandlerError::failed("offline"))
                }),
            ),
    )
    .observed_state()
    .build()
    .unwrap();

    let err = store.dispatch("sync", Value::Null).await.unwrap_err();
    assert_eq!(err, HandlerError::failed("offline"));
}

#[tokio::test]
async fn test_subscriber_panics_do_not_break_dispatch() {
    let store = cart_store();
    store.commit("cart/add", json!("plum")).unwrap();

    store.subscribe_action(
        ActionSubscriber::new()
            .on_before(|_: &ActionRecord, _: &Value| panic!("before failed"))
            .on_after(|_: &ActionRecord, _: &Value| panic!("after failed")),
        SubscribeOptions::default(),
    );

    let result = store.dispatch("cart/checkout", Value::Null).await.unwrap();
    assert_eq!(result, json!("ok"));

    let faults: Vec<_> = store
        .diagnostics()
        .snapshot()
        .into_iter()
        .filter_map(|d| match d {
            Diagnostic::SubscriberFault { phase, message } => Some((phase, message)),
            _ => None,
        })
        .collect();
    assert_eq!(
        faults,
        vec![
            (SubscriberPhase::Before, "before failed".to_string()),
            (SubscriberPhase::After, "after failed".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_unknown_action_resolves_to_null() {
    let store = cart_store();
    let result = store.dispatch("cart/missing", json!({"x": 1})).await.unwrap();

    assert_eq!(result, Value::Null);
    assert_eq!(
        store.diagnostics().snapshot(),
        vec![Diagnostic::UnknownAction {
            action_type: "cart/missing".to_string()
        }]
    );
}

#[tokio::test]
async fn test_sync_action_result_is_awaitable() {
    let store = Store::builder(
        ModuleConfig::new()
            .state(json!({"count": 2}))
            .action_sync("double", |ctx: ActionContext, _| {
                Ok(json!(ctx.state()["count"].as_i64().unwrap_or(0) * 2))
            }),
    )
    .observed_state()
    .build()
    .unwrap();

    assert_eq!(store.dispatch("double", Value::Null).await.unwrap(), json!(4));
}

#[tokio::test]
async fn test_descriptor_dispatch_passes_descriptor_as_payload() {
    let store = Store::builder(
        ModuleConfig::new().action_sync("echo", |_: ActionContext, payload| Ok(payload)),
    )
    .observed_state()
    .build()
    .unwrap();

    let descriptor = json!({"type": "echo", "amount": 3});
    let result = store.dispatch(descriptor.clone(), Value::Null).await.unwrap();
    assert_eq!(result, descriptor);
}

#[tokio::test]
async fn test_actions_compose_through_local_and_root_calls() {
    let store = Store::builder(
        ModuleConfig::new()
            .state(json!({"log": []}))
            .mutation("record", |state, entry| {
                if let Some(log) = state["log"].as_array_mut() {
                    log.push(entry.clone());
                }
            })
            .module(
                "cart",
                cart_module().action("add_and_checkout", |ctx: ActionContext, item| async move {
                    ctx.commit("add", item)?;
                    let result = ctx.dispatch("checkout", Value::Null).await?;
                    ctx.commit_with("record", result.clone(), CallOptions::root())?;
                    Ok(json!({
                        "result": result,
                        "root_log": ctx.root_state()["log"].clone(),
                    }))
                }),
            ),
    )
    .observed_state()
    .build()
    .unwrap();

    let outcome = store.dispatch("cart/add_and_checkout", json!("kiwi")).await.unwrap();

    assert_eq!(outcome, json!({"result": "ok", "root_log": ["ok"]}));
    assert_eq!(store.state()["cart"]["items"], json!(["kiwi"]));
}

#[tokio::test]
async fn test_dispatch_from_spawned_task() {
    let store = cart_store();
    store.commit("cart/add", json!("fig")).unwrap();

    let handle = tokio::spawn({
        let store = store.clone();
        async move { store.dispatch("cart/checkout", Value::Null).await }
    });

    assert_eq!(handle.await.unwrap().unwrap(), json!("ok"));
}
