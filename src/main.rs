// src/main.rs
// Demo binary - builds a small store, commits, dispatches and prints the resulting state

use nodus_store::{HandlerError, ModuleConfig, Store, StoreOptions};
use serde_json::{json, Value};

fn cart_module() -> ModuleConfig {
    ModuleConfig::new()
        .namespaced(true)
        .state_fn(|| json!({"items": [], "checked_out": false}))
        .mutation("add", |state, item| {
            if let Some(items) = state["items"].as_array_mut() {
                items.push(item.clone());
            }
        })
        .mutation("clear", |state, _| {
            state["items"] = json!([]);
            state["checked_out"] = json!(true);
        })
        .getter("count", |state, _, _, _| {
            json!(state["items"].as_array().map(Vec::len).unwrap_or(0))
        })
        .action("checkout", |ctx, _| async move {
            let count = ctx.getters().get("count").and_then(|v| v.as_u64()).unwrap_or(0);
            if count == 0 {
                return Err(HandlerError::rejected("empty"));
            }
            ctx.commit("clear", Value::Null)?;
            ctx.commit_with("increment", json!(count), nodus_store::CallOptions::root())?;
            Ok(json!({"purchased": count}))
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let options = match std::env::args().nth(1) {
        Some(path) => StoreOptions::load(path)?,
        None => StoreOptions::default(),
    };

    let store = Store::builder(
        ModuleConfig::new()
            .state(json!({"count": 0}))
            .mutation("increment", |state, n| {
                let next = state["count"].as_i64().unwrap_or(0) + n.as_i64().unwrap_or(1);
                state["count"] = json!(next);
            })
            .module("cart", cart_module()),
    )
    .options(options)
    .observed_state()
    .build()?;

    store.commit("increment", json!(5))?;
    store.commit("cart/add", json!({"sku": "A-1"}))?;
    store.commit("cart/add", json!({"sku": "B-2"}))?;

    let receipt = store.dispatch("cart/checkout", Value::Null).await?;
    println!("checkout: {}", receipt);

    match store.dispatch("cart/checkout", Value::Null).await {
        Ok(_) => println!("second checkout unexpectedly succeeded"),
        Err(err) => println!("second checkout rejected: {}", err),
    }

    println!("state: {}", serde_json::to_string_pretty(&store.state())?);
    Ok(())
}
