use nodus_store as store;

// Guards against regressions in dispatching to trait-based action handlers:
// a struct implementing `ActionHandler` is registered on a namespaced module,
// commits through its local context and returns a value to the caller.

#[tokio::test]
async fn test_trait_handler_commits_through_local_context() -> Result<(), Box<dyn std::error::Error>> {
    struct StoreSettingsHandler;

    #[async_trait::async_trait]
    impl store::ActionHandler for StoreSettingsHandler {
        async fn handle(
            &self,
            context: store::ActionContext,
            payload: serde_json::Value,
        ) -> Result<serde_json::Value, store::HandlerError> {
            context.commit("set_settings", payload)?;
            Ok(serde_json::json!({"status": "saved"}))
        }
    }

    let settings = store::ModuleConfig::new()
        .namespaced(true)
        .state(serde_json::json!({"current": null}))
        .mutation("set_settings", |state, payload| {
            state["current"] = payload.clone();
        })
        .action_handler("store_settings", StoreSettingsHandler);

    let app = store::Store::builder(store::ModuleConfig::new().module("settings", settings))
        .observed_state()
        .build()?;

    let result = app
        .dispatch("settings/store_settings", serde_json::json!({"theme": "dark"}))
        .await?;

    assert_eq!(result, serde_json::json!({"status": "saved"}));
    assert_eq!(app.state()["settings"]["current"], serde_json::json!({"theme": "dark"}));
    Ok(())
}

#[tokio::test]
async fn test_root_trait_handler_registered_twice_is_joined() -> Result<(), Box<dyn std::error::Error>> {
    struct Echo(&'static str);

    #[async_trait::async_trait]
    impl store::ActionHandler for Echo {
        async fn handle(
            &self,
            _context: store::ActionContext,
            _payload: serde_json::Value,
        ) -> Result<serde_json::Value, store::HandlerError> {
            Ok(serde_json::json!(self.0))
        }
    }

    let app = store::Store::builder(
        store::ModuleConfig::new()
            .module(
                "left",
                store::ModuleConfig::new().namespaced(true).root_action_handler("echo", Echo("left")),
            )
            .module(
                "right",
                store::ModuleConfig::new().namespaced(true).root_action_handler("echo", Echo("right")),
            ),
    )
    .observed_state()
    .build()?;

    let result = app.dispatch("echo", serde_json::Value::Null).await?;
    assert_eq!(result, serde_json::json!(["left", "right"]));
    Ok(())
}
