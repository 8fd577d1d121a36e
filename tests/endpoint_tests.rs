mod common;

use common::harness::{call, call_with, engine_with_logger, router_for};
use declarest::errors::{ids, ErrorCatalog};
use declarest::hooks::policies::{require_header, require_value};
use declarest::render::{text_renderer, TEXT_PLAIN};
use declarest::{
    Bind, Endpoint, EngineConfig, ErrorMapper, ErrorPayload, Problem, Request, RequestContext,
    ResponseWriter, Router,
};
use http::{Method, StatusCode};
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Bind)]
struct Hello {
    #[bind(path = "id", required)]
    id: u64,
    #[bind(query = "name")]
    name: String,
}

#[derive(Debug, Serialize)]
struct Greeting {
    greeting: String,
}

fn hello_endpoint() -> Endpoint<Hello, Greeting> {
    Endpoint::new(Method::GET, "/hello/{id}", |_ctx: &RequestContext, input: Hello| {
        Ok(Greeting {
            greeting: format!("hello {} (#{})", input.name, input.id),
        })
    })
}

#[test]
fn test_hello_renders_json() {
    let (engine, logger) = engine_with_logger(EngineConfig::default());
    let router = router_for(&engine, hello_endpoint());

    let res = call(&router, Request::new(Method::GET, "/hello/42?name=World"));
    assert_eq!(res.status(), Some(StatusCode::OK));
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(res.body_str(), r#"{"greeting":"hello World (#42)"}"#);

    let entries = logger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, Some(200));
    assert_eq!(entries[0].path, "/hello/42");
    assert!(entries[0].error.is_none());
}

#[test]
fn test_accept_text_plain_uses_endpoint_renderer() {
    let (engine, _logger) = engine_with_logger(EngineConfig::default());
    let endpoint = hello_endpoint().renderer(
        TEXT_PLAIN,
        text_renderer(|payload| {
            format!("~ {} ~", payload["greeting"].as_str().unwrap_or_default())
        }),
    );
    let router = router_for(&engine, endpoint);

    let req = Request::new(Method::GET, "/hello/42?name=World").with_header("Accept", "text/plain");
    let res = call(&router, req);
    assert_eq!(res.status(), Some(StatusCode::OK));
    assert_eq!(res.header("content-type"), Some("text/plain"));
    assert_eq!(res.body_str(), "~ hello World (#42) ~");

    // The endpoint renderer stays local to the endpoint.
    assert!(!engine.renderers().contains(TEXT_PLAIN));
}

#[test]
fn test_handler_panic_maps_to_internal_error() {
    let (engine, logger) = engine_with_logger(EngineConfig::default());
    let endpoint = Endpoint::new(
        Method::GET,
        "/boom/{id}",
        |_ctx: &RequestContext, _input: Hello| -> anyhow::Result<Greeting> {
            panic!("handler exploded")
        },
    );
    let router = router_for(&engine, endpoint);

    let res = call(&router, Request::new(Method::GET, "/boom/1"));
    assert_eq!(res.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    let payload: ErrorPayload = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(payload.id, ids::INTERNAL_ERROR);
    assert!(!payload.message.contains("exploded"));

    let entries = logger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, Some(500));
    assert!(entries[0].error.as_deref().unwrap().contains("handler exploded"));
}

#[test]
fn test_panicking_renderer_falls_back_to_json_error() {
    let (engine, logger) = engine_with_logger(EngineConfig::default());
    let endpoint = hello_endpoint().renderer(
        TEXT_PLAIN,
        text_renderer(|_payload| -> String { panic!("renderer exploded") }),
    );
    let router = router_for(&engine, endpoint);

    let req = Request::new(Method::GET, "/hello/42?name=World").with_header("Accept", "text/plain");
    let res = call(&router, req);
    assert_eq!(res.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(res.json()["id"], ids::INTERNAL_ERROR);

    let entries = logger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, Some(500));
    assert!(entries[0].error.as_deref().unwrap().contains("renderer exploded"));
}

#[test]
fn test_bind_failure_reports_fields_and_origin() {
    let (engine, _logger) = engine_with_logger(EngineConfig::default());
    let router = router_for(&engine, hello_endpoint());

    let req = Request::new(Method::GET, "/hello/abc").with_header("X-Request-Id", "req-123");
    let res = call(&router, req);
    assert_eq!(res.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(res.header("x-request-id"), Some("req-123"));

    let body = res.json();
    assert_eq!(body["id"], ids::INVALID_REQUEST);
    assert_eq!(body["origin"], "req-123");
    assert_eq!(body["data"]["fields"][0]["field"], "id");
    assert_eq!(body["data"]["fields"][0]["source"], "path");
}

#[test]
fn test_generated_correlation_id_is_echoed() {
    let (engine, logger) = engine_with_logger(EngineConfig::default());
    let router = router_for(&engine, hello_endpoint());

    let res = call(&router, Request::new(Method::GET, "/hello/1"));
    let echoed = res.header("x-request-id").unwrap().to_string();
    assert!(!echoed.is_empty());
    assert_eq!(logger.entries()[0].request_id.as_deref(), Some(echoed.as_str()));
}

#[test]
fn test_hooks_run_engine_first_in_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (mut engine, _logger) = engine_with_logger(EngineConfig::default());

    let seen = Arc::clone(&order);
    engine.add_input_hook(move |_ctx, value| {
        assert!(value.downcast_ref::<Hello>().is_some());
        seen.lock().unwrap().push("engine input");
        Ok(())
    });
    let seen = Arc::clone(&order);
    engine.add_output_hook(move |_ctx, _value| {
        seen.lock().unwrap().push("engine output");
        Ok(())
    });

    let (first, second, third) = (Arc::clone(&order), Arc::clone(&order), Arc::clone(&order));
    let endpoint = hello_endpoint()
        .input_hook(move |_ctx, input: &mut Hello| {
            first.lock().unwrap().push("endpoint input");
            input.name = input.name.to_uppercase();
            Ok(())
        })
        .output_hook(move |_ctx, output: &mut Greeting| {
            second.lock().unwrap().push("endpoint output");
            output.greeting.push('!');
            Ok(())
        })
        .policy(move |_ctx, _req: &Request, input: &Hello| {
            third.lock().unwrap().push("policy");
            assert_eq!(input.name, "WORLD");
            Ok(())
        });
    let router = router_for(&engine, endpoint);

    let res = call(&router, Request::new(Method::GET, "/hello/7?name=world"));
    assert_eq!(res.json()["greeting"], "hello WORLD (#7)!");
    assert_eq!(
        *order.lock().unwrap(),
        vec![
            "engine input",
            "endpoint input",
            "policy",
            "engine output",
            "endpoint output"
        ]
    );
}

#[test]
fn test_failing_hook_stops_the_request() {
    let called = Arc::new(Mutex::new(false));
    let (engine, _logger) = engine_with_logger(EngineConfig::default());
    let flag = Arc::clone(&called);
    let endpoint = Endpoint::new(Method::GET, "/hello/{id}", move |_ctx: &RequestContext, _input: Hello| {
        *flag.lock().unwrap() = true;
        Ok(Greeting { greeting: String::new() })
    })
    .input_hook(|_ctx, _input: &mut Hello| Err(Problem::invalid("rejected by hook").into()));
    let router = router_for(&engine, endpoint);

    let res = call(&router, Request::new(Method::GET, "/hello/1"));
    assert_eq!(res.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(res.json()["message"], "rejected by hook");
    assert!(!*called.lock().unwrap());
}

#[test]
fn test_policies_reject_unauthorized_and_forbidden() {
    #[derive(Clone)]
    struct Principal(&'static str);

    let (engine, _logger) = engine_with_logger(EngineConfig::default());
    let endpoint = hello_endpoint()
        .enricher(|ctx: RequestContext, req: &Request| {
            Ok(match req.header("authorization") {
                Some("Bearer good") => ctx.with_value(Principal("alice")),
                _ => ctx,
            })
        })
        .policy_with(Arc::new(require_header("Authorization")))
        .policy_with(Arc::new(require_value::<Principal>()));
    let router = router_for(&engine, endpoint);

    let res = call(&router, Request::new(Method::GET, "/hello/1"));
    assert_eq!(res.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(res.json()["id"], ids::UNAUTHORIZED);

    let req = Request::new(Method::GET, "/hello/1").with_header("Authorization", "Bearer bad");
    let res = call(&router, req);
    assert_eq!(res.status(), Some(StatusCode::FORBIDDEN));

    let req = Request::new(Method::GET, "/hello/1").with_header("Authorization", "Bearer good");
    let res = call(&router, req);
    assert_eq!(res.status(), Some(StatusCode::OK));
}

#[derive(Debug, Default, Bind)]
struct ById {
    #[bind(path = "id", required)]
    id: u64,
}

#[test]
fn test_default_statuses_follow_the_method() {
    let (engine, _logger) = engine_with_logger(EngineConfig::default());
    let mut router = Router::new();
    engine
        .mount(
            &mut router,
            Endpoint::new(Method::POST, "/items/{id}", |_ctx: &RequestContext, input: ById| {
                Ok(serde_json::json!({ "id": input.id }))
            }),
        )
        .unwrap();
    engine
        .mount(
            &mut router,
            Endpoint::new(Method::DELETE, "/items/{id}", |_ctx: &RequestContext, _input: ById| {
                Ok(())
            }),
        )
        .unwrap();
    engine
        .mount(
            &mut router,
            Endpoint::new(Method::PUT, "/items/{id}", |_ctx: &RequestContext, _input: ById| Ok(()))
                .status(StatusCode::ACCEPTED),
        )
        .unwrap();

    let res = call(&router, Request::new(Method::POST, "/items/3"));
    assert_eq!(res.status(), Some(StatusCode::CREATED));
    assert_eq!(res.json()["id"], 3);

    let res = call(&router, Request::new(Method::DELETE, "/items/3"));
    assert_eq!(res.status(), Some(StatusCode::NO_CONTENT));
    assert!(res.body().is_empty());

    let res = call(&router, Request::new(Method::PUT, "/items/3"));
    assert_eq!(res.status(), Some(StatusCode::ACCEPTED));
    assert_eq!(res.body_str(), "null");
}

#[test]
fn test_cancelled_request_writes_nothing() {
    let (engine, logger) = engine_with_logger(EngineConfig::default());
    let router = router_for(&engine, hello_endpoint());

    let (ctx, cancel) = RequestContext::with_cancel();
    cancel.cancel();
    let res = call_with(&router, ctx, Request::new(Method::GET, "/hello/1"));
    assert_eq!(res.status(), None);
    assert!(res.body().is_empty());

    let entries = logger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, None);
    assert!(entries[0].error.as_deref().unwrap().contains("canceled"));
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("pet is sleeping")]
struct Sleeping;

#[test]
fn test_custom_catalog_and_sentinel_rules() {
    let mut catalog = ErrorCatalog::with_defaults();
    catalog.register("pet_not_found", 404, "no such pet").unwrap();
    catalog.register("pet_busy", 409, "").unwrap();
    let mapper = ErrorMapper::standard_with(Arc::new(catalog)).unwrap();
    mapper.register_sentinel(Sleeping, "pet_busy").unwrap();

    let (mut engine, _logger) = engine_with_logger(EngineConfig::default());
    engine.set_mapper(Arc::new(mapper));
    let endpoint = Endpoint::new(Method::GET, "/pets/{id}", |_ctx: &RequestContext, input: ById| {
        match input.id {
            1 => Err(Problem::new("pet_not_found")
                .with_data(serde_json::json!({ "id": input.id }))
                .into()),
            2 => Err(anyhow::Error::new(Sleeping).context("loading pet")),
            _ => Ok(serde_json::json!({ "id": input.id })),
        }
    });
    let router = router_for(&engine, endpoint);

    let res = call(&router, Request::new(Method::GET, "/pets/1"));
    assert_eq!(res.status(), Some(StatusCode::NOT_FOUND));
    let body = res.json();
    assert_eq!(body["id"], "pet_not_found");
    assert_eq!(body["message"], "no such pet");
    assert_eq!(body["data"]["id"], 1);

    let res = call(&router, Request::new(Method::GET, "/pets/2"));
    assert_eq!(res.status(), Some(StatusCode::CONFLICT));
    assert_eq!(res.json()["message"], "Conflict");

    let res = call(&router, Request::new(Method::GET, "/pets/3"));
    assert_eq!(res.status(), Some(StatusCode::OK));
}

#[test]
fn test_compiled_endpoint_snapshots_engine_defaults() {
    let (mut engine, _logger) = engine_with_logger(EngineConfig::default());
    let router = router_for(&engine, hello_endpoint());

    engine.register_renderer(TEXT_PLAIN, text_renderer(|_| "late".to_string()));
    let req = Request::new(Method::GET, "/hello/1").with_header("Accept", "text/plain");
    let res = call(&router, req);
    assert_eq!(res.header("content-type"), Some("application/json"));

    let later = router_for(&engine, hello_endpoint());
    let req = Request::new(Method::GET, "/hello/1").with_header("Accept", "text/plain");
    assert_eq!(call(&later, req).body_str(), "late");
}

#[test]
fn test_unknown_default_content_type_fails_compile() {
    let (engine, _logger) = engine_with_logger(EngineConfig::default());
    let mut router = Router::new();
    let err = engine
        .mount(&mut router, hello_endpoint().default_content_type("application/xml"))
        .unwrap_err();
    assert!(err.to_string().contains("/hello/{id}"));
    assert!(router.is_empty());
}
